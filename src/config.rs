//! 回放配置模块
//!
//! 汇集一次回放所需的全部外部参数。核心只把它们当作普通值读取，
//! 解析来源（命令行、环境）由外层负责。

use std::time::Duration;

use crate::measure::ReportFormat;

/// 回放配置
///
/// `parallel` 是真实并发上限，`batch_size` 是单个批次消费的日志行数。
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// 数据库服务器地址（驱动相关的 URI 前缀）
    pub server: String,

    /// 默认数据库名，init db 载荷为空时使用
    pub database: String,

    /// 数据库用户名
    pub username: String,

    /// 数据库密码
    pub password: String,

    /// 并发上限 P：同时运行的会话工作线程数
    pub parallel: usize,

    /// 单个批次消费的日志行数
    pub batch_size: usize,

    /// 忽略前缀：以这些前缀开头的语句不回放
    pub ignore_prefixes: Vec<String>,

    /// 受限连接 id：该连接的生命周期事件被跳过
    pub restricted_id: Option<String>,

    /// 报表输出格式
    pub format: ReportFormat,

    /// 晋升线程的轮询兜底间隔
    pub promote_interval: Duration,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            database: "test".to_string(),
            username: String::new(),
            password: String::new(),
            parallel: 15,
            batch_size: 10_000,
            ignore_prefixes: Vec::new(),
            restricted_id: None,
            format: ReportFormat::Text,
            promote_interval: Duration::from_millis(500),
        }
    }
}
