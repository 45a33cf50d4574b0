//! 错误类型定义
//!
//! 定义了解析与回放过程中可能出现的所有错误类型。
//! 逐行解析错误（[`ParseError`]）不会中断批次；回放错误（[`ReplayError`]）
//! 中只有 IO 类错误会终止整次运行。

use thiserror::Error;

/// 逐行解析错误类型
///
/// 单行日志解析失败时产生，对应行被丢弃并记录，批次继续。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// 行不符合事件行文法（既不是事件行，也不在多行语句的续行上下文中）
    #[error("line does not match the query log grammar: {0}")]
    InvalidEventLine(String),

    /// 形似事件行，但命令字不在 connect / query / init db / quit 之中
    #[error("unrecognized command word '{command}' in line: {line}")]
    UnknownCommand {
        /// 行内出现的命令字
        command: String,
        /// 原始行内容
        line: String,
    },

    /// 语句首词不在可回放的 SQL 动词白名单内
    #[error("unrecognized sql verb '{verb}' in statement: {sql}")]
    UnknownSqlVerb {
        /// 语句的首个空白分隔词
        verb: String,
        /// 完整语句文本
        sql: String,
    },

    /// query 事件没有任何语句文本
    #[error("empty statement payload for connection {id}")]
    EmptyStatement {
        /// 连接 id
        id: String,
    },
}

/// 回放错误类型
///
/// 资源与执行类错误彼此隔离，不会波及兄弟会话；
/// 只有 `Io` 对整次运行是致命的。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplayError {
    /// 日志文件不可读或结果文件不可写，终止当前运行
    #[error("io error: {0}")]
    Io(String),

    /// 数据库连接无法建立；会话保留但没有句柄
    #[error("failed to open connection to '{server}' database '{database}': {message}")]
    Resource {
        /// 服务器地址
        server: String,
        /// 目标数据库名
        database: String,
        /// 驱动报告的错误信息
        message: String,
    },

    /// 单条语句执行失败；记录后继续下一条
    #[error("statement execution failed: {0}")]
    Execution(String),

    /// 会话从未建立数据库句柄
    #[error("connection not initialized")]
    NoConnection,

    /// 会话工作线程 panic，join 时上报
    #[error("session worker panicked: {0}")]
    WorkerPanic(String),
}

impl From<std::io::Error> for ReplayError {
    fn from(err: std::io::Error) -> Self {
        ReplayError::Io(err.to_string())
    }
}
