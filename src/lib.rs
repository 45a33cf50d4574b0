//! # MySQL Database Replay - Query Log
//!
//! 一个基于 MySQL 通用查询日志的并发回放与基准测试库：把抓取到的
//! 日志文本重建为各连接的事件时间线，对目标数据库重新执行每条语句，
//! 并测量逐语句延迟。
//!
//! ## 功能特性
//!
//! - **事件流解析**: 正则驱动的行文法匹配，多行语句前瞻重组与单行回退
//! - **会话级并发**: 每个连接一个工作线程，私有 FIFO 队列保证语句顺序
//! - **时序屏障**: 会话推迟到其 connect 瞬间活跃的全部前驱终止之后执行
//! - **准入控制**: 可配置的并发上限，超出部分进入 FIFO 积压队列
//! - **逐语句计时**: 以语句文本为键聚合延迟，输出纯文本或 CSV 报表
//!
//! ## 快速开始
//!
//! ```rust
//! use std::io::Cursor;
//! use std::sync::Arc;
//!
//! use mysql_database_replay_querylog::{
//!     BenchMonitor, LogEventParser, NullDriver, ReplayConfig, ReplayEngine, ReportFormat,
//! };
//!
//! let log = "150811  6:47:54  940899 Connect  user@host as anon\n\
//!            940899 Init DB  test\n\
//!            940899 Query  SELECT 1\n\
//!            940899 Quit\n";
//!
//! let mut parser = LogEventParser::new(Cursor::new(log));
//! let monitor = Arc::new(BenchMonitor::new());
//! let engine = ReplayEngine::new(
//!     ReplayConfig::default(),
//!     Arc::new(NullDriver),
//!     Arc::clone(&monitor),
//! );
//!
//! for event in parser.parse_all().unwrap() {
//!     engine.dispatch(event);
//! }
//! engine.join().unwrap();
//!
//! let report = monitor.render(ReportFormat::Text);
//! assert!(report.contains("SELECT 1"));
//! ```
//!
//! ## 日志格式
//!
//! 支持的事件行示例（时间戳前缀可选，命令字大小写不敏感）：
//!
//! ```text
//! 150811  6:47:54  940899 Connect  user@host on
//! 940899 Init DB   orders
//! 940899 Query     SELECT * FROM t WHERE id = 1
//! 940899 Quit
//! ```
//!
//! `query` 的语句体可以跨多行：不匹配行文法的后续行都并入语句。

pub mod admission;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod executor;
pub mod measure;
pub mod parser;
pub mod session;

pub use config::ReplayConfig;
pub use engine::ReplayEngine;
pub use error::{ParseError, ReplayError};
pub use event::{Query, QueryKind, SessionEvent, SqlVerb};
pub use executor::{NullDriver, SqlConnection, SqlDriver};
#[cfg(feature = "sqlite")]
pub use executor::SqliteDriver;
pub use measure::{BenchMonitor, MeasurePoint, PointSummary, ReportFormat};
pub use parser::{LogEventParser, parse_events_from_string};
pub use session::{Session, SessionState};
