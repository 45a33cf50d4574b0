//! 数据库驱动接口模块
//!
//! 核心通过 [`SqlDriver`] / [`SqlConnection`] 两个 trait 与具体数据库
//! 解耦：回放引擎只需要「打开连接、查询模式执行、更新模式执行、关闭」
//! 四个操作。crate 自带两个实现：
//! - [`NullDriver`] - 空跑驱动，接受一切语句什么都不做
//! - `SqliteDriver`（`sqlite` 特性）- 基于 rusqlite 的本地驱动

use crate::error::ReplayError;

/// 数据库驱动：按会话凭据打开连接
pub trait SqlDriver: Send + Sync {
    /// 打开一条到 `server` 上数据库 `database` 的连接
    ///
    /// # 返回
    ///
    /// * `Ok(handle)` - 连接建立成功，句柄归会话独占
    /// * `Err(ReplayError::Resource)` - 连接无法建立
    fn open(
        &self,
        server: &str,
        database: &str,
        username: &str,
        password: &str,
    ) -> Result<Box<dyn SqlConnection>, ReplayError>;
}

/// 一条已建立的数据库连接
///
/// 始终由单个会话工作线程独占访问，无需内部同步。
pub trait SqlConnection: Send {
    /// 查询模式执行，结果集被丢弃
    fn execute_query(&mut self, sql: &str) -> Result<(), ReplayError>;

    /// 更新模式执行，返回（随后被丢弃的）影响行数
    fn execute_update(&mut self, sql: &str) -> Result<usize, ReplayError>;

    /// 关闭连接
    fn close(&mut self) -> Result<(), ReplayError>;
}

/// 空跑驱动
///
/// 不连接任何服务器，所有语句立即成功。用于只验证解析与调度
/// 的试运行（`--dry-run`）。
#[derive(Debug, Default)]
pub struct NullDriver;

struct NullConnection;

impl SqlDriver for NullDriver {
    fn open(
        &self,
        _server: &str,
        _database: &str,
        _username: &str,
        _password: &str,
    ) -> Result<Box<dyn SqlConnection>, ReplayError> {
        Ok(Box::new(NullConnection))
    }
}

impl SqlConnection for NullConnection {
    fn execute_query(&mut self, _sql: &str) -> Result<(), ReplayError> {
        Ok(())
    }

    fn execute_update(&mut self, _sql: &str) -> Result<usize, ReplayError> {
        Ok(0)
    }

    fn close(&mut self) -> Result<(), ReplayError> {
        Ok(())
    }
}

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDriver;

#[cfg(feature = "sqlite")]
mod sqlite {
    use std::path::Path;

    use super::{SqlConnection, SqlDriver};
    use crate::error::ReplayError;

    /// 基于 rusqlite 的本地驱动
    ///
    /// `server` 被解释为存放数据库文件的目录（`:memory:` 表示内存库），
    /// 每个会话打开 `<server>/<database>.db`；用户名密码被忽略。
    /// MySQL 等网络驱动可以通过同一个 trait 接缝接入。
    #[derive(Debug, Default)]
    pub struct SqliteDriver;

    struct SqliteConnection {
        conn: Option<rusqlite::Connection>,
    }

    impl SqlDriver for SqliteDriver {
        fn open(
            &self,
            server: &str,
            database: &str,
            _username: &str,
            _password: &str,
        ) -> Result<Box<dyn SqlConnection>, ReplayError> {
            let resource = |e: rusqlite::Error| ReplayError::Resource {
                server: server.to_string(),
                database: database.to_string(),
                message: e.to_string(),
            };

            let conn = if server == ":memory:" {
                rusqlite::Connection::open_in_memory().map_err(resource)?
            } else {
                let path = Path::new(server).join(format!("{database}.db"));
                rusqlite::Connection::open(path).map_err(resource)?
            };

            Ok(Box::new(SqliteConnection { conn: Some(conn) }))
        }
    }

    impl SqliteConnection {
        fn conn(&mut self) -> Result<&mut rusqlite::Connection, ReplayError> {
            self.conn.as_mut().ok_or(ReplayError::NoConnection)
        }
    }

    impl SqlConnection for SqliteConnection {
        fn execute_query(&mut self, sql: &str) -> Result<(), ReplayError> {
            let conn = self.conn()?;
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| ReplayError::Execution(e.to_string()))?;
            let mut rows = stmt
                .query([])
                .map_err(|e| ReplayError::Execution(e.to_string()))?;
            // 结果集被丢弃，但仍然完整拉取，计时才覆盖整个执行
            while rows
                .next()
                .map_err(|e| ReplayError::Execution(e.to_string()))?
                .is_some()
            {}
            Ok(())
        }

        fn execute_update(&mut self, sql: &str) -> Result<usize, ReplayError> {
            self.conn()?
                .execute(sql, [])
                .map_err(|e| ReplayError::Execution(e.to_string()))
        }

        fn close(&mut self) -> Result<(), ReplayError> {
            match self.conn.take() {
                Some(conn) => conn
                    .close()
                    .map_err(|(_, e)| ReplayError::Execution(e.to_string())),
                None => Ok(()),
            }
        }
    }
}
