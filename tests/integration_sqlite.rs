//! 端到端回放测试：真实数据库
//!
//! 用 rusqlite 实现驱动接缝，把一段查询日志回放到临时目录里的
//! SQLite 数据库上，验证写语句真实落库、读语句产生计时样本。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use mysql_database_replay_querylog::{
    BenchMonitor, ReplayConfig, ReplayEngine, ReplayError, SqlConnection, SqlDriver,
    parse_events_from_string,
};

/// `server` 解释为数据库文件所在目录，每个会话打开 `<db>.db`
struct DirSqliteDriver;

struct DirSqliteConnection {
    conn: rusqlite::Connection,
}

impl SqlDriver for DirSqliteDriver {
    fn open(
        &self,
        server: &str,
        database: &str,
        _username: &str,
        _password: &str,
    ) -> Result<Box<dyn SqlConnection>, ReplayError> {
        let path = Path::new(server).join(format!("{database}.db"));
        let conn = rusqlite::Connection::open(path).map_err(|e| ReplayError::Resource {
            server: server.to_string(),
            database: database.to_string(),
            message: e.to_string(),
        })?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| ReplayError::Resource {
                server: server.to_string(),
                database: database.to_string(),
                message: e.to_string(),
            })?;
        Ok(Box::new(DirSqliteConnection { conn }))
    }
}

impl SqlConnection for DirSqliteConnection {
    fn execute_query(&mut self, sql: &str) -> Result<(), ReplayError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| ReplayError::Execution(e.to_string()))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| ReplayError::Execution(e.to_string()))?;
        while rows
            .next()
            .map_err(|e| ReplayError::Execution(e.to_string()))?
            .is_some()
        {}
        Ok(())
    }

    fn execute_update(&mut self, sql: &str) -> Result<usize, ReplayError> {
        self.conn
            .execute(sql, [])
            .map_err(|e| ReplayError::Execution(e.to_string()))
    }

    fn close(&mut self) -> Result<(), ReplayError> {
        Ok(())
    }
}

#[test]
fn replay_against_sqlite_database() {
    let dir = TempDir::new().unwrap();

    // 会话 2 在会话 1 活跃期间 connect，屏障保证建表先于查询
    let log = "150811  6:47:54  1 Connect  bench@localhost on\n\
               1 Init DB  bench\n\
               1 Query  CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)\n\
               1 Query  INSERT INTO t (name) VALUES ('a')\n\
               1 Query  INSERT INTO t (name) VALUES ('b')\n\
               2 Connect  bench@localhost on\n\
               2 Init DB  bench\n\
               2 Query  SELECT name\n\
               FROM t\n\
               ORDER BY id\n\
               1 Quit\n\
               2 Quit\n";

    let (events, errors) = parse_events_from_string(log);
    assert!(errors.is_empty(), "unexpected parse errors: {errors:?}");

    let monitor = Arc::new(BenchMonitor::new());
    let config = ReplayConfig {
        server: dir.path().to_string_lossy().into_owned(),
        parallel: 4,
        ..ReplayConfig::default()
    };
    let engine = ReplayEngine::new(config, Arc::new(DirSqliteDriver), Arc::clone(&monitor));
    for event in events {
        engine.dispatch(event);
    }
    engine.join().unwrap();

    // 写语句真实落库
    let check = rusqlite::Connection::open(dir.path().join("bench.db")).unwrap();
    let count: i64 = check
        .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 2);

    // 四条语句各产生一个计时样本
    let points = monitor.snapshot();
    assert_eq!(points.len(), 4);
    assert!(points.iter().all(|p| p.count == 1));
    assert!(
        points
            .iter()
            .any(|p| p.label == "SELECT name\nFROM t\nORDER BY id")
    );
}

#[test]
fn broken_statement_is_isolated_from_the_batch() {
    let dir = TempDir::new().unwrap();

    let log = "1 Connect  bench@localhost on\n\
               1 Init DB  bench\n\
               1 Query  CREATE TABLE t (id INTEGER PRIMARY KEY)\n\
               1 Query  INSERT INTO missing_table VALUES (1)\n\
               1 Query  INSERT INTO t VALUES (1)\n\
               1 Quit\n";

    let (events, _) = parse_events_from_string(log);
    let monitor = Arc::new(BenchMonitor::new());
    let config = ReplayConfig {
        server: dir.path().to_string_lossy().into_owned(),
        ..ReplayConfig::default()
    };
    let engine = ReplayEngine::new(config, Arc::new(DirSqliteDriver), Arc::clone(&monitor));
    for event in events {
        engine.dispatch(event);
    }
    engine.join().unwrap();

    let check = rusqlite::Connection::open(dir.path().join("bench.db")).unwrap();
    let count: i64 = check
        .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);

    // 失败语句没有计时样本
    let labels: Vec<String> = monitor.snapshot().into_iter().map(|p| p.label).collect();
    assert!(!labels.iter().any(|l| l.contains("missing_table")));
}
