//! 解析器的文件级集成测试
//!
//! 覆盖批次消费、回退行跨批次、过滤规则与幂等性。

use std::io::Write;

use tempfile::NamedTempFile;

use mysql_database_replay_querylog::{
    LogEventParser, ParseError, QueryKind, ReplayError, SessionEvent,
};

fn write_log(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn parse_full_session_from_file() {
    let file = write_log(
        "150811  6:47:54  940899 Connect  user@host as anon\n\
         940899 Init DB  test\n\
         940899 Query  SELECT 1\n\
         940899 Quit\n",
    );

    let mut parser = LogEventParser::from_path(file.path()).unwrap();
    let events = parser.parse_all().unwrap();

    assert_eq!(events.len(), 4);
    assert_eq!(
        events[0],
        SessionEvent::Connect {
            id: "940899".to_string(),
            auth: "user@host as anon".to_string(),
        }
    );
    assert_eq!(
        events[1],
        SessionEvent::InitDb {
            id: "940899".to_string(),
            database: "test".to_string(),
        }
    );
    match &events[2] {
        SessionEvent::Query { id, query } => {
            assert_eq!(id, "940899");
            assert_eq!(query.sql, "SELECT 1");
            assert_eq!(query.kind, QueryKind::Read);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(
        events[3],
        SessionEvent::Quit {
            id: "940899".to_string()
        }
    );
    assert!(parser.parse_errors().is_empty());
}

#[test]
fn missing_file_is_fatal() {
    let err = LogEventParser::from_path("/nonexistent/query.log").unwrap_err();
    assert!(matches!(err, ReplayError::Io(_)));
}

#[test]
fn batches_resume_across_calls() {
    let lines = [
        "1 Query SELECT 1",
        "1 Query SELECT 2,",
        "  3",
        "1 Query SELECT 4",
        "1 Quit",
        "",
    ];
    let file = write_log(&lines.join("\n"));

    let mut parser = LogEventParser::from_path(file.path()).unwrap();
    let mut events = Vec::new();

    // 批次大小 2：第二条语句是多行的，回退行留到下一批
    assert!(parser.parse_batch(2, &mut events).unwrap());
    assert_eq!(events.len(), 2);
    match &events[1] {
        SessionEvent::Query { query, .. } => assert_eq!(query.sql, "SELECT 2,\n  3"),
        other => panic!("unexpected event: {other:?}"),
    }

    assert!(!parser.parse_batch(100, &mut events).unwrap());
    assert_eq!(events.len(), 4);
    assert!(parser.is_finished());
}

#[test]
fn header_lines_are_collected_as_errors() {
    let file = write_log(
        "/usr/sbin/mysqld, Version: 5.6.25-log\n\
         Time                 Id Command    Argument\n\
         1 Query SELECT 1\n",
    );

    let mut parser = LogEventParser::from_path(file.path()).unwrap();
    let events = parser.parse_all().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(parser.parse_errors().len(), 2);
}

#[test]
fn filters_apply_from_file() {
    let file = write_log(
        "9 Connect capture@localhost\n\
         1 Query SET sql_mode=''\n\
         1 Query SELECT 1\n\
         9 Quit\n",
    );

    let mut parser = LogEventParser::from_path(file.path())
        .unwrap()
        .with_restricted_id("9")
        .with_ignore_prefixes(["SET"]);
    let events = parser.parse_all().unwrap();

    assert_eq!(events.len(), 1);
    match &events[0] {
        SessionEvent::Query { id, query } => {
            assert_eq!(id, "1");
            assert_eq!(query.sql, "SELECT 1");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn reparsing_the_same_file_is_idempotent() {
    let content = "150811  6:47:54  1 Connect u@h\n\
                   1 Init DB test\n\
                   1 Query SELECT a,\n\
                     b FROM t\n\
                   1 Query GRANT nothing\n\
                   1 Quit\n";
    let file = write_log(content);

    let mut first = LogEventParser::from_path(file.path()).unwrap();
    let mut second = LogEventParser::from_path(file.path()).unwrap();

    let first_events = first.parse_all().unwrap();
    let second_events = second.parse_all().unwrap();

    assert_eq!(first_events, second_events);
    assert_eq!(first.parse_errors(), second.parse_errors());
    assert!(matches!(
        first.parse_errors()[0],
        ParseError::UnknownSqlVerb { .. }
    ));
}
