//! 会话事件与语句类型定义
//!
//! 定义了解析器产出的事件模型：连接生命周期事件 [`SessionEvent`]、
//! 单条语句 [`Query`] 及其读写分类 [`QueryKind`]。
//! 事件一经构造即不可变。

use memchr::memchr2;

use crate::error::ParseError;

/// 可回放语句的 SQL 动词白名单
///
/// 语句首词必须落在该枚举内才会生成 query 事件；
/// 不在白名单内的首词按逐行解析错误处理（丢弃该行，批次继续）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SqlVerb {
    Select,
    Insert,
    Update,
    Delete,
    Replace,
    Create,
    Drop,
    Alter,
    Truncate,
    Show,
    Describe,
    Explain,
    Begin,
    Commit,
    Rollback,
    Set,
    Use,
    Call,
}

impl SqlVerb {
    /// 从语句首词（已小写）映射动词
    fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "select" => Self::Select,
            "insert" => Self::Insert,
            "update" => Self::Update,
            "delete" => Self::Delete,
            "replace" => Self::Replace,
            "create" => Self::Create,
            "drop" => Self::Drop,
            "alter" => Self::Alter,
            "truncate" => Self::Truncate,
            "show" => Self::Show,
            "describe" | "desc" => Self::Describe,
            "explain" => Self::Explain,
            "begin" => Self::Begin,
            "commit" => Self::Commit,
            "rollback" => Self::Rollback,
            "set" => Self::Set,
            "use" => Self::Use,
            "call" => Self::Call,
            _ => return None,
        })
    }

    /// 动词对应的执行模式
    ///
    /// 产生结果集的动词以查询模式执行，其余一律按更新模式执行。
    pub fn kind(self) -> QueryKind {
        match self {
            Self::Select | Self::Show | Self::Describe | Self::Explain => QueryKind::Read,
            _ => QueryKind::Write,
        }
    }
}

/// 语句的读写分类
///
/// 只决定执行模式（查询 / 更新），不携带任何事务语义。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QueryKind {
    /// 查询模式执行，结果集被丢弃
    Read,
    /// 更新模式执行，行数被丢弃
    Write,
}

/// 一条待回放的 SQL 语句
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Query {
    /// 语句文本
    pub sql: String,

    /// 读写分类，由语句首词导出
    pub kind: QueryKind,
}

impl Query {
    /// 按首词分类语句并构造 [`Query`]
    ///
    /// # 返回
    ///
    /// * `Ok(Query)` - 首词在白名单内
    /// * `Err(ParseError::UnknownSqlVerb)` - 首词不可识别
    /// * `Err(ParseError::EmptyStatement)` - 语句为空
    pub fn classify(id: &str, sql: String) -> Result<Self, ParseError> {
        let token = {
            let head = sql.trim_start();
            let token_end = memchr2(b' ', b'\t', head.as_bytes()).unwrap_or(head.len());
            head[..token_end]
                .trim_end_matches(|c| c == ';' || c == '(')
                .to_string()
        };
        if token.is_empty() {
            return Err(ParseError::EmptyStatement { id: id.to_string() });
        }

        match SqlVerb::from_token(&token.to_ascii_lowercase()) {
            Some(verb) => Ok(Query {
                kind: verb.kind(),
                sql,
            }),
            None => Err(ParseError::UnknownSqlVerb { verb: token, sql }),
        }
    }
}

/// 会话生命周期事件
///
/// 解析器按日志顺序产出的带类型事件流，`id` 为连接 id（数字串）。
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SessionEvent {
    /// 客户端建立连接，`auth` 为认证信息原文（如 `user@host as anon`）
    Connect { id: String, auth: String },

    /// 客户端选择数据库
    InitDb { id: String, database: String },

    /// 客户端提交语句
    Query { id: String, query: Query },

    /// 客户端断开连接
    Quit { id: String },
}

impl SessionEvent {
    /// 事件所属的连接 id
    pub fn connection_id(&self) -> &str {
        match self {
            Self::Connect { id, .. }
            | Self::InitDb { id, .. }
            | Self::Query { id, .. }
            | Self::Quit { id } => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_is_read() {
        let q = Query::classify("1", "SELECT * FROM users".to_string()).unwrap();
        assert_eq!(q.kind, QueryKind::Read);
        assert_eq!(q.sql, "SELECT * FROM users");
    }

    #[test]
    fn result_set_verbs_are_read() {
        for sql in ["SHOW TABLES", "DESCRIBE users", "desc users", "EXPLAIN SELECT 1"] {
            let q = Query::classify("1", sql.to_string()).unwrap();
            assert_eq!(q.kind, QueryKind::Read, "{}", sql);
        }
    }

    #[test]
    fn dml_and_ddl_are_write() {
        for sql in [
            "INSERT INTO t VALUES (1)",
            "update t set a = 1",
            "DELETE FROM t",
            "CREATE TABLE t (a INT)",
            "COMMIT",
            "SET sql_mode=''",
        ] {
            let q = Query::classify("1", sql.to_string()).unwrap();
            assert_eq!(q.kind, QueryKind::Write, "{}", sql);
        }
    }

    #[test]
    fn verb_is_case_insensitive() {
        assert!(Query::classify("1", "sElEcT 1".to_string()).is_ok());
    }

    #[test]
    fn trailing_semicolon_on_bare_verb() {
        let q = Query::classify("1", "COMMIT;".to_string()).unwrap();
        assert_eq!(q.kind, QueryKind::Write);
    }

    #[test]
    fn unknown_verb_is_rejected() {
        let err = Query::classify("7", "GRANT ALL ON *.* TO root".to_string()).unwrap_err();
        match err {
            ParseError::UnknownSqlVerb { verb, .. } => assert_eq!(verb, "GRANT"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_statement_is_rejected() {
        let err = Query::classify("7", "   ".to_string()).unwrap_err();
        assert_eq!(
            err,
            ParseError::EmptyStatement {
                id: "7".to_string()
            }
        );
    }

    #[test]
    fn event_connection_id() {
        let ev = SessionEvent::Quit {
            id: "940899".to_string(),
        };
        assert_eq!(ev.connection_id(), "940899");
    }
}
