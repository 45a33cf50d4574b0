//! 查询日志事件解析模块
//!
//! 将 MySQL 通用查询日志文本解析为严格有序的会话事件流，支持：
//! - 事件行文法匹配（可选时间戳前缀 + 连接 id + 命令字 + 载荷）
//! - 多行语句重组（前瞻读取续行，遇到新事件行时回退一行）
//! - 按批次消费日志行，批次边界不会截断未结束的多行语句
//! - 忽略前缀、SQL 动词白名单与受限连接 id 过滤
//!
//! 单行解析失败只丢弃该行并记录错误，批次继续；IO 失败是致命的。
//!
//! # 示例
//!
//! ```rust
//! use mysql_database_replay_querylog::parser::LogEventParser;
//! use std::io::Cursor;
//!
//! let log = "150811  6:47:54  940899 Connect  user@host as anon\n\
//!            940899 Query  SELECT 1\n\
//!            940899 Quit\n";
//!
//! let mut parser = LogEventParser::new(Cursor::new(log));
//! let mut events = Vec::new();
//! let filled = parser.parse_batch(1000, &mut events).unwrap();
//!
//! assert!(!filled);
//! assert_eq!(events.len(), 3);
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::mem;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ParseError, ReplayError};
use crate::event::{Query, SessionEvent};

/// 事件行文法：`<可选时间戳><连接id> <命令字> [载荷]`
///
/// 时间戳前缀只允许数字、冒号与空白；命令字大小写不敏感。
static EVENT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[\s\d:]*?(\d+)\s+(connect|init\s+db|query|quit)\b(?:\s+(.*))?$")
        .expect("event line pattern must compile")
});

/// 形似事件行但命令字未知的行，用于区分 UnknownCommand 与普通垃圾行
static COMMAND_SHAPED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[\s\d:]*?\d+\s+([a-z]+)").expect("command shape pattern must compile")
});

/// 查询日志事件解析器
///
/// 从任意 `Read` 源逐行读取日志并产出 [`SessionEvent`]。
/// 内部持有单行回退缓存：多行语句前瞻时读到的下一个事件行
/// 会被暂存，在下一次取行时优先返回。
#[derive(Debug)]
pub struct LogEventParser<R: Read> {
    reader: BufReader<R>,
    buffer: String,
    /// 回退行：前瞻时读到的下一个事件行
    pushback: Option<String>,
    restricted_id: Option<String>,
    ignore_prefixes: Vec<String>,
    errors: Vec<ParseError>,
    finished: bool,
}

impl LogEventParser<File> {
    /// 打开日志文件并构造解析器
    ///
    /// # 返回
    ///
    /// * `Ok(LogEventParser)` - 文件打开成功
    /// * `Err(ReplayError::Io)` - 文件不存在或不可读
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ReplayError> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)
            .map_err(|e| ReplayError::Io(format!("{}: {}", path_ref.display(), e)))?;
        Ok(Self::new(file))
    }
}

impl<R: Read> LogEventParser<R> {
    /// 从任意 `Read` 源构造解析器
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buffer: String::new(),
            pushback: None,
            restricted_id: None,
            ignore_prefixes: Vec::new(),
            errors: Vec::new(),
            finished: false,
        }
    }

    /// 排除指定连接 id 的 connect / init db / quit 事件
    ///
    /// 用于剔除某个连接（例如抓取日志的会话自身）。
    pub fn with_restricted_id(mut self, id: impl Into<String>) -> Self {
        self.restricted_id = Some(id.into());
        self
    }

    /// 设置忽略前缀列表：以这些前缀（大小写不敏感）开头的语句不生成事件
    pub fn with_ignore_prefixes<S: Into<String>>(
        mut self,
        prefixes: impl IntoIterator<Item = S>,
    ) -> Self {
        self.ignore_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// 解析一个批次
    ///
    /// 最多消费 `batch_size` 行日志，把产出的事件按日志顺序追加到
    /// `events`。唯一的例外：批次末尾恰好处于多行语句中间时，会继续
    /// 读完该语句的续行，批次边界不会截断语句。
    ///
    /// # 返回
    ///
    /// * `Ok(true)` - 批次已满，后续可能还有输入
    /// * `Ok(false)` - 输入已耗尽
    /// * `Err(ReplayError::Io)` - 底层读取失败，致命
    pub fn parse_batch(
        &mut self,
        batch_size: usize,
        events: &mut Vec<SessionEvent>,
    ) -> Result<bool, ReplayError> {
        let mut consumed = 0usize;
        while consumed < batch_size {
            let Some(line) = self.next_line()? else {
                self.finished = true;
                return Ok(false);
            };
            consumed += 1;
            self.process_line(line, &mut consumed, events)?;
        }
        Ok(true)
    }

    /// 解析全部剩余输入
    ///
    /// # 返回
    ///
    /// 产出的事件序列；逐行错误通过 [`parse_errors`](Self::parse_errors) 获取。
    pub fn parse_all(&mut self) -> Result<Vec<SessionEvent>, ReplayError> {
        let mut events = Vec::new();
        self.parse_batch(usize::MAX, &mut events)?;
        Ok(events)
    }

    /// 输入是否已经读完
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// 迄今记录的逐行解析错误
    pub fn parse_errors(&self) -> &[ParseError] {
        &self.errors
    }

    /// 取走并清空已记录的逐行解析错误
    pub fn take_parse_errors(&mut self) -> Vec<ParseError> {
        mem::take(&mut self.errors)
    }

    /// 处理一个已消费的行：事件行生成事件，其余记录错误
    fn process_line(
        &mut self,
        line: String,
        consumed: &mut usize,
        events: &mut Vec<SessionEvent>,
    ) -> Result<(), ReplayError> {
        let Some(caps) = EVENT_LINE.captures(&line) else {
            self.record_unmatched(line);
            return Ok(());
        };

        let id = caps[1].to_string();
        let command = caps[2].to_ascii_lowercase();
        let payload = caps
            .get(3)
            .map(|m| m.as_str().trim_end().to_string())
            .unwrap_or_default();

        if command == "query" {
            let sql = self.collect_statement(payload, consumed)?;
            self.push_query(id, sql, events);
            return Ok(());
        }

        if self.restricted_id.as_deref() == Some(id.as_str()) {
            return Ok(());
        }

        if command == "connect" {
            events.push(SessionEvent::Connect { id, auth: payload });
        } else if command == "quit" {
            events.push(SessionEvent::Quit { id });
        } else {
            // 余下只有 init db（命令字中间的空白可能不止一个）
            events.push(SessionEvent::InitDb {
                id,
                database: payload,
            });
        }
        Ok(())
    }

    /// 前瞻收集多行语句的续行
    ///
    /// 不匹配事件行文法的行都属于当前语句；读到的第一个事件行
    /// 被回退，留给下一次取行处理。
    fn collect_statement(
        &mut self,
        first: String,
        consumed: &mut usize,
    ) -> Result<String, ReplayError> {
        let mut sql = first;
        loop {
            match self.next_line()? {
                None => {
                    self.finished = true;
                    break;
                }
                Some(next) if EVENT_LINE.is_match(&next) => {
                    self.pushback = Some(next);
                    break;
                }
                Some(next) => {
                    *consumed += 1;
                    if !sql.is_empty() {
                        sql.push('\n');
                    }
                    sql.push_str(&next);
                }
            }
        }
        Ok(sql)
    }

    /// 过滤并分类语句，生成 query 事件或记录错误
    fn push_query(&mut self, id: String, sql: String, events: &mut Vec<SessionEvent>) {
        if self
            .ignore_prefixes
            .iter()
            .any(|p| starts_with_ignore_case(&sql, p))
        {
            return;
        }
        match Query::classify(&id, sql) {
            Ok(query) => events.push(SessionEvent::Query { id, query }),
            Err(err) => self.errors.push(err),
        }
    }

    /// 记录不在任何语句上下文中的非事件行
    fn record_unmatched(&mut self, line: String) {
        if line.trim().is_empty() {
            return;
        }
        if let Some(caps) = COMMAND_SHAPED.captures(&line) {
            let command = caps[1].to_string();
            self.errors.push(ParseError::UnknownCommand { command, line });
        } else {
            self.errors.push(ParseError::InvalidEventLine(line));
        }
    }

    /// 取下一行：优先返回回退行，否则从底层读取并去掉行尾换行符
    fn next_line(&mut self) -> Result<Option<String>, ReplayError> {
        if let Some(line) = self.pushback.take() {
            return Ok(Some(line));
        }

        self.buffer.clear();
        let bytes_read = self
            .reader
            .read_line(&mut self.buffer)
            .map_err(|e| ReplayError::Io(e.to_string()))?;
        if bytes_read == 0 {
            return Ok(None);
        }

        // 原地去掉行尾的 \r\n，避免额外分配
        let mut len = self.buffer.len();
        while len > 0 {
            let last = self.buffer.as_bytes()[len - 1];
            if last == b'\n' || last == b'\r' {
                len -= 1;
            } else {
                break;
            }
        }
        self.buffer.truncate(len);

        Ok(Some(mem::take(&mut self.buffer)))
    }
}

/// 大小写不敏感的前缀判断
fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// 从字符串解析全部事件（便捷函数）
///
/// # 返回
///
/// `(events, errors)` - 事件序列与逐行错误，互不影响
pub fn parse_events_from_string(content: &str) -> (Vec<SessionEvent>, Vec<ParseError>) {
    let mut parser = LogEventParser::new(std::io::Cursor::new(content));
    let events = parser
        .parse_all()
        .expect("reading from an in-memory cursor cannot fail");
    let errors = parser.take_parse_errors();
    (events, errors)
}
