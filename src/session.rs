//! 会话模块
//!
//! [`Session`] 是一条原始客户端连接在回放侧的对应物：私有的语句
//! FIFO 队列、独占的数据库句柄、以及创建瞬间活跃会话的屏障快照。
//! 每个被准入的会话由一个独立工作线程驱动：先等待屏障内全部前驱
//! 终止，然后按入队顺序逐条执行语句，quit 标志置位且队列排空后
//! 终止并释放句柄。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::Duration;

use crate::error::ReplayError;
use crate::event::{Query, QueryKind};
use crate::executor::{SqlConnection, SqlDriver};
use crate::measure::BenchMonitor;

/// 活跃会话注册表：连接 id → 会话
pub(crate) type Registry = Mutex<HashMap<String, Arc<Session>>>;

/// 屏障等待中复查 quit / abort 标志的兜底间隔
const BARRIER_POLL: Duration = Duration::from_millis(200);

/// 会话生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// connect 已处理，屏障已快照
    Created,
    /// init db 已处理，句柄已尝试打开，等待或已获得准入
    Ready,
    /// 工作线程正在排空队列
    Running,
    /// quit 标志已置位，队列继续排空
    Quitting,
    /// 队列已空且 quit 置位，句柄已释放
    Terminated,
}

struct SessionInner {
    state: SessionState,
    queue: VecDeque<Query>,
    quitting: bool,
    finished: bool,
}

/// 一条逻辑客户端连接的回放侧模型
///
/// 队列满足严格 FIFO；屏障保证本会话的第一条语句不会早于任何
/// 前驱会话的终止。句柄由本会话的工作线程独占访问。
pub struct Session {
    id: String,
    /// connect 载荷里的认证信息原文
    auth: String,
    inner: Mutex<SessionInner>,
    cond: Condvar,
    /// 创建瞬间处于 Ready / Running / Quitting 的前驱会话快照
    barrier: Vec<Arc<Session>>,
    connection: Mutex<Option<Box<dyn SqlConnection>>>,
    /// 是否已经（或即将）拥有工作线程
    admitted: AtomicBool,
    abort: Arc<AtomicBool>,
    registry: Weak<Registry>,
    monitor: Arc<BenchMonitor>,
}

impl Session {
    pub(crate) fn new(
        id: String,
        auth: String,
        barrier: Vec<Arc<Session>>,
        monitor: Arc<BenchMonitor>,
        abort: Arc<AtomicBool>,
        registry: Weak<Registry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            auth,
            inner: Mutex::new(SessionInner {
                state: SessionState::Created,
                queue: VecDeque::new(),
                quitting: false,
                finished: false,
            }),
            cond: Condvar::new(),
            barrier,
            connection: Mutex::new(None),
            admitted: AtomicBool::new(false),
            abort,
            registry,
            monitor,
        })
    }

    /// 连接 id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 当前生命周期状态
    pub fn state(&self) -> SessionState {
        self.inner.lock().expect("session lock poisoned").state
    }

    /// 是否已请求准入
    pub(crate) fn is_admitted(&self) -> bool {
        self.admitted.load(Ordering::Acquire)
    }

    pub(crate) fn mark_admitted(&self) {
        self.admitted.store(true, Ordering::Release);
    }

    /// 打开数据库句柄（init db）
    ///
    /// 打开失败只记录：会话保持无句柄状态，后续语句按执行失败记账。
    pub(crate) fn open(
        &self,
        driver: &dyn SqlDriver,
        server: &str,
        database: &str,
        username: &str,
        password: &str,
    ) {
        log::debug!(
            "opening connection for session {} (auth '{}') to {}/{}",
            self.id,
            self.auth,
            server,
            database
        );
        match driver.open(server, database, username, password) {
            Ok(conn) => {
                let mut slot = self.connection.lock().expect("session lock poisoned");
                if let Some(mut old) = slot.replace(conn) {
                    if let Err(err) = old.close() {
                        log::warn!("closing stale handle of session {} failed: {}", self.id, err);
                    }
                }
            }
            Err(err) => log::error!("sql connection for session {} failed: {}", self.id, err),
        }

        let mut inner = self.inner.lock().expect("session lock poisoned");
        if inner.state == SessionState::Created {
            inner.state = SessionState::Ready;
        }
    }

    /// 把语句追加到队尾
    ///
    /// quit 之后到达的语句被拒绝（同 id 的后续语句属于新会话）。
    pub(crate) fn enqueue(&self, query: Query) {
        {
            let mut inner = self.inner.lock().expect("session lock poisoned");
            if inner.quitting {
                log::warn!("statement for quitting session {} ignored", self.id);
                return;
            }
            inner.queue.push_back(query);
        }
        self.cond.notify_all();
    }

    /// 置位 quit 标志
    ///
    /// 已入队语句继续排空；从未被准入的会话没有工作线程，立即终止。
    pub(crate) fn quit(&self) {
        {
            let mut inner = self.inner.lock().expect("session lock poisoned");
            inner.quitting = true;
            if !matches!(inner.state, SessionState::Terminated) {
                inner.state = SessionState::Quitting;
            }
        }
        self.cond.notify_all();

        if !self.is_admitted() {
            self.finish();
        }
    }

    /// 唤醒阻塞中的工作线程（abort 用）
    pub(crate) fn wake(&self) {
        self.cond.notify_all();
    }

    fn aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    /// 工作线程主体：屏障等待 → 排空队列 → 终止
    pub(crate) fn run(&self) {
        self.await_predecessors();
        if !self.aborted() {
            {
                let mut inner = self.inner.lock().expect("session lock poisoned");
                if inner.state == SessionState::Ready {
                    inner.state = SessionState::Running;
                }
            }
            self.drain();
        }
        self.finish();
    }

    /// 阻塞到屏障内全部前驱终止
    ///
    /// 前驱终止时通过其条件变量通知；quit / abort 通过短暂超时复查，
    /// 已入队的工作在屏障之后照常排空。
    fn await_predecessors(&self) {
        for pred in &self.barrier {
            let mut inner = pred.inner.lock().expect("session lock poisoned");
            while !inner.finished {
                if self.aborted() {
                    return;
                }
                let (guard, _) = pred
                    .cond
                    .wait_timeout(inner, BARRIER_POLL)
                    .expect("session lock poisoned");
                inner = guard;
            }
        }
    }

    /// 按 FIFO 排空私有队列；队列空且未 quit 时阻塞
    fn drain(&self) {
        let mut conn = self.connection.lock().expect("session lock poisoned").take();
        loop {
            let next = {
                let mut inner = self.inner.lock().expect("session lock poisoned");
                loop {
                    if self.aborted() {
                        break None;
                    }
                    if let Some(query) = inner.queue.pop_front() {
                        break Some(query);
                    }
                    if inner.quitting {
                        break None;
                    }
                    inner = self.cond.wait(inner).expect("session lock poisoned");
                }
            };
            match next {
                Some(query) => self.run_statement(&mut conn, &query),
                None => break,
            }
        }
        *self.connection.lock().expect("session lock poisoned") = conn;
    }

    /// 执行单条语句并计时
    ///
    /// 读语句走查询模式，写语句走更新模式；失败的语句记录日志、
    /// 丢弃计时点，绝不终止会话。
    fn run_statement(&self, conn: &mut Option<Box<dyn SqlConnection>>, query: &Query) {
        let point = self.monitor.start_point(&query.sql);
        let result = match conn.as_mut() {
            Some(handle) => match query.kind {
                QueryKind::Read => handle.execute_query(&query.sql),
                QueryKind::Write => handle.execute_update(&query.sql).map(|_| ()),
            },
            None => Err(ReplayError::NoConnection),
        };
        match result {
            Ok(()) => point.collect(),
            Err(err) => {
                point.discard();
                log::error!("execution of statement {:?} failed: {}", query.sql, err);
            }
        }
    }

    /// 终止：释放句柄、标记 Terminated、唤醒屏障等待者、离开注册表
    pub(crate) fn finish(&self) {
        if let Some(mut conn) = self.connection.lock().expect("session lock poisoned").take() {
            if let Err(err) = conn.close() {
                log::warn!("closing connection of session {} failed: {}", self.id, err);
            }
        }

        {
            let mut inner = self.inner.lock().expect("session lock poisoned");
            if inner.finished {
                return;
            }
            inner.finished = true;
            inner.state = SessionState::Terminated;
        }
        self.cond.notify_all();

        // 注册表里的条目可能已被同 id 的新会话顶替，按指针身份保护
        if let Some(registry) = self.registry.upgrade() {
            let mut map = registry.lock().expect("registry lock poisoned");
            if map
                .get(&self.id)
                .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), self))
            {
                map.remove(&self.id);
            }
        }
        log::debug!("session {} terminated", self.id);
    }

    /// 屏障快照中的会话 id（测试辅助）
    #[cfg(test)]
    fn barrier_ids(&self) -> Vec<String> {
        self.barrier.iter().map(|s| s.id.clone()).collect()
    }
}
