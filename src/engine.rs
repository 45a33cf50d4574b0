//! 回放引擎模块
//!
//! [`ReplayEngine`] 持有活跃会话注册表，是会话事件的唯一入口：
//! connect 创建会话并快照屏障，init db 打开句柄并请求准入，
//! query 入队，quit 置位退出标志。`join` 在喂完一个批次后调用：
//! 停止接受新的准入，排空积压队列，等待全部已注册会话终止。
//! 注册表只存活一个回放批次，批次之间各自新建引擎。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::admission::AdmissionController;
use crate::config::ReplayConfig;
use crate::error::ReplayError;
use crate::event::{Query, SessionEvent};
use crate::executor::SqlDriver;
use crate::measure::BenchMonitor;
use crate::session::{Registry, Session, SessionState};

/// 日志驱动的并发回放引擎
pub struct ReplayEngine {
    config: ReplayConfig,
    driver: Arc<dyn SqlDriver>,
    monitor: Arc<BenchMonitor>,
    admission: AdmissionController,
    /// 活跃会话注册表；会话终止时自行移除
    registry: Arc<Registry>,
    /// 本批次创建过的全部会话（含被同 id 顶替者），abort 唤醒用
    sessions: Mutex<Vec<Arc<Session>>>,
    abort: Arc<AtomicBool>,
}

impl ReplayEngine {
    /// 构造引擎并启动后台晋升线程
    pub fn new(config: ReplayConfig, driver: Arc<dyn SqlDriver>, monitor: Arc<BenchMonitor>) -> Self {
        let abort = Arc::new(AtomicBool::new(false));
        let admission = AdmissionController::new(
            config.parallel,
            config.promote_interval,
            Arc::clone(&abort),
        );
        Self {
            config,
            driver,
            monitor,
            admission,
            registry: Arc::new(Mutex::new(HashMap::new())),
            sessions: Mutex::new(Vec::new()),
            abort,
        }
    }

    /// 按连接 id 路由一个会话事件
    pub fn dispatch(&self, event: SessionEvent) {
        if self.abort.load(Ordering::Relaxed) {
            return;
        }
        match event {
            SessionEvent::Connect { id, auth } => self.connect(id, auth),
            SessionEvent::InitDb { id, database } => self.init_db(id, database),
            SessionEvent::Query { id, query } => self.query(id, query),
            SessionEvent::Quit { id } => self.quit(id),
        }
    }

    /// 当前活跃会话数（尚未终止离表的会话）
    pub fn active_sessions(&self) -> usize {
        self.registry.lock().expect("registry lock poisoned").len()
    }

    /// 请求中止：唤醒全部阻塞中的工作线程，放弃未执行的语句
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
        for session in self.sessions.lock().expect("engine lock poisoned").iter() {
            session.wake();
        }
        log::warn!("replay abort requested");
    }

    /// 等待批次完全执行
    ///
    /// 输入已经耗尽：仍活跃的会话不会再收到事件，按隐式 quit 处理，
    /// 否则尾部缺失 quit 行的日志会让 join 永远阻塞。随后排空准入
    /// 积压并回收全部工作线程。
    pub fn join(self) -> Result<(), ReplayError> {
        let active: Vec<Arc<Session>> = {
            let registry = self.registry.lock().expect("registry lock poisoned");
            registry.values().cloned().collect()
        };
        for session in active {
            session.quit();
        }

        self.admission.shutdown();
        self.admission.join_workers()
    }

    fn lookup(&self, id: &str) -> Option<Arc<Session>> {
        self.registry
            .lock()
            .expect("registry lock poisoned")
            .get(id)
            .cloned()
    }

    /// connect：快照屏障并注册新会话
    fn connect(&self, id: String, auth: String) {
        // 屏障只收 Ready / Running / Quitting 的前驱；
        // 刚 connect 还没 init db 的会话不算活跃
        let barrier: Vec<Arc<Session>> = {
            let registry = self.registry.lock().expect("registry lock poisoned");
            registry
                .values()
                .filter(|s| {
                    matches!(
                        s.state(),
                        SessionState::Ready | SessionState::Running | SessionState::Quitting
                    )
                })
                .cloned()
                .collect()
        };

        let session = Session::new(
            id.clone(),
            auth,
            barrier,
            Arc::clone(&self.monitor),
            Arc::clone(&self.abort),
            Arc::downgrade(&self.registry),
        );
        self.sessions
            .lock()
            .expect("engine lock poisoned")
            .push(Arc::clone(&session));

        let previous = self
            .registry
            .lock()
            .expect("registry lock poisoned")
            .insert(id.clone(), session);
        if let Some(previous) = previous {
            // 日志里缺了上一条 quit；旧会话继续收尾，新会话顶替路由
            log::debug!("connection id {} reused before previous session terminated", id);
            previous.quit();
        }
    }

    /// init db：打开句柄并请求准入
    fn init_db(&self, id: String, database: String) {
        let session = match self.lookup(&id) {
            Some(session) => session,
            None => {
                // connect 行丢失时补一个会话，容忍残缺的日志
                log::warn!("init db for unknown connection {}, creating session", id);
                self.connect(id.clone(), String::new());
                match self.lookup(&id) {
                    Some(session) => session,
                    None => return,
                }
            }
        };

        if session.is_admitted() {
            log::warn!("duplicate init db for session {} ignored", id);
            return;
        }

        let database = if database.is_empty() {
            self.config.database.clone()
        } else {
            database
        };
        session.open(
            self.driver.as_ref(),
            &self.config.server,
            &database,
            &self.config.username,
            &self.config.password,
        );
        session.mark_admitted();
        self.admission.submit(session);
    }

    /// query：入队到对应会话
    fn query(&self, id: String, query: Query) {
        match self.lookup(&id) {
            Some(session) => session.enqueue(query),
            None => log::debug!("query for unknown connection {} ignored", id),
        }
    }

    /// quit：置位退出标志，队列照常排空
    fn quit(&self, id: String) {
        match self.lookup(&id) {
            Some(session) => session.quit(),
            None => log::debug!("quit for unknown connection {} ignored", id),
        }
    }
}
