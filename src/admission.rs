//! 准入控制模块
//!
//! [`AdmissionController`] 把真实并发限制在 `P` 个会话工作线程以内：
//! 就绪会话在有空位时立刻启动，否则进入 FIFO 积压队列。后台晋升
//! 线程在工作线程终止发来的通知（兜底：固定轮询间隔）上醒来，按
//! 队首顺序晋升积压会话。停止时先把已入队的会话全部晋升完毕再退
//! 出（排空式关闭），这是引擎 join 操作的底层机制。

use std::collections::VecDeque;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::ReplayError;
use crate::session::Session;

/// 晋升线程的唤醒通知
enum Notice {
    /// 新会话进入积压队列
    Submitted,
    /// 某个工作线程已终止，空出一个并发额度
    WorkerDone,
    /// 停止：排空积压队列后退出
    Shutdown,
}

struct AdmissionState {
    /// 当前持有并发额度的工作线程数
    running: usize,
    /// 等待晋升的会话，严格 FIFO
    backlog: VecDeque<Arc<Session>>,
}

struct AdmissionInner {
    parallel: usize,
    state: Mutex<AdmissionState>,
    /// 已启动的工作线程句柄，join 时统一回收
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
    abort: Arc<AtomicBool>,
}

/// 有界并发门闸
pub struct AdmissionController {
    inner: Arc<AdmissionInner>,
    tx: Sender<Notice>,
    promoter: Mutex<Option<JoinHandle<()>>>,
}

impl AdmissionController {
    /// 创建门闸并启动晋升线程
    ///
    /// `parallel` 为并发上限 P（0 按 1 处理），`promote_interval`
    /// 是通知丢失时的轮询兜底间隔。
    pub(crate) fn new(
        parallel: usize,
        promote_interval: Duration,
        abort: Arc<AtomicBool>,
    ) -> Self {
        let inner = Arc::new(AdmissionInner {
            parallel: parallel.max(1),
            state: Mutex::new(AdmissionState {
                running: 0,
                backlog: VecDeque::new(),
            }),
            handles: Mutex::new(Vec::new()),
            abort,
        });

        let (tx, rx) = channel();
        let promoter = {
            let inner = Arc::clone(&inner);
            let tx = tx.clone();
            thread::Builder::new()
                .name("admission-promoter".to_string())
                .spawn(move || promoter_loop(inner, tx, rx, promote_interval))
                .expect("failed to spawn promoter thread")
        };

        Self {
            inner,
            tx,
            promoter: Mutex::new(Some(promoter)),
        }
    }

    /// 提交一个就绪会话
    ///
    /// 有空位且没有更早的积压会话时立即启动，否则追加到积压队尾。
    /// 每个会话恰好启动一次。
    pub(crate) fn submit(&self, session: Arc<Session>) {
        let mut state = self.inner.state.lock().expect("admission lock poisoned");
        if state.running < self.inner.parallel && state.backlog.is_empty() {
            state.running += 1;
            drop(state);
            spawn_worker(&self.inner, &self.tx, session);
        } else {
            log::debug!("session {} enters backlog", session.id());
            state.backlog.push_back(session);
            drop(state);
            let _ = self.tx.send(Notice::Submitted);
        }
    }

    /// 当前持有并发额度的工作线程数
    pub fn running(&self) -> usize {
        self.inner.state.lock().expect("admission lock poisoned").running
    }

    /// 当前积压队列长度
    pub fn backlog_len(&self) -> usize {
        self.inner
            .state
            .lock()
            .expect("admission lock poisoned")
            .backlog
            .len()
    }

    /// 停止门闸：排空积压队列后回收晋升线程
    ///
    /// 返回前保证不再有新的工作线程被启动。
    pub(crate) fn shutdown(&self) {
        let _ = self.tx.send(Notice::Shutdown);
        if let Some(handle) = self.promoter.lock().expect("admission lock poisoned").take() {
            if handle.join().is_err() {
                log::error!("promoter thread panicked");
            }
        }
    }

    /// 等待全部已启动的工作线程终止
    ///
    /// 必须在 [`shutdown`](Self::shutdown) 之后调用。
    pub(crate) fn join_workers(&self) -> Result<(), ReplayError> {
        let handles = mem::take(&mut *self.inner.handles.lock().expect("admission lock poisoned"));
        let mut first_panic = None;
        for (id, handle) in handles {
            if handle.join().is_err() {
                log::error!("worker of session {} panicked", id);
                first_panic.get_or_insert(id);
            }
        }
        match first_panic {
            Some(id) => Err(ReplayError::WorkerPanic(id)),
            None => Ok(()),
        }
    }
}

/// 工作线程退出时归还并发额度并通知晋升线程
///
/// 以 Drop 形式实现，panic 路径也不会丢失额度。
struct SlotGuard {
    inner: Arc<AdmissionInner>,
    tx: Sender<Notice>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Ok(mut state) = self.inner.state.lock() {
            state.running -= 1;
        }
        let _ = self.tx.send(Notice::WorkerDone);
    }
}

/// 为会话启动工作线程；调用方已经占好并发额度
fn spawn_worker(inner: &Arc<AdmissionInner>, tx: &Sender<Notice>, session: Arc<Session>) {
    let id = session.id().to_string();
    let guard = SlotGuard {
        inner: Arc::clone(inner),
        tx: tx.clone(),
    };
    let spawned = thread::Builder::new()
        .name(format!("session-{id}"))
        .spawn(move || {
            let _guard = guard;
            session.run();
        });
    match spawned {
        Ok(handle) => inner
            .handles
            .lock()
            .expect("admission lock poisoned")
            .push((id, handle)),
        Err(err) => log::error!("failed to spawn worker for session {}: {}", id, err),
    }
}

/// 晋升线程主体
///
/// 在通知或轮询间隔上醒来，把积压队首晋升到空出的额度上；
/// 收到停止通知后继续晋升直到积压排空。
fn promoter_loop(
    inner: Arc<AdmissionInner>,
    tx: Sender<Notice>,
    rx: Receiver<Notice>,
    interval: Duration,
) {
    let mut shutting_down = false;
    loop {
        match rx.recv_timeout(interval) {
            Ok(Notice::Shutdown) | Err(RecvTimeoutError::Disconnected) => shutting_down = true,
            Ok(_) | Err(RecvTimeoutError::Timeout) => {}
        }

        if inner.abort.load(Ordering::Relaxed) {
            let dropped = {
                let mut state = inner.state.lock().expect("admission lock poisoned");
                state.backlog.drain(..).count()
            };
            if dropped > 0 {
                log::warn!("abort requested, dropping {} backlogged sessions", dropped);
            }
        }

        promote_ready(&inner, &tx);

        if shutting_down
            && inner
                .state
                .lock()
                .expect("admission lock poisoned")
                .backlog
                .is_empty()
        {
            return;
        }
    }
}

/// 只要有空位就晋升积压队首
fn promote_ready(inner: &Arc<AdmissionInner>, tx: &Sender<Notice>) {
    loop {
        let session = {
            let mut state = inner.state.lock().expect("admission lock poisoned");
            if state.running >= inner.parallel {
                return;
            }
            match state.backlog.pop_front() {
                Some(session) => {
                    state.running += 1;
                    session
                }
                None => return,
            }
        };
        log::debug!("promoting session {} from backlog", session.id());
        spawn_worker(inner, tx, session);
    }
}
