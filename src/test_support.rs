use crate::agent::{BackupCommand, RestoreCommand};
use crate::error::{AgentError, Result};
use crate::locks::{LockError, LockHeader, LockInfo, LockStore, OperationType};
use crate::node::{Node, NodeInfo};
use crate::pitr::{Intent, PitrIntent};
use crate::runner::{BackupRunner, CancelToken, RestoreRunner, RunError, SliceRunner};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Node with a fixed answer.
pub(crate) struct FakeNode {
    info: std::result::Result<NodeInfo, String>,
    lookups: AtomicUsize,
}

impl FakeNode {
    pub(crate) fn new(info: NodeInfo) -> Self {
        Self {
            info: Ok(info),
            lookups: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(msg: &str) -> Self {
        Self {
            info: Err(msg.to_string()),
            lookups: AtomicUsize::new(0),
        }
    }

    pub(crate) fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl Node for FakeNode {
    fn info(&self) -> Result<NodeInfo> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.info.clone().map_err(AgentError::Node)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StoreCall {
    Acquire(LockHeader, bool),
    Release(LockHeader),
    MarkStale(LockHeader),
}

/// Lock store wrapper that records every call with its time.
pub(crate) struct RecordingStore {
    inner: Arc<dyn LockStore>,
    calls: Mutex<Vec<(StoreCall, Instant)>>,
}

impl RecordingStore {
    pub(crate) fn new(inner: Arc<dyn LockStore>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<StoreCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    /// Acquisition attempts for `op`, successful or not.
    pub(crate) fn acquires(&self, op: OperationType) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, StoreCall::Acquire(h, _) if h.op == op))
            .count()
    }

    /// When the last release of an `op` lock happened.
    pub(crate) fn released_at(&self, op: OperationType) -> Option<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|(call, at)| match call {
                StoreCall::Release(h) if h.op == op => Some(*at),
                _ => None,
            })
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push((call, Instant::now()));
    }
}

impl LockStore for RecordingStore {
    fn acquire(&self, header: &LockHeader) -> std::result::Result<bool, LockError> {
        let result = self.inner.acquire(header);
        if let Ok(got) = result {
            self.record(StoreCall::Acquire(header.clone(), got));
        }
        result
    }

    fn release(&self, header: &LockHeader) -> std::result::Result<(), LockError> {
        self.record(StoreCall::Release(header.clone()));
        self.inner.release(header)
    }

    fn mark_stale(&self, header: &LockHeader) -> std::result::Result<(), LockError> {
        self.record(StoreCall::MarkStale(header.clone()));
        self.inner.mark_stale(header)
    }

    fn refresh(&self, header: &LockHeader) -> std::result::Result<(), LockError> {
        self.inner.refresh(header)
    }

    fn list(&self) -> std::result::Result<Vec<LockInfo>, LockError> {
        self.inner.list()
    }
}

/// How a scripted runner ends.
#[derive(Debug, Clone)]
pub(crate) enum Script {
    Succeed,
    Fail(String),
    /// Run until cancelled, giving up after the duration.
    WaitForCancel,
    Panic,
}

/// Backup runner that follows a script and records what it saw.
pub(crate) struct ScriptedBackup {
    script: Script,
    duration: Duration,
    runs: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    started: Mutex<Vec<Instant>>,
    finished: Mutex<Vec<Instant>>,
    intent: OnceLock<Arc<PitrIntent>>,
    seen_intent: Mutex<Vec<Intent>>,
}

impl ScriptedBackup {
    pub(crate) fn new(script: Script, duration: Duration) -> Self {
        Self {
            script,
            duration,
            runs: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
            finished: Mutex::new(Vec::new()),
            intent: OnceLock::new(),
            seen_intent: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn succeeding(duration: Duration) -> Self {
        Self::new(Script::Succeed, duration)
    }

    /// Record the PITR intent at the start of every run.
    pub(crate) fn watch_intent(&self, intent: Arc<PitrIntent>) {
        let _ = self.intent.set(intent);
    }

    pub(crate) fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub(crate) fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub(crate) fn first_started(&self) -> Option<Instant> {
        self.started.lock().unwrap().first().copied()
    }

    pub(crate) fn last_finished(&self) -> Option<Instant> {
        self.finished.lock().unwrap().last().copied()
    }

    pub(crate) fn seen_intent(&self) -> Vec<Intent> {
        self.seen_intent.lock().unwrap().clone()
    }
}

impl BackupRunner for ScriptedBackup {
    fn run(
        &self,
        _cmd: &BackupCommand,
        _node: &NodeInfo,
        cancel: &CancelToken,
    ) -> std::result::Result<(), RunError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.started.lock().unwrap().push(Instant::now());
        if let Some(intent) = self.intent.get() {
            self.seen_intent.lock().unwrap().push(intent.get());
        }

        let result = match &self.script {
            Script::Succeed => {
                std::thread::sleep(self.duration);
                Ok(())
            }
            Script::Fail(msg) => {
                std::thread::sleep(self.duration);
                Err(RunError::Failed(msg.clone()))
            }
            Script::WaitForCancel => {
                let deadline = Instant::now() + self.duration;
                loop {
                    if cancel.is_cancelled() {
                        break Err(RunError::Cancelled);
                    }
                    if Instant::now() >= deadline {
                        break Ok(());
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
            Script::Panic => {
                self.active.fetch_sub(1, Ordering::SeqCst);
                panic!("scripted backup panic");
            }
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.finished.lock().unwrap().push(Instant::now());
        result
    }
}

/// Restore runner that succeeds or fails on demand.
pub(crate) struct ScriptedRestore {
    failure: Option<String>,
    runs: AtomicUsize,
}

impl ScriptedRestore {
    pub(crate) fn succeeding() -> Self {
        Self {
            failure: None,
            runs: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(msg: &str) -> Self {
        Self {
            failure: Some(msg.to_string()),
            runs: AtomicUsize::new(0),
        }
    }

    pub(crate) fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl RestoreRunner for ScriptedRestore {
    fn run(&self, _cmd: &RestoreCommand, _node: &NodeInfo) -> std::result::Result<(), RunError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(msg) => Err(RunError::Failed(msg.clone())),
            None => Ok(()),
        }
    }
}

/// Slice runner that counts slices and checks the PITR lock is held.
#[derive(Default)]
pub(crate) struct ScriptedSlices {
    failure: Option<RunError>,
    /// Run until stopped, finishing normally after this long.
    wait_for_cancel: Option<Duration>,
    runs: AtomicUsize,
    store: OnceLock<Arc<dyn LockStore>>,
    held: Mutex<Vec<bool>>,
}

impl ScriptedSlices {
    pub(crate) fn failing(err: RunError) -> Self {
        Self {
            failure: Some(err),
            ..Self::default()
        }
    }

    pub(crate) fn waiting_for_cancel(limit: Duration) -> Self {
        Self {
            wait_for_cancel: Some(limit),
            ..Self::default()
        }
    }

    /// Look for a PITR lock in `store` during every run.
    pub(crate) fn watch_store(&self, store: Arc<dyn LockStore>) {
        let _ = self.store.set(store);
    }

    pub(crate) fn count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub(crate) fn held_lock_during_run(&self) -> bool {
        let held = self.held.lock().unwrap();
        !held.is_empty() && held.iter().all(|h| *h)
    }
}

impl SliceRunner for ScriptedSlices {
    fn run(&self, _node: &NodeInfo, stop: &CancelToken) -> std::result::Result<(), RunError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Some(store) = self.store.get() {
            let held = store
                .list()
                .map(|locks| {
                    locks
                        .iter()
                        .any(|l| l.metadata.header.op == OperationType::Pitr)
                })
                .unwrap_or(false);
            self.held.lock().unwrap().push(held);
        }
        if let Some(limit) = self.wait_for_cancel {
            let started = Instant::now();
            while started.elapsed() < limit {
                if stop.is_cancelled() {
                    return Err(RunError::Cancelled);
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}
