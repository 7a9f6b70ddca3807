//! Coordinator tests.

use super::*;
use crate::locks::{FileLockStore, LockHeader, LockMetadata, OperationType};
use crate::log::{Level, LogEntry, LogFilter, read_entries};
use crate::node::{MemberState, NodeInfo};
use crate::pitr::Intent;
use crate::test_support::{
    FakeNode, RecordingStore, ScriptedBackup, ScriptedRestore, Script, StoreCall,
};
use serial_test::serial;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;
use tempfile::TempDir;

fn timing(wait_backup_start_ms: u64) -> Timing {
    Timing {
        pitr_check_period: Duration::from_millis(20),
        wait_backup_start: Duration::from_millis(wait_backup_start_ms),
        lock_heartbeat: Duration::from_secs(1),
    }
}

fn build_agent(
    lock_dir: &Path,
    log_path: &Path,
    node: Arc<FakeNode>,
    backups: Arc<ScriptedBackup>,
    restores: Arc<ScriptedRestore>,
    timing: Timing,
) -> (Arc<Agent>, Arc<RecordingStore>) {
    let store = Arc::new(RecordingStore::new(Arc::new(FileLockStore::new(
        lock_dir, 30,
    ))));
    let me = node
        .info()
        .map(|info| info.me)
        .unwrap_or_else(|_| "unknown".to_string());
    let log = Arc::new(AgentLog::new(&me, Some(log_path.to_path_buf())));
    let runners = Runners {
        backup: backups.clone(),
        restore: restores,
    };
    let agent = Arc::new(Agent::new(node, store.clone(), runners, log, timing));
    backups.watch_intent(agent.pitr_handle().intent);
    (agent, store)
}

struct Harness {
    _temp_dir: TempDir,
    lock_dir: PathBuf,
    log_path: PathBuf,
    node: Arc<FakeNode>,
    store: Arc<RecordingStore>,
    backups: Arc<ScriptedBackup>,
    restores: Arc<ScriptedRestore>,
    agent: Arc<Agent>,
}

impl Harness {
    fn new(
        node: FakeNode,
        backups: ScriptedBackup,
        restores: ScriptedRestore,
        timing: Timing,
    ) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let lock_dir = temp_dir.path().join("locks");
        let log_path = temp_dir.path().join("agent.ndjson");
        let node = Arc::new(node);
        let backups = Arc::new(backups);
        let restores = Arc::new(restores);
        let (agent, store) = build_agent(
            &lock_dir,
            &log_path,
            node.clone(),
            backups.clone(),
            restores.clone(),
            timing,
        );
        Self {
            _temp_dir: temp_dir,
            lock_dir,
            log_path,
            node,
            store,
            backups,
            restores,
            agent,
        }
    }

    fn backup_node(info: NodeInfo, backups: ScriptedBackup, timing: Timing) -> Self {
        Self::new(
            FakeNode::new(info),
            backups,
            ScriptedRestore::succeeding(),
            timing,
        )
    }

    fn restore_node(info: NodeInfo, restores: ScriptedRestore) -> Self {
        Self::new(
            FakeNode::new(info),
            ScriptedBackup::succeeding(Duration::ZERO),
            restores,
            timing(0),
        )
    }

    /// A store on the same lock directory, acting as another member.
    fn peer_store(&self) -> FileLockStore {
        FileLockStore::new(&self.lock_dir, 30)
    }

    fn entries(&self) -> Vec<LogEntry> {
        read_entries(&self.log_path, &LogFilter::default()).unwrap()
    }

    fn has_entry(&self, level: Level, needle: &str) -> bool {
        self.entries()
            .iter()
            .any(|e| e.level == level && e.msg.contains(needle))
    }

    fn intent(&self) -> Intent {
        self.agent.pitr_handle().intent.get()
    }
}

fn secondary() -> NodeInfo {
    NodeInfo::secondary("rs0", "node1:27017")
}

fn primary() -> NodeInfo {
    NodeInfo::primary("rs0", "node1:27017")
}

fn wait_for_current(agent: &Agent, name: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while agent.current_backup().as_deref() != Some(name) {
        assert!(Instant::now() < deadline, "backup {} never started", name);
        thread::sleep(Duration::from_millis(5));
    }
}

// ============================================================================
// Backup
// ============================================================================

#[test]
fn backup_on_unsuitable_node_takes_no_lock() {
    let h = Harness::backup_node(
        NodeInfo::with_state("rs0", "node1:27017", MemberState::Arbiter),
        ScriptedBackup::succeeding(Duration::ZERO),
        timing(0),
    );

    h.agent.backup(&BackupCommand::new("bk1"));

    assert!(h.store.calls().is_empty());
    assert!(h.has_entry(Level::Info, "not suitable for backup"));
    assert_eq!(h.agent.current_backup(), None);
    assert_eq!(h.backups.runs(), 0);
    assert_eq!(h.intent(), Intent::None);
}

#[test]
fn backup_on_delayed_secondary_is_rejected() {
    let mut info = secondary();
    info.delay_secs = 600;
    let h = Harness::backup_node(info, ScriptedBackup::succeeding(Duration::ZERO), timing(0));

    h.agent.backup(&BackupCommand::new("bk1"));

    assert!(h.store.calls().is_empty());
    assert_eq!(h.backups.runs(), 0);
}

#[test]
fn backup_node_failure_is_logged_as_error() {
    let h = Harness::new(
        FakeNode::failing("connection refused"),
        ScriptedBackup::succeeding(Duration::ZERO),
        ScriptedRestore::succeeding(),
        timing(0),
    );

    h.agent.backup(&BackupCommand::new("bk1"));

    assert!(h.store.calls().is_empty());
    assert!(h.has_entry(Level::Error, "node check: Node lookup failed: connection refused"));
    assert_eq!(h.intent(), Intent::None);
}

#[test]
#[serial]
fn backup_runs_and_releases_lock() {
    let h = Harness::backup_node(
        secondary(),
        ScriptedBackup::succeeding(Duration::ZERO),
        timing(0),
    );

    h.agent.backup(&BackupCommand::new("bk1"));

    assert_eq!(h.backups.runs(), 1);
    assert!(h.peer_store().list().unwrap().is_empty());
    assert!(h.has_entry(Level::Info, "backup started"));
    assert!(h.has_entry(Level::Info, "backup finished"));

    let backup_lock = LockHeader::backup("rs0", "node1:27017", "bk1");
    assert_eq!(
        h.store.calls(),
        vec![
            StoreCall::MarkStale(LockHeader::pitr("rs0", "node1:27017")),
            StoreCall::Acquire(backup_lock.clone(), true),
            StoreCall::Release(backup_lock),
        ]
    );
}

#[test]
#[serial]
fn backup_waits_for_pitr_loop_before_locking() {
    let h = Harness::backup_node(
        secondary(),
        ScriptedBackup::succeeding(Duration::ZERO),
        timing(0),
    );

    let t0 = Instant::now();
    h.agent.backup(&BackupCommand::new("bk1"));

    let started = h.backups.first_started().unwrap();
    assert!(started - t0 >= Duration::from_millis(22));
}

#[test]
#[serial]
fn backup_holds_intent_while_running_and_resets_after() {
    let h = Harness::backup_node(
        secondary(),
        ScriptedBackup::succeeding(Duration::ZERO),
        timing(0),
    );

    h.agent.backup(&BackupCommand::new("bk1"));

    assert_eq!(h.backups.seen_intent(), vec![Intent::Backup]);
    assert_eq!(h.intent(), Intent::None);
}

#[test]
#[serial]
fn backup_clears_pitr_lock_and_wakes_loop() {
    let h = Harness::backup_node(
        secondary(),
        ScriptedBackup::succeeding(Duration::ZERO),
        timing(0),
    );
    let peer = h.peer_store();
    assert!(peer.acquire(&LockHeader::pitr("rs0", "node2:27017")).unwrap());

    h.agent.backup(&BackupCommand::new("bk1"));

    // The PITR lock would have blocked the backup lock.
    assert_eq!(h.backups.runs(), 1);
    assert!(!h.has_entry(Level::Warning, "clearing pitr locks"));
    assert!(h.agent.pitr_handle().waker.wait_timeout(Duration::ZERO));
}

#[test]
#[serial]
fn two_members_race_and_one_runs() {
    let h = Harness::backup_node(
        secondary(),
        ScriptedBackup::succeeding(Duration::from_millis(100)),
        timing(300),
    );
    let peer_backups = Arc::new(ScriptedBackup::succeeding(Duration::from_millis(100)));
    let (peer, _) = build_agent(
        &h.lock_dir,
        &h.log_path,
        Arc::new(FakeNode::new(NodeInfo::secondary("rs0", "node2:27017"))),
        peer_backups.clone(),
        Arc::new(ScriptedRestore::succeeding()),
        timing(300),
    );

    let cmd = BackupCommand::new("bk1");
    let handles: Vec<_> = [h.agent.clone(), peer]
        .into_iter()
        .map(|agent| {
            let cmd = cmd.clone();
            thread::spawn(move || agent.backup(&cmd))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(h.backups.runs() + peer_backups.runs(), 1);
    assert!(h.has_entry(Level::Info, "backup has been scheduled on another replset node"));
    assert!(h.peer_store().list().unwrap().is_empty());
}

#[test]
#[serial]
fn fast_backup_holds_lock_for_dwell_floor() {
    let h = Harness::backup_node(
        secondary(),
        ScriptedBackup::succeeding(Duration::from_millis(50)),
        timing(500),
    );

    let t0 = Instant::now();
    h.agent.backup(&BackupCommand::new("bk2"));

    let released = h.store.released_at(OperationType::Backup).unwrap();
    let finished = h.backups.last_finished().unwrap();
    let started = h.backups.first_started().unwrap();
    assert!(released - t0 >= Duration::from_millis(500));
    assert!(released - started >= Duration::from_millis(450));
    assert!(released > finished);
}

#[test]
#[serial]
fn slow_backup_releases_immediately() {
    let h = Harness::backup_node(
        secondary(),
        ScriptedBackup::succeeding(Duration::from_millis(200)),
        timing(50),
    );

    h.agent.backup(&BackupCommand::new("bk1"));

    let released = h.store.released_at(OperationType::Backup).unwrap();
    let finished = h.backups.last_finished().unwrap();
    assert!(released - finished < Duration::from_millis(50));
}

#[test]
#[serial]
fn cancel_backup_stops_running_backup() {
    let h = Harness::backup_node(
        secondary(),
        ScriptedBackup::new(Script::WaitForCancel, Duration::from_secs(10)),
        timing(0),
    );

    let agent = h.agent.clone();
    let handle = thread::spawn(move || agent.backup(&BackupCommand::new("bk1")));
    wait_for_current(&h.agent, "bk1");

    assert!(h.agent.cancel_backup());
    assert!(!h.agent.cancel_backup());
    handle.join().unwrap();

    assert!(h.has_entry(Level::Info, "backup was canceled"));
    assert!(!h.has_entry(Level::Error, "backup:"));
    assert_eq!(h.agent.current_backup(), None);
    assert!(h.peer_store().list().unwrap().is_empty());
}

#[test]
fn cancel_without_backup_is_noop() {
    let h = Harness::backup_node(
        secondary(),
        ScriptedBackup::succeeding(Duration::ZERO),
        timing(0),
    );

    assert!(!h.agent.cancel_backup());
    assert!(h.entries().is_empty());
}

#[test]
#[serial]
fn concurrent_backups_never_share_the_slot() {
    let h = Harness::backup_node(
        secondary(),
        ScriptedBackup::succeeding(Duration::from_millis(300)),
        timing(0),
    );

    let first = {
        let agent = h.agent.clone();
        thread::spawn(move || agent.backup(&BackupCommand::new("bk1")))
    };
    wait_for_current(&h.agent, "bk1");
    h.agent.backup(&BackupCommand::new("bk2"));
    assert_eq!(h.agent.current_backup().as_deref(), Some("bk1"));
    first.join().unwrap();

    assert_eq!(h.backups.runs(), 1);
    assert_eq!(h.backups.max_active(), 1);
    assert!(h.has_entry(Level::Error, "another backup is already running"));
    assert!(h.peer_store().list().unwrap().is_empty());
}

#[test]
#[serial]
fn failed_backup_is_logged_and_lock_released() {
    let h = Harness::backup_node(
        secondary(),
        ScriptedBackup::new(Script::Fail("disk full".to_string()), Duration::ZERO),
        timing(0),
    );

    h.agent.backup(&BackupCommand::new("bk1"));

    assert!(h.has_entry(Level::Error, "backup: disk full"));
    assert!(!h.has_entry(Level::Info, "backup finished"));
    assert!(h.peer_store().list().unwrap().is_empty());
    assert_eq!(h.agent.current_backup(), None);
}

#[test]
#[serial]
fn panicking_runner_leaves_no_state_behind() {
    let h = Harness::backup_node(
        secondary(),
        ScriptedBackup::new(Script::Panic, Duration::ZERO),
        timing(0),
    );

    let agent = h.agent.clone();
    let result = thread::spawn(move || agent.backup(&BackupCommand::new("bk1"))).join();

    assert!(result.is_err());
    assert_eq!(h.intent(), Intent::None);
    assert_eq!(h.agent.current_backup(), None);
    assert!(h.peer_store().list().unwrap().is_empty());
}

#[test]
#[serial]
fn abandoned_backup_lock_is_marked_stale_and_retried() {
    let h = Harness::backup_node(
        secondary(),
        ScriptedBackup::succeeding(Duration::ZERO),
        timing(0),
    );
    let abandoned = LockHeader::backup("rs0", "node2:27017", "bk1");
    let peer = h.peer_store();
    let path = peer.lock_path(&abandoned);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut meta = LockMetadata::new(&abandoned);
    meta.heartbeat = chrono::Utc::now() - chrono::Duration::seconds(600);
    std::fs::write(&path, meta.to_json().unwrap()).unwrap();

    h.agent.backup(&BackupCommand::new("bk1"));

    assert_eq!(h.backups.runs(), 1);
    assert!(h.has_entry(Level::Warning, "marked stale"));
}

#[test]
#[serial]
fn lock_taken_away_during_backup_is_reported() {
    let h = Harness::backup_node(
        secondary(),
        ScriptedBackup::new(Script::WaitForCancel, Duration::from_secs(10)),
        timing(0),
    );

    let agent = h.agent.clone();
    let handle = thread::spawn(move || agent.backup(&BackupCommand::new("bk1")));
    wait_for_current(&h.agent, "bk1");
    h.peer_store()
        .mark_stale(&LockHeader::backup("rs0", "node1:27017", "bk1"))
        .unwrap();
    h.agent.cancel_backup();
    handle.join().unwrap();

    assert!(h.has_entry(Level::Error, "unable to release backup lock"));
}

// ============================================================================
// Restore
// ============================================================================

#[test]
fn restore_on_secondary_is_not_attempted() {
    let h = Harness::restore_node(secondary(), ScriptedRestore::succeeding());

    h.agent.restore(&RestoreCommand::new("r1", "bk1"));

    assert_eq!(h.store.acquires(OperationType::Restore), 0);
    assert_eq!(h.restores.runs(), 0);
    let entries = h.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].level, Level::Info);
    assert!(entries[0].msg.contains("not suitable for restore"));
    assert_eq!(entries[0].name, "bk1");
}

#[test]
fn restore_on_primary_runs_under_lock() {
    let h = Harness::restore_node(primary(), ScriptedRestore::succeeding());

    h.agent.restore(&RestoreCommand::new("r1", "bk1"));

    let restore_lock = LockHeader::restore("rs0", "node1:27017", "r1");
    assert_eq!(
        h.store.calls(),
        vec![
            StoreCall::Acquire(restore_lock.clone(), true),
            StoreCall::Release(restore_lock),
        ]
    );
    assert_eq!(h.restores.runs(), 1);
    assert!(h.has_entry(Level::Info, "restore finished successfully"));
    assert_eq!(h.node.lookups(), 1);
}

#[test]
fn restore_contention_is_an_error() {
    let h = Harness::restore_node(primary(), ScriptedRestore::succeeding());
    assert!(
        h.peer_store()
            .acquire(&LockHeader::restore("rs0", "node2:27017", "r1"))
            .unwrap()
    );

    h.agent.restore(&RestoreCommand::new("r1", "bk1"));

    assert_eq!(h.restores.runs(), 0);
    assert!(h.has_entry(Level::Error, "another backup or restore process running"));
}

#[test]
fn restore_waits_for_pitr_lock() {
    let h = Harness::restore_node(primary(), ScriptedRestore::succeeding());
    assert!(
        h.peer_store()
            .acquire(&LockHeader::pitr("rs0", "node2:27017"))
            .unwrap()
    );

    h.agent.restore(&RestoreCommand::new("r1", "bk1"));

    assert_eq!(h.restores.runs(), 0);
    assert!(h.has_entry(Level::Error, "unable to run the restore"));
}

#[test]
fn failed_restore_still_releases_lock() {
    let h = Harness::restore_node(primary(), ScriptedRestore::failing("oplog replay failed"));

    h.agent.restore(&RestoreCommand::new("r1", "bk1"));

    assert!(h.has_entry(Level::Error, "restore: oplog replay failed"));
    assert!(h.peer_store().list().unwrap().is_empty());
}

#[test]
fn restore_node_failure_is_logged() {
    let h = Harness::new(
        FakeNode::failing("timeout"),
        ScriptedBackup::succeeding(Duration::ZERO),
        ScriptedRestore::succeeding(),
        timing(0),
    );

    h.agent.restore(&RestoreCommand::new("r1", "bk1"));

    assert!(h.store.calls().is_empty());
    assert!(h.has_entry(Level::Error, "get node info"));
}
