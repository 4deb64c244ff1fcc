use log_backup_agent::config::WatchConfig;
use log_backup_agent::{BackupExecutor, LoopPhase, PollOutcome, StateStore};
use std::fs::{self, File, FileTimes};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct Fixture {
    _dir: TempDir,
    source: PathBuf,
    backup_dir: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("logs").join("VM-state.log");
        let backup_dir = dir.path().join("backup");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        Self {
            _dir: dir,
            source,
            backup_dir,
        }
    }

    fn config(&self) -> WatchConfig {
        WatchConfig {
            source_file: self.source.clone(),
            backup_dir: self.backup_dir.clone(),
            interval_secs: 1,
        }
    }

    fn executor(&self) -> BackupExecutor {
        BackupExecutor::new(&self.config())
    }

    fn backups(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.backup_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("VM-state.log__"))
            })
            .collect();
        files.sort();
        files
    }
}

fn set_mtime(path: &Path, secs: u64) {
    let t = UNIX_EPOCH + Duration::from_secs(secs);
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_times(FileTimes::new().set_modified(t))
        .unwrap();
}

#[test]
fn missing_source_creates_no_backup_until_it_appears() {
    let fx = Fixture::new();
    let mut executor = fx.executor();

    assert_eq!(executor.poll_once(), PollOutcome::SourceMissing);
    assert_eq!(executor.poll_once(), PollOutcome::SourceMissing);
    assert!(fx.backups().is_empty());

    fs::write(&fx.source, b"first boot\n").unwrap();
    assert!(matches!(executor.poll_once(), PollOutcome::BackedUp(_)));
    assert_eq!(fx.backups().len(), 1);
}

#[test]
fn append_produces_second_backup_with_new_content() {
    let fx = Fixture::new();
    let mut executor = fx.executor();

    fs::write(&fx.source, b"A").unwrap();
    assert!(matches!(executor.poll_once(), PollOutcome::BackedUp(_)));

    fs::write(&fx.source, b"AB").unwrap();
    let PollOutcome::BackedUp(second) = executor.poll_once() else {
        panic!("append was not backed up");
    };

    assert_eq!(fx.backups().len(), 2);
    assert_eq!(fs::read(&second.last_backup_file).unwrap(), b"AB");
}

#[test]
fn unchanged_source_is_backed_up_once() {
    let fx = Fixture::new();
    let mut executor = fx.executor();
    fs::write(&fx.source, b"steady").unwrap();

    assert!(matches!(executor.poll_once(), PollOutcome::BackedUp(_)));
    assert_eq!(executor.poll_once(), PollOutcome::Unchanged);
    assert_eq!(executor.poll_once(), PollOutcome::Unchanged);

    assert_eq!(fx.backups().len(), 1);
}

#[test]
fn touch_without_content_change_adds_no_backup() {
    let fx = Fixture::new();
    let mut executor = fx.executor();
    fs::write(&fx.source, b"same bytes").unwrap();
    set_mtime(&fx.source, 1_700_000_000);

    assert!(matches!(executor.poll_once(), PollOutcome::BackedUp(_)));

    set_mtime(&fx.source, 1_700_000_060);
    assert_eq!(executor.poll_once(), PollOutcome::MetadataOnly);
    assert_eq!(fx.backups().len(), 1);
}

#[test]
fn restart_with_unchanged_source_skips_backup() {
    let fx = Fixture::new();
    fs::write(&fx.source, b"persisted").unwrap();

    let mut first = fx.executor();
    assert!(matches!(first.poll_once(), PollOutcome::BackedUp(_)));
    let saved = StateStore::new(first.backup_dir()).load();
    assert_eq!(&saved, first.state());
    drop(first);

    let mut restarted = fx.executor();
    assert_eq!(restarted.state(), &saved);
    assert_eq!(restarted.poll_once(), PollOutcome::Unchanged);
    assert_eq!(fx.backups().len(), 1);
}

#[test]
fn corrupt_state_file_leads_to_fresh_backup() {
    let fx = Fixture::new();
    fs::write(&fx.source, b"data").unwrap();
    fs::create_dir_all(&fx.backup_dir).unwrap();
    fs::write(fx.backup_dir.join("backup_state.json"), b"not json").unwrap();

    let mut executor = fx.executor();
    assert!(executor.state().is_empty());
    assert!(matches!(executor.poll_once(), PollOutcome::BackedUp(_)));
}

#[test]
fn unwritable_state_file_does_not_stop_backups() {
    let fx = Fixture::new();
    // A directory in place of the state file makes every save fail.
    fs::create_dir_all(fx.backup_dir.join("backup_state.json")).unwrap();
    let mut executor = fx.executor();
    assert!(executor.state().is_empty());

    fs::write(&fx.source, b"A").unwrap();
    assert!(matches!(executor.poll_once(), PollOutcome::BackedUp(_)));
    assert_eq!(executor.poll_once(), PollOutcome::Unchanged);

    fs::write(&fx.source, b"AB").unwrap();
    let PollOutcome::BackedUp(second) = executor.poll_once() else {
        panic!("change after a failed save was not backed up");
    };

    assert_eq!(fx.backups().len(), 2);
    assert_eq!(fs::read(&second.last_backup_file).unwrap(), b"AB");
    assert!(fx.backup_dir.join("backup_state.json").is_dir());
}

#[test]
fn backup_preserves_source_bytes_and_mtime() {
    let fx = Fixture::new();
    let mut executor = fx.executor();
    fs::write(&fx.source, b"kernel: ok\nvm: running\n").unwrap();
    set_mtime(&fx.source, 1_690_000_000);

    let PollOutcome::BackedUp(record) = executor.poll_once() else {
        panic!("no backup written");
    };

    assert_eq!(
        fs::read(&record.last_backup_file).unwrap(),
        fs::read(&fx.source).unwrap()
    );
    let copied = fs::metadata(&record.last_backup_file).unwrap();
    assert_eq!(
        copied.modified().unwrap(),
        UNIX_EPOCH + Duration::from_secs(1_690_000_000)
    );
    assert_eq!(executor.state().last_mtime, Some(1_690_000_000));
}

#[tokio::test]
async fn run_loop_backs_up_and_stops_on_cancel() {
    let fx = Fixture::new();
    fs::write(&fx.source, b"loop").unwrap();

    let cancel = CancellationToken::new();
    let loop_cancel = cancel.clone();
    let config = fx.config();
    let handle = tokio::spawn(async move {
        let mut executor = BackupExecutor::new(&config);
        executor.run(loop_cancel).await;
        executor
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();

    let executor = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop did not stop")
        .unwrap();

    assert_eq!(executor.phase(), LoopPhase::Stopped);
    assert_eq!(fx.backups().len(), 1);
    assert_eq!(executor.state().last_size, Some(4));
}
