//! End-to-end dispatch tests with fake translator and service manager.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use notify::event::{
    AccessKind, AccessMode, CreateKind, DataChange, MetadataKind, ModifyKind, RenameMode,
};
use notify::{Event, EventKind};
use tempfile::TempDir;
use tokio::sync::mpsc;

use provision_watcher::config::ActivationConfig;
use provision_watcher::extractors::TranslateError;
use provision_watcher::{
    ActivationError, ActivationGateway, CycleError, CycleOutcome, Dispatcher, EventSource,
    ServiceManager, TransientUnit, Translator, WatchError, WatchRegistry,
};

#[derive(Default)]
struct RecordingManager {
    units: Mutex<Vec<TransientUnit>>,
    fail: bool,
}

impl RecordingManager {
    fn count(&self) -> usize {
        self.units.lock().unwrap().len()
    }
}

#[async_trait]
impl ServiceManager for RecordingManager {
    async fn start_transient_unit(&self, unit: &TransientUnit) -> Result<(), ActivationError> {
        if self.fail {
            return Err(ActivationError::Connect {
                program: PathBuf::from("systemd-run"),
                source: io::Error::other("bus unavailable"),
            });
        }
        self.units.lock().unwrap().push(unit.clone());
        Ok(())
    }
}

#[derive(Default)]
struct CountingTranslator {
    calls: Mutex<Vec<String>>,
    fail: bool,
}

#[async_trait]
impl Translator for CountingTranslator {
    async fn translate(&self, interface: &str, _contents: &str) -> Result<String, TranslateError> {
        self.calls.lock().unwrap().push(interface.to_string());
        if self.fail {
            return Err(TranslateError::Io(io::Error::other("script missing")));
        }
        Ok(format!("[Match]\nName={interface}\n\n[Network]\nDHCP=yes\n"))
    }
}

struct Fixture {
    root: TempDir,
    scratch: TempDir,
    manager: Arc<RecordingManager>,
    translator: Arc<CountingTranslator>,
    dispatcher: Dispatcher,
}

impl Fixture {
    fn new() -> Self {
        Self::with(RecordingManager::default(), CountingTranslator::default())
    }

    fn with(manager: RecordingManager, translator: CountingTranslator) -> Self {
        let root = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let manager = Arc::new(manager);
        let translator = Arc::new(translator);

        let registry = WatchRegistry::standard(root.path(), translator.clone());
        let config = ActivationConfig {
            scratch_dir: Some(scratch.path().to_path_buf()),
            ..ActivationConfig::default()
        };
        let gateway = ActivationGateway::new(manager.clone(), &config);
        let dispatcher = Dispatcher::new(registry, gateway);

        Self {
            root,
            scratch,
            manager,
            translator,
            dispatcher,
        }
    }

    fn map_dispatcher(mut self, f: impl FnOnce(Dispatcher) -> Dispatcher) -> Self {
        self.dispatcher = f(self.dispatcher);
        self
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.path().join(key.trim_start_matches('/'))
    }

    fn write(&self, key: &str, contents: &str) -> PathBuf {
        let path = self.path(key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn scratch_files(&self) -> usize {
        std::fs::read_dir(self.scratch.path()).unwrap().count()
    }
}

fn created(path: &Path) -> Event {
    Event::new(EventKind::Create(CreateKind::File)).add_path(path.to_path_buf())
}

fn written(path: &Path) -> Event {
    Event::new(EventKind::Access(AccessKind::Close(AccessMode::Write))).add_path(path.to_path_buf())
}

fn activated_scratch(outcome: &CycleOutcome) -> &Path {
    match outcome {
        CycleOutcome::Activated { scratch, .. } => scratch,
        other => panic!("expected activation, got {other:?}"),
    }
}

#[tokio::test]
async fn test_shadow_event_activates_document() {
    let fixture = Fixture::new();
    let path = fixture.write("/etc/shadow", "root:$1$abc$def:15839:0:::::\n");

    let results = fixture.dispatcher.handle_event(&written(&path)).await;

    assert_eq!(results.len(), 1);
    let outcome = results[0].as_ref().unwrap();
    let CycleOutcome::Activated { key, unit, scratch } = outcome else {
        panic!("expected activation, got {outcome:?}");
    };
    assert_eq!(key, Path::new("/etc/shadow"));
    assert!(unit.ends_with(".service"));

    let rendered = std::fs::read_to_string(scratch).unwrap();
    assert!(rendered.starts_with("#cloud-config\n"));
    assert!(rendered.contains("name: root"));
    assert!(rendered.contains("name: core"));
    assert_eq!(rendered.matches("$1$abc$def").count(), 2);

    let units = fixture.manager.units.lock().unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(&units[0].name, unit);
    assert_eq!(units[0].exec_start[1], "--from-file");
    assert_eq!(units[0].exec_start[2], scratch.display().to_string());
}

#[tokio::test]
async fn test_network_event_translates_each_interface_once() {
    let fixture = Fixture::new();
    let path = fixture.write(
        "/etc/conf.d/net",
        "config_eth0=\"10.0.0.5/24\"\nroutes_eth0=\"default via 10.0.0.1\"\nconfig_eth1=\"dhcp\"\n",
    );

    let results = fixture.dispatcher.handle_event(&written(&path)).await;
    let scratch = activated_scratch(results[0].as_ref().unwrap());

    assert_eq!(*fixture.translator.calls.lock().unwrap(), vec!["eth0", "eth1"]);
    let rendered = std::fs::read_to_string(scratch).unwrap();
    assert!(rendered.contains("50-eth0.network"));
    assert!(rendered.contains("50-eth1.network"));
}

#[tokio::test]
async fn test_unregistered_path_is_ignored() {
    let fixture = Fixture::new();
    let path = fixture.write("/etc/passwd", "root:x:0:0:root:/root:/bin/bash\n");

    let results = fixture.dispatcher.handle_event(&written(&path)).await;

    assert!(matches!(
        results.as_slice(),
        [Ok(CycleOutcome::Unregistered { .. })]
    ));
    assert_eq!(fixture.manager.count(), 0);
    assert_eq!(fixture.scratch_files(), 0);
}

#[tokio::test]
async fn test_deleted_file_aborts_cycle() {
    let fixture = Fixture::new();
    let path = fixture.write("/etc/conf.d/hostname", "HOSTNAME=\"node-7\"\n");
    std::fs::remove_file(&path).unwrap();

    let results = fixture.dispatcher.handle_event(&written(&path)).await;

    assert!(matches!(
        results.as_slice(),
        [Ok(CycleOutcome::Missing { key })] if key == Path::new("/etc/conf.d/hostname")
    ));
    assert_eq!(fixture.manager.count(), 0);
}

#[tokio::test]
async fn test_metadata_change_is_ignored() {
    let fixture = Fixture::new();
    let path = fixture.write("/etc/shadow", "root:$1$abc$def:15839:0:::::\n");
    let event = Event::new(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)))
        .add_path(path);

    let results = fixture.dispatcher.handle_event(&event).await;

    assert!(results.is_empty());
    assert_eq!(fixture.manager.count(), 0);
}

#[tokio::test]
async fn test_modify_policy() {
    let fixture = Fixture::new();
    let path = fixture.write("/etc/conf.d/hostname", "HOSTNAME=\"node-7\"\n");

    let results = fixture.dispatcher.handle_event(&written(&path)).await;
    assert_eq!(results.len(), 1);
    assert_eq!(fixture.manager.count(), 1);

    let fixture = fixture.map_dispatcher(|d| d.react_to_modify(false));
    assert!(fixture.dispatcher.handle_event(&written(&path)).await.is_empty());
    assert_eq!(fixture.manager.count(), 1);

    // Without close-write reactions the creation itself is the trigger
    let results = fixture.dispatcher.handle_event(&created(&path)).await;
    assert_eq!(results.len(), 1);
    assert_eq!(fixture.manager.count(), 2);
}

#[tokio::test]
async fn test_new_file_write_activates_once() {
    for react_to_modify in [true, false] {
        let fixture = Fixture::new().map_dispatcher(|d| d.react_to_modify(react_to_modify));
        let path = fixture.write("/etc/shadow", "root:$1$abc$def:15839:0:::::\n");

        // The sequence inotify reports for a single write of a new file
        for event in [
            created(&path),
            Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Any))).add_path(path.clone()),
            written(&path),
        ] {
            fixture.dispatcher.handle_event(&event).await;
        }

        assert_eq!(fixture.manager.count(), 1, "react_to_modify = {react_to_modify}");
        assert_eq!(fixture.scratch_files(), 1);
    }
}

#[tokio::test]
async fn test_rename_into_place_activates() {
    let fixture = Fixture::new();
    let path = fixture.write("/root/.ssh/authorized_keys", "ssh-rsa AAA\n");
    let moved = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To))).add_path(path);

    let results = fixture.dispatcher.handle_event(&moved).await;

    assert!(matches!(results.as_slice(), [Ok(CycleOutcome::Activated { .. })]));
    assert_eq!(fixture.manager.count(), 1);
}

#[tokio::test]
async fn test_unrelated_events_skip_settle_delay() {
    let fixture = Fixture::new().map_dispatcher(|d| d.with_settle(Duration::from_millis(200)));
    let motd = fixture.write("/etc/motd", "hello\n");

    let started = Instant::now();
    for _ in 0..10 {
        let results = fixture.dispatcher.handle_event(&written(&motd)).await;
        assert!(matches!(
            results.as_slice(),
            [Ok(CycleOutcome::Unregistered { .. })]
        ));
    }

    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(fixture.manager.count(), 0);
}

#[tokio::test]
async fn test_settle_delay_applies_once_per_event() {
    let fixture = Fixture::new().map_dispatcher(|d| d.with_settle(Duration::from_millis(50)));
    let shadow = fixture.write("/etc/shadow", "root:$1$abc$def:15839:0:::::\n");
    let hostname = fixture.write("/etc/conf.d/hostname", "HOSTNAME=\"node-7\"\n");
    let motd = fixture.write("/etc/motd", "hello\n");
    let event = written(&shadow).add_path(motd).add_path(hostname);

    let started = Instant::now();
    let results = fixture.dispatcher.handle_event(&event).await;

    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(matches!(
        results.as_slice(),
        [
            Ok(CycleOutcome::Activated { .. }),
            Ok(CycleOutcome::Unregistered { .. }),
            Ok(CycleOutcome::Activated { .. })
        ]
    ));
    assert_eq!(fixture.manager.count(), 2);
}

#[tokio::test]
async fn test_extraction_failure_skips_activation() {
    let fixture = Fixture::with(
        RecordingManager::default(),
        CountingTranslator {
            fail: true,
            ..Default::default()
        },
    );
    let path = fixture.write("/etc/conf.d/net", "config_eth0=\"dhcp\"\n");

    let result = fixture.dispatcher.process_path(&path).await;

    assert!(matches!(result, Err(CycleError::Extract { .. })));
    assert_eq!(fixture.manager.count(), 0);
}

#[tokio::test]
async fn test_activation_failure_is_reported() {
    let fixture = Fixture::with(
        RecordingManager {
            fail: true,
            ..Default::default()
        },
        CountingTranslator::default(),
    );
    let path = fixture.write("/etc/conf.d/hostname", "HOSTNAME=\"node-7\"\n");

    let result = fixture.dispatcher.process_path(&path).await;

    assert!(matches!(result, Err(CycleError::Activate { .. })));
}

#[tokio::test]
async fn test_reconcile_only_existing_files() {
    let fixture = Fixture::new();
    fixture.write("/etc/shadow", "root:$1$abc$def:15839:0:::::\n");
    fixture.write("/etc/conf.d/hostname", "HOSTNAME=\"node-7\"\n");

    let summary = fixture.dispatcher.reconcile().await;

    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.activated, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(fixture.manager.count(), 2);
    // No network file, so the translator never ran
    assert!(fixture.translator.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_reconcile_runs_every_extractor_once() {
    let fixture = Fixture::new();
    fixture.write("/etc/conf.d/net", "config_eth0=\"dhcp\"\n");
    fixture.write("/root/.ssh/authorized_keys", "ssh-rsa AAA\nssh-ed25519 BBB");
    fixture.write("/etc/shadow", "root:$1$abc$def:15839:0:::::\n");
    fixture.write("/etc/conf.d/hostname", "HOSTNAME=\"node-7\"\n");

    let summary = fixture.dispatcher.reconcile().await;

    assert_eq!(summary.attempted, 4);
    assert_eq!(summary.activated, 4);
    assert_eq!(fixture.manager.count(), 4);
    assert_eq!(fixture.translator.calls.lock().unwrap().len(), 1);
    assert_eq!(fixture.scratch_files(), 4);
}

#[tokio::test]
async fn test_reprocessing_is_idempotent() {
    let fixture = Fixture::new();
    let path = fixture.write("/root/.ssh/authorized_keys", "ssh-rsa AAA\nssh-ed25519 BBB");

    let first = fixture.dispatcher.process_path(&path).await.unwrap();
    let second = fixture.dispatcher.process_path(&path).await.unwrap();

    let first_scratch = activated_scratch(&first);
    let second_scratch = activated_scratch(&second);
    assert_ne!(first_scratch, second_scratch);
    assert_eq!(
        std::fs::read_to_string(first_scratch).unwrap(),
        std::fs::read_to_string(second_scratch).unwrap()
    );

    let units = fixture.manager.units.lock().unwrap();
    assert_eq!(units.len(), 2);
    assert_ne!(units[0].name, units[1].name);
}

#[tokio::test]
async fn test_run_survives_cycle_errors_and_stops_on_source_error() {
    let fixture = Fixture::with(
        RecordingManager {
            fail: true,
            ..Default::default()
        },
        CountingTranslator::default(),
    );
    let hostname = fixture.write("/etc/conf.d/hostname", "HOSTNAME=\"node-7\"\n");
    let unrelated = fixture.write("/etc/motd", "hello\n");

    let (tx, rx) = mpsc::channel(8);
    tx.send(Ok(written(&hostname))).await.unwrap();
    tx.send(Ok(written(&unrelated))).await.unwrap();
    tx.send(Err(notify::Error::generic("inotify queue overflow")))
        .await
        .unwrap();

    let err = fixture.dispatcher.run(rx).await.unwrap_err();

    assert!(matches!(err, WatchError::EventSource { .. }));
}

#[tokio::test]
async fn test_run_stops_when_channel_closes() {
    let fixture = Fixture::new();
    let path = fixture.write("/etc/conf.d/hostname", "HOSTNAME=\"node-7\"\n");

    let (tx, rx) = mpsc::channel(8);
    tx.send(Ok(written(&path))).await.unwrap();
    drop(tx);

    let err = fixture.dispatcher.run(rx).await.unwrap_err();

    assert!(matches!(err, WatchError::ChannelClosed));
    assert_eq!(fixture.manager.count(), 1);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_live_source_skips_missing_dirs_and_activates_once() {
    let fixture = Fixture::new();
    // Only /etc exists; /etc/conf.d and /root/.ssh do not
    std::fs::create_dir_all(fixture.path("/etc")).unwrap();

    let mut source = EventSource::new(16).unwrap();
    let watched = source.watch_registry(fixture.dispatcher.registry());
    assert_eq!(watched, 1);
    assert_eq!(fixture.dispatcher.registry().watch_dirs().len(), 3);

    let (_watcher, events) = source.into_parts();
    fixture.write("/etc/shadow", "root:$1$abc$def:15839:0:::::\n");
    fixture.write("/etc/motd", "hello\n");

    // The loop only ends on source failure, so bound it
    let run = tokio::time::timeout(Duration::from_millis(500), fixture.dispatcher.run(events));
    assert!(run.await.is_err());

    assert_eq!(fixture.manager.count(), 1);
    assert_eq!(fixture.scratch_files(), 1);
}
