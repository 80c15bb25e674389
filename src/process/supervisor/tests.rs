use super::*;
use crate::config::Config;
use crate::process::readiness::ReadinessError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize};
use std::time::Duration;
use tempfile::TempDir;

struct FakeProcess {
    id: u32,
    exited: Arc<AtomicBool>,
    terminations: Arc<AtomicUsize>,
}

#[async_trait]
impl ServerProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(self.id)
    }

    fn liveness(&mut self) -> Result<Liveness> {
        Ok(if self.exited.load(Ordering::SeqCst) {
            Liveness::Exited { code: Some(1) }
        } else {
            Liveness::Alive
        })
    }

    async fn terminate(&mut self, _grace: Duration) -> Result<()> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        self.exited.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct FakeLauncher {
    next_id: AtomicU32,
    specs: parking_lot::Mutex<Vec<LaunchSpec>>,
    current: parking_lot::Mutex<Option<Arc<AtomicBool>>>,
    terminations: Arc<AtomicUsize>,
    fail: AtomicBool,
}

impl FakeLauncher {
    fn launches(&self) -> usize {
        self.specs.lock().len()
    }

    fn crash_current(&self) {
        if let Some(exited) = self.current.lock().as_ref() {
            exited.store(true, Ordering::SeqCst);
        }
    }
}

impl ServerLauncher for FakeLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ServerProcess>> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("executable missing");
        }
        self.specs.lock().push(spec.clone());
        let exited = Arc::new(AtomicBool::new(false));
        *self.current.lock() = Some(exited.clone());
        Ok(Box::new(FakeProcess {
            id: 1000 + self.next_id.fetch_add(1, Ordering::SeqCst),
            exited,
            terminations: self.terminations.clone(),
        }))
    }
}

#[derive(Default)]
struct CountingReadiness(AtomicUsize);

#[async_trait]
impl ReadinessCheck for CountingReadiness {
    async fn confirm(&self) -> Result<(), ReadinessError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    supervisor: ProcessSupervisor,
    launcher: Arc<FakeLauncher>,
    readiness: Arc<CountingReadiness>,
    _dir: TempDir,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let mods_file = dir.path().join("mods.txt");
    std::fs::write(&mods_file, "@CF\n@Trader\n").unwrap();

    let config: Config = toml::from_str(&format!(
        r#"
[server]
name = "test"
dir = '{dir}'
mods_file = '{mods}'

[killfeed]
log_dir = '{dir}'
webhook_url = "http://127.0.0.1/webhook"
occupancy_url = "http://127.0.0.1/status"
"#,
        dir = dir.path().display(),
        mods = mods_file.display(),
    ))
    .unwrap();

    let launcher = Arc::new(FakeLauncher::default());
    let readiness = Arc::new(CountingReadiness::default());
    let supervisor = ProcessSupervisor::new(
        config.server,
        config.supervisor,
        launcher.clone(),
        Some(readiness.clone()),
    );
    Harness {
        supervisor,
        launcher,
        readiness,
        _dir: dir,
    }
}

#[tokio::test(start_paused = true)]
async fn test_start_launches_with_mod_list() {
    let h = harness();
    h.supervisor.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(h.supervisor.state(), SupervisorState::Running);
    assert_eq!(h.supervisor.pid().await, Some(1000));
    let specs = h.launcher.specs.lock().clone();
    assert_eq!(specs.len(), 1);
    assert!(specs[0].args.contains(&"-mod=@CF;@Trader".to_string()));
    assert_eq!(h.readiness.0.load(Ordering::SeqCst), 1);

    h.supervisor.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_start_is_idempotent() {
    let h = harness();
    h.supervisor.start().await.unwrap();
    h.supervisor.start().await.unwrap();
    assert_eq!(h.launcher.launches(), 1);
    h.supervisor.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_crash_restarts_with_new_process() {
    let h = harness();
    let mut states = h.supervisor.subscribe();
    let observed = tokio::spawn(async move {
        let mut seen = Vec::new();
        while states.changed().await.is_ok() {
            seen.push(*states.borrow_and_update());
        }
        seen
    });

    h.supervisor.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    h.launcher.crash_current();

    // One liveness interval to notice, one restart delay to relaunch.
    tokio::time::sleep(Duration::from_secs(25)).await;

    assert_eq!(h.supervisor.state(), SupervisorState::Running);
    assert_eq!(h.launcher.launches(), 2);
    assert_eq!(h.supervisor.launches(), 2);
    assert_eq!(h.supervisor.pid().await, Some(1001));
    assert_eq!(h.readiness.0.load(Ordering::SeqCst), 2);
    // The crashed handle was reaped.
    assert_eq!(h.launcher.terminations.load(Ordering::SeqCst), 1);

    h.supervisor.stop().await.unwrap();
    drop(h.supervisor);
    let seen = observed.await.unwrap();
    let crash = seen
        .iter()
        .position(|s| *s == SupervisorState::Running)
        .unwrap();
    assert!(seen[crash..].contains(&SupervisorState::Starting));
    assert_eq!(seen.last(), Some(&SupervisorState::Stopped));
}

#[tokio::test(start_paused = true)]
async fn test_stop_halts_restarts() {
    let h = harness();
    h.supervisor.start().await.unwrap();
    h.supervisor.stop().await.unwrap();
    assert_eq!(h.supervisor.state(), SupervisorState::Stopped);
    assert_eq!(h.launcher.terminations.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.launcher.launches(), 1);
    assert_eq!(h.supervisor.state(), SupervisorState::Stopped);
    assert_eq!(h.supervisor.pid().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_stop_when_stopped_is_harmless() {
    let h = harness();
    h.supervisor.stop().await.unwrap();
    assert_eq!(h.supervisor.state(), SupervisorState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_restart_relaunches() {
    let h = harness();
    h.supervisor.start().await.unwrap();
    h.supervisor.restart().await.unwrap();

    assert_eq!(h.launcher.launches(), 2);
    assert_eq!(h.launcher.terminations.load(Ordering::SeqCst), 1);
    assert_eq!(h.supervisor.state(), SupervisorState::Running);
    h.supervisor.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_launch_leaves_stopped() {
    let h = harness();
    h.launcher.fail.store(true, Ordering::SeqCst);
    let err = h.supervisor.start().await.unwrap_err();
    assert!(err.to_string().contains("executable missing"));
    assert_eq!(h.supervisor.state(), SupervisorState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_failed_relaunch_is_retried() {
    let h = harness();
    h.supervisor.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    h.launcher.fail.store(true, Ordering::SeqCst);
    h.launcher.crash_current();
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(h.supervisor.state(), SupervisorState::Starting);
    assert_eq!(h.launcher.launches(), 1);

    h.launcher.fail.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.supervisor.state(), SupervisorState::Running);
    assert_eq!(h.launcher.launches(), 2);

    h.supervisor.stop().await.unwrap();
}
