/**
 * HEARTH LIFECYCLE - Thread de travail par unité
 *
 * RÔLE : Exécuter le travail périodique d'une unité sur son propre thread OS,
 * sans que la logique de l'unité ait à gérer threading, arrêt ou crash.
 *
 * FONCTIONNEMENT : start() démarre le thread ; chaque itération est confinée
 * (erreur -> log + backoff fixe, panic -> log + backoff, la boucle continue).
 * stop() efface le drapeau puis join le thread : il ne rend la main qu'une
 * fois la fonction de cleanup terminée. stop() sur une unité jamais démarrée
 * ou déjà arrêtée est un no-op.
 *
 * Les sommeils passent par WorkerCtl::pause : tranches d'une seconde avec
 * re-lecture du drapeau, pour que l'arrêt soit vu en ~1s et non après une
 * période complète.
 */

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, info_span, warn};

/// Backoff après une itération en échec.
const ERROR_BACKOFF_SECS: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Constructed,
    Initialized,
    Running,
    Stopping,
    Stopped,
}

/// Corps d'une unité : une itération de travail + un cleanup final.
pub trait PluginTask: Send + Sync + 'static {
    fn run_iteration(&self, ctl: &WorkerCtl) -> anyhow::Result<()>;
    fn cleanup(&self) {}
}

/// Poignée passée à chaque itération : drapeau de marche + nom de l'unité
/// (toutes les traces de l'itération portent ce nom via le span du thread).
#[derive(Clone)]
pub struct WorkerCtl {
    name: &'static str,
    running: Arc<AtomicBool>,
}

impl WorkerCtl {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sommeil interruptible : `secs` tranches d'une seconde.
    pub fn pause(&self, secs: u64) {
        for _ in 0..secs {
            if !self.is_running() {
                return;
            }
            std::thread::sleep(Duration::from_secs(1));
        }
    }

    /// Poignée détachée pour piloter une itération à la main dans les tests.
    #[cfg(test)]
    pub(crate) fn for_tests(name: &'static str) -> Self {
        Self {
            name,
            running: Arc::new(AtomicBool::new(true)),
        }
    }
}

pub struct Worker {
    name: &'static str,
    running: Arc<AtomicBool>,
    state: Mutex<LifecycleState>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            running: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(LifecycleState::Constructed),
            handle: Mutex::new(None),
        }
    }

    /// À appeler en fin de construction réussie de l'unité.
    pub fn mark_initialized(&self) {
        let mut state = self.state.lock();
        if *state == LifecycleState::Constructed {
            *state = LifecycleState::Initialized;
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub fn is_initialized(&self) -> bool {
        self.state() != LifecycleState::Constructed
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    pub fn start<T: PluginTask>(&self, task: Arc<T>) {
        let mut state = self.state.lock();
        match *state {
            LifecycleState::Initialized => {}
            LifecycleState::Constructed => {
                warn!(unit = self.name, "start called before initialized, not running");
                return;
            }
            _ => return, // déjà démarrée ou arrêtée
        }

        self.running.store(true, Ordering::SeqCst);
        let ctl = WorkerCtl {
            name: self.name,
            running: Arc::clone(&self.running),
        };

        let spawned = std::thread::Builder::new()
            .name(self.name.to_string())
            .spawn(move || run_loop(task, ctl));

        match spawned {
            Ok(handle) => {
                *self.handle.lock() = Some(handle);
                *state = LifecycleState::Running;
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                error!(unit = self.name, "failed to spawn worker thread: {e}");
            }
        }
    }

    /// Rendez-vous synchrone : ne rend la main qu'après le cleanup de l'unité.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state != LifecycleState::Running {
                return;
            }
            *state = LifecycleState::Stopping;
        }

        self.running.store(false, Ordering::SeqCst);

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                // le thread confine ses panics ; un join raté reste signalé
                error!(unit = self.name, "worker thread terminated abnormally");
            }
        }

        *self.state.lock() = LifecycleState::Stopped;
    }
}

fn run_loop<T: PluginTask>(task: Arc<T>, ctl: WorkerCtl) {
    let span = info_span!("unit", name = ctl.name);
    let _entered = span.enter();

    info!("worker started");

    while ctl.is_running() {
        match catch_unwind(AssertUnwindSafe(|| task.run_iteration(&ctl))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("iteration failed: {e:#}");
                ctl.pause(ERROR_BACKOFF_SECS);
            }
            Err(payload) => {
                error!("iteration panicked: {}", panic_message(&payload));
                ctl.pause(ERROR_BACKOFF_SECS);
            }
        }
    }

    task.cleanup();
    info!("worker stopped");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    struct TickTask {
        iterations: AtomicUsize,
        cleanups: AtomicUsize,
        period: u64,
    }

    impl TickTask {
        fn new(period: u64) -> Arc<Self> {
            Arc::new(Self {
                iterations: AtomicUsize::new(0),
                cleanups: AtomicUsize::new(0),
                period,
            })
        }
    }

    impl PluginTask for TickTask {
        fn run_iteration(&self, ctl: &WorkerCtl) -> anyhow::Result<()> {
            self.iterations.fetch_add(1, Ordering::SeqCst);
            ctl.pause(self.period);
            Ok(())
        }

        fn cleanup(&self) {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn ready_worker(name: &'static str) -> Worker {
        let worker = Worker::new(name);
        worker.mark_initialized();
        worker
    }

    #[test]
    fn stop_returns_within_one_tick_and_cleans_up_once() {
        let worker = ready_worker("tick");
        let task = TickTask::new(30);

        worker.start(Arc::clone(&task));
        assert!(worker.is_running());
        std::thread::sleep(Duration::from_millis(200));

        let begun = Instant::now();
        worker.stop();
        // période de 30s, mais le drapeau est relu à chaque tranche de 1s
        assert!(begun.elapsed() < Duration::from_secs(3));
        assert_eq!(task.cleanups.load(Ordering::SeqCst), 1);
        assert!(task.iterations.load(Ordering::SeqCst) >= 1);
        assert_eq!(worker.state(), LifecycleState::Stopped);

        // deuxième stop : no-op, pas de deuxième cleanup
        worker.stop();
        assert_eq!(task.cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_on_never_started_worker_is_a_noop() {
        let worker = ready_worker("idle");
        worker.stop();
        assert_eq!(worker.state(), LifecycleState::Initialized);

        let constructed = Worker::new("unconfigured");
        constructed.stop();
        assert_eq!(constructed.state(), LifecycleState::Constructed);
        assert!(!constructed.is_initialized());
    }

    #[test]
    fn start_before_initialized_does_not_run() {
        let worker = Worker::new("unready");
        let task = TickTask::new(1);
        worker.start(Arc::clone(&task));
        assert!(!worker.is_running());
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(task.iterations.load(Ordering::SeqCst), 0);
    }

    struct FlakyTask {
        iterations: AtomicUsize,
        cleanups: AtomicUsize,
    }

    impl PluginTask for FlakyTask {
        fn run_iteration(&self, ctl: &WorkerCtl) -> anyhow::Result<()> {
            let n = self.iterations.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                anyhow::bail!("transient sensor failure");
            }
            if n == 1 {
                panic!("sensor driver blew up");
            }
            ctl.pause(1);
            Ok(())
        }

        fn cleanup(&self) {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn errors_and_panics_do_not_kill_the_loop() {
        let worker = ready_worker("flaky");
        let task = Arc::new(FlakyTask {
            iterations: AtomicUsize::new(0),
            cleanups: AtomicUsize::new(0),
        });

        worker.start(Arc::clone(&task));
        // deux échecs (erreur puis panic) séparés par le backoff de 3s
        let deadline = Instant::now() + Duration::from_secs(10);
        while task.iterations.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
        worker.stop();

        assert!(task.iterations.load(Ordering::SeqCst) >= 3);
        assert_eq!(task.cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(worker.state(), LifecycleState::Stopped);
    }
}
