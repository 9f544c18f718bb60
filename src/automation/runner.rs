//! Refresh runner: owns the worker thread of one session.
//!
//! Validates the session, spawns the worker, drives the state machine and
//! guarantees that statistics are persisted and `Finished` is sent exactly
//! once, whether the loop ends normally, with an error or with a panic.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, channel};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::automation::config::SessionSettings;
use crate::automation::detection::TemplateMatcher;
use crate::automation::hotkey::HotkeyMonitor;
use crate::automation::input::create_device;
use crate::automation::items::ItemRegistry;
use crate::automation::queue::{EventSender, SessionEvent};
use crate::automation::state::{RefreshEngine, SessionBackends};
use crate::capture::{create_capturer, create_locator};
use crate::error::{RefresherError, Result};

/// How long `stop()` waits for the worker before abandoning it.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Granularity of cancellable waits.
const WAIT_SLICE: Duration = Duration::from_millis(20);

/// Shared stop flag of one session. Once set it stays set.
#[derive(Clone, Debug, Default)]
pub struct CancellationSignal(Arc<AtomicBool>);

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` unless cancelled first.
    ///
    /// Returns true if the signal is set when the wait ends.
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(WAIT_SLICE.min(deadline - now));
        }
    }
}

/// Starts and stops refresh sessions.
pub struct Controller {
    settings: SessionSettings,
    cancel: CancellationSignal,
    worker: Option<JoinHandle<()>>,
    exited: Option<Receiver<()>>,
    hotkey: Option<HotkeyMonitor>,
}

impl Controller {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            cancel: CancellationSignal::new(),
            worker: None,
            exited: None,
            hotkey: None,
        }
    }

    /// Checks if the worker thread is still running.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    /// Starts a session against the real game window.
    ///
    /// Loads the item icons, checks that the window exists and installs the
    /// global Escape hotkey. Returns immediately after spawning the worker.
    ///
    /// # Errors
    /// Returns an error if:
    /// - A session is already running
    /// - No item is selected or an icon cannot be loaded
    /// - The game window cannot be found
    pub fn start(&mut self, events: EventSender) -> Result<()> {
        let registry = ItemRegistry::load(&self.settings.items, &self.settings.assets_dir)?;
        let backends = SessionBackends {
            locator: create_locator(&self.settings.window_title, self.settings.process_name.as_deref()),
            capturer: create_capturer(),
            device: create_device(),
            matcher: Box::new(TemplateMatcher::from_settings(&self.settings)),
        };
        self.start_with(registry, backends, events)?;
        self.hotkey = HotkeyMonitor::install(self.cancel.clone());
        Ok(())
    }

    /// Starts a session with explicit backends.
    pub fn start_with(
        &mut self,
        registry: ItemRegistry,
        backends: SessionBackends,
        events: EventSender,
    ) -> Result<()> {
        if self.is_running() {
            return Err(RefresherError::Setup("a session is already running".to_string()));
        }
        if registry.is_empty() {
            return Err(RefresherError::Setup("no items selected".to_string()));
        }
        // The window must exist before the worker starts
        backends.locator.locate()?;

        self.cancel = CancellationSignal::new();
        let (exit_tx, exit_rx) = channel();
        let engine = RefreshEngine::new(
            self.settings.clone(),
            registry,
            backends,
            self.cancel.clone(),
            events.clone(),
        );

        let worker = thread::Builder::new()
            .name("refresh-worker".to_string())
            .spawn(move || {
                run_session(engine, &events);
                let _ = exit_tx.send(());
            })
            .map_err(|e| RefresherError::Setup(format!("failed to spawn worker: {}", e)))?;

        self.worker = Some(worker);
        self.exited = Some(exit_rx);
        Ok(())
    }

    /// Requests cancellation and waits up to `timeout` for the worker.
    ///
    /// Returns true if the worker exited. On timeout the worker is abandoned
    /// with the signal still set. Safe to call on a finished session.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.cancel.cancel();
        self.hotkey = None;

        let Some(exited) = self.exited.take() else {
            return true;
        };
        let worker = self.worker.take();

        match exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(worker) = worker {
                    if worker.join().is_err() {
                        log::error!("Refresh worker panicked after finishing");
                    }
                }
                log::info!("Refresh worker stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Refresh worker did not stop within {:.1}s; abandoning it",
                    timeout.as_secs_f32()
                );
                false
            }
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        // Never leave a worker clicking without an owner
        self.cancel.cancel();
    }
}

/// Runs the state machine to the end, then finalizes and reports.
fn run_session(mut engine: RefreshEngine, events: &EventSender) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        loop {
            match engine.step() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    engine.fail(e.to_string());
                    break;
                }
            }
        }
    }));
    if let Err(payload) = outcome {
        engine.fail(format!("panic: {}", panic_message(payload.as_ref())));
    }

    let report = engine.finalize();
    events.send(SessionEvent::Finished(report));
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
