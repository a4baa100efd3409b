//! Lifecycle sources - who tells the dispatcher the host is going away

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{LifecycleSource, UnloadCallback};
use tracing::{debug, error, info, warn};

/// Lifecycle source that never fires
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLifecycle;

impl NoopLifecycle {
    pub fn new() -> Self {
        Self
    }
}

impl LifecycleSource for NoopLifecycle {
    fn name(&self) -> &str {
        "noop"
    }

    fn on_unloading(&self, _callback: UnloadCallback) {}
}

/// Lifecycle source fired explicitly by the host
///
/// Callbacks run on the thread calling [`ManualLifecycle::trigger`]. Only the
/// first trigger runs them; callbacks registered afterwards are dropped.
#[derive(Default)]
pub struct ManualLifecycle {
    callbacks: Mutex<Vec<UnloadCallback>>,
    fired: AtomicBool,
}

impl ManualLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire every registered callback; returns how many ran
    ///
    /// `fired` flips under the callbacks lock, so a concurrent registration
    /// either lands in this batch or sees the flag and is dropped.
    pub fn trigger(&self) -> usize {
        let callbacks = {
            let mut guard = self.lock_callbacks();
            if self.fired.swap(true, Ordering::AcqRel) {
                debug!("Lifecycle already fired, ignoring trigger");
                return 0;
            }
            std::mem::take(&mut *guard)
        };

        let count = callbacks.len();
        for callback in callbacks {
            callback();
        }
        info!(callbacks = count, "Unloading callbacks fired");
        count
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    fn lock_callbacks(&self) -> MutexGuard<'_, Vec<UnloadCallback>> {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl LifecycleSource for ManualLifecycle {
    fn name(&self) -> &str {
        "manual"
    }

    fn on_unloading(&self, callback: UnloadCallback) {
        let mut guard = self.lock_callbacks();
        if self.has_fired() {
            drop(guard);
            warn!("Unloading callback registered after lifecycle fired, dropping it");
            return;
        }
        guard.push(callback);
    }
}

/// Lifecycle source fired by Ctrl+C or SIGTERM
///
/// The process-level equivalent of a page's "before unload" event.
#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<ManualLifecycle>,
}

impl ShutdownSignal {
    /// Install the signal listener on the current tokio runtime
    ///
    /// # Panics
    /// Must be called from within a tokio runtime.
    pub fn install() -> Self {
        let inner = Arc::new(ManualLifecycle::new());
        let listener = Arc::clone(&inner);

        tokio::spawn(async move {
            if wait_for_signal().await {
                warn!("Shutdown signal received");
                listener.trigger();
            }
        });

        Self { inner }
    }

    pub fn has_fired(&self) -> bool {
        self.inner.has_fired()
    }
}

impl LifecycleSource for ShutdownSignal {
    fn name(&self) -> &str {
        "shutdown_signal"
    }

    fn on_unloading(&self, callback: UnloadCallback) {
        self.inner.on_unloading(callback);
    }
}

/// Wait for Ctrl+C or SIGTERM; false if no handler could be installed
async fn wait_for_signal() -> bool {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<bool>().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => stream.recv().await.is_some(),
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<bool>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<bool>();

    tokio::select! {
        fired = ctrl_c => fired,
        fired = terminate => fired,
    }
}
