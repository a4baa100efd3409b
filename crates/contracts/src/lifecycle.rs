//! LifecycleSource trait - host lifecycle abstraction
//!
//! Decouples the dispatcher from whatever tells it the host context is going
//! away (a page unload, a process signal, a test harness).

/// Callback invoked when the host is unloading
pub type UnloadCallback = Box<dyn FnOnce() + Send>;

/// Host lifecycle notification source
///
/// # Contract
///
/// 1. Each registered callback fires at most once per host-context lifetime.
/// 2. Firing is best-effort: a host killed abruptly may never fire.
/// 3. Callbacks may run on any thread and must not assume a runtime context.
///
/// # Example
///
/// ```ignore
/// let lifecycle: Arc<dyn LifecycleSource> = Arc::new(ManualLifecycle::new());
/// lifecycle.on_unloading(Box::new(|| println!("unloading")));
/// ```
pub trait LifecycleSource: Send + Sync {
    /// Source name (used for logging)
    fn name(&self) -> &str;

    /// Register an unloading callback
    fn on_unloading(&self, callback: UnloadCallback);
}
