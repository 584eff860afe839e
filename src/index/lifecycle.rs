//! Write lifecycle hooks
//!
//! Callers attach an `OnIndexSeries` to every write so they can release
//! resources tied to it (reference-counted buffers, in-flight markers).
//! The index guarantees `on_index_finalize` fires exactly once per write,
//! and `on_index_success` at most once, before finalize.
//!
//! `LifecycleGuard` carries that guarantee in its ownership: it is consumed
//! by `succeed`/`finalize`, and finalizes on drop if neither ran.

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Caller-supplied callbacks for one write attempt
pub trait OnIndexSeries: Send + Sync {
    /// The series was inserted into the segment index at `ts`
    fn on_index_success(&self, ts: DateTime<Utc>);

    /// The write is done, successful or not
    fn on_index_finalize(&self);
}

/// Owns the hooks of one write until they are delivered
pub struct LifecycleGuard {
    hooks: Option<Arc<dyn OnIndexSeries>>,
}

impl LifecycleGuard {
    pub fn new(hooks: Arc<dyn OnIndexSeries>) -> Self {
        Self { hooks: Some(hooks) }
    }

    /// Fire success then finalize
    ///
    /// Finalize runs from `Drop`, so it still fires when the success hook
    /// panics.
    pub fn succeed(self, ts: DateTime<Utc>) {
        if let Some(hooks) = self.hooks.as_ref() {
            hooks.on_index_success(ts);
        }
    }

    /// Fire finalize only
    pub fn finalize(mut self) {
        if let Some(hooks) = self.hooks.take() {
            hooks.on_index_finalize();
        }
    }
}

impl Drop for LifecycleGuard {
    fn drop(&mut self) {
        if let Some(hooks) = self.hooks.take() {
            hooks.on_index_finalize();
        }
    }
}

impl std::fmt::Debug for LifecycleGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleGuard")
            .field("pending", &self.hooks.is_some())
            .finish()
    }
}

/// Hooks that do nothing, for writers with no resources to release
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLifecycle;

impl OnIndexSeries for NoopLifecycle {
    fn on_index_success(&self, _ts: DateTime<Utc>) {}
    fn on_index_finalize(&self) {}
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every delivery; panics on a second finalize
    #[derive(Debug, Default)]
    pub struct RecordingLifecycle {
        state: Mutex<RecordingState>,
    }

    #[derive(Debug, Default, Clone)]
    pub struct RecordingState {
        pub success_calls: usize,
        pub finalize_calls: usize,
        pub write_time: Option<DateTime<Utc>>,
        pub success_before_finalize: bool,
    }

    impl RecordingLifecycle {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn snapshot(&self) -> RecordingState {
            self.state.lock().clone()
        }
    }

    impl OnIndexSeries for RecordingLifecycle {
        fn on_index_success(&self, ts: DateTime<Utc>) {
            let mut state = self.state.lock();
            state.success_calls += 1;
            state.write_time = Some(ts);
            state.success_before_finalize = state.finalize_calls == 0;
        }

        fn on_index_finalize(&self) {
            let mut state = self.state.lock();
            if state.finalize_calls > 0 {
                panic!("already finalized");
            }
            state.finalize_calls += 1;
        }
    }

    /// Panics in `on_index_success`; counts finalize calls
    #[derive(Debug, Default)]
    pub struct PanickingLifecycle {
        pub finalize_calls: AtomicUsize,
    }

    impl PanickingLifecycle {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }
    }

    impl OnIndexSeries for PanickingLifecycle {
        fn on_index_success(&self, _ts: DateTime<Utc>) {
            panic!("success hook failed");
        }

        fn on_index_finalize(&self) {
            self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{PanickingLifecycle, RecordingLifecycle};
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_succeed_fires_both_in_order() {
        let hooks = RecordingLifecycle::new();
        let ts = Utc::now();
        LifecycleGuard::new(hooks.clone()).succeed(ts);

        let state = hooks.snapshot();
        assert_eq!(state.success_calls, 1);
        assert_eq!(state.finalize_calls, 1);
        assert_eq!(state.write_time, Some(ts));
        assert!(state.success_before_finalize);
    }

    #[test]
    fn test_finalize_only() {
        let hooks = RecordingLifecycle::new();
        LifecycleGuard::new(hooks.clone()).finalize();

        let state = hooks.snapshot();
        assert_eq!(state.success_calls, 0);
        assert_eq!(state.finalize_calls, 1);
    }

    #[test]
    fn test_drop_finalizes() {
        let hooks = RecordingLifecycle::new();
        {
            let _guard = LifecycleGuard::new(hooks.clone());
        }
        assert_eq!(hooks.snapshot().finalize_calls, 1);
    }

    #[test]
    fn test_panicking_success_still_finalizes() {
        let hooks = PanickingLifecycle::new();
        let guard = LifecycleGuard::new(hooks.clone());

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            guard.succeed(Utc::now())
        }));
        assert!(result.is_err());
        assert_eq!(hooks.finalize_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_noop_lifecycle() {
        LifecycleGuard::new(Arc::new(NoopLifecycle)).succeed(Utc::now());
    }
}
