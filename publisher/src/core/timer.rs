use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::{debug, Instrument};

#[derive(Default)]
struct TimerState {
    timers: HashMap<String, (u64, AbortHandle)>,
    next_id: u64,
}

/// Named one-shot timers.
///
/// Scheduling a name that is already armed aborts the previous timer first, so a
/// superseded close or capacity recheck never fires twice. A timer removes its own
/// entry right before running its callback; a running callback is never aborted.
#[derive(Clone, Default)]
pub struct TimerRegistry {
    inner: Arc<Mutex<TimerState>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, TimerState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn schedule<F>(&self, name: impl Into<String>, delay: Duration, callback: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        // the lock is held while spawning so that the task can not deregister before it is registered
        let mut state = self.state();
        state.next_id += 1;
        let id = state.next_id;

        let registry = self.clone();
        let timer_name = name.clone();
        let handle = tokio::spawn(
            async move {
                tokio::time::sleep(delay).await;
                registry.deregister(&timer_name, id);
                callback.await;
            }
            .in_current_span(),
        );

        if let Some((_, previous)) = state.timers.insert(name.clone(), (id, handle.abort_handle())) {
            previous.abort();
            debug!(timer = %name, "Replaced armed timer");
        }
        debug!(timer = %name, delay_ms = delay.as_millis() as u64, "Timer armed");
    }

    /// Cancels the timer `name`. Returns false if it was not armed.
    pub fn cancel(&self, name: &str) -> bool {
        match self.state().timers.remove(name) {
            Some((_, handle)) => {
                handle.abort();
                debug!(timer = %name, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.state().timers.contains_key(name)
    }

    pub fn cancel_all(&self) {
        for (_, (_, handle)) in self.state().timers.drain() {
            handle.abort();
        }
    }

    fn deregister(&self, name: &str, id: u64) {
        let mut state = self.state();
        if state.timers.get(name).is_some_and(|(armed, _)| *armed == id) {
            state.timers.remove(name);
        }
    }
}
