//! Named, cancellable background timers.
//!
//! Every periodic sweep and background listener is registered here so that a
//! single `cancel_all` tears all of them down. Dropping the registry cancels
//! whatever is still running.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Default)]
pub struct TimerRegistry {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `tick` every `period`, first after one full period.
    ///
    /// Replaces (and cancels) any timer already registered under `name`.
    pub fn spawn_interval<F, Fut>(&self, name: &str, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tick().await;
            }
        });
        self.insert(name, handle);
    }

    /// Run a one-off background task under `name`.
    pub fn spawn_task<Fut>(&self, name: &str, task: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.insert(name, tokio::spawn(task));
    }

    fn insert(&self, name: &str, handle: JoinHandle<()>) {
        if let Some(previous) = self.tasks.lock().insert(name.to_string(), handle) {
            previous.abort();
            tracing::debug!(timer = name, "Replaced existing timer");
        }
    }

    /// Cancel one timer. Returns false if no such timer was registered.
    pub fn cancel(&self, name: &str) -> bool {
        match self.tasks.lock().remove(name) {
            Some(handle) => {
                handle.abort();
                true
            },
            None => false,
        }
    }

    /// Cancel every registered timer, returning how many were registered.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<(String, JoinHandle<()>)> = self.tasks.lock().drain().collect();
        for (name, handle) in &drained {
            handle.abort();
            tracing::debug!(timer = %name, "Timer cancelled");
        }
        drained.len()
    }

    /// Names of timers whose task is still alive, sorted.
    pub fn active(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tasks
            .lock()
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.tasks.lock().get(name).is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.get_mut().drain() {
            handle.abort();
        }
    }
}
