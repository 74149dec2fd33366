use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::ServerConfig;
use crate::coordinator::Coordinator;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Coordinator,
    pub config: Arc<ServerConfig>,
    pub sse_subscriber_count: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_coordinator(Coordinator::new(config))
    }

    pub fn with_coordinator(coordinator: Coordinator) -> Self {
        Self {
            config: Arc::new(coordinator.config().clone()),
            coordinator,
            sse_subscriber_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Counts one open connection for as long as it lives.
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    pub fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self { counter }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}
