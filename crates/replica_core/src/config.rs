//! Coordinator configuration.

use std::time::Duration;

/// Configuration for a [`Coordinator`](crate::Coordinator).
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Quiet window between the first change signal and the callback.
    pub debounce: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
        }
    }
}

impl CoordinatorConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the debounce window.
    #[must_use]
    pub const fn debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }
}
