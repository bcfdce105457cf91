//! Deadline that shuts the session down once nothing has played for a while.

use std::time::Duration;

use tokio::time::Instant;

/// One resettable deadline.
///
/// The timer does not run anything itself; the session loop sleeps until
/// [`deadline`](Self::deadline) and treats reaching it as the firing.
#[derive(Debug)]
pub struct IdleTimer {
    window: Duration,
    deadline: Option<Instant>,
}

impl IdleTimer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// Arms the timer, restarting the window if it was already armed.
    pub fn arm(&mut self) {
        if self.deadline.is_none() {
            log::debug!("[Idle] Armed for {:?}", self.window);
        }
        self.deadline = Some(Instant::now() + self.window);
    }

    /// Disarms the timer. No-op if it is not armed.
    pub fn disarm(&mut self) {
        if self.deadline.take().is_some() {
            log::debug!("[Idle] Disarmed");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
