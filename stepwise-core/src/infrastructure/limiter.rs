//! Sliding-window request limiter shared by every run that talks to the same
//! completion service.
//!
//! A caller first [`RateLimiter::acquire`]s a [`SlotPermit`], which reserves
//! one slot under the same lock that checked capacity. Completing the send
//! with [`SlotPermit::record_send`] turns the reservation into a timestamp;
//! dropping the permit instead releases the slot, so failed attempts never
//! count against the window.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_MARGIN: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct WindowState {
    sent: VecDeque<Instant>,
    reserved: usize,
}

impl WindowState {
    fn purge(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.sent.front() {
            if now.duration_since(*oldest) >= window {
                self.sent.pop_front();
            } else {
                break;
            }
        }
    }

    fn occupied(&self) -> usize {
        self.sent.len() + self.reserved
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    capacity: usize,
    window: Duration,
    margin: Duration,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    /// Limiter admitting `capacity` sends per minute.
    pub fn per_minute(capacity: usize) -> Self {
        Self::new(capacity, DEFAULT_WINDOW, DEFAULT_MARGIN)
    }

    pub fn new(capacity: usize, window: Duration, margin: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            window,
            margin,
            state: Mutex::new(WindowState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sends recorded within the current window.
    pub fn sent_in_window(&self) -> usize {
        let mut state = self.lock();
        state.purge(Instant::now(), self.window);
        state.sent.len()
    }

    /// Wait until a send is permitted and reserve the slot.
    pub async fn acquire(&self) -> SlotPermit<'_> {
        loop {
            let wait = {
                let mut state = self.lock();
                let now = Instant::now();
                state.purge(now, self.window);

                if state.occupied() < self.capacity {
                    state.reserved += 1;
                    return SlotPermit {
                        limiter: self,
                        recorded: false,
                    };
                }

                match state.sent.front() {
                    Some(oldest) => self
                        .window
                        .saturating_sub(now.duration_since(*oldest))
                        + self.margin,
                    // Full of in-flight reservations only; poll until one resolves.
                    None => self.margin,
                }
            };

            info!(
                capacity = self.capacity,
                wait_ms = wait.as_millis() as u64,
                "Request rate limit reached, waiting"
            );
            sleep(wait).await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reservation of one send slot. See the module docs.
#[derive(Debug)]
pub struct SlotPermit<'a> {
    limiter: &'a RateLimiter,
    recorded: bool,
}

impl SlotPermit<'_> {
    /// Commit the reservation as a completed send at the current instant.
    pub fn record_send(mut self) {
        let mut state = self.limiter.lock();
        state.reserved = state.reserved.saturating_sub(1);
        state.sent.push_back(Instant::now());
        self.recorded = true;
        debug!(in_window = state.sent.len(), "Recorded request send");
    }
}

impl Drop for SlotPermit<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            let mut state = self.limiter.lock();
            state.reserved = state.reserved.saturating_sub(1);
        }
    }
}
