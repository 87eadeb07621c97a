//! Per-user sliding-window rate limiting.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::config::RateLimitConfig;

const WINDOW: Duration = Duration::from_secs(60);

/// Allows at most `requests_per_minute` requests per user in any 60 s window.
#[derive(Debug)]
pub struct RateLimiter {
    requests_per_minute: usize,
    history: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: usize) -> Self {
        Self {
            requests_per_minute,
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_minute)
    }

    pub fn requests_per_minute(&self) -> usize {
        self.requests_per_minute
    }

    /// Record a request if the user is under the limit.
    ///
    /// Returns `false` without recording when the limit is reached.
    pub fn check_limit(&self, user_id: &str) -> bool {
        self.check_limit_at(user_id, Instant::now())
    }

    /// Requests the user may still make in the current window.
    pub fn get_remaining_requests(&self, user_id: &str) -> usize {
        self.remaining_at(user_id, Instant::now())
    }

    /// Forget a user's request history.
    pub fn reset(&self, user_id: &str) {
        self.lock().remove(user_id);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        // The map stays consistent even if a holder panicked.
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_limit_at(&self, user_id: &str, now: Instant) -> bool {
        let mut history = self.lock();
        let requests = history.entry(user_id.to_string()).or_default();
        prune(requests, now);

        if requests.len() >= self.requests_per_minute {
            warn!(user_id = %user_id, limit = self.requests_per_minute, "Rate limit exceeded");
            return false;
        }
        requests.push_back(now);
        true
    }

    fn remaining_at(&self, user_id: &str, now: Instant) -> usize {
        let mut history = self.lock();
        let used = match history.get_mut(user_id) {
            Some(requests) => {
                prune(requests, now);
                requests.len()
            }
            None => 0,
        };
        self.requests_per_minute.saturating_sub(used)
    }
}

fn prune(requests: &mut VecDeque<Instant>, now: Instant) {
    while let Some(&oldest) = requests.front() {
        if now.saturating_duration_since(oldest) >= WINDOW {
            requests.pop_front();
        } else {
            break;
        }
    }
}
