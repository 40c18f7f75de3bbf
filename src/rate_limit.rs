use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;
use uuid::Uuid;

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed one-second windows per client, local to this process.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<Uuid, Window>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one request and reports whether it fits `limit`. A non-positive limit
    /// disables the check.
    pub fn check(&self, client_id: Uuid, limit: i32) -> bool {
        let Ok(limit) = u32::try_from(limit) else {
            return true;
        };
        if limit == 0 {
            return true;
        }

        let now = Instant::now();
        match self.windows.entry(client_id) {
            Entry::Occupied(mut entry) => {
                let window = entry.get_mut();
                if now.duration_since(window.started) >= WINDOW {
                    *window = Window {
                        started: now,
                        count: 1,
                    };
                    return true;
                }
                if window.count >= limit {
                    return false;
                }
                window.count += 1;
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(Window {
                    started: now,
                    count: 1,
                });
                true
            }
        }
    }
}
