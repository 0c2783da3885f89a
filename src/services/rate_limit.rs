use std::collections::HashMap;
use std::sync::Mutex;

use crate::utils::ApiError;

pub const OTP_WINDOW_MS: i64 = 10 * 60 * 1000;
pub const OTP_LIMIT: u32 = 3;

struct Window {
    count: u32,
    expires_at: i64,
}

/// Fixed-window request counter keyed by an arbitrary string.
pub struct RateLimiter {
    limit: u32,
    window_ms: i64,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window_ms: i64) -> Self {
        RateLimiter {
            limit,
            window_ms,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, key: &str) -> Result<(), ApiError> {
        self.check_at(key, chrono::Utc::now().timestamp_millis())
    }

    fn check_at(&self, key: &str, now: i64) -> Result<(), ApiError> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| ApiError::internal_error("Rate limiter lookup failed"))?;

        windows.retain(|_, window| window.expires_at > now);

        match windows.get_mut(key) {
            // First request OR expired window
            None => {
                windows.insert(
                    key.to_string(),
                    Window {
                        count: 1,
                        expires_at: now + self.window_ms,
                    },
                );
                Ok(())
            }
            Some(window) if window.count >= self.limit => Err(ApiError::too_many_requests(
                "Too many requests. Please try later.",
            )),
            Some(window) => {
                window.count += 1;
                Ok(())
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(OTP_LIMIT, OTP_WINDOW_MS)
    }
}
