// Per-IP fixed-window rate limiter with in-memory counters.
//
// The default limit is one window per IP across the whole surface. OTP
// endpoints carry tighter built-in limits with a window of their own, and
// each custom rule counts every path it matches in one shared window.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use edustore_core::options::RateLimitOptions;

use crate::error::ServiceError;

/// Above this many tracked keys, stale windows are purged on the next check.
const CLEANUP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub window: u64,
    pub max: u64,
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u64,
    window_start: Instant,
}

/// Thread-safe via `Mutex<HashMap>`; counters are per process.
#[derive(Debug)]
pub struct RateLimiter {
    options: RateLimitOptions,
    custom_rules: Vec<(String, RateLimitRule)>,
    store: Mutex<HashMap<String, RateLimitEntry>>,
}

impl RateLimiter {
    pub fn new(options: RateLimitOptions) -> Self {
        Self {
            options,
            custom_rules: Vec::new(),
            store: Mutex::new(HashMap::new()),
        }
    }

    /// Add a rule for paths matching `pattern` (exact, prefix, or `/x/*`).
    pub fn with_rule(mut self, pattern: impl Into<String>, rule: RateLimitRule) -> Self {
        self.custom_rules.push((pattern.into(), rule));
        self
    }

    /// Count one request from `ip` to `path` (relative to the base path).
    pub fn check(&self, ip: &str, path: &str) -> Result<(), ServiceError> {
        if !self.options.enabled {
            return Ok(());
        }

        let (RateLimitRule { window, max }, scope) = self.effective_limits(path);
        let key = match scope {
            Some(scope) => format!("{ip}:{scope}"),
            None => ip.to_string(),
        };
        let now = Instant::now();
        let window = Duration::from_secs(window);

        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        if store.len() > CLEANUP_THRESHOLD {
            let keep = self.retention();
            store.retain(|_, entry| now.duration_since(entry.window_start) < keep);
        }

        let entry = store.entry(key).or_insert(RateLimitEntry {
            count: 0,
            window_start: now,
        });
        let elapsed = now.duration_since(entry.window_start);

        if elapsed >= window {
            entry.count = 1;
            entry.window_start = now;
            Ok(())
        } else if entry.count >= max {
            let retry_after = (window - elapsed).as_secs() + 1;
            tracing::debug!(ip, path, retry_after, "rate limit exceeded");
            Err(ServiceError::RateLimited {
                retry_after,
                message: "Too many requests. Please try again later.".into(),
            })
        } else {
            entry.count += 1;
            Ok(())
        }
    }

    /// The rule for `path` and the window it counts in (`None` is the
    /// per-IP default window). Custom rules win over the built-in OTP
    /// rules, which win over the defaults.
    fn effective_limits<'a>(&'a self, path: &'a str) -> (RateLimitRule, Option<&'a str>) {
        if let Some((pattern, rule)) = self
            .custom_rules
            .iter()
            .find(|(pattern, _)| path_matches(path, pattern))
        {
            return (*rule, Some(pattern.as_str()));
        }
        if let Some(rule) = special_rule(path) {
            return (rule, Some(path));
        }
        let default = RateLimitRule {
            window: self.options.window,
            max: self.options.max,
        };
        (default, None)
    }

    /// Drop windows that can no longer affect a decision.
    pub fn cleanup(&self) {
        let keep = self.retention();
        let now = Instant::now();
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        store.retain(|_, entry| now.duration_since(entry.window_start) < keep);
    }

    fn retention(&self) -> Duration {
        let longest = self
            .custom_rules
            .iter()
            .map(|(_, rule)| rule.window)
            .chain([self.options.window, 60])
            .max()
            .unwrap_or(60);
        Duration::from_secs(longest * 2)
    }
}

fn special_rule(path: &str) -> Option<RateLimitRule> {
    match path {
        "/auth/request-otp" => Some(RateLimitRule { window: 60, max: 5 }),
        "/auth/verify-otp" => Some(RateLimitRule { window: 60, max: 10 }),
        _ => None,
    }
}

fn path_matches(path: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => path.starts_with(prefix),
        None => path == pattern || path.starts_with(pattern),
    }
}
