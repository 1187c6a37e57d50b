//! Shared support types for the HTTP adapter (`ess-server`, spec.md §6).
//!
//! `ess-core` owns the request/response shapes, the bearer-token guard, and
//! the per-project rate limiter so that `ess-server` stays a thin axum
//! router with no business logic of its own -- the same split the teacher
//! used between its engine crate and `server.rs`, just with the auth check
//! and timestamps made real (the teacher's `chrono_now` returned a
//! `"{secs}s-since-epoch"` placeholder and its `AuthGuard::authenticate` used
//! `Vec::contains`, which is not constant-time).

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::config::ApiConfig;

/// Current time as an ISO-8601 / RFC 3339 string (spec.md §6 audit log,
/// evidence packet `timestamp`).
pub fn now_iso8601() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Bearer-token guard for `POST /query` (spec.md §6: "opaque, compared in
/// constant time"). A `None` token in [`ApiConfig`] disables auth, which is
/// only appropriate for local/dev use.
pub struct AuthGuard {
    token: Option<String>,
}

impl AuthGuard {
    /// Build a guard from the server's configured token.
    pub fn new(config: &ApiConfig) -> Self {
        Self { token: config.token.clone() }
    }

    /// Whether `provided` (the `Authorization: Bearer <token>` value, if
    /// any) is allowed through.
    pub fn authenticate(&self, provided: Option<&str>) -> bool {
        match &self.token {
            None => true,
            Some(expected) => match provided {
                Some(actual) => constant_time_eq(expected.as_bytes(), actual.as_bytes()),
                None => false,
            },
        }
    }
}

/// Constant-time byte comparison: a bearer check must not leak how many
/// leading bytes matched via early-exit timing, so this always walks the
/// full (padded) length of the longer input rather than returning early on
/// a length mismatch or first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let len = a.len().max(b.len());
    let mut diff: u8 = (a.len() != b.len()) as u8;
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= x ^ y;
    }
    diff == 0
}

/// Per-project token bucket (spec.md §9 open question: "a per-project token
/// bucket is recommended but not required"). One bucket per project name,
/// refilled continuously at `limit_per_minute / 60` tokens/sec, capacity
/// capped at `limit_per_minute`.
pub struct RateLimiter {
    limit_per_minute: Option<u32>,
    buckets: Mutex<HashMap<String, Bucket>>,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Build a limiter from the server's configured per-minute budget.
    /// `None` disables limiting entirely.
    pub fn new(limit_per_minute: Option<u32>) -> Self {
        Self {
            limit_per_minute,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Consume one token for `project`. Returns `false` if the bucket is
    /// empty (the caller should respond `429`).
    pub fn allow(&self, project: &str) -> bool {
        let Some(limit) = self.limit_per_minute else {
            return true;
        };
        if limit == 0 {
            return false;
        }

        let mut buckets = self.buckets.lock();
        let now = Instant::now();
        let rate_per_sec = f64::from(limit) / 60.0;
        let bucket = buckets.entry(project.to_string()).or_insert_with(|| Bucket {
            tokens: f64::from(limit),
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * rate_per_sec).min(f64::from(limit));
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP request / response bodies (spec.md §6)
// ---------------------------------------------------------------------------

/// `POST /query` request body.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct HttpQueryRequest {
    /// Free-text query.
    pub query: String,
    /// Caller-supplied request id (UUID). Generated if absent.
    #[serde(rename = "requestId", default)]
    pub request_id: Option<String>,
    /// Caller-supplied ISO-8601 timestamp. Stamped server-side if absent.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Project to query. Required when the server serves multiple projects.
    #[serde(default)]
    pub project: Option<String>,
    /// Prior conversation turns, for conversational mode.
    #[serde(default)]
    pub context: Option<Vec<String>>,
    /// `one_shot` (default) or `conversational`.
    #[serde(default)]
    pub mode: Option<String>,
}

/// `GET /health` response body.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthResponse {
    /// Overall rollup across every backend's circuit.
    pub status: HealthStatus,
    /// Per-backend circuit snapshot.
    pub services: HashMap<String, ServiceHealth>,
    /// When this snapshot was taken.
    pub timestamp: String,
}

/// Overall health rollup (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every circuit closed.
    Healthy,
    /// At least one non-critical circuit is open.
    Degraded,
    /// Both stores are unreachable.
    Unhealthy,
}

/// One backend's health entry in a `/health` response.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ServiceHealth {
    /// Circuit state: `"closed"`, `"open"`, or `"half_open"`.
    pub state: String,
    /// Most recent observed call latency, if any.
    pub latency_ms: Option<u64>,
    /// Seconds since the last observed failure, if any.
    pub last_failure_secs_ago: Option<u64>,
}

/// JSON error body returned for `4xx`/`5xx` responses.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
    /// HTTP status code, repeated in the body for non-HTTP-aware clients.
    pub status: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_disabled_without_token() {
        let guard = AuthGuard::new(&ApiConfig { token: None, rate_limit_per_minute: None });
        assert!(guard.authenticate(None));
        assert!(guard.authenticate(Some("anything")));
    }

    #[test]
    fn auth_requires_matching_token() {
        let guard = AuthGuard::new(&ApiConfig {
            token: Some("secret".into()),
            rate_limit_per_minute: None,
        });
        assert!(!guard.authenticate(None));
        assert!(!guard.authenticate(Some("wrong")));
        assert!(guard.authenticate(Some("secret")));
    }

    #[test]
    fn constant_time_eq_matches_semantics() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(!constant_time_eq(b"", b"a"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn rate_limiter_disabled_when_unconfigured() {
        let limiter = RateLimiter::new(None);
        for _ in 0..1000 {
            assert!(limiter.allow("demo"));
        }
    }

    #[test]
    fn rate_limiter_enforces_bucket_capacity() {
        let limiter = RateLimiter::new(Some(3));
        assert!(limiter.allow("demo"));
        assert!(limiter.allow("demo"));
        assert!(limiter.allow("demo"));
        assert!(!limiter.allow("demo"));
    }

    #[test]
    fn rate_limiter_tracks_projects_independently() {
        let limiter = RateLimiter::new(Some(1));
        assert!(limiter.allow("a"));
        assert!(limiter.allow("b"));
        assert!(!limiter.allow("a"));
    }
}
