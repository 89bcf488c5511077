// src/config.rs

use dotenvy::dotenv;
use std::env;

/// Runtime configuration, loaded once at startup.
///
/// Policy knobs (violation threshold, submission grace, cache TTL, code
/// length) are env-tunable with sensible defaults so deployments can adjust
/// contest policy without a rebuild.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// JWT lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,

    /// Optional admin account seeded at startup.
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,

    /// Number of integrity violations that triggers a forced submission.
    pub violation_threshold: i64,
    /// Seconds past a contest's end time during which a manual submit from a
    /// straggling client is still accepted.
    pub submission_grace_seconds: i64,
    /// How long a computed contest statistics object may be served from cache.
    pub stats_cache_ttl_seconds: u64,
    /// Length of generated join codes.
    pub join_code_length: usize,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(86400);

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let admin_username = env::var("ADMIN_USERNAME").ok();
        let admin_password = env::var("ADMIN_PASSWORD").ok();

        let violation_threshold = env::var("VIOLATION_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);

        let submission_grace_seconds = env::var("SUBMISSION_GRACE_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let stats_cache_ttl_seconds = env::var("STATS_CACHE_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(15);

        let join_code_length = env::var("JOIN_CODE_LENGTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(6);

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            admin_username,
            admin_password,
            violation_threshold,
            submission_grace_seconds,
            stats_cache_ttl_seconds,
            join_code_length,
        }
    }
}
