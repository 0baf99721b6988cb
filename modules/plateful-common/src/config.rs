use std::env;
use std::time::Duration;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres (source of record + outbox)
    pub database_url: String,

    // Neo4j
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,

    /// Identity stamped into `claimed_by` so operators can tell which worker
    /// holds a lease.
    pub worker_id: String,

    // Claim loop tuning
    pub batch_size: i64,
    pub poll_interval: Duration,
    pub lease_duration: Duration,

    // Retry policy
    pub max_attempts: i32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            neo4j_uri: required_env("NEO4J_URI"),
            neo4j_user: required_env("NEO4J_USER"),
            neo4j_password: required_env("NEO4J_PASSWORD"),
            worker_id: env::var("WORKER_ID")
                .unwrap_or_else(|_| format!("plateful-{}", std::process::id())),
            batch_size: numeric_env("BATCH_SIZE", 25),
            poll_interval: Duration::from_secs(numeric_env("POLL_INTERVAL_SECS", 5) as u64),
            lease_duration: Duration::from_secs(numeric_env("LEASE_SECS", 300) as u64),
            max_attempts: numeric_env("MAX_ATTEMPTS", 5) as i32,
            backoff_base: Duration::from_secs(numeric_env("BACKOFF_BASE_SECS", 10) as u64),
            backoff_cap: Duration::from_secs(numeric_env("BACKOFF_CAP_SECS", 600) as u64),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn numeric_env(key: &str, default: i64) -> i64 {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number, got {v:?}")),
        Err(_) => default,
    }
}
