// Environment detection and logger initialization.

use std::sync::OnceLock;

static ENV_MODE: OnceLock<EnvMode> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvMode {
    Production,
    Development,
    Test,
}

/// Detect the current environment mode.
/// Checks `EDUSTORE_ENV`, `RUST_ENV` and `APP_ENV` in order.
pub fn detect_env_mode() -> EnvMode {
    *ENV_MODE.get_or_init(|| {
        let env_val = std::env::var("EDUSTORE_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .or_else(|_| std::env::var("APP_ENV"))
            .unwrap_or_default();
        parse_env_mode(&env_val)
    })
}

fn parse_env_mode(value: &str) -> EnvMode {
    match value.to_lowercase().as_str() {
        "production" | "prod" => EnvMode::Production,
        "test" | "testing" => EnvMode::Test,
        _ => EnvMode::Development,
    }
}

pub fn is_production() -> bool {
    detect_env_mode() == EnvMode::Production
}

/// The token signing secret, from `EDUSTORE_SECRET` or `JWT_SECRET`.
pub fn get_secret_from_env() -> Option<String> {
    std::env::var("EDUSTORE_SECRET")
        .or_else(|_| std::env::var("JWT_SECRET"))
        .ok()
        .filter(|s| !s.is_empty())
}

pub fn get_database_url_from_env() -> Option<String> {
    std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty())
}

/// Initialize the `tracing` subscriber.
///
/// `RUST_LOG` takes precedence; otherwise production logs at info and every
/// other mode at debug.
pub fn init_logger() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if is_production() {
            EnvFilter::new("edustore=info,edustore_axum=info,tower_http=info")
        } else {
            EnvFilter::new("edustore=debug,edustore_axum=debug,tower_http=debug")
        }
    });

    // A second call (tests, embedded use) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_mode() {
        assert_eq!(parse_env_mode("Production"), EnvMode::Production);
        assert_eq!(parse_env_mode("prod"), EnvMode::Production);
        assert_eq!(parse_env_mode("test"), EnvMode::Test);
        assert_eq!(parse_env_mode(""), EnvMode::Development);
        assert_eq!(parse_env_mode("staging"), EnvMode::Development);
    }
}
