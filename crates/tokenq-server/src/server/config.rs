use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use tokenq::StoreOptions;

/// Secret used when `JWT_SECRET` is not provided. Fine for local runs only.
pub const DEV_JWT_SECRET: &str = "jwt-secret-key-change-in-production";

/// Runtime configuration for the `tokenq-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults suitable for a single-node
/// deployment.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "tokenq-server",
    version,
    about = "An HTTP service that issues sequential service-request tokens"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:5001"))]
    pub server_addr: String,

    /// SQLite database URL. Every instance pointing at the same file shares
    /// one token sequence.
    ///
    /// Environment variable: `DATABASE_URL`
    #[arg(long, env = "DATABASE_URL", default_value_t = String::from("sqlite://service_tokens.db"))]
    pub database_url: String,

    /// Maximum number of pooled database connections.
    ///
    /// Environment variable: `DB_MAX_CONNECTIONS`
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 8)]
    pub db_max_connections: u32,

    /// How long (in milliseconds) a write waits for the database lock held
    /// by another process before the request fails as unavailable.
    ///
    /// Environment variable: `DB_BUSY_TIMEOUT_MS`
    #[arg(long, env = "DB_BUSY_TIMEOUT_MS", default_value_t = 5_000)]
    pub db_busy_timeout_ms: u64,

    /// Administrator login name.
    ///
    /// Environment variable: `ADMIN_USERNAME`
    #[arg(long, env = "ADMIN_USERNAME", default_value_t = String::from("admin"))]
    pub admin_username: String,

    /// Administrator password.
    ///
    /// Environment variable: `ADMIN_PASSWORD`
    #[arg(long, env = "ADMIN_PASSWORD", default_value_t = String::from("admin123"), hide_default_value = true)]
    pub admin_password: String,

    /// HMAC secret used to sign admin bearer tokens.
    ///
    /// Environment variable: `JWT_SECRET`
    #[arg(long, env = "JWT_SECRET", default_value_t = String::from(DEV_JWT_SECRET), hide_default_value = true)]
    pub jwt_secret: String,

    /// Lifetime of an admin bearer token, in hours.
    ///
    /// Environment variable: `JWT_TTL_HOURS`
    #[arg(long, env = "JWT_TTL_HOURS", default_value_t = 24)]
    pub jwt_ttl_hours: u32,

    /// Seconds between reminder sweeps. `0` disables reminders.
    ///
    /// Environment variable: `REMINDER_INTERVAL_SECS`
    #[arg(long, env = "REMINDER_INTERVAL_SECS", default_value_t = 60)]
    pub reminder_interval_secs: u64,

    /// Seconds to wait for background tasks to stop during shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub database_url: String,
    pub store: StoreOptions,
    pub admin_username: String,
    pub admin_password: String,
    pub jwt_secret: String,
    pub jwt_ttl: chrono::Duration,
    pub reminder_interval: Option<Duration>,
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.db_max_connections == 0 {
            bail!("DB_MAX_CONNECTIONS must be greater than 0");
        }

        if args.admin_username.trim().is_empty() || args.admin_password.is_empty() {
            bail!("ADMIN_USERNAME and ADMIN_PASSWORD must not be empty");
        }

        if args.jwt_secret.is_empty() {
            bail!("JWT_SECRET must not be empty");
        }

        if args.jwt_ttl_hours == 0 {
            bail!("JWT_TTL_HOURS must be greater than 0");
        }

        let reminder_interval =
            (args.reminder_interval_secs > 0).then(|| Duration::from_secs(args.reminder_interval_secs));

        Ok(Self {
            server_addr: args.server_addr,
            database_url: args.database_url,
            store: StoreOptions {
                max_connections: args.db_max_connections,
                busy_timeout: Duration::from_millis(args.db_busy_timeout_ms),
            },
            admin_username: args.admin_username,
            admin_password: args.admin_password,
            jwt_secret: args.jwt_secret,
            jwt_ttl: chrono::Duration::hours(i64::from(args.jwt_ttl_hours)),
            reminder_interval,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
        })
    }
}

/// Parses arguments with every environment-backed flag given explicitly, so
/// the result does not depend on the caller's environment. `overrides`
/// replace the built-in values.
#[cfg(test)]
pub(crate) fn isolated_args(overrides: &[(&str, &str)]) -> CliArgs {
    let defaults = [
        ("--server-addr", "127.0.0.1:0"),
        ("--database-url", "sqlite::memory:"),
        ("--db-max-connections", "8"),
        ("--db-busy-timeout-ms", "5000"),
        ("--admin-username", "admin"),
        ("--admin-password", "admin123"),
        ("--jwt-secret", DEV_JWT_SECRET),
        ("--jwt-ttl-hours", "24"),
        ("--reminder-interval-secs", "60"),
        ("--shutdown-timeout-secs", "5"),
    ];

    let mut argv = vec!["tokenq-server".to_string()];
    for (flag, default) in defaults {
        let value = overrides
            .iter()
            .find(|(name, _)| *name == flag)
            .map_or(default, |(_, value)| *value);
        argv.push(flag.to_string());
        argv.push(value.to_string());
    }
    CliArgs::parse_from(argv)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        ServerConfig::try_from(isolated_args(args))
    }

    #[test]
    fn reminder_interval_zero_disables_scheduler() {
        let config = parse(&[("--reminder-interval-secs", "0")]).unwrap();
        assert_eq!(config.reminder_interval, None);

        let config = parse(&[("--reminder-interval-secs", "30")]).unwrap();
        assert_eq!(config.reminder_interval, Some(Duration::from_secs(30)));
    }

    #[test]
    fn rejects_zero_connections_and_empty_secret() {
        assert!(parse(&[("--db-max-connections", "0")]).is_err());
        assert!(parse(&[("--jwt-secret", "")]).is_err());
        assert!(parse(&[("--jwt-ttl-hours", "0")]).is_err());
    }

    #[test]
    fn store_options_follow_arguments() {
        let config = parse(&[
            ("--db-max-connections", "3"),
            ("--db-busy-timeout-ms", "250"),
            ("--jwt-secret", "s3cret"),
        ])
        .unwrap();
        assert_eq!(config.store.max_connections, 3);
        assert_eq!(config.store.busy_timeout, Duration::from_millis(250));
        assert!(!config.uses_dev_secret());
    }

    #[test]
    fn isolated_args_pin_every_setting() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.server_addr, "127.0.0.1:0");
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.store, StoreOptions::default());
        assert_eq!(config.admin_username, "admin");
        assert!(config.uses_dev_secret());
        assert_eq!(config.jwt_ttl, chrono::Duration::hours(24));
        assert_eq!(config.reminder_interval, Some(Duration::from_secs(60)));
    }
}
