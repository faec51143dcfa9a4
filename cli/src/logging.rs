//! Diagnostics for the `shard-wallet` binary.
//!
//! Command results go to stdout; every log line goes to stderr, so output
//! such as transaction hashes can be piped while the wallet reports which
//! partition it is polling and why a step was retried.
//!
//! The filter comes from `RUST_LOG` when set, otherwise from `--log-level`.
//! A malformed filter is an error rather than a silent fallback.

use anyhow::{Context, Result};
use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Multi-line, colored; the default for interactive use.
    #[default]
    Pretty,
    /// One short line per event, no timestamps.
    Compact,
    /// JSON lines for log collectors.
    Json,
}

/// `RUST_LOG` wins over `default_directives` when present.
fn build_filter(default_directives: &str, from_env: Option<String>) -> Result<EnvFilter> {
    match from_env {
        Some(directives) => {
            EnvFilter::try_new(&directives).with_context(|| format!("invalid RUST_LOG '{directives}'"))
        }
        None => EnvFilter::try_new(default_directives)
            .with_context(|| format!("invalid log filter '{default_directives}'")),
    }
}

/// Installs the global subscriber. Call once, before the engine is built.
pub fn init_logging(default_directives: &str, format: LogFormat) -> Result<()> {
    let filter = build_filter(
        default_directives,
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
    )?;
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .try_init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .without_time()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    }
    .context("failed to install the tracing subscriber")?;

    tracing::debug!(?format, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_match_flag_values() {
        assert_eq!(LogFormat::from_str("json", true).unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("Compact", true).unwrap(), LogFormat::Compact);
        assert!(LogFormat::from_str("xml", true).is_err());
    }

    #[test]
    fn env_directives_take_precedence() {
        let filter = build_filter("shard_wallet=info", Some("shard_wallet=trace".into())).unwrap();
        assert!(filter.to_string().contains("trace"));
    }

    #[test]
    fn malformed_filter_is_rejected() {
        assert!(build_filter("shard_wallet=loud", None).is_err());
        assert!(build_filter("shard_wallet=debug,shard_wallet_cli=warn", None).is_ok());
    }
}
