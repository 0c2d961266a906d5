//! Runtime configuration, read from the environment (after `.env`).
//!
//! | Variable | Default |
//! |----------|---------|
//! | `BIND_ADDR` | `0.0.0.0:8080` |
//! | `SIGNIN_DOMAIN` | `localhost:8080` |
//! | `SIGNIN_URI` | `http://{SIGNIN_DOMAIN}` |
//! | `SIGNIN_STATEMENT` | see [`DEFAULT_STATEMENT`] |
//! | `SIGNIN_CHAIN_ID` | `mainnet` |
//! | `SIGNIN_RESOURCES` | none (comma separated) |
//! | `CHALLENGE_TTL_SECS` | `300` (at most [`MAX_CHALLENGE_TTL_SECS`]) |
//! | `MAX_PENDING_CHALLENGES` | `10000` |
//! | `LOG_RETENTION` | `1000` |
//! | `SIGNER_TIMEOUT_MS` | `120000` |
//! | `CONSOLE_MESSAGE` | see [`DEFAULT_CONSOLE_MESSAGE`] |
//! | `WALLET_ORIGIN` | `SIGNIN_DOMAIN` |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};

use crate::activity::DEFAULT_RETENTION;
use crate::challenge::ChallengeConfig;
use crate::console::ConsoleSettings;
use crate::store::DEFAULT_MAX_PENDING;

/// One day.
pub const MAX_CHALLENGE_TTL_SECS: i64 = 86_400;

pub const DEFAULT_STATEMENT: &str =
    "Sign in to prove you own this wallet. This request will not send a transaction or cost any fee.";
pub const DEFAULT_CONSOLE_MESSAGE: &str = "Sign this message to prove you control this account.";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub challenge: ChallengeConfig,
    pub challenge_ttl: chrono::Duration,
    pub max_pending: usize,
    pub log_retention: usize,
    pub signer_timeout: Duration,
    pub console_message: String,
    pub wallet_origin: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr: SocketAddr =
            parse_or(&var, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?;
        let domain = var("SIGNIN_DOMAIN").unwrap_or_else(|| "localhost:8080".into());
        let uri = var("SIGNIN_URI").unwrap_or_else(|| format!("http://{domain}"));
        let statement = var("SIGNIN_STATEMENT").unwrap_or_else(|| DEFAULT_STATEMENT.into());
        let chain_id = var("SIGNIN_CHAIN_ID").unwrap_or_else(|| "mainnet".into());
        let resources = var("SIGNIN_RESOURCES")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let ttl_secs: i64 = parse_or(&var, "CHALLENGE_TTL_SECS", 300)?;
        if !(1..=MAX_CHALLENGE_TTL_SECS).contains(&ttl_secs) {
            bail!("CHALLENGE_TTL_SECS must be between 1 and {MAX_CHALLENGE_TTL_SECS}, got {ttl_secs}");
        }
        let max_pending: usize = parse_or(&var, "MAX_PENDING_CHALLENGES", DEFAULT_MAX_PENDING)?;
        if max_pending == 0 {
            bail!("MAX_PENDING_CHALLENGES must be positive");
        }
        let log_retention: usize = parse_or(&var, "LOG_RETENTION", DEFAULT_RETENTION)?;
        if log_retention == 0 {
            bail!("LOG_RETENTION must be positive");
        }
        let timeout_ms: u64 = parse_or(&var, "SIGNER_TIMEOUT_MS", 120_000)?;
        if timeout_ms == 0 {
            bail!("SIGNER_TIMEOUT_MS must be positive");
        }
        let challenge_ttl = chrono::Duration::seconds(ttl_secs);

        Ok(Self {
            bind_addr,
            wallet_origin: var("WALLET_ORIGIN").unwrap_or_else(|| domain.clone()),
            challenge: ChallengeConfig {
                domain,
                statement: Some(statement),
                uri: Some(uri),
                chain_id: Some(chain_id),
                expiration: Some(challenge_ttl),
                resources,
            },
            challenge_ttl,
            max_pending,
            log_retention,
            signer_timeout: Duration::from_millis(timeout_ms),
            console_message: var("CONSOLE_MESSAGE").unwrap_or_else(|| DEFAULT_CONSOLE_MESSAGE.into()),
        })
    }

    pub fn console_settings(&self) -> ConsoleSettings {
        ConsoleSettings {
            challenge: self.challenge.clone(),
            message: self.console_message.clone(),
            signer_timeout: self.signer_timeout,
        }
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw.parse().with_context(|| format!("invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert_eq!(cfg.challenge.domain, "localhost:8080");
        assert_eq!(cfg.challenge.uri.as_deref(), Some("http://localhost:8080"));
        assert_eq!(cfg.challenge_ttl, chrono::Duration::minutes(5));
        assert_eq!(cfg.signer_timeout, Duration::from_secs(120));
        assert_eq!(cfg.wallet_origin, "localhost:8080");
        assert!(cfg.challenge.resources.is_empty());
        assert_eq!(cfg.max_pending, 10_000);
        assert_eq!(cfg.log_retention, 1_000);
    }

    #[test]
    fn overrides() {
        let cfg = load(&[
            ("SIGNIN_DOMAIN", "app.example.test"),
            ("SIGNIN_RESOURCES", "https://a.test, https://b.test,"),
            ("CHALLENGE_TTL_SECS", "60"),
            ("WALLET_ORIGIN", "wallet.example.test"),
            ("SIGNIN_STATEMENT", "   "),
        ])
        .unwrap();
        assert_eq!(cfg.challenge.domain, "app.example.test");
        assert_eq!(cfg.challenge.resources, ["https://a.test", "https://b.test"]);
        assert_eq!(cfg.challenge.expiration, Some(chrono::Duration::seconds(60)));
        assert_eq!(cfg.wallet_origin, "wallet.example.test");
        assert_eq!(cfg.challenge.statement.as_deref(), Some(DEFAULT_STATEMENT));
    }

    #[test]
    fn ttl_is_bounded() {
        let err = load(&[("CHALLENGE_TTL_SECS", "9000000000000")]).unwrap_err();
        assert!(err.to_string().contains("CHALLENGE_TTL_SECS"), "{err}");

        let cfg = load(&[("CHALLENGE_TTL_SECS", "86400")]).unwrap();
        assert!(crate::challenge::create_challenge(&cfg.challenge).is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(load(&[("CHALLENGE_TTL_SECS", "soon")]).is_err());
        assert!(load(&[("CHALLENGE_TTL_SECS", "0")]).is_err());
        assert!(load(&[("MAX_PENDING_CHALLENGES", "0")]).is_err());
        assert!(load(&[("LOG_RETENTION", "-1")]).is_err());
        assert!(load(&[("SIGNER_TIMEOUT_MS", "0")]).is_err());
        assert!(load(&[("BIND_ADDR", "nowhere")]).is_err());
    }
}
