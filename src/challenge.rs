//! Sign-in challenge construction.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::{rngs::OsRng, RngCore};
use uuid::Uuid;

use crate::error::ChallengeError;
use crate::types::SignInInput;

pub const SIGN_IN_VERSION: &str = "1";

/// 128 bits from the OS CSPRNG.
const NONCE_BYTES: usize = 16;

/// Relying-party settings every challenge is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeConfig {
    pub domain: String,
    pub statement: Option<String>,
    pub uri: Option<String>,
    pub chain_id: Option<String>,
    pub expiration: Option<Duration>,
    pub resources: Vec<String>,
}

impl ChallengeConfig {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            statement: None,
            uri: None,
            chain_id: None,
            expiration: None,
            resources: Vec::new(),
        }
    }

    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = Some(statement.into());
        self
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    fn validate(&self) -> Result<(), ChallengeError> {
        if self.domain.trim().is_empty() {
            return Err(ChallengeError::MissingDomain);
        }
        let single_line = |s: &str| !s.contains(['\n', '\r']);
        let checks = [
            ("domain", Some(self.domain.as_str())),
            ("statement", self.statement.as_deref()),
            ("uri", self.uri.as_deref()),
            ("chain_id", self.chain_id.as_deref()),
        ];
        for (field, value) in checks {
            if value.is_some_and(|v| !single_line(v)) {
                return Err(ChallengeError::LineBreak(field));
            }
        }
        if self.resources.iter().any(|r| !single_line(r)) {
            return Err(ChallengeError::LineBreak("resources"));
        }
        Ok(())
    }
}

pub fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn gen_nonce() -> String {
    let mut b = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut b);
    bs58::encode(b).into_string()
}

/// Build a fresh challenge: new nonce, new request id, issued now.
pub fn create_challenge(cfg: &ChallengeConfig) -> Result<SignInInput, ChallengeError> {
    create_challenge_at(cfg, Utc::now())
}

pub fn create_challenge_at(
    cfg: &ChallengeConfig,
    now: DateTime<Utc>,
) -> Result<SignInInput, ChallengeError> {
    cfg.validate()?;
    let expires_at = cfg
        .expiration
        .map(|ttl| now.checked_add_signed(ttl).ok_or(ChallengeError::ExpirationOutOfRange))
        .transpose()?;
    Ok(SignInInput {
        domain: cfg.domain.clone(),
        address: None,
        statement: cfg.statement.clone(),
        uri: cfg.uri.clone(),
        version: Some(SIGN_IN_VERSION.to_string()),
        chain_id: cfg.chain_id.clone(),
        nonce: Some(gen_nonce()),
        issued_at: Some(timestamp(now)),
        expiration_time: expires_at.map(timestamp),
        not_before: None,
        request_id: Some(Uuid::new_v4().to_string()),
        resources: cfg.resources.clone(),
    })
}

/// Deliberately broken challenges for exercising the rejection path.
///
/// Nothing in here may be used to authenticate anyone: the server's
/// pending-challenge table only ever receives [`create_challenge`] output.
pub mod fixtures {
    use chrono::Utc;

    use super::{gen_nonce, timestamp, SIGN_IN_VERSION};
    use crate::types::SignInInput;

    /// Reserved TLD, never a real relying party.
    pub const FOREIGN_DOMAIN: &str = "phishing.invalid";

    /// A challenge claiming a foreign origin. A wallet bound to the real
    /// origin signs its own origin instead, so verification cannot pass.
    pub fn create_error_challenge() -> SignInInput {
        SignInInput {
            domain: FOREIGN_DOMAIN.to_string(),
            statement: Some("Sign-in to connect!".to_string()),
            uri: Some(format!("https://www.{FOREIGN_DOMAIN}")),
            version: Some(SIGN_IN_VERSION.to_string()),
            chain_id: Some("solana:mainnet".to_string()),
            nonce: Some(gen_nonce()),
            issued_at: Some(timestamp(Utc::now())),
            resources: vec![format!("https://{FOREIGN_DOMAIN}/")],
            ..Default::default()
        }
    }
}
