//! Wallet console: the demo's buttons, each leaving a trail in the
//! activity log.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::activity::{ActivityLog, LogStatus};
use crate::attempt::{AttemptPhase, AttemptReport, SignInAttempt};
use crate::challenge::{create_challenge, fixtures, ChallengeConfig};
use crate::error::{AuthError, SignerError};
use crate::events::{Subscription, WalletEvent};
use crate::signer::Signer;

#[derive(Debug, Clone)]
pub struct ConsoleSettings {
    pub challenge: ChallengeConfig,
    /// Text signed by the raw sign-message action.
    pub message: String,
    pub signer_timeout: Duration,
}

pub struct WalletConsole {
    signer: Arc<dyn Signer>,
    settings: ConsoleSettings,
    log: ActivityLog,
    _account_changes: Subscription,
}

impl WalletConsole {
    pub fn new(signer: Arc<dyn Signer>, settings: ConsoleSettings, log: ActivityLog) -> Self {
        let sink = log.clone();
        let account_changes = signer.events().subscribe(move |event| {
            if let WalletEvent::Connected(account) = event {
                sink.record(LogStatus::Info, "accountChanged", account.address.clone());
            }
        });
        Self {
            signer,
            settings,
            log,
            _account_changes: account_changes,
        }
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn signer(&self) -> &dyn Signer {
        self.signer.as_ref()
    }

    pub async fn connect(&self) {
        match self.signer.connect().await {
            Ok(account) => self.log.record(
                LogStatus::Success,
                "connect",
                format!("Connected to account {}", account.address),
            ),
            Err(e) => self.log.record(LogStatus::Error, "connect", e.to_string()),
        }
    }

    pub async fn disconnect(&self) {
        match self.signer.disconnect().await {
            Ok(()) => self.log.record(LogStatus::Warning, "disconnect", "disconnected"),
            Err(e) => self.log.record(LogStatus::Error, "disconnect", e.to_string()),
        }
    }

    pub async fn sign_message(&self) {
        let result = if !self.signer.capabilities().sign_message {
            Err(SignerError::Unavailable("wallet does not support message signing".into()))
        } else if self.signer.account().is_none() {
            Err(SignerError::Unavailable("no wallet connected".into()))
        } else {
            self.signer.sign_message(self.settings.message.as_bytes()).await
        };
        match result {
            Ok(signature) => self.log.record(
                LogStatus::Success,
                "signMessage",
                format!(
                    "Message signed with signature {}",
                    bs58::encode(signature).into_string()
                ),
            ),
            Err(e) => self.log.record(LogStatus::Error, "signMessage", e.to_string()),
        }
    }

    /// Full sign-in on a fresh challenge.
    pub async fn sign_in(&self, cancel: &CancellationToken) -> AttemptReport {
        let challenge = match create_challenge(&self.settings.challenge) {
            Ok(c) => c,
            Err(e) => {
                let err = AuthError::from(e);
                self.log.record(LogStatus::Error, "signIn", err.to_string());
                return AttemptReport {
                    outcome: Err(err),
                    phases: vec![AttemptPhase::Idle],
                };
            }
        };
        SignInAttempt::new(challenge, self.settings.signer_timeout)
            .run(self.signer.as_ref(), cancel, &self.log)
            .await
    }

    /// Sign-in on a challenge built to fail verification.
    pub async fn sign_in_error(&self, cancel: &CancellationToken) -> AttemptReport {
        SignInAttempt::new(fixtures::create_error_challenge(), self.settings.signer_timeout)
            .with_method("signInError")
            .run(self.signer.as_ref(), cancel, &self.log)
            .await
    }
}
