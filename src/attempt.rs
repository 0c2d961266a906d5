//! One sign-in attempt: challenge → signer → verification → one log entry.

use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

use crate::activity::{ActivityLog, LogStatus};
use crate::error::{AuthError, SignerError};
use crate::signer::Signer;
use crate::types::{SignInInput, SignInOutput};
use crate::verify::verify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AttemptPhase {
    Idle,
    ChallengeCreated,
    AwaitingSigner,
    Signed,
    Verified,
    Rejected,
}

impl AttemptPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptPhase::Verified | AttemptPhase::Rejected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSignIn {
    pub address: String,
    pub nonce: Option<String>,
}

#[derive(Debug)]
pub struct AttemptReport {
    pub outcome: Result<VerifiedSignIn, AuthError>,
    /// Every phase the attempt passed through, in order.
    pub phases: Vec<AttemptPhase>,
}

impl AttemptReport {
    pub fn final_phase(&self) -> AttemptPhase {
        self.phases.last().copied().unwrap_or(AttemptPhase::Idle)
    }
}

/// Hand `challenge` to `signer` and wait for a structurally sound answer.
///
/// The wait is bounded by `timeout` and abandoned as soon as `cancel`
/// fires; the pending signer future is dropped in both cases.
pub async fn request_sign_in(
    challenge: &SignInInput,
    signer: &dyn Signer,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<SignInOutput, SignerError> {
    if signer.account().is_none() {
        return Err(SignerError::Unavailable("no wallet connected".into()));
    }
    if !signer.capabilities().sign_in {
        return Err(SignerError::Unavailable("wallet does not support sign-in".into()));
    }

    let output = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(SignerError::Cancelled),
        res = tokio::time::timeout(timeout, signer.sign_in(challenge)) => {
            res.map_err(|_| SignerError::Timeout(timeout))??
        }
    };
    check_output(&output)?;
    Ok(output)
}

fn check_output(out: &SignInOutput) -> Result<(), SignerError> {
    if out.account.address.is_empty() {
        return Err(SignerError::Protocol("missing account address".into()));
    }
    if out.account.public_key.len() != 32 {
        return Err(SignerError::Protocol(format!(
            "public key is {} bytes, expected 32",
            out.account.public_key.len()
        )));
    }
    if out.signature.len() != 64 {
        return Err(SignerError::Protocol(format!(
            "signature is {} bytes, expected 64",
            out.signature.len()
        )));
    }
    if out.signed_message.is_empty() {
        return Err(SignerError::Protocol("missing signed message".into()));
    }
    Ok(())
}

fn status_for(err: &AuthError) -> LogStatus {
    match err {
        AuthError::Signer(SignerError::Declined | SignerError::Cancelled) => LogStatus::Warning,
        _ => LogStatus::Error,
    }
}

/// Records the cancelled outcome for an attempt dropped before it reached
/// a terminal phase, e.g. when the caller goes away mid-signer.
struct OutcomeGuard<'a> {
    log: &'a ActivityLog,
    method: String,
    armed: bool,
}

impl OutcomeGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for OutcomeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("sign-in attempt dropped while waiting on signer");
            let err = AuthError::from(SignerError::Cancelled);
            self.log.record(status_for(&err), &self.method, err.to_string());
        }
    }
}

/// Owns its challenge, so a challenge can back at most one attempt.
pub struct SignInAttempt {
    challenge: SignInInput,
    method: String,
    timeout: Duration,
    phases: Vec<AttemptPhase>,
}

impl SignInAttempt {
    pub fn new(challenge: SignInInput, timeout: Duration) -> Self {
        Self {
            challenge,
            method: "signIn".to_string(),
            timeout,
            phases: vec![AttemptPhase::Idle, AttemptPhase::ChallengeCreated],
        }
    }

    /// Log method name for the outcome entry.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn challenge(&self) -> &SignInInput {
        &self.challenge
    }

    fn enter(&mut self, phase: AttemptPhase) {
        debug!(?phase, "sign-in attempt");
        self.phases.push(phase);
    }

    /// Drive the attempt to a terminal phase, recording exactly one entry
    /// in `log`.
    pub async fn run(
        self,
        signer: &dyn Signer,
        cancel: &CancellationToken,
        log: &ActivityLog,
    ) -> AttemptReport {
        let span = info_span!(
            "sign_in",
            method = %self.method,
            nonce = self.challenge.nonce.as_deref().unwrap_or_default()
        );
        self.run_inner(signer, cancel, log).instrument(span).await
    }

    async fn run_inner(
        mut self,
        signer: &dyn Signer,
        cancel: &CancellationToken,
        log: &ActivityLog,
    ) -> AttemptReport {
        self.enter(AttemptPhase::AwaitingSigner);
        let mut guard = OutcomeGuard {
            log,
            method: self.method.clone(),
            armed: true,
        };
        let answer = request_sign_in(&self.challenge, signer, self.timeout, cancel).await;
        // no await below: the attempt runs to its terminal phase from here
        guard.disarm();

        let outcome = match answer {
            Err(e) => Err(AuthError::from(e)),
            Ok(output) => {
                self.enter(AttemptPhase::Signed);
                match verify(&self.challenge, &output) {
                    Ok(true) => {
                        log.record(
                            LogStatus::Success,
                            &self.method,
                            format!(
                                "Message signed: {} by {} with signature {}",
                                bs58::encode(&output.signed_message).into_string(),
                                output.account.address,
                                bs58::encode(&output.signature).into_string(),
                            ),
                        );
                        Ok(VerifiedSignIn {
                            address: output.account.address,
                            nonce: self.challenge.nonce.clone(),
                        })
                    }
                    Ok(false) => Err(AuthError::VerificationFailed),
                    Err(e) => Err(AuthError::from(e)),
                }
            }
        };

        match &outcome {
            Ok(_) => self.enter(AttemptPhase::Verified),
            Err(e) => {
                log.record(status_for(e), &self.method, e.to_string());
                self.enter(AttemptPhase::Rejected);
            }
        }
        AttemptReport {
            outcome,
            phases: self.phases,
        }
    }
}
