//! Signer capability and the in-process keypair wallet.

use std::sync::Mutex;

use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
use rand::rngs::OsRng;
use tracing::{debug, info};

use crate::canon::canonical_message;
use crate::error::SignerError;
use crate::events::{WalletEvent, WalletEvents};
use crate::types::{Account, SignInInput, SignInOutput};

/// Optional methods a signer supports. Checked once when an attempt starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignerCapabilities {
    pub sign_in: bool,
    pub sign_message: bool,
}

impl SignerCapabilities {
    pub const ALL: Self = Self {
        sign_in: true,
        sign_message: true,
    };
}

/// A wallet that holds key material and signs on request, usually behind
/// an interactive approval step.
#[async_trait]
pub trait Signer: Send + Sync {
    fn capabilities(&self) -> SignerCapabilities;

    /// Currently connected account, if any.
    fn account(&self) -> Option<Account>;

    fn events(&self) -> &WalletEvents;

    async fn connect(&self) -> Result<Account, SignerError>;

    async fn disconnect(&self) -> Result<(), SignerError>;

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, SignerError>;

    async fn sign_in(&self, input: &SignInInput) -> Result<SignInOutput, SignerError>;
}

/// Ed25519 keypair wallet bound to one origin.
///
/// Like a browser wallet, it signs challenges for the origin it is running
/// at: a challenge naming another domain is re-bound to `origin` before
/// signing.
pub struct LocalSigner {
    key: SigningKey,
    origin: String,
    connected: Mutex<bool>,
    events: WalletEvents,
}

impl LocalSigner {
    pub fn new(key: SigningKey, origin: impl Into<String>) -> Self {
        Self {
            key,
            origin: origin.into(),
            connected: Mutex::new(false),
            events: WalletEvents::new(),
        }
    }

    pub fn generate(origin: impl Into<String>) -> Self {
        Self::new(SigningKey::generate(&mut OsRng), origin)
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn own_account(&self) -> Account {
        Account::from_public_key(self.key.verifying_key().to_bytes())
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_connected(&self, value: bool) {
        *self.connected.lock().unwrap_or_else(|p| p.into_inner()) = value;
    }

    fn require_connected(&self) -> Result<(), SignerError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SignerError::Unavailable("wallet not connected".into()))
        }
    }
}

#[async_trait]
impl Signer for LocalSigner {
    fn capabilities(&self) -> SignerCapabilities {
        SignerCapabilities::ALL
    }

    fn account(&self) -> Option<Account> {
        self.is_connected().then(|| self.own_account())
    }

    fn events(&self) -> &WalletEvents {
        &self.events
    }

    async fn connect(&self) -> Result<Account, SignerError> {
        self.set_connected(true);
        let account = self.own_account();
        info!(address = %account.address, "local wallet connected");
        self.events.emit(WalletEvent::Connected(account.clone()));
        Ok(account)
    }

    async fn disconnect(&self) -> Result<(), SignerError> {
        self.set_connected(false);
        self.events.emit(WalletEvent::Disconnected);
        Ok(())
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        self.require_connected()?;
        Ok(self.key.sign(message).to_bytes().to_vec())
    }

    async fn sign_in(&self, input: &SignInInput) -> Result<SignInOutput, SignerError> {
        self.require_connected()?;
        let account = self.own_account();

        let mut bound = input.clone();
        if bound.domain != self.origin {
            debug!(requested = %bound.domain, origin = %self.origin, "re-binding challenge to wallet origin");
            bound.domain = self.origin.clone();
        }
        let signed_message = canonical_message(&bound, &account.address);
        let signature = self.key.sign(&signed_message).to_bytes().to_vec();

        Ok(SignInOutput {
            account,
            signed_message,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::parse_sign_in_message;
    use ed25519_dalek::{Signature, Verifier};

    fn signer() -> LocalSigner {
        LocalSigner::new(SigningKey::from_bytes(&[3u8; 32]), "example.test")
    }

    #[tokio::test]
    async fn refuses_until_connected() {
        let s = signer();
        assert!(s.account().is_none());
        assert!(matches!(
            s.sign_message(b"hi").await,
            Err(SignerError::Unavailable(_))
        ));

        s.connect().await.unwrap();
        assert!(s.account().is_some());
        assert!(s.sign_message(b"hi").await.is_ok());

        s.disconnect().await.unwrap();
        assert!(s.account().is_none());
    }

    #[tokio::test]
    async fn raw_signature_verifies() {
        let s = signer();
        let account = s.connect().await.unwrap();
        let sig = s.sign_message(b"hello").await.unwrap();

        let vk = s.key.verifying_key();
        assert_eq!(account.public_key, vk.to_bytes().to_vec());
        let sig = Signature::from_slice(&sig).unwrap();
        assert!(vk.verify(b"hello", &sig).is_ok());
    }

    #[tokio::test]
    async fn sign_in_names_own_account_and_binds_origin() {
        let s = signer();
        let account = s.connect().await.unwrap();
        let input = SignInInput {
            domain: "elsewhere.test".into(),
            address: Some(Account::from_public_key([8u8; 32]).address),
            nonce: Some("abcdefgh".into()),
            ..Default::default()
        };

        let out = s.sign_in(&input).await.unwrap();
        let signed = parse_sign_in_message(&out.signed_message).unwrap();
        assert_eq!(signed.domain, "example.test");
        assert_eq!(signed.address, Some(account.address));
        assert_eq!(signed.nonce.as_deref(), Some("abcdefgh"));
    }

    #[tokio::test]
    async fn connect_emits_event() {
        let s = signer();
        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = s.events().subscribe(move |e| sink.lock().unwrap().push(e.clone()));

        s.connect().await.unwrap();
        s.disconnect().await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[0], WalletEvent::Connected(_)));
        assert_eq!(seen[1], WalletEvent::Disconnected);
    }
}
