// src/types.rs
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use serde::{Deserialize, Serialize};

/// Sign-in challenge presented to a signer.
///
/// Field names follow the wallet-standard sign-in input, so a challenge
/// serialized by this service can be handed to a browser wallet unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInInput {
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
}

/// Identity that produced a sign-in signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Base58 rendering of `public_key`.
    pub address: String,
    pub public_key: Vec<u8>,
}

impl Account {
    pub fn from_public_key(public_key: [u8; 32]) -> Self {
        Self {
            address: bs58::encode(public_key).into_string(),
            public_key: public_key.to_vec(),
        }
    }
}

/// What a signer hands back for a [`SignInInput`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInOutput {
    pub account: Account,
    pub signed_message: Vec<u8>,
    pub signature: Vec<u8>,
}

// ---------- HTTP payloads ---------- //

#[derive(Debug, Default, Deserialize)]
pub struct ChallengeReq {
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChallengeRes {
    pub input: SignInInput,
    pub expires_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInOutputWire {
    pub address: String,
    pub pubkey_b64: String,
    pub signed_message_b64: String,
    pub signature_b64: String,
}

impl From<&SignInOutput> for SignInOutputWire {
    fn from(out: &SignInOutput) -> Self {
        Self {
            address: out.account.address.clone(),
            pubkey_b64: B64.encode(&out.account.public_key),
            signed_message_b64: B64.encode(&out.signed_message),
            signature_b64: B64.encode(&out.signature),
        }
    }
}

impl TryFrom<SignInOutputWire> for SignInOutput {
    type Error = base64::DecodeError;

    fn try_from(wire: SignInOutputWire) -> Result<Self, Self::Error> {
        Ok(Self {
            account: Account {
                address: wire.address,
                public_key: B64.decode(&wire.pubkey_b64)?,
            },
            signed_message: B64.decode(&wire.signed_message_b64)?,
            signature: B64.decode(&wire.signature_b64)?,
        })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct VerifyReq {
    pub input: SignInInput,
    pub output: SignInOutputWire,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyRes {
    pub ok: bool,
    pub address: String,
}
