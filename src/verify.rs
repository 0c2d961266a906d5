//! Sign-in response verification.

use ed25519_dalek::{Signature, VerifyingKey};
use tracing::debug;

use crate::canon::{canonical_message, parse_sign_in_message};
use crate::error::VerifyError;
use crate::types::{SignInInput, SignInOutput};

/// Check `response` against the challenge it answers.
///
/// `Ok(true)` only when the signed bytes equal the canonical encoding of
/// `challenge` for the responding account, the address is the base58 form
/// of the public key (and the pinned address, if the challenge has one),
/// and the signature passes strict Ed25519 verification under that key.
/// Every mismatch is `Ok(false)`; `Err` means the response could not be
/// checked at all.
pub fn verify(challenge: &SignInInput, response: &SignInOutput) -> Result<bool, VerifyError> {
    let pk: [u8; 32] = response
        .account
        .public_key
        .as_slice()
        .try_into()
        .map_err(|_| VerifyError::MalformedPublicKey)?;
    let vk = VerifyingKey::from_bytes(&pk).map_err(|_| VerifyError::MalformedPublicKey)?;
    let sig = Signature::from_slice(&response.signature).map_err(|_| VerifyError::MalformedSignature)?;

    if response.account.address != bs58::encode(pk).into_string() {
        debug!(address = %response.account.address, "address is not derived from public key");
        return Ok(false);
    }
    if let Some(pinned) = challenge.address.as_deref().filter(|a| !a.is_empty()) {
        if pinned != response.account.address {
            debug!(%pinned, address = %response.account.address, "response from another account");
            return Ok(false);
        }
    }

    let expected = canonical_message(challenge, &response.account.address);
    if response.signed_message != expected {
        match parse_sign_in_message(&response.signed_message) {
            Some(signed) => debug!(
                field = first_divergence(challenge, &signed).unwrap_or("layout"),
                "signed message diverges from challenge"
            ),
            None => debug!("signed message is not a sign-in message"),
        }
        return Ok(false);
    }

    // strict: small-order keys and non-canonical R are refused
    Ok(vk.verify_strict(&response.signed_message, &sig).is_ok())
}

fn first_divergence(expected: &SignInInput, signed: &SignInInput) -> Option<&'static str> {
    if expected.domain != signed.domain {
        return Some("domain");
    }
    if expected.address.is_some() && expected.address != signed.address {
        return Some("address");
    }
    let pairs = [
        ("statement", &expected.statement, &signed.statement),
        ("uri", &expected.uri, &signed.uri),
        ("version", &expected.version, &signed.version),
        ("chainId", &expected.chain_id, &signed.chain_id),
        ("nonce", &expected.nonce, &signed.nonce),
        ("issuedAt", &expected.issued_at, &signed.issued_at),
        ("expirationTime", &expected.expiration_time, &signed.expiration_time),
        ("notBefore", &expected.not_before, &signed.not_before),
        ("requestId", &expected.request_id, &signed.request_id),
    ];
    for (name, a, b) in pairs {
        if a.as_deref().filter(|s| !s.is_empty()) != b.as_deref() {
            return Some(name);
        }
    }
    (expected.resources != signed.resources).then_some("resources")
}
