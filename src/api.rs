//! HTTP surface: relying-party sign-in endpoints plus the wallet console.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::activity::{ActivityLog, LogStatus};
use crate::challenge::create_challenge;
use crate::config::Config;
use crate::console::WalletConsole;
use crate::error::{bad, ApiError, AuthError, StoreError};
use crate::store::ChallengeStore;
use crate::types::*;
use crate::verify::verify;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: ChallengeStore,
    pub log: ActivityLog,
    pub console: Arc<WalletConsole>,
    /// Cancelled on shutdown; in-flight sign-in attempts hang off it.
    pub shutdown: CancellationToken,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/signin/challenge", post(challenge))
        .route("/api/signin/verify", post(verify_sign_in))
        .route("/api/logs", get(list_logs).delete(clear_logs))
        .route("/api/console/:action", post(console_action))
        .with_state(state)
}

// ---------- API HANDLERS ---------- //

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn challenge(
    State(st): State<AppState>,
    Json(req): Json<ChallengeReq>,
) -> Result<Json<ChallengeRes>, ApiError> {
    let mut input = create_challenge(&st.config.challenge).map_err(AuthError::from)?;

    if let Some(address) = req.address.filter(|a| !a.is_empty()) {
        let pk = bs58::decode(&address).into_vec().map_err(bad("address"))?;
        if pk.len() != 32 {
            return Err(ApiError::BadRequest("address: not a 32-byte public key".into()));
        }
        input.address = Some(address);
    }

    let expires_at = st
        .store
        .issue(input.clone(), st.config.challenge_ttl)
        .map_err(|e| match e {
            StoreError::Full => ApiError::from(e),
            other => anyhow::Error::new(other).context("recording challenge").into(),
        })?;
    info!(nonce = input.nonce.as_deref().unwrap_or_default(), "challenge issued");

    Ok(Json(ChallengeRes {
        input,
        expires_at: expires_at.to_rfc3339(),
    }))
}

async fn verify_sign_in(
    State(st): State<AppState>,
    Json(req): Json<VerifyReq>,
) -> Result<Json<VerifyRes>, ApiError> {
    let result = check_sign_in(&st.store, req);
    match &result {
        Ok(res) => st.log.record(
            LogStatus::Success,
            "verifySignIn",
            format!("Verified sign-in by {}", res.address),
        ),
        Err(e) => st.log.record(LogStatus::Error, "verifySignIn", e.to_string()),
    }
    result.map(Json)
}

fn check_sign_in(store: &ChallengeStore, req: VerifyReq) -> Result<VerifyRes, ApiError> {
    let nonce = req
        .input
        .nonce
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("nonce".into()))?;
    // consumed whatever happens next
    let issued = store.take(nonce)?;
    if issued != req.input {
        return Err(ApiError::ChallengeMismatch);
    }

    let output = SignInOutput::try_from(req.output).map_err(bad("output"))?;
    match verify(&issued, &output).map_err(AuthError::from)? {
        true => Ok(VerifyRes {
            ok: true,
            address: output.account.address,
        }),
        false => Err(AuthError::VerificationFailed.into()),
    }
}

async fn list_logs(State(st): State<AppState>) -> Json<Value> {
    Json(json!({ "logs": st.log.entries() }))
}

async fn clear_logs(State(st): State<AppState>) -> Json<Value> {
    st.log.clear();
    Json(json!({ "ok": true }))
}

async fn console_action(
    State(st): State<AppState>,
    Path(action): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let console = &st.console;
    let report = match action.as_str() {
        "connect" => {
            console.connect().await;
            None
        }
        "disconnect" => {
            console.disconnect().await;
            None
        }
        "sign-message" => {
            console.sign_message().await;
            None
        }
        "sign-in" => Some(console.sign_in(&st.shutdown.child_token()).await),
        "sign-in-error" => Some(console.sign_in_error(&st.shutdown.child_token()).await),
        other => return Err(ApiError::BadRequest(format!("console action: {other}"))),
    };

    Ok(Json(match report {
        None => json!({ "ok": true }),
        Some(r) => json!({
            "ok": r.outcome.is_ok(),
            "phase": r.final_phase(),
            "address": r.outcome.ok().map(|v| v.address),
        }),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::canonical_message;
    use crate::signer::LocalSigner;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use ed25519_dalek::{Signer as _, SigningKey};
    use tower::ServiceExt;

    fn app() -> (Router, AppState) {
        app_with(Config::from_lookup(|_| None).unwrap())
    }

    fn app_with(config: Config) -> (Router, AppState) {
        let log = ActivityLog::with_retention(config.log_retention);
        let signer = Arc::new(LocalSigner::new(
            SigningKey::from_bytes(&[21u8; 32]),
            config.wallet_origin.clone(),
        ));
        let console = WalletConsole::new(signer, config.console_settings(), log.clone());
        let store = ChallengeStore::with_capacity(config.max_pending);
        let state = AppState {
            config: Arc::new(config),
            store,
            log,
            console: Arc::new(console),
            shutdown: CancellationToken::new(),
        };
        (router(state.clone()), state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn wallet_answer(input: &SignInInput, key: &SigningKey) -> SignInOutput {
        let account = Account::from_public_key(key.verifying_key().to_bytes());
        let signed_message = canonical_message(input, &account.address);
        let signature = key.sign(&signed_message).to_bytes().to_vec();
        SignInOutput {
            account,
            signed_message,
            signature,
        }
    }

    async fn issue(app: &Router) -> SignInInput {
        let (status, body) = send(app, "POST", "/api/signin/challenge", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        let res: ChallengeRes = serde_json::from_value(body).unwrap();
        res.input
    }

    fn verify_body(input: &SignInInput, output: &SignInOutput) -> Value {
        serde_json::to_value(VerifyReq {
            input: input.clone(),
            output: SignInOutputWire::from(output),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn challenge_verify_round_trip() {
        let (app, state) = app();
        let key = SigningKey::from_bytes(&[1u8; 32]);

        let input = issue(&app).await;
        assert_eq!(input.domain, "localhost:8080");
        assert!(input.expiration_time.is_some());

        let output = wallet_answer(&input, &key);
        let (status, body) = send(&app, "POST", "/api/signin/verify", Some(verify_body(&input, &output))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["address"], output.account.address);

        // nonce is spent
        let (status, body) = send(&app, "POST", "/api/signin/verify", Some(verify_body(&input, &output))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_code"], "unknown_nonce");

        let statuses: Vec<_> = state.log.entries().iter().map(|e| e.status).collect();
        assert_eq!(statuses, [LogStatus::Success, LogStatus::Error]);
    }

    #[tokio::test]
    async fn tampered_signature_is_unauthorized() {
        let (app, _) = app();
        let key = SigningKey::from_bytes(&[1u8; 32]);
        let input = issue(&app).await;
        let mut output = wallet_answer(&input, &key);
        output.signature[0] ^= 0xff;

        let (status, body) = send(&app, "POST", "/api/signin/verify", Some(verify_body(&input, &output))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "verification_failed");
    }

    #[tokio::test]
    async fn edited_challenge_is_refused() {
        let (app, state) = app();
        let key = SigningKey::from_bytes(&[1u8; 32]);
        let mut input = issue(&app).await;
        input.statement = Some("something else".into());
        let output = wallet_answer(&input, &key);

        let (status, body) = send(&app, "POST", "/api/signin/verify", Some(verify_body(&input, &output))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_code"], "challenge_mismatch");
        assert!(state.store.is_empty());
    }

    #[tokio::test]
    async fn pinned_address_is_validated() {
        let (app, _) = app();
        let (status, _) = send(&app, "POST", "/api/signin/challenge", Some(json!({ "address": "0OIl" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let address = Account::from_public_key([4u8; 32]).address;
        let (status, body) = send(&app, "POST", "/api/signin/challenge", Some(json!({ "address": address }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["input"]["address"], address);
    }

    #[tokio::test]
    async fn pinned_challenge_refuses_other_signer() {
        let (app, state) = app();
        let owner = SigningKey::from_bytes(&[4u8; 32]);
        let intruder = SigningKey::from_bytes(&[1u8; 32]);
        let address = Account::from_public_key(owner.verifying_key().to_bytes()).address;

        let (status, body) = send(&app, "POST", "/api/signin/challenge", Some(json!({ "address": address }))).await;
        assert_eq!(status, StatusCode::OK);
        let input: SignInInput = serde_json::from_value(body["input"].clone()).unwrap();

        let output = wallet_answer(&input, &intruder);
        let (status, body) = send(&app, "POST", "/api/signin/verify", Some(verify_body(&input, &output))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "verification_failed");
        assert!(state.store.is_empty());

        let (_, body) = send(&app, "POST", "/api/signin/challenge", Some(json!({ "address": address }))).await;
        let input: SignInInput = serde_json::from_value(body["input"].clone()).unwrap();
        let output = wallet_answer(&input, &owner);
        let (status, body) = send(&app, "POST", "/api/signin/verify", Some(verify_body(&input, &output))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["address"], address);
    }

    #[tokio::test]
    async fn challenge_table_is_bounded() {
        let config = Config::from_lookup(|k| (k == "MAX_PENDING_CHALLENGES").then(|| "1".to_string())).unwrap();
        let (app, _) = app_with(config);

        issue(&app).await;
        let (status, body) = send(&app, "POST", "/api/signin/challenge", Some(json!({}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error_code"], "challenge_capacity");
    }

    #[tokio::test]
    async fn console_drives_local_wallet() {
        let (app, _) = app();

        let (status, body) = send(&app, "POST", "/api/console/sign-in", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], false);

        send(&app, "POST", "/api/console/connect", None).await;
        let (_, body) = send(&app, "POST", "/api/console/sign-in", None).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["phase"], "verified");

        let (_, body) = send(&app, "POST", "/api/console/sign-in-error", None).await;
        assert_eq!(body["ok"], false);
        assert_eq!(body["phase"], "rejected");

        let (status, _) = send(&app, "POST", "/api/console/teleport", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(&app, "GET", "/api/logs", None).await;
        let methods: Vec<_> = body["logs"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["method"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            methods,
            ["signIn", "accountChanged", "connect", "signIn", "signInError"]
        );

        send(&app, "DELETE", "/api/logs", None).await;
        let (_, body) = send(&app, "GET", "/api/logs", None).await;
        assert!(body["logs"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (app, _) = app();
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
