//! Request boundary.
//!
//! Two kinds of inbound messages reach the service:
//!
//! - background requests, tagged by `type` (`getState`, `signChallenge`, ...)
//! - page messages, tagged by `action` and carrying the page `origin`
//!
//! Both are closed unions. An unrecognized tag fails with `UnknownAction`
//! before any other work; every outcome is a [`BridgeResponse`].

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, error};

use crate::identity::IdentityService;
use crate::types::{ErrorBody, IdentityError, Result};

const REQUEST_TYPES: [&str; 8] = [
    "getState",
    "initialize",
    "confirmSeedBackup",
    "getSeedPhrase",
    "getPublicKey",
    "signChallenge",
    "signMessage",
    "reset",
];

const PAGE_ACTIONS: [&str; 5] = [
    "check_available",
    "is_initialized",
    "get_public_key",
    "sign_challenge",
    "sign_message",
];

/// Background request, one variant per core operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    GetState,
    #[serde(rename_all = "camelCase")]
    Initialize {
        #[serde(default)]
        seed_phrase: Option<String>,
    },
    ConfirmSeedBackup,
    GetSeedPhrase,
    GetPublicKey {
        domain: String,
    },
    SignChallenge {
        domain: String,
        challenge: JsonValue,
    },
    SignMessage {
        domain: String,
        message: String,
    },
    Reset,
}

impl Request {
    pub fn from_value(value: JsonValue) -> Result<Self> {
        check_tag(&value, "type", &REQUEST_TYPES)?;
        serde_json::from_value(value).map_err(|e| {
            debug!(error = %e, "Malformed request");
            IdentityError::Internal("Malformed request".into())
        })
    }
}

/// Action requested by an embedding page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PageAction {
    CheckAvailable,
    IsInitialized,
    GetPublicKey,
    SignChallenge { challenge: JsonValue },
    SignMessage { message: String },
}

/// Page action plus the origin it arrived from.
#[derive(Debug, Clone, PartialEq)]
pub struct PageMessage {
    pub origin: String,
    pub action: PageAction,
}

impl PageMessage {
    pub fn from_value(value: JsonValue) -> Result<Self> {
        check_tag(&value, "action", &PAGE_ACTIONS)?;
        let origin = value
            .get("origin")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| IdentityError::Internal("Page message has no origin".into()))?
            .to_string();
        let action = serde_json::from_value(value).map_err(|e| {
            debug!(error = %e, "Malformed page message");
            IdentityError::Internal("Malformed page message".into())
        })?;
        Ok(Self { origin, action })
    }
}

fn check_tag(value: &JsonValue, field: &str, known: &[&str]) -> Result<()> {
    match value.get(field).and_then(JsonValue::as_str) {
        Some(tag) if known.contains(&tag) => Ok(()),
        Some(tag) => Err(IdentityError::UnknownAction(format!("Unknown {}: {}", field, tag))),
        None => Err(IdentityError::UnknownAction(format!("Missing {}", field))),
    }
}

/// Uniform reply: `{success, data}` or `{success, error: {code, message}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    /// Echo of the caller's correlation id, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonValue>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl BridgeResponse {
    pub fn ok(data: JsonValue) -> Self {
        Self {
            id: None,
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(err: &IdentityError) -> Self {
        Self {
            id: None,
            success: false,
            data: None,
            error: Some(err.to_body()),
        }
    }

    fn from_result(result: Result<JsonValue>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(&e),
        }
    }

    pub fn with_id(mut self, id: Option<JsonValue>) -> Self {
        self.id = id;
        self
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}

fn to_data<T: Serialize>(value: T) -> Result<JsonValue> {
    serde_json::to_value(value).map_err(|e| {
        debug!(error = %e, "Response encoding failed");
        IdentityError::Internal("Response encoding failed".into())
    })
}

/// Run a handler, turning a panic into `InternalError`.
pub async fn guarded<F>(handler: F) -> BridgeResponse
where
    F: Future<Output = Result<JsonValue>>,
{
    match AssertUnwindSafe(handler).catch_unwind().await {
        Ok(result) => BridgeResponse::from_result(result),
        Err(_) => {
            error!("Request handler panicked");
            BridgeResponse::err(&IdentityError::Internal(
                "Unexpected error while handling request".into(),
            ))
        }
    }
}

pub struct Bridge {
    service: Arc<IdentityService>,
}

impl Bridge {
    pub fn new(service: Arc<IdentityService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<IdentityService> {
        &self.service
    }

    pub async fn handle_request(&self, request: Request) -> BridgeResponse {
        guarded(self.dispatch(request)).await
    }

    pub async fn handle_page(&self, message: PageMessage) -> BridgeResponse {
        guarded(self.dispatch_page(message)).await
    }

    /// Route an untyped message: page messages carry an `origin`.
    pub async fn handle_value(&self, value: JsonValue) -> BridgeResponse {
        let id = value.get("id").cloned();
        let response = if value.get("origin").is_some() {
            match PageMessage::from_value(value) {
                Ok(message) => self.handle_page(message).await,
                Err(e) => BridgeResponse::err(&e),
            }
        } else {
            match Request::from_value(value) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => BridgeResponse::err(&e),
            }
        };
        response.with_id(id)
    }

    /// Handle one NDJSON line.
    pub async fn handle_line(&self, line: &str) -> BridgeResponse {
        match serde_json::from_str::<JsonValue>(line) {
            Ok(value) => self.handle_value(value).await,
            Err(e) => {
                debug!(error = %e, "Unparseable request line");
                BridgeResponse::err(&IdentityError::Internal("Request is not valid JSON".into()))
            }
        }
    }

    async fn dispatch(&self, request: Request) -> Result<JsonValue> {
        let service = &self.service;
        match request {
            Request::GetState => to_data(service.get_state().await?),
            Request::Initialize { seed_phrase } => to_data(service.initialize(seed_phrase).await?),
            Request::ConfirmSeedBackup => {
                service.confirm_seed_backup().await?;
                Ok(json!({ "confirmed": true }))
            }
            Request::GetSeedPhrase => to_data(service.get_seed_phrase()?),
            Request::GetPublicKey { domain } => to_data(service.get_public_key(&domain).await?),
            Request::SignChallenge { domain, challenge } => {
                to_data(service.sign_challenge(&domain, challenge).await?)
            }
            Request::SignMessage { domain, message } => {
                to_data(service.sign_message(&domain, &message).await?)
            }
            Request::Reset => {
                service.reset().await?;
                Ok(json!({ "reset": true }))
            }
        }
    }

    async fn dispatch_page(&self, message: PageMessage) -> Result<JsonValue> {
        let service = &self.service;
        let origin = message.origin.as_str();
        match message.action {
            PageAction::CheckAvailable => Ok(json!({ "available": true })),
            PageAction::IsInitialized => {
                let state = service.get_state().await?;
                Ok(json!({ "initialized": state.initialized }))
            }
            PageAction::GetPublicKey => to_data(service.get_public_key(origin).await?),
            PageAction::SignChallenge { challenge } => {
                to_data(service.sign_challenge(origin, challenge).await?)
            }
            PageAction::SignMessage { message } => {
                to_data(service.sign_message(origin, &message).await?)
            }
        }
    }
}
