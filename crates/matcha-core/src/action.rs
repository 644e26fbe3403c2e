//! Action request/response envelopes and the client-visible error taxonomy.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::{CodecError, FileError, StoreError};
use crate::payload::Payload;
use crate::scene::Scene;

// ============================================================================
// Envelopes
// ============================================================================

/// An RPC call from the connected bot program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub params: Payload,
    /// Opaque correlation token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<Payload>,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>, params: Value) -> Self {
        Self {
            action: action.into(),
            params: params.into(),
            echo: None,
        }
    }

    /// Decodes the parameters into a typed record.
    ///
    /// Missing params decode as an empty object; byte strings arrive as Base64.
    pub fn parse_params<T: DeserializeOwned>(&self) -> Result<T, ActionError> {
        let value = match self.params.clone().into_json() {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        serde_json::from_value(value).map_err(|e| ActionError::bad_param(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Failed,
}

/// Result of an action as sent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub status: Status,
    pub retcode: i64,
    #[serde(default)]
    pub data: Payload,
    /// Human-readable diagnostics; only some protocol versions carry it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<Payload>,
}

impl ActionResponse {
    /// Status follows retcode: zero is ok, anything else failed.
    pub fn new(retcode: i64, data: Payload) -> Self {
        Self {
            status: if retcode == 0 { Status::Ok } else { Status::Failed },
            retcode,
            data,
            message: None,
            echo: None,
        }
    }

    pub fn ok(data: Payload) -> Self {
        Self::new(0, data)
    }

    pub fn failed(retcode: i64) -> Self {
        Self::new(retcode, Payload::Null)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_echo(mut self, echo: Option<Payload>) -> Self {
        self.echo = echo;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

/// Handler output: response data plus any scenes the action produced.
#[derive(Debug, Default)]
pub struct ActionOutcome {
    pub data: Payload,
    pub scenes: Vec<Scene>,
}

impl ActionOutcome {
    pub fn data(data: impl Into<Payload>) -> Self {
        Self {
            data: data.into(),
            scenes: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_scene(mut self, scene: Scene) -> Self {
        self.scenes.push(scene);
        self
    }

    pub fn with_scenes(mut self, scenes: impl IntoIterator<Item = Scene>) -> Self {
        self.scenes.extend(scenes);
        self
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Failure class; each protocol maps these to its own retcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Request envelope could not be understood.
    BadRequest,
    UnsupportedAction,
    BadParam,
    /// A multi-stage action received an unknown stage or fetch type.
    InvalidStage,
    NotFound,
    Forbidden,
    File,
    /// Unexpected failure inside a handler.
    Internal,
}

/// A failed action, carried back to the caller as a response.
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct ActionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ActionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unsupported(action: &str) -> Self {
        Self::new(ErrorKind::UnsupportedAction, format!("unsupported action: {action}"))
    }

    pub fn bad_param(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadParam, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn invalid_stage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidStage, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Whether the failure is the caller's fault rather than the simulator's.
    pub fn is_client_error(&self) -> bool {
        self.kind != ErrorKind::Internal
    }
}

impl From<StoreError> for ActionError {
    fn from(err: StoreError) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<FileError> for ActionError {
    fn from(err: FileError) -> Self {
        Self::new(ErrorKind::File, err.to_string())
    }
}

impl From<CodecError> for ActionError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::NotImplemented(_) | CodecError::Malformed(_) => Self::bad_param(err.to_string()),
            CodecError::File(e) => e.into(),
            CodecError::Store(e) => e.into(),
        }
    }
}

/// Result type for action handlers.
pub type ActionResult<T = ActionOutcome> = Result<T, ActionError>;

// ============================================================================
// Dispatch helpers
// ============================================================================

/// Strips the `_async` and `_rate_limited` call-mode suffixes.
///
/// Both modes run the action synchronously here.
pub fn normalize_action(name: &str) -> &str {
    let name = name.strip_suffix("_async").unwrap_or(name);
    name.strip_suffix("_rate_limited").unwrap_or(name)
}

/// Per-protocol mapping from [`ErrorKind`] to wire retcodes.
#[derive(Debug, Clone, Copy)]
pub struct RetcodeTable {
    pub bad_request: i64,
    pub unsupported_action: i64,
    pub bad_param: i64,
    pub invalid_stage: i64,
    pub not_found: i64,
    pub forbidden: i64,
    pub file: i64,
    pub internal: i64,
    /// Whether failed responses carry the `message` field.
    pub with_message: bool,
}

impl RetcodeTable {
    pub fn code(&self, kind: ErrorKind) -> i64 {
        match kind {
            ErrorKind::BadRequest => self.bad_request,
            ErrorKind::UnsupportedAction => self.unsupported_action,
            ErrorKind::BadParam => self.bad_param,
            ErrorKind::InvalidStage => self.invalid_stage,
            ErrorKind::NotFound => self.not_found,
            ErrorKind::Forbidden => self.forbidden,
            ErrorKind::File => self.file,
            ErrorKind::Internal => self.internal,
        }
    }

    pub fn failure(&self, err: &ActionError) -> ActionResponse {
        let response = ActionResponse::failed(self.code(err.kind));
        if self.with_message {
            response.with_message(err.message.clone())
        } else {
            response
        }
    }

    pub fn success(&self, data: Payload) -> ActionResponse {
        let response = ActionResponse::ok(data);
        if self.with_message {
            response.with_message("")
        } else {
            response
        }
    }
}
