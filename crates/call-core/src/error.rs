use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::CallLifecyclePhase;

/// Broad error category used to decide whether a fault reaches the user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CallErrorCategory {
    /// Invalid configuration or URL construction.
    Config,
    /// Widget driver failed to start the call.
    WidgetStart,
    /// Script evaluation or host message delivery failure.
    Transport,
    /// Serialization/deserialization failure.
    Serialization,
    /// Picture-in-picture could not be entered.
    PictureInPicture,
    /// Internal bug or invariant break.
    Internal,
}

/// Stable error payload used across the call bridge crates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct CallError {
    /// High-level error category.
    pub category: CallErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl CallError {
    /// Construct a new call error.
    pub fn new(
        category: CallErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Build a standard invalid-state-transition error.
    pub fn invalid_state(current: CallLifecyclePhase, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            CallErrorCategory::Internal,
            "invalid_state_transition",
            format!("cannot run '{action}' while call session is in phase {current:?}"),
        )
    }

    /// Whether this error is ever surfaced to the user.
    ///
    /// Only widget-start failures are; everything else is logged and absorbed.
    pub fn is_user_visible(&self) -> bool {
        self.category == CallErrorCategory::WidgetStart
    }
}

impl From<serde_json::Error> for CallError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(
            CallErrorCategory::Serialization,
            "serde_json_error",
            err.to_string(),
        )
    }
}

impl From<url::ParseError> for CallError {
    fn from(err: url::ParseError) -> Self {
        Self::new(CallErrorCategory::Config, "invalid_url", err.to_string())
    }
}
