use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

const ACTION_BUFFER: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("script evaluator unavailable: {0}")]
    Unavailable(String),
    #[error("script raised an exception: {0}")]
    Script(String),
}

/// Host web view script evaluation.
#[async_trait]
pub trait ScriptEvaluator: Send + Sync {
    async fn evaluate(&self, script: &str) -> Result<Value, EvaluationError>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PictureInPictureError {
    #[error("picture-in-picture is not possible right now")]
    NotPossible,
    #[error("picture-in-picture failed: {0}")]
    Failed(String),
}

/// Host hook that moves the call surface into a floating window.
#[async_trait]
pub trait PictureInPictureHandler: Send + Sync {
    async fn request_picture_in_picture(&self) -> Result<(), PictureInPictureError>;
}

/// Action emitted by the native call-management service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallServiceAction {
    /// System UI asked to mute or unmute the call in `room_id`.
    SetAudioEnabled { enabled: bool, room_id: String },
}

/// Native call management (system call UI, audio session).
#[async_trait]
pub trait CallService: Send + Sync {
    async fn setup_call_session(&self, room_id: &str, room_display_name: &str);

    fn tear_down_call_session(&self);

    /// Keep the system call indicator in sync with the widget's microphone.
    fn set_audio_enabled(&self, enabled: bool, room_id: &str);

    fn subscribe_actions(&self) -> broadcast::Receiver<CallServiceAction>;
}

/// Script evaluator that records every script and answers with a fixed result.
#[derive(Clone, Default)]
pub struct RecordingScriptEvaluator {
    scripts: Arc<Mutex<Vec<String>>>,
    failure: Option<EvaluationError>,
}

impl RecordingScriptEvaluator {
    /// Evaluator whose every evaluation fails with `error` (after recording).
    pub fn failing(error: EvaluationError) -> Self {
        Self {
            scripts: Arc::default(),
            failure: Some(error),
        }
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts
            .lock()
            .map(|scripts| scripts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ScriptEvaluator for RecordingScriptEvaluator {
    async fn evaluate(&self, script: &str) -> Result<Value, EvaluationError> {
        self.scripts
            .lock()
            .map_err(|_| EvaluationError::Unavailable("poisoned lock".to_owned()))?
            .push(script.to_owned());
        debug!(script_len = script.len(), "recorded script evaluation");

        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(Value::Null),
        }
    }
}

/// Picture-in-picture handler with a preset answer.
#[derive(Clone)]
pub struct StaticPictureInPicture {
    outcome: Result<(), PictureInPictureError>,
    requests: Arc<Mutex<usize>>,
}

impl StaticPictureInPicture {
    pub fn succeeding() -> Self {
        Self::with_outcome(Ok(()))
    }

    pub fn failing(error: PictureInPictureError) -> Self {
        Self::with_outcome(Err(error))
    }

    fn with_outcome(outcome: Result<(), PictureInPictureError>) -> Self {
        Self {
            outcome,
            requests: Arc::default(),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|count| *count).unwrap_or_default()
    }
}

#[async_trait]
impl PictureInPictureHandler for StaticPictureInPicture {
    async fn request_picture_in_picture(&self) -> Result<(), PictureInPictureError> {
        if let Ok(mut count) = self.requests.lock() {
            *count += 1;
        }
        self.outcome.clone()
    }
}

/// One call received by [`RecordingCallService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCallServiceCall {
    SetupCallSession {
        room_id: String,
        room_display_name: String,
    },
    TearDownCallSession,
    SetAudioEnabled {
        enabled: bool,
        room_id: String,
    },
}

/// In-memory call service recording every call and replaying injected actions.
#[derive(Clone)]
pub struct RecordingCallService {
    calls: Arc<Mutex<Vec<RecordedCallServiceCall>>>,
    action_tx: broadcast::Sender<CallServiceAction>,
}

impl Default for RecordingCallService {
    fn default() -> Self {
        let (action_tx, _) = broadcast::channel(ACTION_BUFFER);
        Self {
            calls: Arc::default(),
            action_tx,
        }
    }
}

impl RecordingCallService {
    pub fn calls(&self) -> Vec<RecordedCallServiceCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Publish an action as if the system call UI produced it.
    pub fn send_action(&self, action: CallServiceAction) {
        let _ = self.action_tx.send(action);
    }

    fn record(&self, call: RecordedCallServiceCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl CallService for RecordingCallService {
    async fn setup_call_session(&self, room_id: &str, room_display_name: &str) {
        self.record(RecordedCallServiceCall::SetupCallSession {
            room_id: room_id.to_owned(),
            room_display_name: room_display_name.to_owned(),
        });
    }

    fn tear_down_call_session(&self) {
        self.record(RecordedCallServiceCall::TearDownCallSession);
    }

    fn set_audio_enabled(&self, enabled: bool, room_id: &str) {
        self.record(RecordedCallServiceCall::SetAudioEnabled {
            enabled,
            room_id: room_id.to_owned(),
        });
    }

    fn subscribe_actions(&self) -> broadcast::Receiver<CallServiceAction> {
        self.action_tx.subscribe()
    }
}
