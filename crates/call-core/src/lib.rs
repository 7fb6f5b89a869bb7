//! Core contract of the embedded call widget bridge.
//!
//! This crate defines the widget message model and codec, call configuration
//! and URL normalization, the call lifecycle state machine, the host
//! command/event protocol, and common error/channel abstractions.

/// Async command/event channel primitives.
pub mod channel;
/// JSON codec for widget messages and inbound host envelopes.
pub mod codec;
/// Call configuration and call URL normalization.
pub mod configuration;
/// Stable call error types.
pub mod error;
/// Widget message model.
pub mod message;
/// Widget start outcome normalization.
pub mod normalization;
/// Call session lifecycle state machine.
pub mod state_machine;
/// Page-side scripts for posting to and listening on the call widget.
pub mod transport;
/// Host-facing protocol types (commands, events, collaborator actions).
pub mod types;

pub use channel::{CallChannelError, CallChannels, EventStream};
pub use codec::{InboundEnvelope, decode_inbound_envelope, decode_message, encode_message};
pub use configuration::{
    CallConfiguration, CallConfigurationKind, RoomCallConfiguration, normalize_generic_call_link,
    with_call_type,
};
pub use error::{CallError, CallErrorCategory};
pub use message::{MediaStateData, WidgetAction, WidgetDirection, WidgetMessage};
pub use normalization::{StartOutcome, classify_start_error, normalize_start_outcome};
pub use state_machine::CallStateMachine;
pub use transport::{
    DEFAULT_MESSAGE_HANDLER_NAME, listener_injection_script, post_message_expression,
};
pub use types::{
    AlertInfo, CallCommand, CallEvent, CallLifecyclePhase, ColorScheme, ElementWellKnown,
    ElementWellKnownCall, WidgetDriverAction,
};
