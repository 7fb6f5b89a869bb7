use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

const DIRECTION_TO_WIDGET: &str = "io.element.toWidget";
const DIRECTION_FROM_WIDGET: &str = "io.element.fromWidget";
const ACTION_MEDIA_STATE: &str = "io.element.device_mute";
const ACTION_HANGUP: &str = "im.vector.hangup";

/// Side that originated a widget message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WidgetDirection {
    #[serde(rename = "io.element.toWidget")]
    ToWidget,
    #[serde(rename = "io.element.fromWidget")]
    FromWidget,
}

impl WidgetDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToWidget => DIRECTION_TO_WIDGET,
            Self::FromWidget => DIRECTION_FROM_WIDGET,
        }
    }
}

/// Media device state carried by [`WidgetAction::MediaState`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MediaStateData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_enabled: Option<bool>,
}

/// Widget action together with its action-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetAction {
    /// Mute/unmute local devices (`io.element.device_mute`).
    MediaState(MediaStateData),
    /// Leave the call (`im.vector.hangup`).
    Hangup,
    /// Any action this crate does not interpret.
    Other(String),
}

impl WidgetAction {
    /// Wire name of the action.
    pub fn name(&self) -> &str {
        match self {
            Self::MediaState(_) => ACTION_MEDIA_STATE,
            Self::Hangup => ACTION_HANGUP,
            Self::Other(action) => action,
        }
    }
}

/// One message exchanged with the embedded call widget.
///
/// Wire shape:
/// `{"direction": "...", "requestId": "...", "action": "...", "data": {...}, "widgetId": "..."}`.
/// `data` is omitted when absent; `requestId` when empty.
///
/// `data` is the payload exactly as it travels on the wire, so a decoded
/// message re-encodes unchanged. `action` is its interpreted form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireMessage", into = "WireMessage")]
pub struct WidgetMessage {
    pub direction: WidgetDirection,
    pub request_id: String,
    pub action: WidgetAction,
    pub data: Option<Value>,
    pub widget_id: String,
}

impl WidgetMessage {
    /// Build a message with a fresh widget-API request id and the payload
    /// implied by `action`.
    pub fn new(
        direction: WidgetDirection,
        action: WidgetAction,
        widget_id: impl Into<String>,
    ) -> Self {
        let data = match &action {
            // A struct of optional bools always serializes.
            WidgetAction::MediaState(state) => serde_json::to_value(state).ok(),
            WidgetAction::Hangup | WidgetAction::Other(_) => None,
        };
        Self {
            direction,
            request_id: format!("widgetapi-{}", Uuid::new_v4()),
            action,
            data,
            widget_id: widget_id.into(),
        }
    }

    /// Replace the wire payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Ask the widget to change its microphone state.
    pub fn set_audio_enabled(enabled: bool, widget_id: impl Into<String>) -> Self {
        Self::new(
            WidgetDirection::ToWidget,
            WidgetAction::MediaState(MediaStateData {
                audio_enabled: Some(enabled),
                video_enabled: None,
            }),
            widget_id,
        )
    }

    /// Hangup request, phrased as if the widget itself asked to leave.
    pub fn hangup(widget_id: impl Into<String>) -> Self {
        Self::new(WidgetDirection::FromWidget, WidgetAction::Hangup, widget_id)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    direction: WidgetDirection,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    request_id: String,
    action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    widget_id: String,
}

impl From<WidgetMessage> for WireMessage {
    fn from(message: WidgetMessage) -> Self {
        let action = match message.action {
            WidgetAction::Other(action) => action,
            known => known.name().to_owned(),
        };

        Self {
            direction: message.direction,
            request_id: message.request_id,
            action,
            data: message.data,
            widget_id: message.widget_id,
        }
    }
}

impl TryFrom<WireMessage> for WidgetMessage {
    type Error = serde_json::Error;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let action = match wire.action.as_str() {
            ACTION_MEDIA_STATE => {
                let state = match &wire.data {
                    Some(data) => MediaStateData::deserialize(data)?,
                    None => MediaStateData::default(),
                };
                WidgetAction::MediaState(state)
            }
            ACTION_HANGUP => WidgetAction::Hangup,
            _ => WidgetAction::Other(wire.action),
        };

        Ok(Self {
            direction: wire.direction,
            request_id: wire.request_id,
            action,
            data: wire.data,
            widget_id: wire.widget_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_target_the_expected_direction() {
        let mute = WidgetMessage::set_audio_enabled(false, "w1");
        assert_eq!(mute.direction, WidgetDirection::ToWidget);
        assert_eq!(
            mute.action,
            WidgetAction::MediaState(MediaStateData {
                audio_enabled: Some(false),
                video_enabled: None,
            })
        );

        assert_eq!(mute.data, Some(serde_json::json!({"audioEnabled": false})));

        let hangup = WidgetMessage::hangup("w1");
        assert_eq!(hangup.data, None);
        assert_eq!(hangup.direction, WidgetDirection::FromWidget);
        assert_eq!(hangup.action.name(), "im.vector.hangup");
        assert_eq!(hangup.widget_id, "w1");
    }

    #[test]
    fn request_ids_are_unique_per_message() {
        let a = WidgetMessage::hangup("w1");
        let b = WidgetMessage::hangup("w1");
        assert!(a.request_id.starts_with("widgetapi-"));
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn direction_tokens_are_stable() {
        assert_eq!(WidgetDirection::ToWidget.as_str(), "io.element.toWidget");
        assert_eq!(WidgetDirection::FromWidget.as_str(), "io.element.fromWidget");
    }
}
