use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::CallError, message::WidgetMessage};

/// Message forwarded by the injected listener script: the page's `postMessage`
/// payload plus the origin it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub data: Value,
    #[serde(default)]
    pub origin: String,
}

impl InboundEnvelope {
    /// Raw widget API JSON to hand to the widget driver.
    pub fn into_widget_json(self) -> Result<String, CallError> {
        Ok(serde_json::to_string(&self.data)?)
    }
}

/// Serialize a widget message to the JSON text posted into the page.
pub fn encode_message(message: &WidgetMessage) -> Result<String, CallError> {
    Ok(serde_json::to_string(message)?)
}

/// Parse a widget message. Unknown fields are ignored.
pub fn decode_message(text: &str) -> Result<WidgetMessage, CallError> {
    Ok(serde_json::from_str(text)?)
}

/// Parse the `{data, origin}` envelope delivered on the host message handler.
pub fn decode_inbound_envelope(text: &str) -> Result<InboundEnvelope, CallError> {
    Ok(serde_json::from_str(text)?)
}
