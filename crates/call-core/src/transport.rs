//! Script snippets exchanged with the host web view.

/// Message handler name registered by hosts that do not configure one.
pub const DEFAULT_MESSAGE_HANDLER_NAME: &str = "elementx";

/// Expression delivering `json` to the embedded page.
pub fn post_message_expression(json: &str) -> String {
    format!("postMessage({json}, '*')")
}

/// Listener script injected into the embedded page.
///
/// Forwards widget responses (`api == "toWidget"` with a `response`) and widget
/// requests (`api == "fromWidget"` without one) to the native handler as a
/// stringified `{data, origin}` envelope. Anything else, including the
/// messages the client posts itself, is skipped.
pub fn listener_injection_script(handler_name: &str) -> String {
    format!(
        r#"window.addEventListener(
    "message",
    (event) => {{
        let message = {{data: event.data, origin: event.origin}}
        if (message.data.response && message.data.api == "toWidget"
        || !message.data.response && message.data.api == "fromWidget") {{
            window.webkit.messageHandlers.{handler_name}.postMessage(JSON.stringify(message));
        }} else {{
            console.log("-- skipped event handling by the client because it is sent from the client itself.");
        }}
    }},
    false,
);"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_json_in_post_message_call() {
        assert_eq!(
            post_message_expression(r#"{"widgetId":"w1"}"#),
            r#"postMessage({"widgetId":"w1"}, '*')"#
        );
    }

    #[test]
    fn listener_targets_configured_handler() {
        let script = listener_injection_script("callbridge");
        assert!(script.contains("window.webkit.messageHandlers.callbridge.postMessage"));
        assert!(script.contains(r#"message.data.api == "toWidget""#));
        assert!(script.contains(r#"message.data.api == "fromWidget""#));
        assert!(script.contains("JSON.stringify(message)"));
        assert!(!script.contains("{{"));
    }
}
