use url::Url;

use crate::{
    error::{CallError, CallErrorCategory},
    types::{AlertInfo, CallEvent},
};

/// Widget driver start result before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The widget started and serves the call page at `url`.
    Started { url: Url },
    /// The widget failed to start.
    Failed { error: CallError },
}

/// Convert a start outcome to the event the host should act on.
///
/// Failures collapse to one generic alert; the error detail is only logged.
pub fn normalize_start_outcome(outcome: StartOutcome) -> CallEvent {
    match outcome {
        StartOutcome::Started { url } => CallEvent::UrlResolved { url },
        StartOutcome::Failed { .. } => CallEvent::Alert(AlertInfo::widget_start_failed()),
    }
}

/// Re-categorize any driver error as a widget-start failure.
pub fn classify_start_error(error: CallError) -> CallError {
    CallError {
        category: CallErrorCategory::WidgetStart,
        ..error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_started_to_url_resolved() {
        let url = Url::parse("https://call.example/room1").expect("url");
        let event = normalize_start_outcome(StartOutcome::Started { url: url.clone() });
        assert_eq!(event, CallEvent::UrlResolved { url });
    }

    #[test]
    fn maps_failure_to_single_button_alert() {
        let event = normalize_start_outcome(StartOutcome::Failed {
            error: CallError::new(CallErrorCategory::WidgetStart, "start_failed", "no network"),
        });

        match event {
            CallEvent::Alert(alert) => {
                assert_eq!(alert.title, "error_unknown");
                assert_eq!(alert.primary_button, "action_ok");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn start_errors_become_user_visible() {
        let err = classify_start_error(CallError::new(
            CallErrorCategory::Internal,
            "driver_closed",
            "driver went away",
        ));
        assert_eq!(err.category, CallErrorCategory::WidgetStart);
        assert_eq!(err.code, "driver_closed");
        assert!(err.is_user_visible());
    }
}
