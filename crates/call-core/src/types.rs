use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// High-level call session lifecycle reported to the host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CallLifecyclePhase {
    /// Session constructed, call screen not yet activated.
    Uninitialized,
    /// Base URL resolution and widget driver start are in flight.
    StartingWidget,
    /// Widget is running and its page URL is known.
    Active,
    /// Active call continuing in a picture-in-picture window.
    PictureInPicture,
    /// Session dismissed or torn down.
    EndingOrDismissed,
}

/// Host color scheme forwarded to the widget on start.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ColorScheme {
    #[default]
    Light,
    Dark,
}

impl ColorScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

/// Action emitted by a widget driver about the running call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum WidgetDriverAction {
    /// The widget hung up or the call otherwise finished.
    CallEnded,
    /// The widget's own media devices changed state.
    MediaStateChanged {
        audio_enabled: bool,
        video_enabled: bool,
    },
}

/// The single user-visible failure: the widget could not be started.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertInfo {
    /// Identifier echoed back by `CallCommand::AcknowledgeAlert`.
    pub id: Uuid,
    /// Localizable title key.
    pub title: String,
    /// Localizable title key of the only button, which dismisses the screen.
    pub primary_button: String,
}

impl AlertInfo {
    pub fn widget_start_failed() -> Self {
        Self {
            id: Uuid::new_v4(),
            title: "error_unknown".to_owned(),
            primary_button: "action_ok".to_owned(),
        }
    }
}

/// Server-advertised client configuration (`.well-known/element/element.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ElementWellKnown {
    #[serde(default)]
    pub call: Option<ElementWellKnownCall>,
}

/// Call section of [`ElementWellKnown`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ElementWellKnownCall {
    /// Base URL of the call widget deployment to use for this server.
    pub widget_url: Url,
}

/// Command channel input accepted by the call session controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CallCommand {
    /// Call screen became visible; resolve the call URL and start the widget.
    Activate,
    /// The web view navigated.
    UrlChanged {
        /// New page URL, when the web view reports one.
        url: Option<Url>,
    },
    /// The host can now provide picture-in-picture.
    PictureInPictureIsAvailable,
    /// User navigated back from the call screen.
    NavigateBack,
    /// The picture-in-picture window is about to close.
    PictureInPictureWillStop,
    /// User pressed the end call control.
    EndCall,
    /// User acknowledged an alert previously emitted as `CallEvent::Alert`.
    AcknowledgeAlert { alert_id: Uuid },
    /// Raw widget API message posted by the embedded page.
    WidgetMessageReceived { message: String },
    /// Host is tearing the call down.
    Stop,
}

/// Event channel output emitted by the call session controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CallEvent {
    /// Lifecycle transition.
    StateChanged { phase: CallLifecyclePhase },
    /// The call page address is known and should be loaded.
    UrlResolved { url: Url },
    /// Show an alert to the user.
    Alert(AlertInfo),
    /// The call screen should be dismissed.
    Dismiss,
    /// Picture-in-picture became available.
    PictureInPictureIsAvailable,
    /// The call moved into a picture-in-picture window.
    PictureInPictureStarted,
    /// The picture-in-picture window closed.
    PictureInPictureStopped,
}
