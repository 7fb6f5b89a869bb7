use serde::{Deserialize, Serialize};
use tracing::error;
use url::{Url, form_urlencoded};

use crate::{
    error::{CallError, CallErrorCategory},
    types::ColorScheme,
};

const APP_PROMPT_PARAM: &str = "appPrompt";
const CONFINE_TO_ROOM_PARAM: &str = "confineToRoom";
const CALL_TYPE_PARAM: &str = "call_type";

/// Room-backed call settings. The room and client sessions themselves are
/// referenced by id and passed separately to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomCallConfiguration {
    pub room_id: String,
    /// Identifies this client to the widget.
    pub client_id: String,
    /// Default widget deployment.
    pub base_url: Url,
    /// Takes precedence over both the well-known URL and `base_url`.
    pub base_url_override: Option<Url>,
    pub color_scheme: ColorScheme,
    /// Ring the other room members once the call is up.
    pub notify_other_participants: bool,
    pub is_audio_call: bool,
}

/// Which kind of call the screen is hosting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallConfigurationKind {
    /// Externally hosted call opened from a link.
    GenericCallLink { url: Url },
    /// Call attached to a joined room.
    RoomCall(RoomCallConfiguration),
}

/// Information about how a call should be configured. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallConfiguration {
    kind: CallConfigurationKind,
}

impl CallConfiguration {
    /// Configuration for an external call link.
    ///
    /// The link's fragment query is rewritten so the page never offers to open
    /// a native app and stays confined to the linked room. When the URL cannot
    /// carry a fragment query it is used unmodified.
    pub fn generic_call_link(url: Url) -> Self {
        let url = match normalize_generic_call_link(&url) {
            Ok(adjusted) => adjusted,
            Err(err) => {
                error!(%url, error = %err, "failed adjusting generic call link; using it as is");
                url
            }
        };

        Self {
            kind: CallConfigurationKind::GenericCallLink { url },
        }
    }

    /// Configuration for a call in a joined room.
    pub fn room_call(configuration: RoomCallConfiguration) -> Self {
        Self {
            kind: CallConfigurationKind::RoomCall(configuration),
        }
    }

    pub fn kind(&self) -> &CallConfigurationKind {
        &self.kind
    }

    /// Identifier native call management uses for this call: the link itself
    /// for generic calls, the room id otherwise.
    pub fn call_room_id(&self) -> &str {
        match &self.kind {
            CallConfigurationKind::GenericCallLink { url } => url.as_str(),
            CallConfigurationKind::RoomCall(room) => &room.room_id,
        }
    }
}

/// Force `appPrompt=false` and `confineToRoom=true` in the fragment query,
/// replacing any existing values and keeping every other item in order.
///
/// The fragment is read as `path?query`, so `#/room?x=1` keeps `/room`.
pub fn normalize_generic_call_link(url: &Url) -> Result<Url, CallError> {
    if url.cannot_be_a_base() {
        return Err(CallError::new(
            CallErrorCategory::Config,
            "call_link_not_hierarchical",
            format!("call link cannot carry a fragment query: {url}"),
        ));
    }

    let fragment = url.fragment().unwrap_or_default();
    let (fragment_path, fragment_query) = fragment.split_once('?').unwrap_or((fragment, ""));

    let mut items = form_urlencoded::parse(fragment_query.as_bytes())
        .into_owned()
        .filter(|(name, _)| name != APP_PROMPT_PARAM && name != CONFINE_TO_ROOM_PARAM)
        .collect::<Vec<_>>();
    items.push((APP_PROMPT_PARAM.to_owned(), "false".to_owned()));
    items.push((CONFINE_TO_ROOM_PARAM.to_owned(), "true".to_owned()));

    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(items)
        .finish();

    let mut adjusted = url.clone();
    adjusted.set_fragment(Some(&format!("{fragment_path}?{query}")));
    Ok(adjusted)
}

/// Append the call type marker to a widget URL.
///
/// The marker is appended textually (`<url>&call_type=audio`), matching what
/// the widget parses. Falls back to the unmodified URL if the result does not
/// parse.
pub fn with_call_type(url: &Url, is_audio_call: bool) -> Url {
    let call_type = if is_audio_call { "audio" } else { "video" };
    let candidate = format!("{url}&{CALL_TYPE_PARAM}={call_type}");
    match Url::parse(&candidate) {
        Ok(adjusted) => adjusted,
        Err(err) => {
            error!(%url, error = %err, "invalid call url after adding call type");
            url.clone()
        }
    }
}
