use std::sync::Arc;

use async_trait::async_trait;
use call_core::{
    CallChannelError, CallChannels, CallCommand, CallConfiguration, CallConfigurationKind,
    CallError, CallErrorCategory, CallEvent, CallLifecyclePhase, CallStateMachine, ColorScheme,
    DEFAULT_MESSAGE_HANDLER_NAME, ElementWellKnown, EventStream, RoomCallConfiguration,
    StartOutcome, WidgetDriverAction, WidgetMessage, classify_start_error,
    decode_inbound_envelope, decode_message, encode_message, listener_injection_script,
    normalize_start_outcome, post_message_expression, with_call_type,
};
use call_platform::{
    CallService, CallServiceAction, EvaluationError, PictureInPictureError,
    PictureInPictureHandler, ScriptEvaluator,
};
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;
use uuid::Uuid;

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;
const COMPLETION_BUFFER: usize = 16;
const DRIVER_STREAM_BUFFER: usize = 64;

/// Embedded call widget driver. Owns the widget API conversation; its media
/// logic is opaque to the controller.
#[async_trait]
pub trait WidgetDriver: Send + Sync {
    fn widget_id(&self) -> &str;

    /// Start the widget and return the page URL to load.
    async fn start(
        &self,
        base_url: &Url,
        client_id: &str,
        color_scheme: ColorScheme,
    ) -> Result<Url, CallError>;

    /// Raw widget API JSON posted by the embedded page.
    async fn handle_message(&self, message: String);

    /// Raw widget API JSON the driver wants delivered to the page.
    fn subscribe_messages(&self) -> broadcast::Receiver<String>;

    fn subscribe_actions(&self) -> broadcast::Receiver<WidgetDriverAction>;
}

/// Joined room the call belongs to.
#[async_trait]
pub trait RoomProxy: Send + Sync {
    fn id(&self) -> &str;

    fn display_name(&self) -> Option<String>;

    /// Widget driver bound to this room for the given device.
    fn widget_driver(&self, device_id: &str) -> Result<Arc<dyn WidgetDriver>, CallError>;

    /// Ring the other members, unless a call is already ongoing.
    async fn send_call_notification_if_needed(&self) -> Result<(), CallError>;
}

/// Logged-in client session.
#[async_trait]
pub trait ClientProxy: Send + Sync {
    fn device_id(&self) -> Option<String>;

    async fn element_well_known(&self) -> Result<Option<ElementWellKnown>, CallError>;
}

/// Driver for externally hosted calls: the page at the link is the widget.
///
/// It has no widget API conversation of its own, so its streams never yield.
pub struct GenericCallLinkWidgetDriver {
    widget_id: String,
    url: Url,
    message_tx: broadcast::Sender<String>,
    action_tx: broadcast::Sender<WidgetDriverAction>,
}

impl GenericCallLinkWidgetDriver {
    pub fn new(url: Url) -> Self {
        let (message_tx, _) = broadcast::channel(1);
        let (action_tx, _) = broadcast::channel(1);
        Self {
            widget_id: Uuid::new_v4().to_string(),
            url,
            message_tx,
            action_tx,
        }
    }
}

#[async_trait]
impl WidgetDriver for GenericCallLinkWidgetDriver {
    fn widget_id(&self) -> &str {
        &self.widget_id
    }

    async fn start(
        &self,
        _base_url: &Url,
        _client_id: &str,
        _color_scheme: ColorScheme,
    ) -> Result<Url, CallError> {
        Ok(self.url.clone())
    }

    async fn handle_message(&self, message: String) {
        trace!(
            len = message.len(),
            "generic call link driver ignores widget api traffic"
        );
    }

    fn subscribe_messages(&self) -> broadcast::Receiver<String> {
        self.message_tx.subscribe()
    }

    fn subscribe_actions(&self) -> broadcast::Receiver<WidgetDriverAction> {
        self.action_tx.subscribe()
    }
}

/// Room and client sessions backing a room call.
#[derive(Clone)]
pub struct RoomSession {
    pub room: Arc<dyn RoomProxy>,
    pub client: Arc<dyn ClientProxy>,
}

/// Capabilities injected by the host. The controller only invokes them.
#[derive(Clone)]
pub struct CallSessionHost {
    pub call_service: Arc<dyn CallService>,
    pub script_evaluator: Arc<dyn ScriptEvaluator>,
    pub picture_in_picture: Option<Arc<dyn PictureInPictureHandler>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSessionOptions {
    pub allow_picture_in_picture: bool,
    /// Name of the web view message handler the listener script posts to.
    pub message_handler_name: String,
}

impl Default for CallSessionOptions {
    fn default() -> Self {
        Self {
            allow_picture_in_picture: false,
            message_handler_name: DEFAULT_MESSAGE_HANDLER_NAME.to_owned(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CallSessionHandle {
    channels: CallChannels,
    widget_id: String,
    message_handler_name: String,
}

impl CallSessionHandle {
    pub async fn send(&self, command: CallCommand) -> Result<(), CallChannelError> {
        self.channels.send_command(command).await
    }

    pub fn subscribe(&self) -> EventStream {
        self.channels.subscribe()
    }

    pub fn widget_id(&self) -> &str {
        &self.widget_id
    }

    pub fn is_running(&self) -> bool {
        !self.channels.is_closed()
    }

    pub fn message_handler_name(&self) -> &str {
        &self.message_handler_name
    }

    /// Script the host injects into the call page at document start.
    pub fn listener_script(&self) -> String {
        listener_injection_script(&self.message_handler_name)
    }

    /// Entry point for the host's web view message handler.
    ///
    /// `raw` is the stringified `{data, origin}` envelope produced by the
    /// listener script. Malformed envelopes are logged and dropped.
    pub async fn deliver_script_message(&self, raw: &str) -> Result<(), CallError> {
        let envelope = decode_inbound_envelope(raw).inspect_err(|err| {
            warn!(error = %err, "dropping malformed message from call page");
        })?;
        trace!(origin = %envelope.origin, "message from call page");

        let message = envelope.into_widget_json()?;
        self.send(CallCommand::WidgetMessageReceived { message })
            .await
            .map_err(map_channel_error)
    }
}

/// Build the controller for one call screen and spawn it.
///
/// Room calls need `room_session`; its client must know its device id.
pub fn spawn_call_session(
    configuration: CallConfiguration,
    room_session: Option<RoomSession>,
    host: CallSessionHost,
    options: CallSessionOptions,
) -> Result<CallSessionHandle, CallError> {
    let (kind, driver) = session_kind(&configuration, room_session)?;
    let (channels, command_rx) = CallChannels::new(COMMAND_BUFFER, EVENT_BUFFER);
    let (completion_tx, completion_rx) = mpsc::channel(COMPLETION_BUFFER);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    tokio::spawn(pump_outbound_messages(
        host.script_evaluator.clone(),
        outbound_rx,
    ));
    tokio::spawn(pump_inbound_messages(driver.clone(), inbound_rx));

    let handle = CallSessionHandle {
        channels: channels.clone(),
        widget_id: driver.widget_id().to_owned(),
        message_handler_name: options.message_handler_name,
    };

    let session = CallSession {
        channels,
        command_rx,
        completion_tx,
        completion_rx,
        driver_messages: Some(driver.subscribe_messages()),
        driver_actions: Some(driver.subscribe_actions()),
        service_actions: Some(host.call_service.subscribe_actions()),
        state_machine: CallStateMachine::default(),
        configuration,
        kind,
        driver,
        host,
        allow_picture_in_picture: options.allow_picture_in_picture,
        url: None,
        pending_alert: None,
        picture_in_picture_requested: false,
        widget_reported_end: false,
        outbound_tx,
        inbound_tx,
        shutdown: CancellationToken::new(),
    };
    info!(
        widget_id = %handle.widget_id,
        call_room_id = %session.configuration.call_room_id(),
        "spawning call session"
    );
    tokio::spawn(session.run());

    Ok(handle)
}

/// Effective widget base URL: explicit override, then the server-advertised
/// call URL, then the configured default. Lookup failures fall back silently.
pub async fn resolve_base_url(config: &RoomCallConfiguration, client: &dyn ClientProxy) -> Url {
    if let Some(url) = &config.base_url_override {
        return url.clone();
    }

    match client.element_well_known().await {
        Ok(Some(ElementWellKnown {
            call: Some(call), ..
        })) => call.widget_url,
        Ok(_) => config.base_url.clone(),
        Err(err) => {
            warn!(error = %err, "well-known lookup failed; using configured call url");
            config.base_url.clone()
        }
    }
}

enum SessionKind {
    GenericCallLink {
        url: Url,
    },
    RoomCall {
        config: RoomCallConfiguration,
        session: RoomSession,
    },
}

#[derive(Debug)]
enum Completion {
    WidgetStarted(StartOutcome),
    PictureInPictureResolved(Result<(), PictureInPictureError>),
}

struct CallSession {
    channels: CallChannels,
    command_rx: mpsc::Receiver<CallCommand>,
    completion_tx: mpsc::Sender<Completion>,
    completion_rx: mpsc::Receiver<Completion>,
    driver_messages: Option<broadcast::Receiver<String>>,
    driver_actions: Option<broadcast::Receiver<WidgetDriverAction>>,
    service_actions: Option<broadcast::Receiver<CallServiceAction>>,
    state_machine: CallStateMachine,
    configuration: CallConfiguration,
    kind: SessionKind,
    driver: Arc<dyn WidgetDriver>,
    host: CallSessionHost,
    allow_picture_in_picture: bool,
    url: Option<Url>,
    pending_alert: Option<Uuid>,
    picture_in_picture_requested: bool,
    widget_reported_end: bool,
    outbound_tx: mpsc::UnboundedSender<String>,
    /// Page messages for the driver, handed over in arrival order.
    inbound_tx: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
}

impl CallSession {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                Some(completion) = self.completion_rx.recv() => {
                    self.handle_completion(completion);
                }
                action = next_broadcast(&mut self.driver_actions, "widget_driver_actions") => {
                    self.handle_driver_action(action);
                }
                message = next_broadcast(&mut self.driver_messages, "widget_driver_messages") => {
                    self.forward_driver_message(message);
                }
                action = next_broadcast(&mut self.service_actions, "call_service_actions") => {
                    self.handle_call_service_action(action);
                }
                command = self.command_rx.recv() => {
                    let Some(command) = command else {
                        debug!("all call session handles dropped; stopping");
                        self.handle_stop();
                        break;
                    };

                    let stop = matches!(command, CallCommand::Stop);
                    if let Err(err) = self.handle_command(command) {
                        warn!(code = %err.code, error = %err, "call command rejected");
                    }
                    if stop {
                        break;
                    }
                }
            }
        }

        debug!(widget_id = %self.driver.widget_id(), "call session controller exited");
    }

    fn handle_command(&mut self, command: CallCommand) -> Result<(), CallError> {
        match command {
            CallCommand::Activate => self.handle_activate(),
            CallCommand::UrlChanged { url } => {
                if let Some(url) = url {
                    debug!(%url, "call page url changed");
                }
                Ok(())
            }
            CallCommand::PictureInPictureIsAvailable => {
                self.channels.emit(CallEvent::PictureInPictureIsAvailable);
                Ok(())
            }
            CallCommand::NavigateBack => {
                self.handle_navigate_back();
                Ok(())
            }
            CallCommand::PictureInPictureWillStop => self.handle_picture_in_picture_will_stop(),
            CallCommand::EndCall => {
                self.dismiss("end_call");
                Ok(())
            }
            CallCommand::AcknowledgeAlert { alert_id } => self.handle_acknowledge_alert(alert_id),
            CallCommand::WidgetMessageReceived { message } => {
                self.handle_page_message(message);
                Ok(())
            }
            CallCommand::Stop => {
                self.handle_stop();
                Ok(())
            }
        }
    }

    fn handle_activate(&mut self) -> Result<(), CallError> {
        let event = self.state_machine.begin_start()?;
        self.channels.emit(event);

        let driver = self.driver.clone();
        let completion_tx = self.completion_tx.clone();
        let plan = match &self.kind {
            SessionKind::GenericCallLink { url } => StartPlan::GenericCallLink { url: url.clone() },
            SessionKind::RoomCall { config, session } => StartPlan::RoomCall {
                config: config.clone(),
                client: session.client.clone(),
            },
        };

        tokio::spawn(async move {
            let outcome = start_widget(driver, plan).await;
            if completion_tx
                .send(Completion::WidgetStarted(outcome))
                .await
                .is_err()
            {
                debug!("call session gone before widget start finished");
            }
        });
        Ok(())
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::WidgetStarted(outcome) => self.handle_widget_started(outcome),
            Completion::PictureInPictureResolved(result) => {
                self.handle_picture_in_picture_resolved(result)
            }
        }
    }

    fn handle_widget_started(&mut self, outcome: StartOutcome) {
        if self.state_machine.phase() != CallLifecyclePhase::StartingWidget {
            debug!(phase = ?self.state_machine.phase(), "ignoring late widget start result");
            return;
        }

        match outcome {
            StartOutcome::Started { url } => {
                if let Ok(event) = self.state_machine.on_widget_started() {
                    self.channels.emit(event);
                }
                info!(%url, "call widget started");
                self.url = Some(url.clone());
                self.channels
                    .emit(normalize_start_outcome(StartOutcome::Started { url }));
                self.spawn_call_session_setup();
            }
            StartOutcome::Failed { error } => {
                error!(code = %error.code, error = %error, "failed starting call widget driver");
                let event = normalize_start_outcome(StartOutcome::Failed { error });
                if let CallEvent::Alert(alert) = &event {
                    self.pending_alert = Some(alert.id);
                }
                self.channels.emit(event);
            }
        }
    }

    fn spawn_call_session_setup(&self) {
        let SessionKind::RoomCall { config, session } = &self.kind else {
            return;
        };

        let call_service = self.host.call_service.clone();
        let room = session.room.clone();
        let notify_other_participants = config.notify_other_participants;
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            if shutdown.is_cancelled() {
                return;
            }

            let room_id = room.id().to_owned();
            let display_name = room.display_name().unwrap_or_else(|| room_id.clone());
            call_service
                .setup_call_session(&room_id, &display_name)
                .await;

            if notify_other_participants
                && !shutdown.is_cancelled()
                && let Err(err) = room.send_call_notification_if_needed().await
            {
                warn!(%room_id, error = %err, "failed sending call notification");
            }
        });
    }

    fn handle_navigate_back(&mut self) {
        if self.picture_in_picture_requested
            || self.state_machine.phase() == CallLifecyclePhase::PictureInPicture
        {
            debug!("picture-in-picture already requested or active; ignoring back navigation");
            return;
        }

        let handler = match (
            &self.url,
            self.allow_picture_in_picture,
            &self.host.picture_in_picture,
        ) {
            (Some(_), true, Some(handler)) => handler.clone(),
            _ => {
                self.dismiss("navigate_back");
                return;
            }
        };

        self.picture_in_picture_requested = true;
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = handler.request_picture_in_picture().await;
            let _ = completion_tx
                .send(Completion::PictureInPictureResolved(result))
                .await;
        });
    }

    fn handle_picture_in_picture_resolved(&mut self, result: Result<(), PictureInPictureError>) {
        self.picture_in_picture_requested = false;
        if self.state_machine.is_ended() {
            debug!("ignoring picture-in-picture result after dismissal");
            return;
        }

        if let Err(err) = result {
            let err = map_picture_in_picture_error(err);
            info!(error = %err, "picture-in-picture unavailable; dismissing");
            self.dismiss("picture_in_picture_failed");
            return;
        }

        match self.state_machine.enter_picture_in_picture() {
            Ok(event) => {
                self.channels.emit(event);
                self.channels.emit(CallEvent::PictureInPictureStarted);
            }
            Err(err) => warn!(error = %err, "picture-in-picture started in unexpected phase"),
        }
    }

    fn handle_picture_in_picture_will_stop(&mut self) -> Result<(), CallError> {
        self.channels.emit(CallEvent::PictureInPictureStopped);
        let event = self.state_machine.exit_picture_in_picture()?;
        self.channels.emit(event);
        Ok(())
    }

    fn handle_acknowledge_alert(&mut self, alert_id: Uuid) -> Result<(), CallError> {
        if self.pending_alert != Some(alert_id) {
            return Err(CallError::new(
                CallErrorCategory::Internal,
                "unknown_alert",
                format!("no pending alert with id {alert_id}"),
            ));
        }

        self.pending_alert = None;
        self.dismiss("widget_start_failed");
        Ok(())
    }

    fn handle_page_message(&mut self, message: String) {
        if self.state_machine.is_ended() {
            debug!("dropping call page message after dismissal");
            return;
        }

        match decode_message(&message) {
            Ok(decoded) => trace!(action = decoded.action.name(), "widget message from call page"),
            Err(_) => trace!(len = message.len(), "widget api message from call page"),
        }
        if self.inbound_tx.send(message).is_err() {
            error!("widget driver pump is gone; dropping call page message");
        }
    }

    fn handle_driver_action(&mut self, action: WidgetDriverAction) {
        match action {
            WidgetDriverAction::CallEnded => {
                self.widget_reported_end = true;
                self.dismiss("widget_call_ended");
            }
            WidgetDriverAction::MediaStateChanged {
                audio_enabled,
                video_enabled,
            } => {
                debug!(audio_enabled, video_enabled, "widget media state changed");
                self.host
                    .call_service
                    .set_audio_enabled(audio_enabled, self.configuration.call_room_id());
            }
        }
    }

    fn forward_driver_message(&mut self, message: String) {
        if self.state_machine.is_ended() {
            debug!("dropping widget driver message after dismissal");
            return;
        }
        self.post_json(message);
    }

    fn handle_call_service_action(&mut self, action: CallServiceAction) {
        match action {
            CallServiceAction::SetAudioEnabled { enabled, room_id } => {
                let expected = self.configuration.call_room_id();
                if room_id != expected {
                    error!(%room_id, %expected, "received mute request for a different room");
                    return;
                }
                if !self.state_machine.accepts_widget_traffic() {
                    debug!(phase = ?self.state_machine.phase(), "ignoring mute request outside an active call");
                    return;
                }

                debug!(enabled, "forwarding mute request to widget");
                self.post_message(&WidgetMessage::set_audio_enabled(
                    enabled,
                    self.driver.widget_id(),
                ));
            }
        }
    }

    fn handle_stop(&mut self) {
        if self.widget_reported_end {
            debug!("widget already ended the call; skipping hangup");
        } else {
            self.post_message(&WidgetMessage::hangup(self.driver.widget_id()));
        }

        self.host.call_service.tear_down_call_session();
        if let Some(event) = self.state_machine.end() {
            self.channels.emit(event);
        }
        self.shutdown.cancel();
    }

    /// Emit the dismissal at most once per session.
    fn dismiss(&mut self, reason: &'static str) {
        let Some(event) = self.state_machine.end() else {
            debug!(reason, "call screen already dismissed");
            return;
        };

        info!(reason, "dismissing call screen");
        self.channels.emit(event);
        self.channels.emit(CallEvent::Dismiss);
    }

    fn post_message(&self, message: &WidgetMessage) {
        match encode_message(message) {
            Ok(json) => self.post_json(json),
            Err(err) => error!(error = %err, "failed encoding widget message"),
        }
    }

    fn post_json(&self, json: String) {
        if self.outbound_tx.send(json).is_err() {
            error!("widget message pump is gone; dropping message");
        }
    }
}

enum StartPlan {
    GenericCallLink {
        url: Url,
    },
    RoomCall {
        config: RoomCallConfiguration,
        client: Arc<dyn ClientProxy>,
    },
}

async fn start_widget(driver: Arc<dyn WidgetDriver>, plan: StartPlan) -> StartOutcome {
    let result = match &plan {
        StartPlan::GenericCallLink { url } => {
            driver.start(url, "", ColorScheme::default()).await
        }
        StartPlan::RoomCall { config, client } => {
            let base_url = resolve_base_url(config, client.as_ref()).await;
            debug!(
                %base_url,
                client_id = %config.client_id,
                color_scheme = config.color_scheme.as_str(),
                "starting call widget driver"
            );
            driver
                .start(&base_url, &config.client_id, config.color_scheme)
                .await
                .map(|url| with_call_type(&url, config.is_audio_call))
        }
    };

    match result {
        Ok(url) => StartOutcome::Started { url },
        Err(error) => StartOutcome::Failed {
            error: classify_start_error(error),
        },
    }
}

/// Hand page messages to the driver in order, off the controller task.
async fn pump_inbound_messages(
    driver: Arc<dyn WidgetDriver>,
    mut inbound_rx: mpsc::UnboundedReceiver<String>,
) {
    while let Some(message) = inbound_rx.recv().await {
        driver.handle_message(message).await;
    }
}

/// Deliver outbound widget JSON to the page in order, one evaluation at a time.
async fn pump_outbound_messages(
    evaluator: Arc<dyn ScriptEvaluator>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
) {
    while let Some(json) = outbound_rx.recv().await {
        match evaluator.evaluate(&post_message_expression(&json)).await {
            Ok(result) => debug!(%json, %result, "evaluated widget message"),
            Err(err) => {
                let err = map_evaluation_error(err);
                error!(code = %err.code, error = %err, "widget message delivery failed");
            }
        }
    }
}

async fn next_broadcast<T: Clone>(
    receiver: &mut Option<broadcast::Receiver<T>>,
    source: &'static str,
) -> T {
    loop {
        let Some(rx) = receiver.as_mut() else {
            return std::future::pending().await;
        };

        match rx.recv().await {
            Ok(value) => return value,
            Err(RecvError::Lagged(skipped)) => {
                warn!(source, skipped, "call session lagged behind event source");
            }
            Err(RecvError::Closed) => {
                debug!(source, "event source closed");
                *receiver = None;
            }
        }
    }
}

fn session_kind(
    configuration: &CallConfiguration,
    room_session: Option<RoomSession>,
) -> Result<(SessionKind, Arc<dyn WidgetDriver>), CallError> {
    match configuration.kind() {
        CallConfigurationKind::GenericCallLink { url } => {
            let driver: Arc<dyn WidgetDriver> =
                Arc::new(GenericCallLinkWidgetDriver::new(url.clone()));
            Ok((SessionKind::GenericCallLink { url: url.clone() }, driver))
        }
        CallConfigurationKind::RoomCall(config) => {
            let session = room_session.ok_or_else(|| {
                CallError::new(
                    CallErrorCategory::Config,
                    "room_session_missing",
                    format!("room call for {} needs a room session", config.room_id),
                )
            })?;
            let device_id = session.client.device_id().ok_or_else(|| {
                CallError::new(
                    CallErrorCategory::Config,
                    "missing_device_id",
                    "client has no device id; cannot join a room call",
                )
            })?;
            let driver = session.room.widget_driver(&device_id)?;

            Ok((
                SessionKind::RoomCall {
                    config: config.clone(),
                    session,
                },
                driver,
            ))
        }
    }
}

fn map_evaluation_error(err: EvaluationError) -> CallError {
    match err {
        EvaluationError::Unavailable(message) => CallError::new(
            CallErrorCategory::Transport,
            "script_evaluator_unavailable",
            message,
        ),
        EvaluationError::Script(message) => {
            CallError::new(CallErrorCategory::Transport, "script_evaluation_failed", message)
        }
    }
}

fn map_picture_in_picture_error(err: PictureInPictureError) -> CallError {
    CallError::new(
        CallErrorCategory::PictureInPicture,
        "picture_in_picture_failed",
        err.to_string(),
    )
}

fn map_channel_error(err: CallChannelError) -> CallError {
    CallError::new(
        CallErrorCategory::Internal,
        "call_session_closed",
        err.to_string(),
    )
}
