use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::trace;

use crate::types::{CallCommand, CallEvent};

/// Receiver side of the controller's event fan-out.
pub type EventStream = broadcast::Receiver<CallEvent>;

#[derive(Debug, Error)]
pub enum CallChannelError {
    /// The controller exited; the rejected command is handed back.
    #[error("call session is no longer running; dropped {0:?}")]
    SessionClosed(Box<CallCommand>),
}

impl CallChannelError {
    pub fn into_command(self) -> CallCommand {
        match self {
            Self::SessionClosed(command) => *command,
        }
    }
}

/// Host-to-controller commands and controller-to-host events.
///
/// Commands are bounded and ordered. Events fan out to every subscriber and
/// are dropped when nobody listens.
#[derive(Clone, Debug)]
pub struct CallChannels {
    command_tx: mpsc::Sender<CallCommand>,
    event_tx: broadcast::Sender<CallEvent>,
}

impl CallChannels {
    pub fn new(command_buffer: usize, event_buffer: usize) -> (Self, mpsc::Receiver<CallCommand>) {
        let (command_tx, command_rx) = mpsc::channel(command_buffer.max(1));
        let (event_tx, _) = broadcast::channel(event_buffer.max(1));
        (
            Self {
                command_tx,
                event_tx,
            },
            command_rx,
        )
    }

    pub fn subscribe(&self) -> EventStream {
        self.event_tx.subscribe()
    }

    pub async fn send_command(&self, command: CallCommand) -> Result<(), CallChannelError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|err| CallChannelError::SessionClosed(Box::new(err.0)))
    }

    pub fn emit(&self, event: CallEvent) {
        if let Err(err) = self.event_tx.send(event) {
            trace!(event = ?err.0, "no call event subscribers");
        }
    }

    /// Whether the controller has dropped its command receiver.
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }
}
