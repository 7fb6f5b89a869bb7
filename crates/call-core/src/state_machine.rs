use crate::{
    error::CallError,
    types::{CallEvent, CallLifecyclePhase},
};

/// Call session lifecycle state machine.
///
/// Every successful transition yields the `StateChanged` event to publish.
#[derive(Debug, Clone)]
pub struct CallStateMachine {
    phase: CallLifecyclePhase,
}

impl Default for CallStateMachine {
    fn default() -> Self {
        Self {
            phase: CallLifecyclePhase::Uninitialized,
        }
    }
}

impl CallStateMachine {
    pub fn phase(&self) -> CallLifecyclePhase {
        self.phase
    }

    /// Screen activation: begin resolving and starting the widget.
    pub fn begin_start(&mut self) -> Result<CallEvent, CallError> {
        self.transition_from_state(
            CallLifecyclePhase::Uninitialized,
            CallLifecyclePhase::StartingWidget,
            "activate",
        )
    }

    /// The widget driver started and the call page URL is known.
    pub fn on_widget_started(&mut self) -> Result<CallEvent, CallError> {
        self.transition_from_state(
            CallLifecyclePhase::StartingWidget,
            CallLifecyclePhase::Active,
            "widget_started",
        )
    }

    pub fn enter_picture_in_picture(&mut self) -> Result<CallEvent, CallError> {
        self.transition_from_state(
            CallLifecyclePhase::Active,
            CallLifecyclePhase::PictureInPicture,
            "enter_picture_in_picture",
        )
    }

    pub fn exit_picture_in_picture(&mut self) -> Result<CallEvent, CallError> {
        self.transition_from_state(
            CallLifecyclePhase::PictureInPicture,
            CallLifecyclePhase::Active,
            "exit_picture_in_picture",
        )
    }

    /// Dismiss or tear down from any live phase.
    ///
    /// Returns `None` when the session had already ended, so callers emit at
    /// most one dismissal.
    pub fn end(&mut self) -> Option<CallEvent> {
        if self.is_ended() {
            return None;
        }
        self.phase = CallLifecyclePhase::EndingOrDismissed;
        Some(CallEvent::StateChanged { phase: self.phase })
    }

    /// Whether messages may still flow between the widget and native side.
    pub fn accepts_widget_traffic(&self) -> bool {
        matches!(
            self.phase,
            CallLifecyclePhase::Active | CallLifecyclePhase::PictureInPicture
        )
    }

    pub fn is_ended(&self) -> bool {
        self.phase == CallLifecyclePhase::EndingOrDismissed
    }

    fn transition_from_state(
        &mut self,
        expected: CallLifecyclePhase,
        next: CallLifecyclePhase,
        action: &str,
    ) -> Result<CallEvent, CallError> {
        if self.phase != expected {
            return Err(CallError::invalid_state(self.phase, action));
        }
        self.phase = next;
        Ok(CallEvent::StateChanged { phase: next })
    }
}
