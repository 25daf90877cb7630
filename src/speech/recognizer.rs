//! Boundary to the platform speech recognizer.
//!
//! The platform object is modelled as an exclusively owned handle with an
//! explicit lifecycle. Its callbacks are turned into `RecognizerEvent`s and
//! pushed through a `RecognizerEvents` sink; that sink is the only way
//! platform code talks back to the session.

use super::service::Input;
use super::state::SpeechConfig;
use anyhow::Result;
use tokio::sync::mpsc::WeakUnboundedSender;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    Ready,
    Partial(String),
    /// Final hypothesis; `None` when the recognizer produced no text.
    Final(Option<String>),
    EndOfSpeech,
    /// Raw platform error code.
    Error(i32),
}

/// One live platform recognizer.
pub trait Recognizer: Send {
    fn start(&mut self, config: &SpeechConfig) -> Result<()>;
    /// Stop listening; the instance stays usable for another `start`.
    fn stop(&mut self);
    /// Stop and discard any pending result.
    fn cancel(&mut self);
    /// Release the platform resources. The instance is dropped afterwards.
    fn destroy(&mut self);
}

/// Factory and capability checks for recognizers.
pub trait RecognizerBackend: Send + 'static {
    fn has_permission(&self) -> bool;
    fn is_available(&self) -> bool;
    fn create(&mut self, events: RecognizerEvents) -> Result<Box<dyn Recognizer>>;
}

/// Callback sink handed to each recognizer instance.
///
/// Events carry the instance number they were created for, so callbacks from
/// a released instance are recognized as stale and dropped.
#[derive(Debug, Clone)]
pub struct RecognizerEvents {
    tx: WeakUnboundedSender<Input>,
    instance: u64,
}

impl RecognizerEvents {
    pub(super) fn new(tx: WeakUnboundedSender<Input>, instance: u64) -> Self {
        Self { tx, instance }
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }

    /// Deliver one callback; returns `false` once the session is gone.
    pub fn emit(&self, event: RecognizerEvent) -> bool {
        let Some(tx) = self.tx.upgrade() else {
            trace!(instance = self.instance, "Dropping recognizer event for closed session");
            return false;
        };
        tx.send(Input::Recognizer {
            instance: self.instance,
            event,
        })
        .is_ok()
    }
}
