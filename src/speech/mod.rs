//! Voice input: a speech recognition session with pause/resume, a silence
//! timeout and bounded automatic retries for transient failures.

mod recognizer;
mod service;
mod session;
mod state;

pub use recognizer::{Recognizer, RecognizerBackend, RecognizerEvent, RecognizerEvents};
pub use service::{SpeechHandle, SpeechService};
pub use session::{Phase, SpeechAction, SpeechEvent, SpeechSession, StartGuards};
pub use state::{SpeechConfig, SpeechErrorKind, SpeechState};
