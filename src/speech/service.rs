//! Tokio driver around `SpeechSession`.
//!
//! All inputs (caller commands, recognizer callbacks, timer expirations) are
//! funnelled through one unbounded channel and applied in arrival order by a
//! single task, so the session never sees concurrent transitions.

use super::recognizer::{Recognizer, RecognizerBackend, RecognizerEvent, RecognizerEvents};
use super::session::{SpeechAction, SpeechEvent, SpeechSession, StartGuards};
use super::state::{SpeechConfig, SpeechErrorKind, SpeechState};
use crate::config::AppConfig;
use anyhow::{Result, anyhow};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone)]
pub(crate) enum Command {
    Start(Option<SpeechConfig>),
    Pause,
    Resume,
    Stop,
    Cancel,
    Reset,
    Destroy,
}

#[derive(Debug)]
pub(crate) enum Input {
    Command(Command),
    Recognizer { instance: u64, event: RecognizerEvent },
    TimeoutElapsed { generation: u64 },
    RetryElapsed { generation: u64 },
}

/// Caller side of a running speech service.
#[derive(Debug, Clone)]
pub struct SpeechHandle {
    tx: mpsc::UnboundedSender<Input>,
    states: broadcast::Sender<SpeechState>,
    current: watch::Receiver<SpeechState>,
}

impl SpeechHandle {
    /// Begin listening with the service defaults.
    pub fn start(&self) -> Result<()> {
        self.send(Command::Start(None))
    }

    pub fn start_with(&self, config: SpeechConfig) -> Result<()> {
        self.send(Command::Start(Some(config)))
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.send(Command::Resume)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    pub fn cancel(&self) -> Result<()> {
        self.send(Command::Cancel)
    }

    pub fn reset(&self) -> Result<()> {
        self.send(Command::Reset)
    }

    /// Release everything; the service stops after this.
    pub fn destroy(&self) -> Result<()> {
        self.send(Command::Destroy)
    }

    /// Every emission from now on, including transient partials.
    pub fn subscribe(&self) -> broadcast::Receiver<SpeechState> {
        self.states.subscribe()
    }

    /// Most recent emission.
    pub fn current(&self) -> SpeechState {
        self.current.borrow().clone()
    }

    /// Resolves once the service loop has exited.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(Input::Command(command))
            .map_err(|_| anyhow!("speech service has shut down"))
    }
}

pub struct SpeechService<B: RecognizerBackend> {
    backend: B,
    defaults: SpeechConfig,
    session: SpeechSession,
    recognizer: Option<Box<dyn Recognizer>>,
    instance: u64,
    timeout_task: Option<JoinHandle<()>>,
    retry_task: Option<JoinHandle<()>>,
    inbox: mpsc::UnboundedReceiver<Input>,
    loopback: mpsc::WeakUnboundedSender<Input>,
    states: broadcast::Sender<SpeechState>,
    current: watch::Sender<SpeechState>,
}

impl<B: RecognizerBackend> SpeechService<B> {
    /// Start the service loop on the current runtime.
    ///
    /// `buffer` bounds how many emissions a slow subscriber may lag behind
    /// before it starts missing states.
    pub fn spawn(backend: B, defaults: SpeechConfig, buffer: usize) -> SpeechHandle {
        let (tx, inbox) = mpsc::unbounded_channel();
        let (states, _) = broadcast::channel(buffer.max(1));
        let (current, current_rx) = watch::channel(SpeechState::Idle);
        let service = SpeechService {
            backend,
            session: SpeechSession::new(defaults.clone()),
            defaults,
            recognizer: None,
            instance: 0,
            timeout_task: None,
            retry_task: None,
            inbox,
            loopback: tx.downgrade(),
            states: states.clone(),
            current,
        };
        tokio::spawn(service.run());
        SpeechHandle {
            tx,
            states,
            current: current_rx,
        }
    }

    /// Spawn with the `[speech]` settings of the app config.
    pub fn from_config(backend: B, config: &AppConfig) -> SpeechHandle {
        Self::spawn(backend, config.speech_config(), config.speech_state_buffer)
    }

    async fn run(mut self) {
        info!(language = %self.defaults.language, "Speech service started");
        while let Some(input) = self.inbox.recv().await {
            let Some(event) = self.translate(input) else {
                continue;
            };
            self.dispatch(event);
            if self.session.is_destroyed() {
                break;
            }
        }
        self.shutdown();
        info!("Speech service stopped");
    }

    fn translate(&mut self, input: Input) -> Option<SpeechEvent> {
        match input {
            Input::Command(command) => Some(self.command_event(command)),
            Input::Recognizer { instance, event } => {
                if instance != self.instance || self.recognizer.is_none() {
                    trace!(instance, current = self.instance, "Dropping stale recognizer event");
                    return None;
                }
                match event {
                    RecognizerEvent::Ready => {
                        debug!(instance, "Recognizer ready for speech");
                        None
                    }
                    RecognizerEvent::EndOfSpeech => {
                        debug!(instance, "Recognizer detected end of speech");
                        None
                    }
                    RecognizerEvent::Partial(text) => Some(SpeechEvent::PartialResult(text)),
                    RecognizerEvent::Final(text) => Some(SpeechEvent::FinalResult(text)),
                    RecognizerEvent::Error(code) => {
                        let kind = SpeechErrorKind::from_platform_code(code);
                        debug!(code, %kind, "Recognizer reported an error");
                        Some(SpeechEvent::RecognizerError(kind))
                    }
                }
            }
            Input::TimeoutElapsed { generation } => {
                Some(SpeechEvent::TimeoutElapsed { generation })
            }
            Input::RetryElapsed { generation } => Some(SpeechEvent::RetryElapsed {
                generation,
                guards: self.guards(),
            }),
        }
    }

    fn command_event(&self, command: Command) -> SpeechEvent {
        match command {
            Command::Start(config) => SpeechEvent::StartRequested {
                config: config.unwrap_or_else(|| self.defaults.clone()),
                guards: self.guards(),
            },
            Command::Pause => SpeechEvent::PauseRequested,
            Command::Resume => SpeechEvent::ResumeRequested,
            Command::Stop => SpeechEvent::StopRequested,
            Command::Cancel => SpeechEvent::CancelRequested,
            Command::Reset => SpeechEvent::ResetRequested,
            Command::Destroy => SpeechEvent::DestroyRequested,
        }
    }

    fn guards(&self) -> StartGuards {
        StartGuards {
            permission_granted: self.backend.has_permission(),
            available: self.backend.is_available(),
        }
    }

    fn dispatch(&mut self, event: SpeechEvent) {
        let mut pending = vec![event];
        while let Some(event) = pending.pop() {
            let actions = self.session.transition(event);
            if let Some(followup) = self.apply(actions) {
                pending.push(followup);
            }
        }
    }

    /// Perform `actions` in order. A failed recognizer operation aborts the
    /// rest of the batch and is fed back as an error event.
    fn apply(&mut self, actions: Vec<SpeechAction>) -> Option<SpeechEvent> {
        for action in actions {
            match action {
                SpeechAction::CreateRecognizer => {
                    self.instance += 1;
                    let events = RecognizerEvents::new(self.loopback.clone(), self.instance);
                    match self.backend.create(events) {
                        Ok(recognizer) => {
                            debug!(instance = self.instance, "Created recognizer");
                            self.recognizer = Some(recognizer);
                        }
                        Err(err) => {
                            error!("Failed to create recognizer: {err:#}");
                            return Some(SpeechEvent::RecognizerError(
                                SpeechErrorKind::NotAvailable,
                            ));
                        }
                    }
                }
                SpeechAction::StartRecognizer(config) => {
                    let Some(recognizer) = self.recognizer.as_mut() else {
                        warn!("Start requested without a live recognizer");
                        return Some(SpeechEvent::RecognizerError(SpeechErrorKind::Unknown));
                    };
                    if let Err(err) = recognizer.start(&config) {
                        error!("Failed to start recognizer: {err:#}");
                        return Some(SpeechEvent::RecognizerError(SpeechErrorKind::Unknown));
                    }
                }
                SpeechAction::StopRecognizer => {
                    if let Some(recognizer) = self.recognizer.as_mut() {
                        recognizer.stop();
                    }
                }
                SpeechAction::CancelRecognizer => {
                    if let Some(recognizer) = self.recognizer.as_mut() {
                        recognizer.cancel();
                    }
                }
                SpeechAction::ReleaseRecognizer => self.release_recognizer(),
                SpeechAction::ArmTimeout { generation, after } => {
                    abort(&mut self.timeout_task);
                    self.timeout_task =
                        self.schedule(after, Input::TimeoutElapsed { generation });
                }
                SpeechAction::CancelTimeout => abort(&mut self.timeout_task),
                SpeechAction::ScheduleRetry { generation, after } => {
                    abort(&mut self.retry_task);
                    self.retry_task = self.schedule(after, Input::RetryElapsed { generation });
                }
                SpeechAction::CancelRetry => abort(&mut self.retry_task),
                SpeechAction::Publish(state) => self.publish(state),
                SpeechAction::Shutdown => debug!("Speech session destroyed"),
            }
        }
        None
    }

    fn schedule(&self, after: Duration, input: Input) -> Option<JoinHandle<()>> {
        let tx = self.loopback.clone();
        Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(input);
            }
        }))
    }

    fn release_recognizer(&mut self) {
        if let Some(mut recognizer) = self.recognizer.take() {
            recognizer.destroy();
            debug!(instance = self.instance, "Released recognizer");
        }
        // Late callbacks from the released instance no longer match.
        self.instance += 1;
    }

    fn publish(&mut self, state: SpeechState) {
        trace!(state = state.label(), "Publishing speech state");
        self.current.send_replace(state.clone());
        // No subscribers is fine.
        let _ = self.states.send(state);
    }

    fn shutdown(&mut self) {
        abort(&mut self.timeout_task);
        abort(&mut self.retry_task);
        if let Some(mut recognizer) = self.recognizer.take() {
            recognizer.cancel();
            recognizer.destroy();
        }
        self.inbox.close();
    }
}

fn abort(task: &mut Option<JoinHandle<()>>) {
    if let Some(task) = task.take() {
        task.abort();
    }
}
