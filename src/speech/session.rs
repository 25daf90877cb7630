//! Pure speech session state machine.
//!
//! `SpeechSession::transition` consumes one event and returns the side
//! effects the driver must perform, in order. It never touches the recognizer
//! or timers itself, which keeps every transition testable without a runtime.

use super::state::{SpeechConfig, SpeechErrorKind, SpeechState};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Listening,
    Paused,
    Result(String),
    Error(SpeechErrorKind),
}

/// Preconditions for entering `Listening`, sampled by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartGuards {
    pub permission_granted: bool,
    pub available: bool,
}

impl StartGuards {
    pub const PASS: StartGuards = StartGuards {
        permission_granted: true,
        available: true,
    };
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpeechEvent {
    StartRequested {
        config: SpeechConfig,
        guards: StartGuards,
    },
    PauseRequested,
    ResumeRequested,
    StopRequested,
    CancelRequested,
    ResetRequested,
    DestroyRequested,
    PartialResult(String),
    FinalResult(Option<String>),
    RecognizerError(SpeechErrorKind),
    TimeoutElapsed {
        generation: u64,
    },
    RetryElapsed {
        generation: u64,
        guards: StartGuards,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpeechAction {
    CreateRecognizer,
    StartRecognizer(SpeechConfig),
    StopRecognizer,
    CancelRecognizer,
    ReleaseRecognizer,
    ArmTimeout { generation: u64, after: Duration },
    CancelTimeout,
    ScheduleRetry { generation: u64, after: Duration },
    CancelRetry,
    Publish(SpeechState),
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct SpeechSession {
    phase: Phase,
    config: SpeechConfig,
    last_partial: String,
    recognizer_live: bool,
    timeout_armed: bool,
    retry_pending: bool,
    timer_generation: u64,
    retry_generation: u64,
    retries_used: u32,
    destroyed: bool,
}

impl SpeechSession {
    pub fn new(config: SpeechConfig) -> Self {
        Self {
            phase: Phase::Idle,
            config,
            last_partial: String::new(),
            recognizer_live: false,
            timeout_armed: false,
            retry_pending: false,
            timer_generation: 0,
            retry_generation: 0,
            retries_used: 0,
            destroyed: false,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }

    pub fn last_partial(&self) -> &str {
        &self.last_partial
    }

    pub fn recognizer_live(&self) -> bool {
        self.recognizer_live
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn transition(&mut self, event: SpeechEvent) -> Vec<SpeechAction> {
        if self.destroyed {
            debug!(?event, "Ignoring event for destroyed speech session");
            return Vec::new();
        }
        let mut actions = Vec::new();
        match event {
            SpeechEvent::StartRequested { config, guards } => {
                self.on_start(config, guards, false, &mut actions)
            }
            SpeechEvent::PauseRequested => self.on_pause(&mut actions),
            SpeechEvent::ResumeRequested => self.on_resume(&mut actions),
            SpeechEvent::StopRequested => {
                self.on_halt(SpeechAction::StopRecognizer, &mut actions)
            }
            SpeechEvent::CancelRequested | SpeechEvent::ResetRequested => {
                self.on_halt(SpeechAction::CancelRecognizer, &mut actions)
            }
            SpeechEvent::DestroyRequested => {
                self.on_halt(SpeechAction::CancelRecognizer, &mut actions);
                self.destroyed = true;
                actions.push(SpeechAction::Shutdown);
            }
            SpeechEvent::PartialResult(text) => self.on_partial(text, &mut actions),
            SpeechEvent::FinalResult(text) => self.on_final(text, &mut actions),
            SpeechEvent::RecognizerError(kind) => self.on_recognizer_error(kind, &mut actions),
            SpeechEvent::TimeoutElapsed { generation } => {
                self.on_timeout(generation, &mut actions)
            }
            SpeechEvent::RetryElapsed { generation, guards } => {
                self.on_retry(generation, guards, &mut actions)
            }
        }
        actions
    }

    fn on_start(
        &mut self,
        config: SpeechConfig,
        guards: StartGuards,
        is_retry: bool,
        actions: &mut Vec<SpeechAction>,
    ) {
        if self.phase == Phase::Listening {
            debug!("Start requested while already listening; ignoring");
            return;
        }
        self.cancel_retry(actions);
        if !is_retry {
            self.retries_used = 0;
        }
        self.config = config;

        if !guards.permission_granted {
            self.fail(SpeechErrorKind::NoPermission, actions);
            return;
        }
        if !guards.available {
            self.fail(SpeechErrorKind::NotAvailable, actions);
            return;
        }

        self.last_partial.clear();
        if !self.recognizer_live {
            self.recognizer_live = true;
            actions.push(SpeechAction::CreateRecognizer);
        }
        actions.push(SpeechAction::StartRecognizer(self.config.clone()));
        self.arm_timeout(actions);
        self.phase = Phase::Listening;
        info!(
            language = %self.config.language,
            retry = is_retry,
            "Speech session listening"
        );
        actions.push(SpeechAction::Publish(SpeechState::Listening));
    }

    fn on_pause(&mut self, actions: &mut Vec<SpeechAction>) {
        if self.phase != Phase::Listening {
            return;
        }
        actions.push(SpeechAction::StopRecognizer);
        self.cancel_timeout(actions);
        self.phase = Phase::Paused;
        actions.push(SpeechAction::Publish(SpeechState::Paused {
            last_partial: self.last_partial.clone(),
        }));
    }

    fn on_resume(&mut self, actions: &mut Vec<SpeechAction>) {
        if self.phase != Phase::Paused {
            return;
        }
        if !self.recognizer_live {
            self.recognizer_live = true;
            actions.push(SpeechAction::CreateRecognizer);
        }
        actions.push(SpeechAction::StartRecognizer(self.config.clone()));
        self.arm_timeout(actions);
        self.phase = Phase::Listening;
        actions.push(SpeechAction::Publish(SpeechState::Listening));
    }

    fn on_halt(&mut self, halt: SpeechAction, actions: &mut Vec<SpeechAction>) {
        self.cancel_timeout(actions);
        self.cancel_retry(actions);
        if self.recognizer_live {
            actions.push(halt);
            self.release(actions);
        }
        if self.phase != Phase::Idle {
            self.phase = Phase::Idle;
            actions.push(SpeechAction::Publish(SpeechState::Idle));
        }
    }

    fn on_partial(&mut self, text: String, actions: &mut Vec<SpeechAction>) {
        if self.phase != Phase::Listening {
            return;
        }
        self.last_partial = text.clone();
        actions.push(SpeechAction::Publish(SpeechState::Partial(text)));
    }

    fn on_final(&mut self, text: Option<String>, actions: &mut Vec<SpeechAction>) {
        if self.phase != Phase::Listening {
            return;
        }
        let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
            self.fail(SpeechErrorKind::NoMatch, actions);
            return;
        };
        self.cancel_timeout(actions);
        self.release(actions);
        info!(chars = text.chars().count(), "Speech recognized");
        self.phase = Phase::Result(text.clone());
        actions.push(SpeechAction::Publish(SpeechState::Result(text)));
    }

    fn on_recognizer_error(&mut self, kind: SpeechErrorKind, actions: &mut Vec<SpeechAction>) {
        match self.phase {
            Phase::Listening => self.fail(kind, actions),
            Phase::Paused => debug!(%kind, "Suppressing recognizer error while paused"),
            _ => debug!(%kind, "Ignoring recognizer error outside a listening session"),
        }
    }

    fn on_timeout(&mut self, generation: u64, actions: &mut Vec<SpeechAction>) {
        if !self.timeout_armed
            || generation != self.timer_generation
            || self.phase != Phase::Listening
        {
            debug!(generation, current = self.timer_generation, "Ignoring stale timeout");
            return;
        }
        self.timeout_armed = false;
        self.fail(SpeechErrorKind::Timeout, actions);
    }

    fn on_retry(&mut self, generation: u64, guards: StartGuards, actions: &mut Vec<SpeechAction>) {
        let retryable = matches!(self.phase, Phase::Error(kind) if kind.is_transient());
        if !self.retry_pending || generation != self.retry_generation || !retryable {
            debug!(generation, current = self.retry_generation, "Ignoring stale retry");
            return;
        }
        self.retry_pending = false;
        info!(attempt = self.retries_used, "Retrying speech recognition");
        let config = self.config.clone();
        self.on_start(config, guards, true, actions);
    }

    fn fail(&mut self, kind: SpeechErrorKind, actions: &mut Vec<SpeechAction>) {
        self.cancel_timeout(actions);
        if self.recognizer_live {
            actions.push(SpeechAction::CancelRecognizer);
            self.release(actions);
        }
        warn!(%kind, "Speech session failed");
        self.phase = Phase::Error(kind);
        actions.push(SpeechAction::Publish(SpeechState::Error(kind)));

        if kind.is_transient() && self.retries_used < self.config.max_auto_retries {
            self.retries_used += 1;
            self.retry_generation = self.retry_generation.wrapping_add(1);
            self.retry_pending = true;
            actions.push(SpeechAction::ScheduleRetry {
                generation: self.retry_generation,
                after: self.config.retry_delay,
            });
        }
    }

    fn release(&mut self, actions: &mut Vec<SpeechAction>) {
        if self.recognizer_live {
            self.recognizer_live = false;
            actions.push(SpeechAction::ReleaseRecognizer);
        }
    }

    fn arm_timeout(&mut self, actions: &mut Vec<SpeechAction>) {
        self.timer_generation = self.timer_generation.wrapping_add(1);
        self.timeout_armed = true;
        actions.push(SpeechAction::ArmTimeout {
            generation: self.timer_generation,
            after: self.config.timeout,
        });
    }

    fn cancel_timeout(&mut self, actions: &mut Vec<SpeechAction>) {
        if self.timeout_armed {
            self.timeout_armed = false;
            self.timer_generation = self.timer_generation.wrapping_add(1);
            actions.push(SpeechAction::CancelTimeout);
        }
    }

    fn cancel_retry(&mut self, actions: &mut Vec<SpeechAction>) {
        if self.retry_pending {
            self.retry_pending = false;
            self.retry_generation = self.retry_generation.wrapping_add(1);
            actions.push(SpeechAction::CancelRetry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SpeechConfig {
        SpeechConfig::default()
    }

    fn start() -> SpeechEvent {
        SpeechEvent::StartRequested {
            config: config(),
            guards: StartGuards::PASS,
        }
    }

    fn published(actions: &[SpeechAction]) -> Vec<SpeechState> {
        actions
            .iter()
            .filter_map(|a| match a {
                SpeechAction::Publish(state) => Some(state.clone()),
                _ => None,
            })
            .collect()
    }

    fn listening_session() -> SpeechSession {
        let mut session = SpeechSession::new(config());
        session.transition(start());
        session
    }

    #[test]
    fn start_creates_recognizer_and_arms_timeout() {
        let mut session = SpeechSession::new(config());
        let actions = session.transition(start());
        assert_eq!(
            actions,
            vec![
                SpeechAction::CreateRecognizer,
                SpeechAction::StartRecognizer(config()),
                SpeechAction::ArmTimeout {
                    generation: 1,
                    after: Duration::from_secs(10),
                },
                SpeechAction::Publish(SpeechState::Listening),
            ]
        );
        assert_eq!(session.phase(), &Phase::Listening);
        assert!(session.recognizer_live());
    }

    #[test]
    fn start_keeps_requested_config() {
        let mut session = SpeechSession::new(config());
        let german = SpeechConfig {
            language: "de-DE".to_string(),
            ..config()
        };
        session.transition(SpeechEvent::StartRequested {
            config: german.clone(),
            guards: StartGuards::PASS,
        });
        assert_eq!(session.config(), &german);
        session.transition(SpeechEvent::PartialResult("guten".to_string()));
        assert_eq!(session.last_partial(), "guten");
        // a new start forgets the previous hypothesis
        session.transition(SpeechEvent::StopRequested);
        session.transition(start());
        assert_eq!(session.last_partial(), "");
        assert_eq!(session.config().language, "en-US");
    }

    #[test]
    fn start_while_listening_is_a_no_op() {
        let mut session = listening_session();
        assert!(session.transition(start()).is_empty());
    }

    #[test]
    fn failed_guards_skip_listening() {
        let mut session = SpeechSession::new(config());
        let actions = session.transition(SpeechEvent::StartRequested {
            config: config(),
            guards: StartGuards {
                permission_granted: false,
                available: true,
            },
        });
        assert_eq!(
            actions,
            vec![SpeechAction::Publish(SpeechState::Error(SpeechErrorKind::NoPermission))]
        );

        let mut session = SpeechSession::new(config());
        let actions = session.transition(SpeechEvent::StartRequested {
            config: config(),
            guards: StartGuards {
                permission_granted: true,
                available: false,
            },
        });
        assert_eq!(
            published(&actions),
            vec![SpeechState::Error(SpeechErrorKind::NotAvailable)]
        );
        assert!(!session.recognizer_live());
    }

    #[test]
    fn partials_then_final_release_recognizer() {
        let mut session = listening_session();
        let mut states = Vec::new();
        for text in ["he", "hell"] {
            states.extend(published(
                &session.transition(SpeechEvent::PartialResult(text.to_string())),
            ));
            assert_eq!(session.phase(), &Phase::Listening);
        }
        let actions = session.transition(SpeechEvent::FinalResult(Some("hello".to_string())));
        states.extend(published(&actions));
        assert_eq!(
            states,
            vec![
                SpeechState::Partial("he".to_string()),
                SpeechState::Partial("hell".to_string()),
                SpeechState::Result("hello".to_string()),
            ]
        );
        assert!(actions.contains(&SpeechAction::ReleaseRecognizer));
        assert!(actions.contains(&SpeechAction::CancelTimeout));
        assert!(!session.recognizer_live());
    }

    #[test]
    fn empty_final_is_no_match() {
        let mut session = listening_session();
        let actions = session.transition(SpeechEvent::FinalResult(Some("  ".to_string())));
        assert_eq!(
            published(&actions),
            vec![SpeechState::Error(SpeechErrorKind::NoMatch)]
        );
        let mut session = listening_session();
        session.transition(SpeechEvent::FinalResult(None));
        assert_eq!(session.phase(), &Phase::Error(SpeechErrorKind::NoMatch));
    }

    #[test]
    fn pause_keeps_recognizer_and_resume_reuses_it() {
        let mut session = listening_session();
        session.transition(SpeechEvent::PartialResult("guten".to_string()));
        let paused = session.transition(SpeechEvent::PauseRequested);
        assert_eq!(
            paused,
            vec![
                SpeechAction::StopRecognizer,
                SpeechAction::CancelTimeout,
                SpeechAction::Publish(SpeechState::Paused {
                    last_partial: "guten".to_string(),
                }),
            ]
        );
        assert!(session.recognizer_live());

        let resumed = session.transition(SpeechEvent::ResumeRequested);
        assert!(!resumed.contains(&SpeechAction::CreateRecognizer));
        assert_eq!(resumed[0], SpeechAction::StartRecognizer(config()));
        assert_eq!(session.phase(), &Phase::Listening);
    }

    #[test]
    fn timeout_after_pause_is_stale() {
        let mut session = listening_session();
        session.transition(SpeechEvent::PauseRequested);
        assert!(session
            .transition(SpeechEvent::TimeoutElapsed { generation: 1 })
            .is_empty());
        session.transition(SpeechEvent::ResumeRequested);
        // the resumed timer has a fresh generation; the first one stays stale
        assert!(session
            .transition(SpeechEvent::TimeoutElapsed { generation: 1 })
            .is_empty());
        let actions = session.transition(SpeechEvent::TimeoutElapsed { generation: 3 });
        assert_eq!(
            published(&actions),
            vec![SpeechState::Error(SpeechErrorKind::Timeout)]
        );
    }

    #[test]
    fn errors_are_suppressed_while_paused() {
        let mut session = listening_session();
        session.transition(SpeechEvent::PauseRequested);
        assert!(session
            .transition(SpeechEvent::RecognizerError(SpeechErrorKind::Audio))
            .is_empty());
        assert_eq!(session.phase(), &Phase::Paused);
    }

    #[test]
    fn transient_error_retries_once() {
        let mut session = listening_session();
        let actions = session.transition(SpeechEvent::RecognizerError(SpeechErrorKind::Network));
        assert!(actions.contains(&SpeechAction::ScheduleRetry {
            generation: 1,
            after: Duration::from_secs(1),
        }));
        let retried = session.transition(SpeechEvent::RetryElapsed {
            generation: 1,
            guards: StartGuards::PASS,
        });
        assert_eq!(retried[0], SpeechAction::CreateRecognizer);
        assert_eq!(session.phase(), &Phase::Listening);

        let actions = session.transition(SpeechEvent::RecognizerError(SpeechErrorKind::Busy));
        assert!(!actions
            .iter()
            .any(|a| matches!(a, SpeechAction::ScheduleRetry { .. })));
        assert_eq!(session.phase(), &Phase::Error(SpeechErrorKind::Busy));
    }

    #[test]
    fn terminal_errors_do_not_retry() {
        let mut session = listening_session();
        let actions = session.transition(SpeechEvent::RecognizerError(SpeechErrorKind::Audio));
        assert!(!actions
            .iter()
            .any(|a| matches!(a, SpeechAction::ScheduleRetry { .. })));
    }

    #[test]
    fn stop_cancels_pending_retry() {
        let mut session = listening_session();
        session.transition(SpeechEvent::RecognizerError(SpeechErrorKind::Network));
        let actions = session.transition(SpeechEvent::StopRequested);
        assert_eq!(
            actions,
            vec![
                SpeechAction::CancelRetry,
                SpeechAction::Publish(SpeechState::Idle),
            ]
        );
        assert!(session
            .transition(SpeechEvent::RetryElapsed {
                generation: 1,
                guards: StartGuards::PASS,
            })
            .is_empty());
    }

    #[test]
    fn explicit_start_resets_retry_budget() {
        let mut session = listening_session();
        session.transition(SpeechEvent::RecognizerError(SpeechErrorKind::Network));
        session.transition(SpeechEvent::RetryElapsed {
            generation: 1,
            guards: StartGuards::PASS,
        });
        session.transition(SpeechEvent::RecognizerError(SpeechErrorKind::Network));
        session.transition(start());
        let actions = session.transition(SpeechEvent::RecognizerError(SpeechErrorKind::Network));
        assert!(actions
            .iter()
            .any(|a| matches!(a, SpeechAction::ScheduleRetry { .. })));
    }

    #[test]
    fn destroy_releases_and_ignores_later_events() {
        let mut session = listening_session();
        let actions = session.transition(SpeechEvent::DestroyRequested);
        assert_eq!(
            actions,
            vec![
                SpeechAction::CancelTimeout,
                SpeechAction::CancelRecognizer,
                SpeechAction::ReleaseRecognizer,
                SpeechAction::Publish(SpeechState::Idle),
                SpeechAction::Shutdown,
            ]
        );
        assert!(session.is_destroyed());
        assert!(session.transition(start()).is_empty());
    }

    #[test]
    fn reset_after_result_returns_to_idle() {
        let mut session = listening_session();
        session.transition(SpeechEvent::FinalResult(Some("hallo".to_string())));
        let actions = session.transition(SpeechEvent::ResetRequested);
        assert_eq!(actions, vec![SpeechAction::Publish(SpeechState::Idle)]);
        assert_eq!(session.phase(), &Phase::Idle);
    }
}
