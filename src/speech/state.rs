use std::time::Duration;

/// Why a recognition session ended without a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpeechErrorKind {
    NoPermission,
    NotAvailable,
    Audio,
    Network,
    Timeout,
    NoMatch,
    Busy,
    Server,
    NoInput,
    Unknown,
}

impl SpeechErrorKind {
    /// Map a platform recognizer error code.
    pub fn from_platform_code(code: i32) -> Self {
        match code {
            1 | 2 => SpeechErrorKind::Network,
            3 => SpeechErrorKind::Audio,
            4 => SpeechErrorKind::Server,
            6 => SpeechErrorKind::NoInput,
            7 => SpeechErrorKind::NoMatch,
            8 => SpeechErrorKind::Busy,
            9 => SpeechErrorKind::NoPermission,
            _ => SpeechErrorKind::Unknown,
        }
    }

    /// Errors worth an automatic retry after a short delay.
    pub fn is_transient(self) -> bool {
        matches!(self, SpeechErrorKind::Network | SpeechErrorKind::Busy)
    }
}

impl std::fmt::Display for SpeechErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SpeechErrorKind::NoPermission => "no-permission",
            SpeechErrorKind::NotAvailable => "not-available",
            SpeechErrorKind::Audio => "audio",
            SpeechErrorKind::Network => "network",
            SpeechErrorKind::Timeout => "timeout",
            SpeechErrorKind::NoMatch => "no-match",
            SpeechErrorKind::Busy => "busy",
            SpeechErrorKind::Server => "server",
            SpeechErrorKind::NoInput => "no-input",
            SpeechErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// What observers of a session see. `Partial` is only ever an emission; the
/// session itself stays listening while partials arrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechState {
    Idle,
    Listening,
    Paused { last_partial: String },
    Partial(String),
    Result(String),
    Error(SpeechErrorKind),
}

impl SpeechState {
    pub fn label(&self) -> &'static str {
        match self {
            SpeechState::Idle => "idle",
            SpeechState::Listening => "listening",
            SpeechState::Paused { .. } => "paused",
            SpeechState::Partial(_) => "partial",
            SpeechState::Result(_) => "result",
            SpeechState::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechConfig {
    /// BCP-47 language tag passed to the recognizer.
    pub language: String,
    pub partial_results: bool,
    pub timeout: Duration,
    pub retry_delay: Duration,
    pub max_auto_retries: u32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            partial_results: true,
            timeout: Duration::from_secs(10),
            retry_delay: Duration::from_secs(1),
            max_auto_retries: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_codes_map_to_kinds() {
        assert_eq!(SpeechErrorKind::from_platform_code(1), SpeechErrorKind::Network);
        assert_eq!(SpeechErrorKind::from_platform_code(2), SpeechErrorKind::Network);
        assert_eq!(SpeechErrorKind::from_platform_code(6), SpeechErrorKind::NoInput);
        assert_eq!(SpeechErrorKind::from_platform_code(8), SpeechErrorKind::Busy);
        assert_eq!(SpeechErrorKind::from_platform_code(5), SpeechErrorKind::Unknown);
        assert_eq!(SpeechErrorKind::from_platform_code(42), SpeechErrorKind::Unknown);
    }

    #[test]
    fn only_network_and_busy_are_transient() {
        assert!(SpeechErrorKind::Network.is_transient());
        assert!(SpeechErrorKind::Busy.is_transient());
        assert!(!SpeechErrorKind::Timeout.is_transient());
        assert!(!SpeechErrorKind::NoPermission.is_transient());
    }
}
