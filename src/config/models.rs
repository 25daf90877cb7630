use crate::ocr::Granularity;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// High-level app configuration; deserializable from TOML.
#[derive(Debug, Clone, Deserialize, serde::Serialize, PartialEq)]
pub struct AppConfig {
    #[serde(default = "crate::config::defaults::default_max_width")]
    pub max_width: u32,
    #[serde(default = "crate::config::defaults::default_max_height")]
    pub max_height: u32,
    #[serde(default = "crate::config::defaults::default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "crate::config::defaults::default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "crate::config::defaults::default_min_scale")]
    pub min_scale: f32,
    #[serde(default = "crate::config::defaults::default_max_scale")]
    pub max_scale: f32,
    #[serde(default = "crate::config::defaults::default_hit_inset")]
    pub hit_inset: f32,
    #[serde(default)]
    pub default_granularity: Granularity,
    #[serde(default = "crate::config::defaults::default_speech_language")]
    pub speech_language: String,
    #[serde(default = "crate::config::defaults::default_partial_results")]
    pub speech_partial_results: bool,
    #[serde(default = "crate::config::defaults::default_speech_timeout_secs")]
    pub speech_timeout_secs: f32,
    #[serde(default = "crate::config::defaults::default_retry_delay_ms")]
    pub speech_retry_delay_ms: u64,
    #[serde(default = "crate::config::defaults::default_max_auto_retries")]
    pub speech_max_auto_retries: u32,
    #[serde(default = "crate::config::defaults::default_state_buffer")]
    pub speech_state_buffer: usize,
    #[serde(default = "crate::config::defaults::default_log_level")]
    pub log_level: LogLevel,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            max_width: crate::config::defaults::default_max_width(),
            max_height: crate::config::defaults::default_max_height(),
            jpeg_quality: crate::config::defaults::default_jpeg_quality(),
            cache_dir: crate::config::defaults::default_cache_dir(),
            min_scale: crate::config::defaults::default_min_scale(),
            max_scale: crate::config::defaults::default_max_scale(),
            hit_inset: crate::config::defaults::default_hit_inset(),
            default_granularity: Granularity::default(),
            speech_language: crate::config::defaults::default_speech_language(),
            speech_partial_results: crate::config::defaults::default_partial_results(),
            speech_timeout_secs: crate::config::defaults::default_speech_timeout_secs(),
            speech_retry_delay_ms: crate::config::defaults::default_retry_delay_ms(),
            speech_max_auto_retries: crate::config::defaults::default_max_auto_retries(),
            speech_state_buffer: crate::config::defaults::default_state_buffer(),
            log_level: crate::config::defaults::default_log_level(),
        }
    }
}

impl AppConfig {
    pub fn cache_root(&self) -> PathBuf {
        PathBuf::from(&self.cache_dir)
    }

    pub fn normalize_options(&self) -> crate::imaging::NormalizeOptions {
        crate::imaging::NormalizeOptions {
            max_width: self.max_width.max(1),
            max_height: self.max_height.max(1),
            jpeg_quality: self.jpeg_quality.clamp(1, 100),
        }
    }

    pub fn zoom_limits(&self) -> crate::overlay::ZoomLimits {
        let min = self.min_scale.max(0.01);
        crate::overlay::ZoomLimits {
            min,
            max: self.max_scale.max(min),
        }
    }

    pub fn speech_config(&self) -> crate::speech::SpeechConfig {
        let timeout_secs = if self.speech_timeout_secs.is_finite() {
            self.speech_timeout_secs.clamp(0.0, 3600.0)
        } else {
            0.0
        };
        crate::speech::SpeechConfig {
            language: self.speech_language.clone(),
            partial_results: self.speech_partial_results,
            timeout: Duration::from_secs_f32(timeout_secs),
            retry_delay: Duration::from_millis(self.speech_retry_delay_ms),
            max_auto_retries: self.speech_max_auto_retries,
        }
    }
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
