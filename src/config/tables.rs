use super::defaults;
use super::models::{AppConfig, LogLevel};
use crate::ocr::Granularity;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
pub(super) struct ConfigTables {
    #[serde(default)]
    image: ImageConfig,
    #[serde(default)]
    overlay: OverlayConfig,
    #[serde(default)]
    speech: SpeechTable,
    #[serde(default)]
    logging: LoggingConfig,
}

impl From<ConfigTables> for AppConfig {
    fn from(tables: ConfigTables) -> Self {
        AppConfig {
            max_width: tables.image.max_width,
            max_height: tables.image.max_height,
            jpeg_quality: tables.image.jpeg_quality,
            cache_dir: tables.image.cache_dir,
            min_scale: tables.overlay.min_scale,
            max_scale: tables.overlay.max_scale,
            hit_inset: tables.overlay.hit_inset,
            default_granularity: tables.overlay.default_granularity,
            speech_language: tables.speech.language,
            speech_partial_results: tables.speech.partial_results,
            speech_timeout_secs: tables.speech.timeout_secs,
            speech_retry_delay_ms: tables.speech.retry_delay_ms,
            speech_max_auto_retries: tables.speech.max_auto_retries,
            speech_state_buffer: tables.speech.state_buffer,
            log_level: tables.logging.log_level,
        }
    }
}

impl From<&AppConfig> for ConfigTables {
    fn from(config: &AppConfig) -> Self {
        ConfigTables {
            image: ImageConfig {
                max_width: config.max_width,
                max_height: config.max_height,
                jpeg_quality: config.jpeg_quality,
                cache_dir: config.cache_dir.clone(),
            },
            overlay: OverlayConfig {
                min_scale: config.min_scale,
                max_scale: config.max_scale,
                hit_inset: config.hit_inset,
                default_granularity: config.default_granularity,
            },
            speech: SpeechTable {
                language: config.speech_language.clone(),
                partial_results: config.speech_partial_results,
                timeout_secs: config.speech_timeout_secs,
                retry_delay_ms: config.speech_retry_delay_ms,
                max_auto_retries: config.speech_max_auto_retries,
                state_buffer: config.speech_state_buffer,
            },
            logging: LoggingConfig {
                log_level: config.log_level,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct ImageConfig {
    #[serde(default = "defaults::default_max_width")]
    max_width: u32,
    #[serde(default = "defaults::default_max_height")]
    max_height: u32,
    #[serde(default = "defaults::default_jpeg_quality")]
    jpeg_quality: u8,
    #[serde(default = "defaults::default_cache_dir")]
    cache_dir: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        ImageConfig {
            max_width: defaults::default_max_width(),
            max_height: defaults::default_max_height(),
            jpeg_quality: defaults::default_jpeg_quality(),
            cache_dir: defaults::default_cache_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct OverlayConfig {
    #[serde(default = "defaults::default_min_scale")]
    min_scale: f32,
    #[serde(default = "defaults::default_max_scale")]
    max_scale: f32,
    #[serde(default = "defaults::default_hit_inset")]
    hit_inset: f32,
    #[serde(default)]
    default_granularity: Granularity,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        OverlayConfig {
            min_scale: defaults::default_min_scale(),
            max_scale: defaults::default_max_scale(),
            hit_inset: defaults::default_hit_inset(),
            default_granularity: Granularity::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct SpeechTable {
    #[serde(default = "defaults::default_speech_language")]
    language: String,
    #[serde(default = "defaults::default_partial_results")]
    partial_results: bool,
    #[serde(default = "defaults::default_speech_timeout_secs")]
    timeout_secs: f32,
    #[serde(default = "defaults::default_retry_delay_ms")]
    retry_delay_ms: u64,
    #[serde(default = "defaults::default_max_auto_retries")]
    max_auto_retries: u32,
    #[serde(default = "defaults::default_state_buffer")]
    state_buffer: usize,
}

impl Default for SpeechTable {
    fn default() -> Self {
        SpeechTable {
            language: defaults::default_speech_language(),
            partial_results: defaults::default_partial_results(),
            timeout_secs: defaults::default_speech_timeout_secs(),
            retry_delay_ms: defaults::default_retry_delay_ms(),
            max_auto_retries: defaults::default_max_auto_retries(),
            state_buffer: defaults::default_state_buffer(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct LoggingConfig {
    #[serde(default = "defaults::default_log_level")]
    log_level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_level: defaults::default_log_level(),
        }
    }
}
