pub(crate) fn default_max_width() -> u32 {
    800
}

pub(crate) fn default_max_height() -> u32 {
    800
}

pub(crate) fn default_jpeg_quality() -> u8 {
    75
}

pub(crate) fn default_cache_dir() -> String {
    ".cache".to_string()
}

pub(crate) fn default_min_scale() -> f32 {
    0.5
}

pub(crate) fn default_max_scale() -> f32 {
    3.0
}

pub(crate) fn default_hit_inset() -> f32 {
    8.0
}

pub(crate) fn default_speech_language() -> String {
    "en-US".to_string()
}

pub(crate) fn default_partial_results() -> bool {
    true
}

pub(crate) fn default_speech_timeout_secs() -> f32 {
    10.0
}

pub(crate) fn default_retry_delay_ms() -> u64 {
    1000
}

pub(crate) fn default_max_auto_retries() -> u32 {
    1
}

pub(crate) fn default_state_buffer() -> usize {
    64
}

pub(crate) fn default_log_level() -> crate::config::LogLevel {
    crate::config::LogLevel::Info
}
