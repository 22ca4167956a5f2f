use clockwatch_core::DetectorConfig;

/// Thread count used by the write/read storms
pub const STORM_THREADS: usize = 20;

/// Defaults with a capture buffer large enough for any storm in the suite
pub fn capture_config() -> DetectorConfig {
    let mut config = DetectorConfig::default();
    config.capture.buffer_size = 1_024;
    config.logging.level = "warn".into();
    config
}

/// A configuration whose buffer fills after `capacity` reports
pub fn tiny_buffer_config(capacity: usize) -> DetectorConfig {
    let mut config = capture_config();
    config.capture.buffer_size = capacity;
    config
}

pub fn sample_toml() -> &'static str {
    r#"
        [race_detection]
        enabled = true

        [capture]
        enabled = true
        buffer_size = 256

        [logging]
        level = "debug"
        include_modules = true
    "#
}
