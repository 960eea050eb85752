//! Runtime configuration for the demuxer and the remuxer.
//!
//! Values come from the built-in defaults, then an optional `key = value`
//! file (`./tsremux.toml` or `./config.toml`), then `TSREMUX_*` environment
//! variables, each layer overriding the previous one.

use std::env;
use std::fs;
use std::path::Path;

use crate::error::{RemuxError, Result};

const CONFIG_PATHS: [&str; 2] = ["./tsremux.toml", "./config.toml"];
const ENV_PREFIX: &str = "TSREMUX_";

/// Options consumed by [`crate::format::ts::TSDemuxer`].
#[derive(Debug, Clone, PartialEq)]
pub struct DemuxConfig {
    /// Start time of the stream in seconds, added to every timestamp.
    pub timestamp_base_seconds: f64,
    /// Drop PSI sections whose CRC32 does not match.
    pub verify_section_crc: bool,
    /// Hand MPEG Layer II frames to the raw audio hook instead of packaging them.
    pub soft_decode_mp2: bool,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            timestamp_base_seconds: 0.0,
            verify_section_crc: false,
            soft_decode_mp2: false,
        }
    }
}

/// Options consumed by [`crate::format::mp4::MP4Remuxer`].
#[derive(Debug, Clone, PartialEq)]
pub struct RemuxConfig {
    /// Bridge large audio gaps with silent frames.
    pub fix_audio_timestamp_gap: bool,
    /// Live streams do not keep a segment timeline.
    pub is_live: bool,
    /// Prefix a silent frame after a seek so audio starts with video.
    pub fill_silent_after_seek: bool,
    /// Mark the first sample of every video fragment as a sync sample.
    pub force_first_idr: bool,
    /// Emit MP3 as raw `audio/mpeg` instead of fMP4.
    pub mp3_use_mpeg_audio: bool,
}

impl Default for RemuxConfig {
    fn default() -> Self {
        Self {
            fix_audio_timestamp_gap: true,
            is_live: false,
            fill_silent_after_seek: false,
            force_first_idr: false,
            mp3_use_mpeg_audio: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub demux: DemuxConfig,
    pub remux: RemuxConfig,
}

impl Config {
    /// Loads defaults, the first config file found and the environment.
    pub fn load() -> Result<Self> {
        let mut config = Config::default();
        for path in &CONFIG_PATHS {
            if Path::new(path).exists() {
                config.apply_file(path)?;
                break;
            }
        }
        config.apply_env()?;
        Ok(config)
    }

    /// Loads defaults, then `path`, then the environment.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Config::default();
        config.apply_file(path)?;
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let content = fs::read_to_string(path)?;
        self.apply_str(&content)
    }

    /// Applies `key = value` lines. Comments, blank lines, section headers
    /// and unknown keys are skipped.
    pub fn apply_str(&mut self, content: &str) -> Result<()> {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                self.set(key.trim(), value)?;
            }
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<()> {
        for (key, value) in env::vars() {
            if let Some(key) = key.strip_prefix(ENV_PREFIX) {
                self.set(&key.to_ascii_lowercase(), &value)?;
            }
        }
        Ok(())
    }

    /// Sets one option by name.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "timestamp_base_seconds" => self.demux.timestamp_base_seconds = value.parse()?,
            "verify_section_crc" => self.demux.verify_section_crc = parse_bool(key, value)?,
            "soft_decode_mp2" => self.demux.soft_decode_mp2 = parse_bool(key, value)?,
            "fix_audio_timestamp_gap" => {
                self.remux.fix_audio_timestamp_gap = parse_bool(key, value)?
            }
            "is_live" => self.remux.is_live = parse_bool(key, value)?,
            "fill_silent_after_seek" => self.remux.fill_silent_after_seek = parse_bool(key, value)?,
            "force_first_idr" => self.remux.force_first_idr = parse_bool(key, value)?,
            "mp3_use_mpeg_audio" => self.remux.mp3_use_mpeg_audio = parse_bool(key, value)?,
            _ => log::trace!("Ignoring unknown config key {}", key),
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(RemuxError::Parser(format!(
            "invalid boolean for {}: {}",
            key, value
        ))),
    }
}

/// Creates a config template at `path` unless a file already exists there.
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        let template = r#"# tsremux configuration

[demux]
timestamp_base_seconds = 0
verify_section_crc = false
soft_decode_mp2 = false

[remux]
fix_audio_timestamp_gap = true
is_live = false
fill_silent_after_seek = false
force_first_idr = false
mp3_use_mpeg_audio = true
"#;
        fs::write(path, template)?;
    }
    Ok(())
}
