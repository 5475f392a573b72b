use serde::{Deserialize, Serialize};

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_bind_port() -> u16 {
    8090
}

fn default_fps() -> u32 {
    60
}

fn default_video_bitrate() -> u32 {
    6_000_000
}

fn default_gop_size() -> u32 {
    120
}

fn default_audio_sample_rate() -> u32 {
    48_000
}

fn default_audio_channels() -> u16 {
    2
}

fn default_audio_frame_samples() -> u32 {
    960
}

fn default_opus_bitrate() -> i32 {
    128_000
}

fn default_converter_threads() -> usize {
    8
}

fn default_web_root() -> String {
    ".".to_string()
}

fn default_capture_rect() -> CaptureRect {
    CaptureRect { x: 0, y: 0, width: 1920, height: 1080 }
}

/// The screen region to capture, in root-window pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRect {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
}

/// Server configuration, loaded from an optional TOML file and overridable
/// by CLI flags. Every field has a default so an empty file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    #[serde(default = "default_capture_rect")]
    pub capture_rect: CaptureRect,

    #[serde(default = "default_fps")]
    pub fps: u32,

    #[serde(default = "default_video_bitrate")]
    pub video_bitrate: u32,

    #[serde(default = "default_gop_size")]
    pub gop_size: u32,

    #[serde(default = "default_audio_sample_rate")]
    pub audio_sample_rate: u32,

    #[serde(default = "default_audio_channels")]
    pub audio_channels: u16,

    #[serde(default = "default_audio_frame_samples")]
    pub audio_frame_samples: u32,

    #[serde(default = "default_opus_bitrate")]
    pub opus_bitrate: i32,

    #[serde(default = "default_converter_threads")]
    pub converter_threads: usize,

    #[serde(default = "default_web_root")]
    pub web_root: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_host: default_bind_host(),
            bind_port: default_bind_port(),
            capture_rect: default_capture_rect(),
            fps: default_fps(),
            video_bitrate: default_video_bitrate(),
            gop_size: default_gop_size(),
            audio_sample_rate: default_audio_sample_rate(),
            audio_channels: default_audio_channels(),
            audio_frame_samples: default_audio_frame_samples(),
            opus_bitrate: default_opus_bitrate(),
            converter_threads: default_converter_threads(),
            web_root: default_web_root(),
        }
    }
}

impl Config {
    /// The nominal inter-frame period implied by `fps`.
    pub fn frame_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.fps as f64)
    }

    /// Number of PCM bytes in one audio chunk: samples * channels * 2 (i16).
    pub fn pcm_chunk_bytes(&self) -> usize {
        self.audio_frame_samples as usize * self.audio_channels as usize * 2
    }

    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let c = Config::default();
        assert_eq!(c.bind_port, 8090);
        assert_eq!(c.fps, 60);
        assert_eq!(c.video_bitrate, 6_000_000);
        assert_eq!(c.gop_size, 120);
        assert_eq!(c.audio_sample_rate, 48_000);
        assert_eq!(c.audio_channels, 2);
        assert_eq!(c.audio_frame_samples, 960);
        assert_eq!(c.opus_bitrate, 128_000);
        assert_eq!(c.pcm_chunk_bytes(), 3840);
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let c = Config::from_toml_str("").unwrap();
        assert_eq!(c, Config::default());
    }

    #[test]
    fn partial_toml_overrides_only_given_fields() {
        let c = Config::from_toml_str("fps = 30\nbind_port = 9000\n").unwrap();
        assert_eq!(c.fps, 30);
        assert_eq!(c.bind_port, 9000);
        assert_eq!(c.video_bitrate, Config::default().video_bitrate);
    }

    #[test]
    fn capture_rect_toml_roundtrip() {
        let toml = "[capture_rect]\nx = 100\ny = 200\nwidth = 800\nheight = 600\n";
        let c = Config::from_toml_str(toml).unwrap();
        assert_eq!(c.capture_rect, CaptureRect { x: 100, y: 200, width: 800, height: 600 });
    }

    #[test]
    fn frame_period_at_60fps() {
        let c = Config::default();
        let period = c.frame_period();
        assert!((period.as_secs_f64() - 1.0 / 60.0).abs() < 1e-9);
    }
}
