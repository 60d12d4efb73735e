use std::env;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Playback settings shared by every sound of an [`AudioManager`](crate::AudioManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AudioSettings {
    /// Prefix prepended to each sound's `src` to build the request URI.
    pub audio_path: String,
    /// Fraction of the fade duration used as time constant of the fade-out ramp.
    pub fade_out_ratio: f32,
    /// A play requested before the sound was loaded is dropped if loading
    /// took longer than this (looping sounds always start).
    pub max_play_latency_ms: f64,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            audio_path: String::new(),
            fade_out_ratio: 0.4,
            max_play_latency_ms: 1000.0,
        }
    }
}

impl AudioSettings {
    /// Parses settings from JSON; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: AudioSettings = serde_json::from_str(json)?;
        Ok(settings.sanitized())
    }

    fn sanitized(mut self) -> Self {
        if !self.fade_out_ratio.is_finite() || self.fade_out_ratio < 0.0 {
            self.fade_out_ratio = Self::default().fade_out_ratio;
        }
        if !self.max_play_latency_ms.is_finite() || self.max_play_latency_ms < 0.0 {
            self.max_play_latency_ms = Self::default().max_play_latency_ms;
        }
        self
    }
}

/// Configuration of the development server that hosts the demo page.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: String,
    pub audio_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3030),
            static_dir: env::var("STATIC_DIR").unwrap_or_else(|_| "www".to_string()),
            audio_dir: env::var("AUDIO_DIR").unwrap_or_else(|_| "www/audio".to_string()),
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
