//! Renderer configuration.
//!
//! # Overview
//!
//! [`RendererConfig`] gathers the knobs that size the frame ring and the
//! binding layer. It can be built in code or read from a TOML file, where
//! every field is optional:
//!
//! ```toml
//! frames_in_flight = 3
//! max_objects = 4096
//! vsync = false
//! clear_color = [0.1, 0.1, 0.1, 1.0]
//! ```
//!
//! # Example
//!
//! ```no_run
//! use renderer_core::RendererConfig;
//!
//! let config = RendererConfig::load("renderer.toml")?;
//! assert!(config.frames_in_flight >= 1);
//! # Ok::<(), renderer_core::Error>(())
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::{Error, Result};

/// Largest supported frame ring.
pub const MAX_FRAMES_IN_FLIGHT: u32 = 3;

/// Configuration consumed when the renderer is initialized.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Number of frame slots in the synchronization ring (1..=3).
    pub frames_in_flight: u32,
    /// Capacity of the per-object storage region, per frame slot.
    pub max_objects: u32,
    /// Size of the texture array binding.
    pub max_texture_slots: u32,
    /// Enable the Khronos validation layer and debug messenger.
    pub enable_validation: bool,
    /// Prefer FIFO presentation. When false, MAILBOX is used if available.
    pub vsync: bool,
    /// Swapchain clear color (RGBA).
    pub clear_color: [f32; 4],
    /// Initial window width in pixels.
    pub window_width: u32,
    /// Initial window height in pixels.
    pub window_height: u32,
    /// Window title.
    pub window_title: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            max_objects: 10_000,
            max_texture_slots: 32,
            enable_validation: cfg!(debug_assertions),
            vsync: true,
            clear_color: [0.0, 0.0, 0.0, 0.0],
            window_width: 1280,
            window_height: 720,
            window_title: "Vulkan Renderer".to_string(),
        }
    }
}

impl RendererConfig {
    /// Parse and validate a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or a value is out of range.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// A missing file is not an error: the defaults are returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, cannot be parsed,
    /// or fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let config = Self::from_toml_str(&text)?;
                info!("Loaded renderer config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("{} not found, using default config", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 || self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(Error::Config(format!(
                "frames_in_flight must be in 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT, self.frames_in_flight
            )));
        }
        if self.max_objects == 0 {
            return Err(Error::Config("max_objects must be at least 1".into()));
        }
        if self.max_texture_slots == 0 {
            return Err(Error::Config("max_texture_slots must be at least 1".into()));
        }
        if self.window_width == 0 || self.window_height == 0 {
            return Err(Error::Config(format!(
                "window size must be nonzero, got {}x{}",
                self.window_width, self.window_height
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = RendererConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.max_objects, 10_000);
        assert_eq!(config.max_texture_slots, 32);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RendererConfig::from_toml_str("frames_in_flight = 3\nvsync = false").unwrap();
        assert_eq!(config.frames_in_flight, 3);
        assert!(!config.vsync);
        assert_eq!(config.max_objects, 10_000);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = RendererConfig::from_toml_str("").unwrap();
        assert_eq!(config, RendererConfig::default());
    }

    #[test]
    fn test_clear_color_parsed() {
        let config = RendererConfig::from_toml_str("clear_color = [0.1, 0.2, 0.3, 1.0]").unwrap();
        assert_eq!(config.clear_color, [0.1, 0.2, 0.3, 1.0]);
    }

    #[test]
    fn test_rejects_zero_frames_in_flight() {
        let err = RendererConfig::from_toml_str("frames_in_flight = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_too_many_frames_in_flight() {
        let err = RendererConfig::from_toml_str("frames_in_flight = 4").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_zero_texture_slots() {
        let config = RendererConfig {
            max_texture_slots: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml() {
        let err = RendererConfig::from_toml_str("frames_in_flight = \"two\"").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = RendererConfig::load("/nonexistent/renderer.toml").unwrap();
        assert_eq!(config, RendererConfig::default());
    }
}
