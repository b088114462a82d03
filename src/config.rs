// Configuration - config.toml plus command line flags
//
// Settings load from config.toml with sensible defaults when the file is
// missing or partial. A handful of clap flags override the file.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Command line flags. These win over config.toml.
#[derive(Parser, Debug)]
#[command(about = "Renders a single frame of an 8-point cube with Vulkan", long_about = None)]
pub struct CliArgs {
    /// Write the rendered frame to draw-cube.png before exiting
    #[arg(long)]
    pub save_image: bool,

    /// Path to the TOML config file
    #[arg(long, default_value = "config.toml")]
    pub config: PathBuf,
}

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Draw Cube".to_string(),
            width: 400,
            height: 300,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    /// How long the rendered frame stays on screen before the sample exits
    pub display_seconds: f32,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            display_seconds: 10.0,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub save_image: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            save_image: false,
        }
    }
}

impl Config {
    /// Load configuration and fold in the command line overrides
    pub fn load(args: &CliArgs) -> Self {
        let mut config = Self::load_from_path(&args.config).unwrap_or_else(|e| {
            log::warn!("Failed to load {:?}: {}. Using defaults.", args.config, e);
            Config::default()
        });

        if args.save_image {
            config.debug.save_image = true;
        }

        config
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Get present mode as a Vulkan enum
    pub fn get_present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                ash::vk::PresentModeKHR::FIFO
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn defaults_match_the_sample() {
        let config = Config::default();
        assert_eq!(config.window.title, "Draw Cube");
        assert_eq!((config.window.width, config.window.height), (400, 300));
        assert!(!config.debug.save_image);
        assert_eq!(config.get_present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn partial_toml_merges_over_defaults() {
        let config: Config = toml::from_str(
            r#"
            [graphics]
            present_mode = "mailbox"
            display_seconds = 1.5
            "#,
        )
        .unwrap();

        assert_eq!(config.get_present_mode(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.graphics.display_seconds, 1.5);
        // Untouched sections keep their defaults
        assert_eq!(config.window.width, 400);
        assert_eq!(config.graphics.clear_color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn unknown_present_mode_falls_back_to_fifo() {
        let config: Config = toml::from_str(
            r#"
            [graphics]
            present_mode = "warp-speed"
            "#,
        )
        .unwrap();
        assert_eq!(config.get_present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn save_image_flag_overrides_config() {
        let args = CliArgs::parse_from(["draw-cube", "--save-image"]);
        assert!(args.save_image);

        let args = CliArgs::parse_from(["draw-cube"]);
        assert!(!args.save_image);
    }
}
