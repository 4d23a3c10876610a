//! Configuration types and TOML loading.
//!
//! Every section has serde defaults so a minimal (or absent) config file
//! yields a working setup; the defaults mirror the production values the
//! bot has always run with.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ManimatorConfig {
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Pinned image the render containers run.
    #[serde(default = "default_image")]
    pub image: String,
    /// Non-root user inside the container.
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_render_timeout")]
    pub render_timeout_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Render quality preset passed as `--quality=<q>`.
    #[serde(default = "default_quality")]
    pub quality: String,
    /// Import the online-TeX extension library into assembled scripts.
    #[serde(default)]
    pub online_tex: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            user: default_user(),
            render_timeout_secs: default_render_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            quality: default_quality(),
            online_tex: false,
        }
    }
}

impl SandboxConfig {
    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Which interaction transport a result message is wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ControlBinding {
    /// Legacy trash-can reaction with a fixed expiry.
    Reactions,
    /// Structured controls: render again, change settings, dismiss.
    #[default]
    Buttons,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default)]
    pub transport: ControlBinding,
    /// Idle window after which button controls are disabled.
    #[serde(default = "default_view_timeout")]
    pub view_timeout_secs: u64,
    /// Window the deletion reaction stays armed.
    #[serde(default = "default_reaction_timeout")]
    pub reaction_timeout_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            transport: ControlBinding::default(),
            view_timeout_secs: default_view_timeout(),
            reaction_timeout_secs: default_reaction_timeout(),
        }
    }
}

impl LifecycleConfig {
    pub fn view_timeout(&self) -> Duration {
        Duration::from_secs(self.view_timeout_secs)
    }

    pub fn reaction_timeout(&self) -> Duration {
        Duration::from_secs(self.reaction_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ManimatorConfig {
    /// Loads and validates a TOML configuration file.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ConfigError(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: ManimatorConfig =
            toml::from_str(content).map_err(|e| ConfigError(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sandbox.image.trim().is_empty() {
            return Err(ConfigError("sandbox.image must not be empty".to_string()));
        }
        if self.sandbox.render_timeout_secs == 0 {
            return Err(ConfigError(
                "sandbox.render_timeout_secs must be positive".to_string(),
            ));
        }
        if self.sandbox.probe_timeout_secs == 0 {
            return Err(ConfigError(
                "sandbox.probe_timeout_secs must be positive".to_string(),
            ));
        }
        if self.lifecycle.view_timeout_secs == 0 || self.lifecycle.reaction_timeout_secs == 0 {
            return Err(ConfigError(
                "lifecycle timeouts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_image() -> String {
    "manimcommunity/manim:stable".to_string()
}

fn default_user() -> String {
    "manimuser".to_string()
}

fn default_render_timeout() -> u64 {
    120
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_quality() -> String {
    "m".to_string()
}

fn default_view_timeout() -> u64 {
    120
}

fn default_reaction_timeout() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = ManimatorConfig::from_str("").unwrap();
        assert_eq!(config.sandbox.image, "manimcommunity/manim:stable");
        assert_eq!(config.sandbox.render_timeout_secs, 120);
        assert_eq!(config.sandbox.probe_timeout_secs, 10);
        assert_eq!(config.lifecycle.transport, ControlBinding::Buttons);
    }

    #[test]
    fn sections_override_defaults() {
        let config = ManimatorConfig::from_str(
            "[sandbox]\nrender_timeout_secs = 30\n\n[lifecycle]\ntransport = \"reactions\"\n",
        )
        .unwrap();
        assert_eq!(config.sandbox.render_timeout_secs, 30);
        assert_eq!(config.lifecycle.transport, ControlBinding::Reactions);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = ManimatorConfig::from_str("[sandbox]\nrender_timeout_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("render_timeout_secs"));
    }

    #[test]
    fn empty_image_is_rejected() {
        assert!(ManimatorConfig::from_str("[sandbox]\nimage = \" \"\n").is_err());
    }
}
