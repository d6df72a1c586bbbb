//! Global configuration management
//!
//! Settings are layered: the built-in `Config.toml`, then a `Config.toml`
//! next to the executable, then `DOCMARK_*` environment variables.
//!
//! ```rust,no_run
//! let settings = docmark::config::get_settings();
//! println!("{:?}", settings.image_mode());
//! ```

use config::{Config, ConfigError, Environment, File, FileFormat};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::{env, fs, path::PathBuf, sync::RwLock};

/// How pictures end up in the rendered markdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageMode {
    /// `<!-- image -->` in place of the picture.
    Placeholder,
    /// Inline `data:` URI.
    Embedded,
    /// Saved under `image_path` and linked.
    Referenced,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub image_path: PathBuf,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    #[serde(default)]
    pub image_mode: Option<ImageMode>,
    #[serde(default)]
    pub max_file_size: Option<u64>,
    #[serde(default)]
    pub max_num_pages: Option<usize>,
}

static SETTINGS: Lazy<RwLock<Settings>> = Lazy::new(|| {
    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("failed to load configuration, using defaults: {}", e);
        Settings::default()
    });
    RwLock::new(settings)
});

/// Snapshot of the process-wide settings.
pub fn get_settings() -> Settings {
    match SETTINGS.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Replace the process-wide settings.
pub fn set_settings(settings: Settings) {
    match SETTINGS.write() {
        Ok(mut guard) => *guard = settings,
        Err(poisoned) => *poisoned.into_inner() = settings,
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // 1. built-in default config
        let mut builder = Config::builder().add_source(File::from_str(
            include_str!("../Config.toml"),
            FileFormat::Toml,
        ));

        // 2. external config file beside the executable
        if let Ok(exe_path) = env::current_exe() {
            if let Some(dir) = exe_path.parent() {
                let external = dir.join("Config.toml");
                if fs::metadata(&external).is_ok() {
                    tracing::debug!(path = %external.display(), "loading external config");
                    builder = builder.add_source(File::from(external).required(false));
                }
            }
        }

        // 3. environment variables
        builder = builder.add_source(
            Environment::with_prefix("DOCMARK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Apply values given on the command line on top of the loaded ones.
    pub fn apply_cli_overrides(
        &mut self,
        image_path: Option<PathBuf>,
        output_path: Option<PathBuf>,
        image_mode: Option<ImageMode>,
    ) {
        if let Some(path) = image_path {
            self.image_path = path;
        }
        if let Some(path) = output_path {
            self.output_path = Some(path);
        }
        if let Some(mode) = image_mode {
            self.image_mode = Some(mode);
        }
    }

    /// The effective picture mode: explicit setting first, otherwise
    /// referenced when an image directory is configured.
    pub fn image_mode(&self) -> ImageMode {
        match self.image_mode {
            Some(mode) => mode,
            None if self.image_path.as_os_str().is_empty() => ImageMode::Embedded,
            None => ImageMode::Referenced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_matches_defaults() {
        let builtin: Settings = Config::builder()
            .add_source(File::from_str(include_str!("../Config.toml"), FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert!(builtin.image_path.as_os_str().is_empty());
        assert_eq!(builtin.max_file_size, None);
        assert_eq!(builtin.image_mode(), ImageMode::Embedded);
    }

    #[test]
    fn set_settings_replaces_the_global() {
        let mut settings = get_settings();
        settings.max_num_pages = Some(5_000);
        set_settings(settings);
        assert_eq!(get_settings().max_num_pages, Some(5_000));
    }

    #[test]
    fn image_mode_follows_image_path() {
        let mut settings = Settings::default();
        settings.apply_cli_overrides(Some(PathBuf::from("imgs")), None, None);
        assert_eq!(settings.image_mode(), ImageMode::Referenced);
        settings.apply_cli_overrides(None, None, Some(ImageMode::Placeholder));
        assert_eq!(settings.image_mode(), ImageMode::Placeholder);
    }
}
