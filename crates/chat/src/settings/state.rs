use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::chat::collapse::CollapseConfig;
use crate::chat::viewport::ViewportConfig;

pub const SETTINGS_DIRECTORY_NAME: &str = "arbor";
pub const SETTINGS_FILE_NAME: &str = "view.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportSettings {
    pub retry_delay_ms: u64,
    pub retry_limit: u32,
    pub stabilization_window_ms: u64,
    pub bottom_gap_px: f32,
    pub jump_throttle_ms: u64,
    pub reveal_throttle_ms: u64,
    pub reveal_offset_px: f32,
}

impl Default for ViewportSettings {
    fn default() -> Self {
        Self::from_config(ViewportConfig::default())
    }
}

impl ViewportSettings {
    fn from_config(config: ViewportConfig) -> Self {
        Self {
            retry_delay_ms: duration_ms(config.retry_delay),
            retry_limit: config.retry_limit,
            stabilization_window_ms: duration_ms(config.stabilization_window),
            bottom_gap_px: config.bottom_gap,
            jump_throttle_ms: duration_ms(config.jump_throttle),
            reveal_throttle_ms: duration_ms(config.reveal_throttle),
            reveal_offset_px: config.reveal_offset,
        }
    }

    pub fn to_config(&self) -> ViewportConfig {
        ViewportConfig {
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            retry_limit: self.retry_limit,
            stabilization_window: Duration::from_millis(self.stabilization_window_ms),
            bottom_gap: self.bottom_gap_px,
            jump_throttle: Duration::from_millis(self.jump_throttle_ms),
            reveal_throttle: Duration::from_millis(self.reveal_throttle_ms),
            reveal_offset: self.reveal_offset_px,
        }
    }

    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        Self {
            retry_delay_ms: positive_or(self.retry_delay_ms, defaults.retry_delay_ms),
            retry_limit: if self.retry_limit == 0 {
                defaults.retry_limit
            } else {
                self.retry_limit
            },
            stabilization_window_ms: positive_or(
                self.stabilization_window_ms,
                defaults.stabilization_window_ms,
            ),
            bottom_gap_px: positive_px_or(self.bottom_gap_px, defaults.bottom_gap_px),
            jump_throttle_ms: positive_or(self.jump_throttle_ms, defaults.jump_throttle_ms),
            reveal_throttle_ms: positive_or(self.reveal_throttle_ms, defaults.reveal_throttle_ms),
            reveal_offset_px: positive_px_or(self.reveal_offset_px, defaults.reveal_offset_px),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollapseSettings {
    pub max_height_px: f32,
    pub collapsed_height_px: f32,
    pub reveal_band_px: f32,
    pub recheck_delay_ms: u64,
    pub scroll_delay_ms: u64,
}

impl Default for CollapseSettings {
    fn default() -> Self {
        Self::from_config(CollapseConfig::default())
    }
}

impl CollapseSettings {
    fn from_config(config: CollapseConfig) -> Self {
        Self {
            max_height_px: config.max_height,
            collapsed_height_px: config.collapsed_height,
            reveal_band_px: config.reveal_band,
            recheck_delay_ms: duration_ms(config.recheck_delay),
            scroll_delay_ms: duration_ms(config.scroll_delay),
        }
    }

    pub fn to_config(&self) -> CollapseConfig {
        CollapseConfig {
            max_height: self.max_height_px,
            collapsed_height: self.collapsed_height_px,
            reveal_band: self.reveal_band_px,
            recheck_delay: Duration::from_millis(self.recheck_delay_ms),
            scroll_delay: Duration::from_millis(self.scroll_delay_ms),
        }
    }

    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        let max_height_px = positive_px_or(self.max_height_px, defaults.max_height_px);
        let mut collapsed_height_px =
            positive_px_or(self.collapsed_height_px, defaults.collapsed_height_px);
        // A cap at or above the threshold would never visibly truncate.
        if collapsed_height_px >= max_height_px {
            collapsed_height_px = max_height_px / 2.0;
        }

        Self {
            max_height_px,
            collapsed_height_px,
            reveal_band_px: positive_px_or(self.reveal_band_px, defaults.reveal_band_px),
            recheck_delay_ms: positive_or(self.recheck_delay_ms, defaults.recheck_delay_ms),
            scroll_delay_ms: positive_or(self.scroll_delay_ms, defaults.scroll_delay_ms),
        }
    }
}

/// Tunables of the conversation view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    pub viewport: ViewportSettings,
    pub collapse: CollapseSettings,
}

impl ViewSettings {
    pub fn normalized(self) -> Self {
        Self {
            viewport: self.viewport.normalized(),
            collapse: self.collapse.normalized(),
        }
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<ViewSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".arbor"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<ViewSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: ViewSettings) -> Result<Arc<ViewSettings>, SettingsError> {
        let normalized_settings = Arc::new(settings.normalized());
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::clone(&normalized_settings));
        Ok(normalized_settings)
    }

    fn load_from_disk(path: &Path) -> ViewSettings {
        if !path.exists() {
            tracing::info!("view settings not found at {:?}, using defaults", path);
            return ViewSettings::default();
        }

        let figment =
            Figment::from(Serialized::defaults(ViewSettings::default())).merge(Json::file(path));

        match figment.extract::<ViewSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse view settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                ViewSettings::default()
            }
        }
    }

    fn persist(&self, settings: &ViewSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved view settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn positive_or(value: u64, fallback: u64) -> u64 {
    if value == 0 { fallback } else { value }
}

fn positive_px_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}
