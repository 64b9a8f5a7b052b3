use anyhow::{Context, Result, ensure};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::habit::DEFAULT_COLOR;
use crate::streaks::MAX_WINDOW_DAYS;

const MAX_PAGE_SIZE: u32 = 1000;

fn default_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "me".to_string())
}
fn default_heatmap_days() -> u32 {
    90
}
fn default_consistency_days() -> u32 {
    90
}
fn default_group_days() -> u32 {
    30
}
fn default_page_size() -> u32 {
    50
}
fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Local profile used when `--user` is not given
    #[serde(default = "default_user")]
    pub user: String,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            user: default_user(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_heatmap_days")]
    pub heatmap_days: u32,
    #[serde(default = "default_consistency_days")]
    pub consistency_days: u32,
    #[serde(default = "default_group_days")]
    pub group_days: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            heatmap_days: default_heatmap_days(),
            consistency_days: default_consistency_days(),
            group_days: default_group_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Messages shown by `group chat list`; twice this when polling with --after
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabitsConfig {
    #[serde(default = "default_color")]
    pub default_color: String,
}

impl Default for HabitsConfig {
    fn default() -> Self {
        Self {
            default_color: default_color(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub profile: ProfileConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub habits: HabitsConfig,
}

impl AppConfig {
    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("", "", "habitual")
            .context("Could not determine project directories")
    }

    pub fn config_path() -> Result<PathBuf> {
        let dirs = Self::project_dirs()?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn data_dir() -> Result<PathBuf> {
        let dirs = Self::project_dirs()?;
        Ok(dirs.data_dir().to_path_buf())
    }

    pub fn db_path() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("habitual.db"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("no config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Reading {:?}", path))?;
        let config: AppConfig = toml::from_str(&content).context("Parsing config.toml")?;
        config.validate().with_context(|| format!("Invalid settings in {:?}", path))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let windows = [
            ("analytics.heatmap_days", self.analytics.heatmap_days),
            ("analytics.consistency_days", self.analytics.consistency_days),
            ("analytics.group_days", self.analytics.group_days),
        ];
        for (key, days) in windows {
            ensure!(
                (1..=MAX_WINDOW_DAYS).contains(&days),
                "{} must be between 1 and {} (got {})",
                key,
                MAX_WINDOW_DAYS,
                days
            );
        }
        ensure!(
            (1..=MAX_PAGE_SIZE).contains(&self.chat.page_size),
            "chat.page_size must be between 1 and {} (got {})",
            MAX_PAGE_SIZE,
            self.chat.page_size
        );
        ensure!(!self.profile.user.trim().is_empty(), "profile.user cannot be empty");
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).context("Serializing config")?;
        std::fs::write(path, content).with_context(|| format!("Writing {:?}", path))?;
        Ok(())
    }

    pub fn ensure_data_dir() -> Result<PathBuf> {
        let dir = Self::data_dir()?;
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}
