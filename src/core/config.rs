use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tuning for the feed controller. Every field has a default, so config files
/// written by older versions keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub viewport: ViewportConfig,
    pub resources: ResourceConfig,
    pub url_cache: UrlCacheConfig,
    pub ads: AdConfig,
    pub gestures: GestureConfig,
    pub deep_link: DeepLinkConfig,
    pub page_size: usize,
    pub quality_hint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Fraction of the viewport an item must cover to count as visible.
    pub visibility_threshold: f32,
    pub min_dwell_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Items within this many display positions of the active one stay mounted.
    pub mount_distance: usize,
    pub transient_retry_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlCacheConfig {
    pub ttl_secs: u64,
    pub refresh_grace_secs: u64,
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdConfig {
    /// An ad slot follows every `interval`-th reel.
    pub interval: usize,
    pub max_per_session: usize,
    pub min_reels_watched: usize,
    pub min_session_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub trigger_distance: f32,
    pub direction_ratio: f32,
    pub progress_distance: f32,
    pub release_animation_ms: u64,
    pub settle_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeepLinkConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            viewport: ViewportConfig::default(),
            resources: ResourceConfig::default(),
            url_cache: UrlCacheConfig::default(),
            ads: AdConfig::default(),
            gestures: GestureConfig::default(),
            deep_link: DeepLinkConfig::default(),
            page_size: 10,
            quality_hint: "auto".to_string(),
        }
    }
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: 0.8,
            min_dwell_ms: 100,
        }
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            mount_distance: 1,
            transient_retry_ms: 1_000,
        }
    }
}

impl Default for UrlCacheConfig {
    fn default() -> Self {
        // Upstream locators expire after 15 minutes.
        Self {
            ttl_secs: 10 * 60,
            refresh_grace_secs: 2 * 60,
            capacity: 256,
        }
    }
}

impl Default for AdConfig {
    fn default() -> Self {
        Self {
            interval: 5,
            max_per_session: 3,
            min_reels_watched: 5,
            min_session_secs: 20,
        }
    }
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            trigger_distance: 50.0,
            direction_ratio: 1.5,
            progress_distance: 100.0,
            release_animation_ms: 200,
            settle_delay_ms: 800,
        }
    }
}

impl Default for DeepLinkConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 100,
        }
    }
}

impl ViewportConfig {
    pub fn min_dwell(&self) -> Duration {
        Duration::from_millis(self.min_dwell_ms)
    }
}

impl ResourceConfig {
    pub fn transient_retry_delay(&self) -> Duration {
        Duration::from_millis(self.transient_retry_ms)
    }
}

impl UrlCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn refresh_grace(&self) -> Duration {
        Duration::from_secs(self.refresh_grace_secs)
    }
}

impl AdConfig {
    pub fn min_session(&self) -> Duration {
        Duration::from_secs(self.min_session_secs)
    }
}

impl GestureConfig {
    pub fn release_animation(&self) -> Duration {
        Duration::from_millis(self.release_animation_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl DeepLinkConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl FeedConfig {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .map_err(|e| anyhow::anyhow!("Failed to read config file at {}: {}", config_path.display(), e))?;

            match serde_json::from_str::<Self>(&content) {
                Ok(config) => {
                    config.validate()?;
                    log::info!("Loaded existing config from {}", config_path.display());
                    Ok(config)
                }
                Err(e) => {
                    log::warn!("Config file exists but has issues ({}), replacing it with defaults", e);
                    let new_config = Self::default();
                    new_config.save_to(config_path)
                        .map_err(|save_err| anyhow::anyhow!("Failed to save new config: {}", save_err))?;
                    Ok(new_config)
                }
            }
        } else {
            log::info!("No config file found, creating default config");
            let config = Self::default();
            config.save_to(config_path)
                .map_err(|e| anyhow::anyhow!("Failed to save default config: {}", e))?;
            log::info!("Created new config file at {}", config_path.display());
            Ok(config)
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("reel-feed")
            .join("config.json")
    }

    /// Rejects values that would break the controller's invariants.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.viewport.visibility_threshold) {
            return Err(anyhow::anyhow!(
                "visibility_threshold must be within 0..=1, got {}",
                self.viewport.visibility_threshold
            ));
        }
        if self.ads.interval == 0 {
            return Err(anyhow::anyhow!("ad interval must be at least 1"));
        }
        if self.url_cache.refresh_grace_secs >= self.url_cache.ttl_secs {
            return Err(anyhow::anyhow!(
                "refresh grace ({}s) must be shorter than the TTL ({}s)",
                self.url_cache.refresh_grace_secs,
                self.url_cache.ttl_secs
            ));
        }
        if self.url_cache.capacity == 0 {
            return Err(anyhow::anyhow!("url cache capacity must be at least 1"));
        }
        if self.page_size == 0 {
            return Err(anyhow::anyhow!("page_size must be at least 1"));
        }
        Ok(())
    }
}
