#[cfg(test)]
mod tests {

    use std::time::Duration;
    use crate::core::FeedConfig;

    #[test]
    fn test_feed_config_defaults() {
        let config = FeedConfig::default();
        assert_eq!(config.viewport.visibility_threshold, 0.8);
        assert_eq!(config.viewport.min_dwell(), Duration::from_millis(100));
        assert_eq!(config.resources.mount_distance, 1);
        assert_eq!(config.url_cache.ttl(), Duration::from_secs(600));
        assert_eq!(config.url_cache.refresh_grace(), Duration::from_secs(120));
        assert_eq!(config.ads.interval, 5);
        assert_eq!(config.ads.max_per_session, 3);
        assert_eq!(config.ads.min_reels_watched, 5);
        assert_eq!(config.ads.min_session(), Duration::from_secs(20));
        assert_eq!(config.gestures.trigger_distance, 50.0);
        assert_eq!(config.gestures.direction_ratio, 1.5);
        assert_eq!(config.deep_link.max_retries, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_feed_config_serialization() {
        let mut config = FeedConfig::default();
        config.page_size = 25;
        config.quality_hint = "720p".to_string();
        config.gestures.settle_delay_ms = 1_200;

        let serialized = serde_json::to_string(&config).expect("Failed to serialize config");
        let deserialized: FeedConfig = serde_json::from_str(&serialized).expect("Failed to deserialize config");

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_config_backward_compatibility() {
        // Old config files only carried the page size and ad settings
        let old_config_json = r#"{
            "page_size": 20,
            "ads": { "interval": 7 }
        }"#;

        let config: FeedConfig = serde_json::from_str(old_config_json).expect("Failed to parse old config");

        assert_eq!(config.page_size, 20);
        assert_eq!(config.ads.interval, 7);
        assert_eq!(config.ads.max_per_session, 3);
        assert_eq!(config.url_cache.ttl_secs, 600);
    }

    #[test]
    fn test_validate_rejects_grace_longer_than_ttl() {
        let mut config = FeedConfig::default();
        config.url_cache.refresh_grace_secs = config.url_cache.ttl_secs;
        assert!(config.validate().is_err());

        let mut config = FeedConfig::default();
        config.ads.interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let mut config = FeedConfig::default();
        config.page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_rejects_zero_page_size() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "page_size": 0 }"#).expect("write");

        assert!(FeedConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.json");

        let config = FeedConfig::load_from(&path).expect("load");
        assert_eq!(config, FeedConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn test_load_replaces_corrupted_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").expect("write");

        let config = FeedConfig::load_from(&path).expect("load");
        assert_eq!(config, FeedConfig::default());

        let rewritten = std::fs::read_to_string(&path).expect("read");
        assert!(serde_json::from_str::<FeedConfig>(&rewritten).is_ok());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");

        let mut config = FeedConfig::default();
        config.deep_link.max_retries = 8;
        config.save_to(&path).expect("save");

        let loaded = FeedConfig::load_from(&path).expect("load");
        assert_eq!(loaded.deep_link.max_retries, 8);
    }
}
