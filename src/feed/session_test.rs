#[cfg(test)]
mod tests {
    use crate::audio::SilentAudio;
    use crate::core::{FeedConfig, FeedEvent, LikeState, RemoteReel};
    use crate::engagement::{EngagementApi, EngagementStore, KeyValueStore, MemoryStore, LIKED_REELS_KEY};
    use crate::error::{FeedError, LoadError, Result};
    use crate::feed::{FeedController, FeedProvider, FeedSession, HostCommand};
    use crate::playback::{LifecycleEvent, ResourceCommand, ResourceEvent};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    struct MockProvider {
        reels: Vec<RemoteReel>,
        page_fetches: AtomicUsize,
    }

    impl MockProvider {
        fn new(count: usize) -> Self {
            Self {
                reels: (0..count).map(|i| remote(&format!("r{}", i))).collect(),
                page_fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FeedProvider for MockProvider {
        async fn fetch_reels(&self, page: usize, page_size: usize) -> Result<Vec<RemoteReel>> {
            self.page_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.reels.iter().skip(page * page_size).take(page_size).cloned().collect())
        }

        async fn fetch_reel(&self, item_id: &str) -> Result<RemoteReel> {
            let mut reel = self
                .reels
                .iter()
                .find(|reel| reel.id == item_id)
                .cloned()
                .ok_or_else(|| FeedError::UnknownItem(item_id.to_string()))?;
            reel.locator_candidates = vec![format!("https://cdn/{}.mp4?sig=fresh", item_id)];
            Ok(reel)
        }

        async fn delete_reel(&self, _item_id: &str) -> Result<()> {
            Ok(())
        }
    }

    struct StubApi {
        fail: bool,
    }

    #[async_trait]
    impl EngagementApi for StubApi {
        async fn toggle_like(&self, _item_id: &str) -> Result<LikeState> {
            if self.fail {
                Err(FeedError::Remote("503".to_string()))
            } else {
                Ok(LikeState {
                    is_liked: true,
                    likes_count: 6,
                })
            }
        }

        async fn toggle_follow(&self, _user_id: &str) -> Result<bool> {
            if self.fail {
                Err(FeedError::Remote("503".to_string()))
            } else {
                Ok(true)
            }
        }
    }

    fn remote(id: &str) -> RemoteReel {
        RemoteReel {
            id: id.to_string(),
            owner_id: "u1".to_string(),
            locator_candidates: vec![format!("https://cdn/{}.mp4", id)],
            caption: String::new(),
            tags: Vec::new(),
            is_liked: Some(false),
            likes_count: Some(5),
            comments_count: 0,
            music_present: false,
            created_at: None,
        }
    }

    struct Fixture {
        session: FeedSession,
        provider: Arc<MockProvider>,
        audio: Arc<SilentAudio>,
        store: Arc<MemoryStore>,
    }

    async fn fixture(count: usize, fail_api: bool, controller: FeedController) -> Fixture {
        let provider = Arc::new(MockProvider::new(count));
        let audio = Arc::new(SilentAudio::new());
        let store = Arc::new(MemoryStore::new());
        let engagement = Arc::new(EngagementStore::new(store.clone(), Arc::new(StubApi { fail: fail_api })));
        engagement.load().await.unwrap();

        Fixture {
            session: FeedSession::new(controller, provider.clone(), engagement, audio.clone()),
            provider,
            audio,
            store,
        }
    }

    async fn loaded(count: usize, fail_api: bool, now: Instant) -> Fixture {
        let mut fixture = fixture(count, fail_api, FeedController::new(FeedConfig::default(), now)).await;
        fixture.session.reload(now).await.unwrap();
        fixture
    }

    #[tokio::test]
    async fn test_reload_and_paging() {
        let now = Instant::now();
        let mut fixture = fixture(15, false, FeedController::new(FeedConfig::default(), now)).await;

        assert_eq!(fixture.session.reload(now).await.unwrap(), 10);
        assert!(!fixture.session.is_exhausted());
        assert_eq!(fixture.session.load_more(now).await.unwrap(), 5);
        assert!(fixture.session.is_exhausted());
        assert_eq!(fixture.session.load_more(now).await.unwrap(), 0);

        assert_eq!(fixture.session.controller().reels().len(), 15);
        assert_eq!(fixture.provider.page_fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_page_exhausts_feed() {
        let now = Instant::now();
        let mut fixture = fixture(10, false, FeedController::new(FeedConfig::default(), now)).await;

        assert_eq!(fixture.session.reload(now).await.unwrap(), 10);
        assert!(!fixture.session.is_exhausted());
        assert_eq!(fixture.session.load_more(now).await.unwrap(), 0);
        assert!(fixture.session.is_exhausted());
    }

    #[tokio::test]
    async fn test_failed_like_rolls_back_with_notice() {
        let now = Instant::now();
        let mut fixture = loaded(3, true, now).await;

        assert!(fixture.session.toggle_like("r1").await.is_err());

        let reel = fixture.session.controller().reel("r1").expect("loaded");
        assert!(!reel.engagement.is_liked);
        assert_eq!(reel.engagement.likes_count, 5);
        let raw = fixture.store.get(LIKED_REELS_KEY).await.unwrap();
        assert_eq!(raw.as_deref(), Some("[]"));

        let commands = fixture.session.pump(now).await.unwrap();
        assert!(commands
            .iter()
            .any(|command| matches!(command, HostCommand::Notice(_))));
    }

    #[tokio::test]
    async fn test_successful_like_updates_feed() {
        let now = Instant::now();
        let mut fixture = loaded(3, false, now).await;

        let state = fixture.session.toggle_like("r0").await.unwrap();
        assert_eq!(
            state,
            Some(LikeState {
                is_liked: true,
                likes_count: 6
            })
        );
        let reel = fixture.session.controller().reel("r0").expect("loaded");
        assert!(reel.engagement.is_liked);
        assert!(fixture.session.engagement().liked_ids().contains("r0"));
    }

    #[tokio::test]
    async fn test_feed_event_triggers_reload() {
        let now = Instant::now();
        let mut fixture = loaded(3, false, now).await;

        fixture
            .session
            .handle_event(&FeedEvent::FeedInvalidated, now)
            .await
            .unwrap();
        assert_eq!(fixture.provider.page_fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_filtered_feed_ignores_events() {
        let now = Instant::now();
        let controller = FeedController::new(FeedConfig::default(), now).with_owner_filter("u1");
        let mut fixture = fixture(3, false, controller).await;
        fixture.session.reload(now).await.unwrap();

        let event = FeedEvent::ItemCreated {
            item_id: "r9".to_string(),
            owner_id: "u1".to_string(),
        };
        assert!(fixture.session.handle_event(&event, now).await.unwrap().is_empty());
        assert_eq!(fixture.provider.page_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pump_refreshes_expired_locator() {
        let now = Instant::now();
        let mut fixture = loaded(3, false, now).await;
        let controller = fixture.session.controller_mut();
        controller.on_viewport_sample(0, 1.0, now);
        controller.on_viewport_sample(0, 1.0, now + Duration::from_millis(100));
        controller.drain_commands();

        controller.on_resource_event(
            ResourceEvent::LoadFailed {
                item_id: "r0".to_string(),
                error: LoadError::new("URL signature expired"),
            },
            now,
        );
        let commands = fixture.session.pump(now).await.unwrap();

        assert!(commands.iter().any(|command| matches!(
            command,
            HostCommand::Resource(ResourceCommand::Mount { item_id, locator, .. })
                if item_id == "r0" && locator.contains("sig=fresh")
        )));
        assert!(!commands.iter().any(|command| matches!(command, HostCommand::RefreshLocator(_))));
    }

    #[tokio::test]
    async fn test_pump_stops_ambient_audio() {
        let now = Instant::now();
        let mut fixture = loaded(2, false, now).await;

        fixture.session.controller_mut().on_lifecycle(LifecycleEvent::ScreenBlur);
        let commands = fixture.session.pump(now).await.unwrap();

        assert_eq!(fixture.audio.stop_count(), 1);
        assert!(!commands.contains(&HostCommand::StopAmbientAudio));
    }

    #[tokio::test]
    async fn test_delete_reel_removes_it() {
        let now = Instant::now();
        let mut fixture = loaded(3, false, now).await;

        fixture.session.delete_reel("r1", now).await.unwrap();
        assert!(fixture.session.controller().reel("r1").is_none());
        assert_eq!(fixture.session.controller().reels().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_follow_pushes_notice() {
        let now = Instant::now();
        let mut fixture = loaded(1, true, now).await;

        assert!(fixture.session.toggle_follow("u1").await.is_err());
        assert!(!fixture.session.engagement().is_following("u1"));
        let commands = fixture.session.pump(now).await.unwrap();
        assert!(commands.iter().any(|command| matches!(command, HostCommand::Notice(_))));
    }
}
