use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reel_feed::audio::SilentAudio;
use reel_feed::core::{next_event, FeedConfig, FeedEvent, InvalidationChannel, LikeState, RemoteReel};
use reel_feed::engagement::{EngagementApi, EngagementStore, JsonFileStore};
use reel_feed::feed::{DeepLinkScroller, DeepLinkStep, FeedController, FeedProvider, FeedSession, HostCommand, ScrollHost, ScrollResult};
use reel_feed::playback::{LifecycleEvent, ResourceCommand, ResourceEvent};
use reel_feed::{FeedError, Result};

/// In-memory catalogue standing in for the feed backend.
struct DemoProvider {
    reels: Vec<RemoteReel>,
}

impl DemoProvider {
    fn new(count: usize) -> Self {
        let reels = (0..count)
            .map(|i| RemoteReel {
                id: format!("reel-{}", i),
                owner_id: format!("user-{}", i % 4),
                locator_candidates: vec![format!("https://cdn.example/reels/{}.mp4?sig=demo", i)],
                caption: format!("Demo reel {}", i),
                tags: vec!["demo".to_string()],
                is_liked: if i % 3 == 0 { None } else { Some(false) },
                likes_count: Some(i as u64),
                comments_count: 0,
                music_present: i % 2 == 0,
                created_at: Some(chrono::Utc::now()),
            })
            .collect();
        Self { reels }
    }
}

#[async_trait]
impl FeedProvider for DemoProvider {
    async fn fetch_reels(&self, page: usize, page_size: usize) -> Result<Vec<RemoteReel>> {
        Ok(self.reels.iter().skip(page * page_size).take(page_size).cloned().collect())
    }

    async fn fetch_reel(&self, item_id: &str) -> Result<RemoteReel> {
        self.reels
            .iter()
            .find(|reel| reel.id == item_id)
            .cloned()
            .ok_or_else(|| FeedError::UnknownItem(item_id.to_string()))
    }

    async fn delete_reel(&self, _item_id: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct DemoApi {
    likes: Mutex<HashMap<String, LikeState>>,
    follows: Mutex<HashMap<String, bool>>,
}

#[async_trait]
impl EngagementApi for DemoApi {
    async fn toggle_like(&self, item_id: &str) -> Result<LikeState> {
        let mut likes = self
            .likes
            .lock()
            .map_err(|_| FeedError::Remote("like table poisoned".to_string()))?;
        let state = likes.entry(item_id.to_string()).or_insert(LikeState {
            is_liked: false,
            likes_count: 0,
        });
        *state = state.toggled();
        Ok(*state)
    }

    async fn toggle_follow(&self, user_id: &str) -> Result<bool> {
        let mut follows = self
            .follows
            .lock()
            .map_err(|_| FeedError::Remote("follow table poisoned".to_string()))?;
        let following = follows.entry(user_id.to_string()).or_insert(false);
        *following = !*following;
        Ok(*following)
    }
}

/// A list that has no layout for its first few scroll attempts.
struct DemoScrollHost {
    attempts: AtomicU32,
    ready_after: u32,
}

#[async_trait]
impl ScrollHost for DemoScrollHost {
    async fn scroll_to_index(&self, display_index: usize) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.ready_after {
            return Err(FeedError::NotReady);
        }
        log::info!("Scrolled list to display index {}", display_index);
        Ok(())
    }
}

/// Plays the host side: every mount and play succeeds immediately.
async fn run_host(session: &mut FeedSession, mut commands: Vec<HostCommand>, now: Instant) -> Result<()> {
    loop {
        commands.extend(session.pump(now).await?);
        if commands.is_empty() {
            return Ok(());
        }

        for command in commands.drain(..) {
            let controller = session.controller_mut();
            match command {
                HostCommand::Resource(ResourceCommand::Mount { item_id, locator, muted }) => {
                    log::debug!("Mounting {} from {} (muted: {})", item_id, locator, muted);
                    controller.on_resource_event(ResourceEvent::Mounted { item_id }, now);
                }
                HostCommand::Resource(ResourceCommand::Play { token, .. }) => {
                    controller.on_resource_event(ResourceEvent::PlayCompleted { token, result: Ok(()) }, now);
                }
                HostCommand::Resource(ResourceCommand::Pause { token }) => {
                    controller.on_resource_event(ResourceEvent::PauseCompleted { token, result: Ok(()) }, now);
                }
                HostCommand::Resource(ResourceCommand::Release { item_id }) => {
                    log::debug!("Released {}", item_id);
                }
                HostCommand::ScrollToIndex(display_index) => {
                    log::debug!("Host scrolled to {}", display_index);
                    controller.on_scroll_result(ScrollResult::Scrolled, now);
                }
                HostCommand::Navigate(route) => log::info!("Navigate to {}", route),
                HostCommand::Notice(text) => log::info!("Notice: {}", text),
                other => log::debug!("Host command: {:?}", other),
            }
        }
    }
}

/// Brings `display_index` fully on screen long enough to count as visible.
async fn show(session: &mut FeedSession, display_index: usize, now: Instant) -> Result<Instant> {
    let dwell = Duration::from_millis(session.controller().config().viewport.min_dwell_ms);
    let later = now + dwell + Duration::from_millis(50);

    let controller = session.controller_mut();
    controller.on_viewport_sample(display_index, 1.0, now);
    controller.tick(later);
    run_host(session, Vec::new(), later).await?;

    if let Some(reel) = session.controller().active_reel() {
        log::info!("Now playing {} by {}", reel.id, reel.owner_id);
    }
    Ok(later)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = FeedConfig::load()?;
    let store = Arc::new(JsonFileStore::new(JsonFileStore::default_path()));
    let engagement = Arc::new(EngagementStore::new(store, Arc::new(DemoApi::default())));
    engagement.load().await?;

    let (channel, mut events) = InvalidationChannel::new();
    let mut now = Instant::now();
    let controller = FeedController::new(config.clone(), now);
    let mut session = FeedSession::new(controller, Arc::new(DemoProvider::new(24)), engagement, Arc::new(SilentAudio::new()));

    let loaded = session.reload(now).await?;
    log::info!("Loaded {} reels", loaded);
    while !session.is_exhausted() {
        session.load_more(now).await?;
    }

    for display_index in 0..4 {
        now = show(&mut session, display_index, now).await?;
    }

    if let Some(item_id) = session.controller().active_id().map(str::to_string) {
        match session.toggle_like(&item_id).await {
            Ok(Some(state)) => log::info!("Liked {}: {:?}", item_id, state),
            Ok(None) => log::info!("Like for {} still pending", item_id),
            Err(e) => log::warn!("Like failed: {}", e),
        }
        let saved = session.toggle_save(&item_id).await?;
        log::info!("Saved {}: {}", item_id, saved);
    }

    let mut scroller = DeepLinkScroller::new(&config.deep_link);
    let request = {
        let controller = session.controller();
        scroller.begin("reel-17", controller.reels(), controller.sequence(), controller.interleaver())
    };
    if let Some(request) = request {
        let host = DemoScrollHost {
            attempts: AtomicU32::new(0),
            ready_after: 2,
        };
        let display_index = request.display_index;
        match scroller.run(&host, request).await {
            DeepLinkStep::Done => now = show(&mut session, display_index, now).await?,
            step => log::warn!("Deep link did not land: {:?}", step),
        }
    }

    session.controller_mut().on_lifecycle(LifecycleEvent::AppBackground);
    run_host(&mut session, Vec::new(), now).await?;
    session.controller_mut().on_lifecycle(LifecycleEvent::AppForeground);
    run_host(&mut session, Vec::new(), now).await?;

    channel.publish(FeedEvent::FeedInvalidated);
    if let Some(event) = next_event(&mut events).await {
        let commands = session.handle_event(&event, now).await?;
        run_host(&mut session, commands, now).await?;
    }

    session.controller_mut().close(now);
    run_host(&mut session, Vec::new(), now).await?;
    drop(events);
    log::info!("Feed closed, {} subscribers left", channel.subscriber_count());

    Ok(())
}
