use async_trait::async_trait;
use std::time::Duration;

use crate::ads::{AdInterleaver, DisplaySequence};
use crate::core::{DeepLinkConfig, ItemId, Reel};
use crate::error::{FeedError, Result};

/// The host list that can be scrolled to a display index.
#[async_trait]
pub trait ScrollHost: Send + Sync {
    /// Fails with [`FeedError::NotReady`] while the list has no layout yet.
    async fn scroll_to_index(&self, display_index: usize) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollRequest {
    pub target_id: ItemId,
    pub display_index: usize,
    /// 0 for the first attempt.
    pub attempt: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollResult {
    Scrolled,
    NotReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeepLinkStep {
    Done,
    RetryAfter(Duration),
    /// Retries exhausted; the user stays at the default position.
    GaveUp,
    /// No deep link was in progress.
    Idle,
}

/// Drives the feed list to a deep-linked reel, retrying with linearly
/// growing delays while the host is not ready.
pub struct DeepLinkScroller {
    max_retries: u32,
    base_delay: Duration,
    pending: Option<ScrollRequest>,
}

impl DeepLinkScroller {
    pub fn new(config: &DeepLinkConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.base_delay(),
            pending: None,
        }
    }

    /// Resolves `target_id` to a display index. `None` if the reel is not in
    /// the loaded feed.
    pub fn begin(
        &mut self,
        target_id: &str,
        reels: &[Reel],
        sequence: &DisplaySequence,
        interleaver: &AdInterleaver,
    ) -> Option<ScrollRequest> {
        let Some(display_index) = Self::resolve(target_id, reels, sequence, interleaver) else {
            log::warn!("Deep link target {} is not in the feed", target_id);
            self.pending = None;
            return None;
        };

        let request = ScrollRequest {
            target_id: target_id.to_string(),
            display_index,
            attempt: 0,
        };
        log::debug!("Deep link to {} at display index {}", target_id, display_index);
        self.pending = Some(request.clone());
        Some(request)
    }

    pub fn on_scroll_result(&mut self, result: ScrollResult) -> DeepLinkStep {
        let Some(request) = self.pending.as_mut() else {
            return DeepLinkStep::Idle;
        };

        match result {
            ScrollResult::Scrolled => {
                self.pending = None;
                DeepLinkStep::Done
            }
            ScrollResult::NotReady => {
                request.attempt += 1;
                if request.attempt > self.max_retries {
                    log::debug!(
                        "Giving up deep link to {} after {} retries",
                        request.target_id,
                        self.max_retries
                    );
                    self.pending = None;
                    return DeepLinkStep::GaveUp;
                }
                DeepLinkStep::RetryAfter(self.base_delay * request.attempt)
            }
        }
    }

    /// The pending request with its display index recomputed, since the
    /// sequence may have been rebuilt while waiting.
    pub fn retry_request(
        &mut self,
        reels: &[Reel],
        sequence: &DisplaySequence,
        interleaver: &AdInterleaver,
    ) -> Option<ScrollRequest> {
        let pending = self.pending.as_mut()?;
        match Self::resolve(&pending.target_id, reels, sequence, interleaver) {
            Some(display_index) => {
                pending.display_index = display_index;
                Some(pending.clone())
            }
            None => {
                log::debug!("Deep link target {} left the feed", pending.target_id);
                self.pending = None;
                None
            }
        }
    }

    pub fn pending(&self) -> Option<&ScrollRequest> {
        self.pending.as_ref()
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Scrolls `host` to the request, sleeping between attempts.
    pub async fn run(&mut self, host: &dyn ScrollHost, request: ScrollRequest) -> DeepLinkStep {
        self.pending = Some(request);

        loop {
            let Some(display_index) = self.pending.as_ref().map(|request| request.display_index) else {
                return DeepLinkStep::Idle;
            };

            let result = match host.scroll_to_index(display_index).await {
                Ok(()) => ScrollResult::Scrolled,
                Err(FeedError::NotReady) => ScrollResult::NotReady,
                Err(e) => {
                    log::debug!("Scroll to {} failed: {}", display_index, e);
                    ScrollResult::NotReady
                }
            };

            match self.on_scroll_result(result) {
                DeepLinkStep::RetryAfter(delay) => tokio::time::sleep(delay).await,
                step => return step,
            }
        }
    }

    fn resolve(target_id: &str, reels: &[Reel], sequence: &DisplaySequence, interleaver: &AdInterleaver) -> Option<usize> {
        let reel_index = reels.iter().position(|reel| reel.id == target_id)?;
        Some(interleaver.display_index(reel_index, sequence.inserted_ads()))
    }
}
