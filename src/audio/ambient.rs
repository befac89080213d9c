use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::Result;

/// The audio session that owns background music tracks attached to reels.
#[async_trait]
pub trait AmbientAudio: Send + Sync {
    /// Stops every ambient track. Called on blur and background.
    async fn stop_all(&self) -> Result<()>;
}

/// Ambient audio for hosts without a separate music session. Counts stop
/// requests so callers can observe them.
#[derive(Debug, Default)]
pub struct SilentAudio {
    stops: AtomicUsize,
}

impl SilentAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AmbientAudio for SilentAudio {
    async fn stop_all(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Stops ambient audio, logging instead of propagating failures.
pub async fn stop_ambient(audio: &dyn AmbientAudio) {
    log::debug!("Stopping ambient audio");
    if let Err(e) = audio.stop_all().await {
        log::warn!("Failed to stop ambient audio: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedError;

    struct BrokenAudio;

    #[async_trait]
    impl AmbientAudio for BrokenAudio {
        async fn stop_all(&self) -> Result<()> {
            Err(FeedError::Remote("audio session gone".to_string()))
        }
    }

    #[tokio::test]
    async fn test_stop_ambient_counts_and_swallows_errors() {
        let audio = SilentAudio::new();
        stop_ambient(&audio).await;
        stop_ambient(&audio).await;
        assert_eq!(audio.stop_count(), 2);

        stop_ambient(&BrokenAudio).await;
    }
}
