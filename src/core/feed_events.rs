use tokio::sync::broadcast;

/// Server push notifications that invalidate the loaded feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    ItemCreated { item_id: String, owner_id: String },
    FeedInvalidated,
}

impl FeedEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FeedEvent::ItemCreated { .. } => "item:created",
            FeedEvent::FeedInvalidated => "feed:invalidate",
        }
    }

    /// Parses a named push event. Unknown names are ignored.
    pub fn from_name(name: &str, item_id: Option<&str>, owner_id: Option<&str>) -> Option<Self> {
        match name {
            "item:created" => Some(FeedEvent::ItemCreated {
                item_id: item_id.unwrap_or_default().to_string(),
                owner_id: owner_id.unwrap_or_default().to_string(),
            }),
            "feed:invalidate" => Some(FeedEvent::FeedInvalidated),
            _ => None,
        }
    }
}

/// Fan-out point for invalidation events. The push transport adapter calls
/// [`InvalidationChannel::publish`]; feed sessions hold a receiver for as long
/// as the feed screen is alive and drop it on teardown.
pub struct InvalidationChannel {
    event_sender: broadcast::Sender<FeedEvent>,
}

impl InvalidationChannel {
    pub fn new() -> (Self, broadcast::Receiver<FeedEvent>) {
        let (event_sender, event_receiver) = broadcast::channel(32);
        (InvalidationChannel { event_sender }, event_receiver)
    }

    pub fn publish(&self, event: FeedEvent) {
        log::debug!("Publishing feed event {}", event.name());
        if let Err(e) = self.event_sender.send(event) {
            // No live subscribers; nothing to invalidate.
            log::debug!("Feed event dropped: {}", e);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.event_sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.event_sender.receiver_count()
    }
}

/// Waits for the next event. A receiver that fell behind has missed events,
/// which is reported as a full invalidation. `None` once the channel closed.
pub async fn next_event(receiver: &mut broadcast::Receiver<FeedEvent>) -> Option<FeedEvent> {
    match receiver.recv().await {
        Ok(event) => Some(event),
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
            log::warn!("Missed {} feed events, invalidating", skipped);
            Some(FeedEvent::FeedInvalidated)
        }
        Err(broadcast::error::RecvError::Closed) => None,
    }
}

impl Default for InvalidationChannel {
    fn default() -> Self {
        Self::new().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_round_trip() {
        let created = FeedEvent::from_name("item:created", Some("r1"), Some("u1")).expect("known");
        assert_eq!(created.name(), "item:created");
        assert_eq!(FeedEvent::from_name("feed:invalidate", None, None), Some(FeedEvent::FeedInvalidated));
        assert_eq!(FeedEvent::from_name("comment:added", None, None), None);
    }

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let (channel, mut receiver) = InvalidationChannel::new();
        let mut second = channel.subscribe();
        assert_eq!(channel.subscriber_count(), 2);

        channel.publish(FeedEvent::FeedInvalidated);

        assert_eq!(receiver.recv().await.expect("event"), FeedEvent::FeedInvalidated);
        assert_eq!(second.recv().await.expect("event"), FeedEvent::FeedInvalidated);
    }

    #[tokio::test]
    async fn test_lagging_receiver_sees_invalidation() {
        let (channel, mut receiver) = InvalidationChannel::new();
        for i in 0..40 {
            channel.publish(FeedEvent::ItemCreated {
                item_id: format!("r{}", i),
                owner_id: "u1".to_string(),
            });
        }

        assert_eq!(next_event(&mut receiver).await, Some(FeedEvent::FeedInvalidated));
        drop(channel);
    }

    #[test]
    fn test_unsubscribed_receivers_stop_counting() {
        let (channel, receiver) = InvalidationChannel::new();
        drop(receiver);
        assert_eq!(channel.subscriber_count(), 0);
        channel.publish(FeedEvent::FeedInvalidated);
    }
}
