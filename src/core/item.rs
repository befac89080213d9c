use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ItemId = String;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub is_liked: bool,
    pub likes_count: u64,
    pub comments_count: u64,
}

/// The part of [`Engagement`] a like toggle changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeState {
    pub is_liked: bool,
    pub likes_count: u64,
}

impl Engagement {
    pub fn like_state(&self) -> LikeState {
        LikeState {
            is_liked: self.is_liked,
            likes_count: self.likes_count,
        }
    }

    pub fn apply(&mut self, state: LikeState) {
        self.is_liked = state.is_liked;
        self.likes_count = state.likes_count;
    }
}

impl LikeState {
    /// The optimistic result of toggling: flip the flag and move the count
    /// one step, never below zero.
    pub fn toggled(self) -> Self {
        if self.is_liked {
            Self {
                is_liked: false,
                likes_count: self.likes_count.saturating_sub(1),
            }
        } else {
            Self {
                is_liked: true,
                likes_count: self.likes_count + 1,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reel {
    pub id: ItemId,
    pub owner_id: String,
    pub locator_candidates: Vec<String>,
    pub caption: String,
    pub tags: Vec<String>,
    pub engagement: Engagement,
    pub music_present: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl Reel {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            locator_candidates: vec![locator.into()],
            caption: String::new(),
            tags: Vec::new(),
            engagement: Engagement::default(),
            music_present: false,
            created_at: None,
        }
    }

    /// First usable locator, if any candidate is non-empty.
    pub fn primary_locator(&self) -> Option<&str> {
        self.locator_candidates
            .iter()
            .map(|candidate| candidate.trim())
            .find(|candidate| !candidate.is_empty())
    }
}

/// A reel as delivered by the feed provider. Liking info is optional because
/// some endpoints omit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteReel {
    pub id: ItemId,
    pub owner_id: String,
    #[serde(default)]
    pub locator_candidates: Vec<String>,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_liked: Option<bool>,
    #[serde(default)]
    pub likes_count: Option<u64>,
    #[serde(default)]
    pub comments_count: u64,
    #[serde(default)]
    pub music_present: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl RemoteReel {
    /// Builds a reel, treating missing liking info as not liked.
    pub fn into_reel(self) -> Reel {
        Reel {
            engagement: Engagement {
                is_liked: self.is_liked.unwrap_or(false),
                likes_count: self.likes_count.unwrap_or(0),
                comments_count: self.comments_count,
            },
            id: self.id,
            owner_id: self.owner_id,
            locator_candidates: self.locator_candidates,
            caption: self.caption,
            tags: self.tags,
            music_present: self.music_present,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem {
    Reel(Reel),
    AdSlot { ad_index: usize },
}

impl FeedItem {
    pub fn as_reel(&self) -> Option<&Reel> {
        match self {
            FeedItem::Reel(reel) => Some(reel),
            FeedItem::AdSlot { .. } => None,
        }
    }

    pub fn is_ad(&self) -> bool {
        matches!(self, FeedItem::AdSlot { .. })
    }

    pub fn reel_id(&self) -> Option<&str> {
        self.as_reel().map(|reel| reel.id.as_str())
    }
}
