use crate::core::{FeedItem, Reel};

/// Reels in source order with ad slots spliced in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplaySequence {
    items: Vec<FeedItem>,
    inserted_ads: usize,
}

impl DisplaySequence {
    pub fn from_items(items: Vec<FeedItem>) -> Self {
        let inserted_ads = items.iter().filter(|item| item.is_ad()).count();
        Self { items, inserted_ads }
    }

    pub fn reels_only(reels: &[Reel]) -> Self {
        Self::from_items(reels.iter().cloned().map(FeedItem::Reel).collect())
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    pub fn get(&self, display_index: usize) -> Option<&FeedItem> {
        self.items.get(display_index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn inserted_ads(&self) -> usize {
        self.inserted_ads
    }

    /// Display position of a reel id.
    pub fn position_of(&self, reel_id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.reel_id() == Some(reel_id))
    }

    /// Source-order index of the reel at `display_index`; `None` for ad slots.
    pub fn reel_index_of(&self, display_index: usize) -> Option<usize> {
        match self.items.get(display_index)? {
            FeedItem::AdSlot { .. } => None,
            FeedItem::Reel(_) => Some(
                self.items[..display_index]
                    .iter()
                    .filter(|item| !item.is_ad())
                    .count(),
            ),
        }
    }

    pub fn reel_mut(&mut self, reel_id: &str) -> Option<&mut Reel> {
        self.items.iter_mut().find_map(|item| match item {
            FeedItem::Reel(reel) if reel.id == reel_id => Some(reel),
            _ => None,
        })
    }
}
