pub mod ads;
pub mod audio;
pub mod core;
pub mod engagement;
pub mod error;
pub mod feed;
pub mod gestures;
pub mod playback;

pub use error::{FeedError, Result};
