pub mod config;
pub mod feed_events;
pub mod item;

#[cfg(test)]
mod config_test;

pub use config::*;
pub use feed_events::*;
pub use item::*;
