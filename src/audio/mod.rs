pub mod ambient;

pub use ambient::{stop_ambient, AmbientAudio, SilentAudio};
