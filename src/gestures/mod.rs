pub mod events;
pub mod navigator;


pub use events::*;
pub use navigator::*;
