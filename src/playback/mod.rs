pub mod arbiter;
pub mod commands;
pub mod resources;
pub mod url_cache;
pub mod viewport;

pub use arbiter::*;
pub use commands::*;
pub use resources::*;
pub use url_cache::*;
pub use viewport::*;
