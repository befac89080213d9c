pub mod persistence;
pub mod store;


pub use persistence::*;
pub use store::*;
