pub mod controller;
pub mod deep_link;
pub mod session;

#[cfg(test)]
mod session_test;

pub use controller::*;
pub use deep_link::*;
pub use session::*;
