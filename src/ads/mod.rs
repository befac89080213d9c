pub mod display_sequence;
pub mod interleaver;

pub use display_sequence::*;
pub use interleaver::*;
