pub mod export;
pub mod random_string;

pub use export::*;
pub use random_string::*;
