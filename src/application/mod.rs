// Application layer - use cases and orchestration over the repository.

pub mod auth;
pub mod error;
pub mod locks;
pub mod service;

pub use error::*;
pub use locks::UserLocks;
pub use service::*;
