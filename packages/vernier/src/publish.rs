//! Step-based export of registered meters to monitoring backends.

mod backend;
mod config;
mod partition;
mod publisher;
mod sender;

pub use backend::*;
pub use config::*;
pub use partition::*;
pub use publisher::*;
pub use sender::*;
