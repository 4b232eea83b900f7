//! Ember ABI crate: stable contracts shared by the session core and backends.

pub mod chat;
pub mod engine;
pub mod error;
pub mod sampling;
pub mod token;

pub use chat::*;
pub use engine::*;
pub use error::*;
pub use sampling::*;
pub use token::*;
