//! Core types, wire format, and chunking for the assurance session client.

pub mod chunker;
pub mod client_info;
pub mod close_code;
pub mod deep_link;
pub mod error;
pub mod events;
pub mod limits;
pub mod session;
pub mod store;

pub use chunker::EventChunker;
pub use client_info::ClientInfo;
pub use close_code::CloseCode;
pub use deep_link::DeepLink;
pub use error::{ConnectionError, Error, Result};
pub use events::*;
pub use session::*;
pub use store::*;
