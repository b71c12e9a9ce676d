//! Model Context Protocol client: session handle, transport, and content
//! decoding.

pub mod client;
pub mod content;
pub mod error;
pub mod transport;
