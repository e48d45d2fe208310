//! JSON-RPC tool server support

mod client;
pub mod protocol;

pub use client::McpClient;
