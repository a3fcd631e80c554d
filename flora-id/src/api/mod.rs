//! HTTP API handlers for flora-id

pub mod chat;
pub mod health;
pub mod identify;

pub use chat::chat_routes;
pub use health::health_routes;
pub use identify::identify_routes;

/// Longest user message forwarded to the generation chain
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Trim and bound a user message
pub(crate) fn bounded_message(message: &str) -> &str {
    flora_common::text::truncate_chars(message.trim(), MAX_MESSAGE_CHARS).0
}
