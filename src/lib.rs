// Re-export needed modules for testing
pub mod api;
pub mod chat;
pub mod interactions;
pub mod models;
pub mod session;

// Re-export main types for convenience
pub use chat::{ChatClient, PollConfig, Subscription};
pub use interactions::{InteractionKind, InteractionState, Interactions};
pub use models::*;
