//! API routes.

pub mod ask;
pub mod chat;
pub mod health;

pub use ask::{AskRequest, SearchParams, SearchResponse, ask_handler, search_handler};
pub use chat::{
    ChatRequest, ChatResponse, ResetResponse, SummaryResponse, chat_handler, reset_handler,
    summary_handler,
};
pub use health::{HealthResponse, health_routes};
