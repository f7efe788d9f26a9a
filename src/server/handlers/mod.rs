pub mod chat;
pub mod health;
pub mod rag;
pub mod sessions;
pub mod utils;
