pub mod api;
pub mod chat;
pub mod error;
pub mod events;
pub mod settings;

pub use error::ChatError;
