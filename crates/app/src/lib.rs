pub mod attachments;
pub mod collapse;
pub mod config;
pub mod consumer;
pub mod controller;
pub mod format;
pub mod presets;
pub mod state;
pub mod view;

pub use controller::{ChatController, SendOutcome, ViewListener};
