pub mod client;
pub mod models;

pub use client::BotApiClient;
pub use models::BotApiConfig;
