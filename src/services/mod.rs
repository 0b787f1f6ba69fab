pub mod break_even;
pub mod business_plan;
pub mod chat;
pub mod conversation;
pub mod database;
pub mod export;
pub mod extract;
pub mod hierarchy;
pub mod settings;
pub mod throttle;
pub mod tree;

pub use chat::ChatGateway;
pub use database::Database;
pub use settings::{AppSettings, SettingsService};
pub use throttle::LlmThrottle;
