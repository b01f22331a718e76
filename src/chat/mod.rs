pub mod platform;
pub mod telegram;
pub mod types;
