pub mod engine;
pub mod monitor;
pub mod state;
pub mod status;
