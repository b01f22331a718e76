pub mod command;
pub mod input;
