pub mod batch;
pub mod buffer;
pub mod service;
