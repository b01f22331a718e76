pub mod matcher;
pub mod pipeline;
pub mod screenshot;
pub mod templates;
pub mod traits;
pub mod types;
