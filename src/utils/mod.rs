//! Utils Module
pub mod telemetry;
pub mod truncate;

pub use telemetry::init_telemetry;
pub use truncate::truncate_text;
