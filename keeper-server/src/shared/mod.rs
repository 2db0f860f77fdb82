pub mod extract;
pub mod tracing;
