pub mod commands;
pub mod errors;
pub mod rc;
pub mod serialization;
pub mod types;
