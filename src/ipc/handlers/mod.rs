pub mod config;
pub mod core;
pub mod linkage;
pub mod records;
pub mod runs;
pub mod sheets;
