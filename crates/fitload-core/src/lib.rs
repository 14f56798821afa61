pub mod aggregator;
pub mod config;
pub mod db;
pub mod error;
pub mod loader;
pub mod locator;
pub mod memory;
pub mod orchestrator;
pub mod report;
pub mod table;
pub mod transform;
