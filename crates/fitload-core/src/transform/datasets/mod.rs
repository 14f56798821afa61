//! Transformers for the datasets found in a fitness-platform export.

pub mod activities;
pub mod daily;
pub mod sleep;
