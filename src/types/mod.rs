//! Data types for the belief extraction pipeline.

pub mod belief;
pub mod chunk;
pub mod config;
pub mod graph;
pub mod observation;
pub mod transcript;
pub mod usage;
