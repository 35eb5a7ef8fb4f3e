// src/data_pipeline/mod.rs

pub mod fetcher;
pub mod transaction;
