pub mod aggregates;
pub mod config;
pub mod date_normalizer;
pub mod error;
pub mod export;
pub mod filters;
pub mod forecast;
pub mod ingestion;
pub mod insights;
pub mod kpis;
pub mod pipelines;
pub mod sample;
pub mod types;
pub mod validation;
