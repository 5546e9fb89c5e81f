//! pregao core — daily index-portfolio batch pipeline.
//!
//! Three stages, coupled only through the filesystem and the dataset layout:
//! - Fetch: one day's index composition from B3 into `pregao_<date>.csv`
//! - Load: raw CSVs cleaned and written as `dt`-partitioned Parquet, then archived
//! - Validate: read a dataset object back and summarize its schema and rows
//!
//! Every stage reports per-unit outcomes as values instead of failing the run.

pub mod config;
pub mod data;

pub use config::{ConfigError, HttpConfig, PipelineConfig, RequestConfig};
