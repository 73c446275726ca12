pub mod metrics;
pub mod schemas;
