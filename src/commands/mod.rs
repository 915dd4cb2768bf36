pub mod config;
pub mod kpi;
pub mod review;
