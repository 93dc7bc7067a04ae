pub mod batch;
pub mod config;
pub mod domain;
pub mod enricher;
pub mod exit;
pub mod logging;
pub mod toolkit;
