pub mod camera;
pub mod config;
pub mod error;
pub mod estimator;
pub mod flow;
pub mod pose;
pub mod processor;
pub mod projection;
pub mod storage;
