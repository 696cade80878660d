pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod hooks;
pub mod review;
pub mod session;
