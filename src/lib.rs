pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod etherscan;
pub mod models;
pub mod monitoring;
pub mod prices;
pub mod report;
pub mod storage;
pub mod sync;
