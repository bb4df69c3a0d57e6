pub mod args;
pub mod bridge;
pub mod commands;
pub mod config;
pub mod engine;
