pub mod calendar_bridge;
pub mod command_log;
pub mod config;
pub mod error;
pub mod event_mapper;
