pub mod api;
pub mod app;
pub mod config;
pub mod config_io;
pub mod engine;
pub mod gateway;
pub mod history;
pub mod logging;
pub mod magnet;
pub mod registry;
pub mod single_instance;
