pub mod app;
pub mod config;
pub mod config_io;
pub mod logging;
pub mod single_instance;
pub mod transfer;
