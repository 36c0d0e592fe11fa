pub mod config;
pub mod gateway;
pub mod session;
pub mod settings;
pub mod task;
pub mod terminal;
pub mod transcript;
