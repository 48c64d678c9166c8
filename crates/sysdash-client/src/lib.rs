pub mod app;
pub mod config;
pub mod oneshot;
pub mod theme;
pub mod transport;
pub mod ui;
