mod app;
mod cli;
pub mod config;
mod effects;
pub mod logging;
pub mod persistence;
pub mod render;
pub mod signin;

pub use app::run_app;
pub use cli::{Cli, Command};
