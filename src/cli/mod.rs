pub mod commands;
pub mod config_cmd;
pub mod daemon;
pub mod output;
pub mod renderer;
