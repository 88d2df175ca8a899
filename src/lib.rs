pub mod aws;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod parser;
pub mod pusher;
pub mod watcher;
