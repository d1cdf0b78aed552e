pub mod access_log;
pub mod cache;
pub mod clipboard;
pub mod config;
pub mod error;
pub mod fs;
pub mod index;
pub mod monitor;
pub mod node;
pub mod path;
pub mod protocol;
pub mod server;
pub mod snapshot;
pub mod transport;
pub mod tree;
pub mod users;
