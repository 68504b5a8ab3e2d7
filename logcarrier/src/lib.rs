pub mod binenc;
pub mod chain;
pub mod compress;
pub mod config;
pub mod conn;
pub mod dump;
pub mod error;
pub mod file;
pub mod frame_writer;
pub mod header;
pub mod header_worker;
pub mod line_writer;
pub mod logging;
pub mod panic_hook;
pub mod paths;
pub mod periodic;
pub mod pool;
pub mod registry;
pub mod rotate;
pub mod server;
pub mod signal_hook;
pub mod snapshot;
