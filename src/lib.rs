pub mod env;
pub mod record;
pub mod entry;
pub mod resource;
pub mod context;
pub mod enrich;
pub mod sink;
pub mod transport;
pub mod layer;
pub mod backend;

#[cfg(feature = "http")]
pub mod cloud_logging;

pub mod init;
pub mod noop_sink;
pub mod memory_sink;
pub mod stdout_sink;
