pub mod builder;
pub mod config;
pub mod duration;
pub mod env;
pub mod exception;
pub mod formatter;
pub mod identity;
pub mod mapping;
pub mod record;
pub mod sink;
pub mod logger;
pub mod layer;

#[cfg(feature = "buffered")]
pub mod buffered;

pub mod init;
pub mod noop_sink;

pub use builder::build_mapping;
pub use formatter::EntryFormatter;
pub use mapping::apply_mapping;
