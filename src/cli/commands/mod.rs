//! CLI command modules

pub mod init;
pub mod scan;
pub mod validate;
pub mod watch;
