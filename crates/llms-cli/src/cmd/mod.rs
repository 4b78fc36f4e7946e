pub mod config;
pub mod generate;
pub mod hook;
pub mod init;
pub mod sources;
pub mod status;
pub mod sync;
