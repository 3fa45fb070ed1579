pub mod daemon;
pub mod init;
pub mod plan;
pub mod status;
pub mod sync;
