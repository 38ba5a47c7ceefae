pub mod backups;
pub mod batch;
pub mod describe;
pub mod references;
pub mod rename;
