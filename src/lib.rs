pub mod audio;
pub mod file;
pub mod sync;

#[cfg(not(feature = "production"))]
pub mod debug;
