pub mod address;
pub mod buffer;
pub mod notecard;
pub mod sampling;
pub mod sen5x;
pub mod uploader;
