pub mod audio;
pub mod backend;
pub mod collections;
pub mod sync;
