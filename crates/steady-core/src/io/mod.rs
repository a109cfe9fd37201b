pub mod binary;
pub mod image_io;
pub mod npy;
pub mod preview;
pub mod record;
