pub mod frames;
pub mod status;
