pub mod args;
pub mod bench;
pub mod render;
pub mod session;
