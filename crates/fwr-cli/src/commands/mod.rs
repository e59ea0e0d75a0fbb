pub mod pipeline;
pub mod verify;
