pub mod detection;
pub mod verify;
