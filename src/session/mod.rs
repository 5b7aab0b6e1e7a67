pub mod commands;
pub mod controller;

pub use commands::{handle_command, handle_line, ControlCommand, ControlReply};
pub use controller::{Collaborators, DetectionSnapshot, SessionController};
