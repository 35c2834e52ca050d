pub mod scheduled_message;

pub use scheduled_message::*;
