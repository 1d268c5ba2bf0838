pub mod handlers;
pub mod parser;

pub use handlers::LogCommands;
pub use parser::{LogCommand, parse_command};
