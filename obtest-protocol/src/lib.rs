pub mod client;
pub mod interpreter;
pub mod parser;
pub mod registry;

pub use client::{DEFAULT_RECEIVE_TIMEOUT, ProtocolClient};
pub use interpreter::CommandInterpreter;
pub use parser::{ScriptLine, parse_line};
pub use registry::ConnectionRegistry;
