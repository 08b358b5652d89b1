pub mod probe;
pub mod supervisor;

pub use probe::probe;
pub use supervisor::{ServerHandle, ServerOptions, ServerState, ServerSupervisor};
