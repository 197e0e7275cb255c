//! Python debug attach MCP tools module

pub mod attach_tools;
pub mod types;

pub use attach_tools::PythonDebugToolHandler;
pub use types::*;
