//! Built-in tool implementations for Vigil.
//!
//! Tools give an investigation the ability to look at the system it is
//! investigating: run shell commands and read files. Whether a given call is
//! permitted is decided by the safety policy before the tool ever runs.

pub mod bash;
pub mod read_file;

use vigil_core::tool::ToolRegistry;

pub use bash::BashTool;
pub use read_file::ReadFileTool;

/// Create a registry with every built-in tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(BashTool::new()));
    registry.register(Box::new(ReadFileTool::new()));
    registry
}
