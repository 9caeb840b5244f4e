// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

mod attempt_completion;
mod path;
mod read_file;
mod registry;
mod write_file;
mod write_todos;

pub use attempt_completion::AttemptCompletionTool;
pub use read_file::ReadFileTool;
pub use registry::{Tool, ToolRegistry};
pub use write_file::WriteFileTool;
pub use write_todos::WriteTodosTool;

/// Registry with every built-in tool.
pub fn default_registry() -> ToolRegistry {
	let mut registry = ToolRegistry::new();
	registry.register(Box::new(ReadFileTool::new()));
	registry.register(Box::new(WriteFileTool::new()));
	registry.register(Box::new(WriteTodosTool::new()));
	registry.register(Box::new(AttemptCompletionTool::new()));
	registry
}
