// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Cheap token estimation used for prompt budgeting.

use crate::message::{ContentBlock, HistoryMessage, MessageContent};

const CHARS_PER_TOKEN: usize = 4;

pub fn estimate_tokens(text: &str) -> usize {
	text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

pub fn estimate_message_tokens(message: &HistoryMessage) -> usize {
	match &message.content {
		MessageContent::Text(text) => estimate_tokens(text),
		MessageContent::Blocks(blocks) => blocks.iter().map(estimate_block_tokens).sum(),
	}
}

fn estimate_block_tokens(block: &ContentBlock) -> usize {
	match block {
		ContentBlock::Text { text } => estimate_tokens(text),
		ContentBlock::Thinking { thinking, .. } => estimate_tokens(thinking),
		ContentBlock::ToolUse { name, input, .. } => {
			estimate_tokens(name) + estimate_tokens(&input.to_string())
		}
		ContentBlock::ToolResult { content, .. } => estimate_tokens(content),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_estimate_rounds_up() {
		assert_eq!(estimate_tokens(""), 0);
		assert_eq!(estimate_tokens("abc"), 1);
		assert_eq!(estimate_tokens("abcd"), 1);
		assert_eq!(estimate_tokens("abcde"), 2);
	}

	#[test]
	fn test_message_estimate_counts_blocks() {
		let msg = HistoryMessage::tool_result(None, "t1", "12345678", false, false);
		assert_eq!(estimate_message_tokens(&msg), 2);
	}
}
