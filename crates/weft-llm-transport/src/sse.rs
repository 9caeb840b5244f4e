// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Line framing for `event:`/`data:` streaming responses.

use tracing::trace;

/// One `data:` line together with the most recent `event:` name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseFrame {
	pub event: Option<String>,
	pub data: String,
}

impl SseFrame {
	pub fn data(data: impl Into<String>) -> Self {
		Self {
			event: None,
			data: data.into(),
		}
	}

	pub fn is_done_marker(&self) -> bool {
		self.data == "[DONE]"
	}
}

/// Incremental frame decoder.
///
/// Bytes are buffered until a full line is available. Every `data:` line is
/// dispatched immediately with the event name in effect; a blank line ends
/// the current event. Comment lines (`:`) and unknown fields are skipped.
#[derive(Debug, Default)]
pub struct FrameDecoder {
	buffer: Vec<u8>,
	event: Option<String>,
}

impl FrameDecoder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
		self.buffer.extend_from_slice(chunk);
		let mut frames = Vec::new();

		while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
			let line: Vec<u8> = self.buffer.drain(..=newline).collect();
			let line = String::from_utf8_lossy(&line[..line.len() - 1]);
			let line = line.strip_suffix('\r').unwrap_or(&line).to_string();
			if let Some(frame) = self.process_line(&line) {
				frames.push(frame);
			}
		}

		frames
	}

	/// Flushes a trailing line that had no terminating newline.
	pub fn finish(&mut self) -> Option<SseFrame> {
		if self.buffer.is_empty() {
			return None;
		}
		let rest = std::mem::take(&mut self.buffer);
		let line = String::from_utf8_lossy(&rest);
		let line = line.trim_end_matches('\r').to_string();
		self.process_line(&line)
	}

	fn process_line(&mut self, line: &str) -> Option<SseFrame> {
		if line.is_empty() {
			self.event = None;
			return None;
		}
		if line.starts_with(':') {
			return None;
		}
		if let Some(name) = field(line, "event") {
			self.event = Some(name.to_string());
			return None;
		}
		if let Some(data) = field(line, "data") {
			trace!(event = ?self.event, len = data.len(), "decoded frame");
			return Some(SseFrame {
				event: self.event.clone(),
				data: data.to_string(),
			});
		}
		None
	}
}

fn field<'a>(line: &'a str, name: &str) -> Option<&'a str> {
	let rest = line.strip_prefix(name)?.strip_prefix(':')?;
	Some(rest.strip_prefix(' ').unwrap_or(rest))
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	const ANTHROPIC_STYLE: &str = "event: message_start\ndata: {\"a\":1}\n\nevent: ping\ndata: {}\n\n: keepalive\nevent: content_block_delta\ndata: {\"b\":2}\n\n";

	fn decode_all(chunks: &[&[u8]]) -> Vec<SseFrame> {
		let mut decoder = FrameDecoder::new();
		let mut frames = Vec::new();
		for chunk in chunks {
			frames.extend(decoder.push(chunk));
		}
		frames.extend(decoder.finish());
		frames
	}

	#[test]
	fn test_event_names_attach_to_data() {
		let frames = decode_all(&[ANTHROPIC_STYLE.as_bytes()]);
		assert_eq!(frames.len(), 3);
		assert_eq!(frames[0].event.as_deref(), Some("message_start"));
		assert_eq!(frames[0].data, "{\"a\":1}");
		assert_eq!(frames[1].event.as_deref(), Some("ping"));
		assert_eq!(frames[2].event.as_deref(), Some("content_block_delta"));
	}

	#[test]
	fn test_data_only_lines_and_done_marker() {
		let frames = decode_all(&[b"data: {\"x\":1}\r\n\r\ndata: [DONE]"]);
		assert_eq!(frames.len(), 2);
		assert_eq!(frames[0].event, None);
		assert_eq!(frames[0].data, "{\"x\":1}");
		assert!(frames[1].is_done_marker());
	}

	#[test]
	fn test_blank_line_resets_event() {
		let frames = decode_all(&[b"event: foo\n\ndata: bar\n"]);
		assert_eq!(frames, vec![SseFrame::data("bar")]);
	}

	proptest! {
			/// **Property: framing does not depend on how the body is chunked**
			#[test]
			fn chunking_does_not_change_frames(split in 0usize..ANTHROPIC_STYLE.len(), split2 in 0usize..ANTHROPIC_STYLE.len()) {
					let bytes = ANTHROPIC_STYLE.as_bytes();
					let (a, b) = (split.min(split2), split.max(split2));
					let chunked = decode_all(&[&bytes[..a], &bytes[a..b], &bytes[b..]]);
					let whole = decode_all(&[bytes]);
					prop_assert_eq!(chunked, whole);
			}
	}
}
