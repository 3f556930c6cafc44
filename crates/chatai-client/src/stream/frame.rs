//! Frame splitting and delta extraction for the completion event stream.

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

/// Literal marker that opens every data frame.
pub const DATA_MARKER: &str = "data:";
const MARKER_WIDTH: usize = 5;
const DONE_SENTINEL: &str = "[DONE]";
const PREVIEW_CHARS: usize = 80;
/// Longest unterminated line kept while waiting for its newline.
const MAX_PENDING_LINE: usize = 1024 * 1024;

/// How the frame marker is removed before the payload is decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerMode {
    /// Require the literal `data:` marker; skip SSE comments and non-data
    /// fields; report any other line as malformed.
    #[default]
    Validated,
    /// Strip the first five characters without looking at them.
    FixedOffset,
}

impl std::str::FromStr for MarkerMode {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "validated" => Ok(MarkerMode::Validated),
            "fixed-offset" => Ok(MarkerMode::FixedOffset),
            other => Err(format!("unknown marker mode: {other}")),
        }
    }
}

/// Text fragment carried by one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamDelta {
    pub content: String,
}

#[derive(Deserialize, Debug)]
struct ChunkPayload {
    choices: Option<Vec<ChunkChoice>>,
}

#[derive(Deserialize, Debug)]
struct ChunkChoice {
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize, Debug)]
struct ChunkDelta {
    content: Option<String>,
}

/// Decode one frame payload and extract `choices[0].delta.content`.
///
/// A missing link anywhere on that path yields an empty fragment; only a
/// payload that is not the expected JSON shape is an error.
pub fn parse_delta(payload: &str) -> Result<StreamDelta> {
    let chunk: ChunkPayload = serde_json::from_str(payload)
        .map_err(|e| ChatError::FrameDecode(format!("{e} in {:?}", preview(payload))))?;

    let content = chunk
        .choices
        .and_then(|choices| choices.into_iter().next())
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .unwrap_or_default();

    Ok(StreamDelta { content })
}

/// Splits decoded text into frames. A line cut by a chunk edge is buffered
/// until its newline arrives or the stream ends.
#[derive(Debug)]
pub struct FrameParser {
    mode: MarkerMode,
    line_buffer: String,
}

impl FrameParser {
    pub fn new(mode: MarkerMode) -> Self {
        Self {
            mode,
            line_buffer: String::new(),
        }
    }

    pub fn mode(&self) -> MarkerMode {
        self.mode
    }

    /// Feed decoded text, returning one result per complete frame.
    ///
    /// A frame ends at a newline, or at the end of the pushed text when the
    /// pending line already holds a whole JSON payload. Servers that send one
    /// unterminated frame per chunk are read chunk by chunk.
    pub fn push(&mut self, text: &str) -> Vec<Result<StreamDelta>> {
        self.line_buffer.push_str(text);

        let mut frames = Vec::new();
        if let Some(last_newline) = self.line_buffer.rfind('\n') {
            let complete: String = self.line_buffer.drain(..=last_newline).collect();
            frames.extend(complete.split('\n').filter_map(|line| self.parse_line(line)));
        }

        if self.pending_is_complete() {
            let rest = std::mem::take(&mut self.line_buffer);
            frames.extend(self.parse_line(&rest));
        } else if self.line_buffer.len() > MAX_PENDING_LINE {
            let rest = std::mem::take(&mut self.line_buffer);
            frames.push(Err(ChatError::FrameDecode(format!(
                "no line end after {} bytes in {:?}",
                rest.len(),
                preview(&rest)
            ))));
        }
        frames
    }

    fn pending_is_complete(&self) -> bool {
        let line = self.line_buffer.trim_end();
        if !line.ends_with('}') {
            return false;
        }
        let payload = match self.mode {
            MarkerMode::FixedOffset => line
                .char_indices()
                .nth(MARKER_WIDTH)
                .map(|(offset, _)| &line[offset..]),
            MarkerMode::Validated => line
                .strip_prefix(DATA_MARKER)
                .map(|payload| payload.strip_prefix(' ').unwrap_or(payload)),
        };
        payload.is_some_and(|payload| {
            payload.trim_start().starts_with('{')
                && serde_json::from_str::<serde::de::IgnoredAny>(payload).is_ok()
        })
    }

    /// Parse whatever is left once the body has ended.
    pub fn finish(&mut self) -> Vec<Result<StreamDelta>> {
        let rest = std::mem::take(&mut self.line_buffer);
        self.parse_line(&rest).into_iter().collect()
    }

    fn parse_line(&self, raw: &str) -> Option<Result<StreamDelta>> {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            return None;
        }

        match self.mode {
            MarkerMode::FixedOffset => {
                let payload = match line.char_indices().nth(MARKER_WIDTH) {
                    Some((offset, _)) => &line[offset..],
                    None => "",
                };
                Some(parse_delta(payload))
            }
            MarkerMode::Validated => {
                if let Some(payload) = line.strip_prefix(DATA_MARKER) {
                    let payload = payload.strip_prefix(' ').unwrap_or(payload);
                    if payload.trim() == DONE_SENTINEL {
                        return None;
                    }
                    return Some(parse_delta(payload));
                }

                // SSE comment
                if line.starts_with(':') {
                    return None;
                }
                let field = line.split(':').next().unwrap_or(line);
                if matches!(field, "event" | "id" | "retry") {
                    tracing::trace!(field, "Skipping non-data SSE field");
                    return None;
                }

                Some(Err(ChatError::FrameDecode(format!(
                    "missing data marker in {:?}",
                    preview(line)
                ))))
            }
        }
    }
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().nth(PREVIEW_CHARS).is_some() {
        out.push('…');
    }
    out
}
