//! Separation of `<think>...</think>` reasoning from visible answer text.
//!
//! The parser consumes text chunk by chunk. Text outside a think block is
//! released as soon as it cannot be the start of an opening tag; text inside
//! a block is collected as reasoning until the closing tag arrives. A block
//! that never closes is handed back as visible text by [`ThinkParser::finish`].

pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";
pub const REASONING_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkState {
    Outside,
    InsideThink,
}

/// Result of draining a parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThinkOutput {
    /// Visible text not yet released by `push`.
    pub trailing_visible: String,
    /// All completed think blocks, joined by [`REASONING_SEPARATOR`].
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ThinkParser {
    state: ThinkState,
    pending: String,
    current_block: String,
    blocks: Vec<String>,
}

impl ThinkParser {
    pub fn new() -> Self {
        Self {
            state: ThinkState::Outside,
            pending: String::new(),
            current_block: String::new(),
            blocks: Vec::new(),
        }
    }

    pub fn state(&self) -> ThinkState {
        self.state
    }

    /// Feed a chunk; returns the visible text that can be released now.
    pub fn push(&mut self, chunk: &str) -> String {
        self.pending.push_str(chunk);
        let mut visible = String::new();

        loop {
            match self.state {
                ThinkState::Outside => match self.pending.find(THINK_OPEN) {
                    Some(idx) => {
                        visible.push_str(&self.pending[..idx]);
                        self.pending.drain(..idx + THINK_OPEN.len());
                        self.state = ThinkState::InsideThink;
                    }
                    None => {
                        let keep = partial_tag_suffix(&self.pending, THINK_OPEN);
                        let release = self.pending.len() - keep;
                        visible.push_str(&self.pending[..release]);
                        self.pending.drain(..release);
                        break;
                    }
                },
                ThinkState::InsideThink => match self.pending.find(THINK_CLOSE) {
                    Some(idx) => {
                        self.current_block.push_str(&self.pending[..idx]);
                        self.pending.drain(..idx + THINK_CLOSE.len());
                        let block = std::mem::take(&mut self.current_block);
                        let block = block.trim();
                        if !block.is_empty() {
                            self.blocks.push(block.to_string());
                        }
                        self.state = ThinkState::Outside;
                    }
                    None => {
                        let keep = partial_tag_suffix(&self.pending, THINK_CLOSE);
                        let consumed = self.pending.len() - keep;
                        self.current_block.push_str(&self.pending[..consumed]);
                        self.pending.drain(..consumed);
                        break;
                    }
                },
            }
        }

        visible
    }

    /// Drain the parser at end of input.
    ///
    /// Held-back tag prefixes are released as text, and the body of an
    /// unterminated think block is returned as trailing visible text.
    pub fn finish(mut self) -> ThinkOutput {
        let trailing_visible = match self.state {
            ThinkState::Outside => std::mem::take(&mut self.pending),
            ThinkState::InsideThink => {
                tracing::debug!(
                    chars = self.current_block.len() + self.pending.len(),
                    "Unterminated think block kept as answer text"
                );
                let mut text = std::mem::take(&mut self.current_block);
                text.push_str(&self.pending);
                text
            }
        };

        let reasoning = if self.blocks.is_empty() {
            None
        } else {
            Some(self.blocks.join(REASONING_SEPARATOR))
        };

        ThinkOutput {
            trailing_visible,
            reasoning,
        }
    }
}

impl Default for ThinkParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a complete text into visible content and reasoning.
pub fn split_reasoning(text: &str) -> (String, Option<String>) {
    let mut parser = ThinkParser::new();
    let mut visible = parser.push(text);
    let output = parser.finish();
    visible.push_str(&output.trailing_visible);
    (visible, output.reasoning)
}

/// Length of the longest suffix of `text` that is a proper prefix of `tag`.
fn partial_tag_suffix(text: &str, tag: &str) -> usize {
    let max = (tag.len() - 1).min(text.len());
    (1..=max)
        .rev()
        .find(|&n| text.is_char_boundary(text.len() - n) && tag.starts_with(&text[text.len() - n..]))
        .unwrap_or(0)
}
