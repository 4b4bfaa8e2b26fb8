//! Incremental filter that strips `<think>…</think>` reasoning blocks from a
//! chunked text stream.
//!
//! The model interleaves a reasoning sub-stream with the user-visible answer
//! in the same byte stream. One boolean tracks whether the cursor is inside a
//! reasoning block; the flag persists across fragments, so a block opened in
//! one chunk and closed three chunks later is handled correctly.
//!
//! Known limitation: a marker split across two fragments (e.g. `<thi` at the
//! end of one chunk, `nk>` at the start of the next) is not reassembled, so
//! the first half leaks through. Chat endpoints tokenize the markers as whole
//! units in practice; callers needing exactness must buffer at fragment
//! boundaries themselves.

const START_TAG: &str = "<think>";
const END_TAG: &str = "</think>";

/// Stateful think-block filter. Create a fresh one per response stream.
#[derive(Debug, Default)]
pub struct ThinkTagFilter {
    thinking: bool,
}

impl ThinkTagFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw fragment, get back the user-visible subsequence.
    ///
    /// A fragment may contain any mix of visible text and reasoning — both
    /// markers, one, or neither. The returned string may be empty.
    pub fn push(&mut self, fragment: &str) -> String {
        let mut visible = String::new();
        let mut rest = fragment;

        while !rest.is_empty() {
            if self.thinking {
                match rest.find(END_TAG) {
                    Some(pos) => {
                        // Discard through the end marker, resume visible text.
                        rest = &rest[pos + END_TAG.len()..];
                        self.thinking = false;
                    }
                    None => {
                        // Still inside the block; drop the whole remainder.
                        rest = "";
                    }
                }
            } else {
                match rest.find(START_TAG) {
                    Some(pos) => {
                        visible.push_str(&rest[..pos]);
                        rest = &rest[pos + START_TAG.len()..];
                        self.thinking = true;
                    }
                    None => {
                        visible.push_str(rest);
                        rest = "";
                    }
                }
            }
        }

        visible
    }
}
