//! Splits long generated text into a chain of post-sized chunks.
//!
//! Words are accumulated greedily. The first chunk uses a smaller budget so
//! the hashtag trailer still fits, and a chunk boundary is never placed
//! inside a fenced code block.
//!
//! Known limitation: an odd number of fence markers leaves the fence open
//! for the rest of the text, so everything after the last opening fence ends
//! up in one oversized final chunk.

use log::debug;

/// Separator placed between the first chunk's body and its trailer.
pub const TRAILER_SEPARATOR: &str = "\n\n";

const FENCE: &str = "```";

/// Hashtag block appended to the first chunk of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailer {
    /// Used for plain text posts.
    pub text: String,
    /// Used when media is attached.
    pub media: String,
}

impl Trailer {
    pub fn select(&self, has_media: bool) -> &str {
        if has_media {
            &self.media
        } else {
            &self.text
        }
    }
}

impl Default for Trailer {
    fn default() -> Self {
        Self {
            text: "#StochasticParrot #ChatGPT".to_string(),
            media: "#StochasticParrot #ChatGPT".to_string(),
        }
    }
}

/// Per-platform length limits, counted in characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentLimits {
    pub first_chunk_budget: usize,
    pub continuation_chunk_budget: usize,
    pub trailer: Trailer,
}

impl Default for SegmentLimits {
    fn default() -> Self {
        Self {
            first_chunk_budget: 470,
            continuation_chunk_budget: 500,
            trailer: Trailer::default(),
        }
    }
}

/// One post of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostChunk {
    pub text: String,
    pub is_first: bool,
    pub attach_media: bool,
}

/// Splits `text` into an ordered, non-empty list of chunks.
///
/// `text` must be non-empty after trimming; callers reject empty messages
/// before getting here. For empty input the result is a single chunk that
/// holds only the trailer.
pub fn split_into_chunks(text: &str, has_media: bool, limits: &SegmentLimits) -> Vec<PostChunk> {
    let mut builder = ChunkBuilder::new(text, limits);
    for (start, end) in word_spans(text) {
        builder.push_word(start, end);
    }
    let bodies = builder.finish();
    debug!("Split {} characters into {} chunk(s)", char_len(text), bodies.len());

    let trailer = limits.trailer.select(has_media);
    bodies
        .into_iter()
        .enumerate()
        .map(|(index, body)| {
            let is_first = index == 0;
            let text = if is_first {
                with_trailer(&body, trailer)
            } else {
                body
            };
            PostChunk {
                text,
                is_first,
                attach_media: is_first && has_media,
            }
        })
        .collect()
}

fn with_trailer(body: &str, trailer: &str) -> String {
    match (body.is_empty(), trailer.is_empty()) {
        (_, true) => body.to_string(),
        (true, false) => trailer.to_string(),
        (false, false) => format!("{}{}{}", body, TRAILER_SEPARATOR, trailer),
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte ranges of the whitespace-delimited words of `text`.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (index, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, index));
                start = None;
            }
            (false, None) => start = Some(index),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

fn toggles_fence(word: &str) -> bool {
    word.matches(FENCE).count() % 2 == 1
}

/// Accumulates contiguous ranges of the source text as chunk bodies, so
/// whitespace inside a chunk (newlines in code blocks especially) survives.
struct ChunkBuilder<'a> {
    text: &'a str,
    limits: &'a SegmentLimits,
    bodies: Vec<String>,
    start: Option<usize>,
    end: usize,
    len: usize,
    in_fence: bool,
}

impl<'a> ChunkBuilder<'a> {
    fn new(text: &'a str, limits: &'a SegmentLimits) -> Self {
        Self {
            text,
            limits,
            bodies: Vec::new(),
            start: None,
            end: 0,
            len: 0,
            in_fence: false,
        }
    }

    fn budget(&self) -> usize {
        if self.bodies.is_empty() {
            self.limits.first_chunk_budget
        } else {
            self.limits.continuation_chunk_budget
        }
        .max(1)
    }

    fn push_word(&mut self, word_start: usize, word_end: usize) {
        let mut start = word_start;
        loop {
            let budget = self.budget();
            if self.start.is_some() {
                let extended = self.len + char_len(&self.text[self.end..word_end]);
                if self.in_fence || extended <= budget {
                    self.len = extended;
                    self.end = word_end;
                    break;
                }
                self.flush();
                continue;
            }

            let word_len = char_len(&self.text[start..word_end]);
            if self.in_fence || word_len <= budget {
                self.open(start, word_end, word_len);
                break;
            }

            // A single word longer than the whole budget is cut at a char boundary.
            let cut = self.text[start..word_end]
                .char_indices()
                .nth(budget)
                .map(|(offset, _)| start + offset)
                .unwrap_or(word_end);
            self.open(start, cut, budget);
            self.flush();
            start = cut;
        }

        if toggles_fence(&self.text[word_start..word_end]) {
            self.in_fence = !self.in_fence;
        }
    }

    fn open(&mut self, start: usize, end: usize, len: usize) {
        self.start = Some(start);
        self.end = end;
        self.len = len;
    }

    fn flush(&mut self) {
        if let Some(start) = self.start.take() {
            self.bodies.push(self.text[start..self.end].to_string());
            self.len = 0;
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        if self.bodies.is_empty() {
            self.bodies.push(String::new());
        }
        self.bodies
    }
}
