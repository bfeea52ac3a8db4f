//! Splitting a final answer into streaming deltas.

use serde::Deserialize;

fn default_size() -> usize {
    1
}

/// How buffered text is cut into content chunks on the OpenAI stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Chunking {
    /// Fixed number of characters per chunk.
    Chars {
        #[serde(default = "default_size")]
        size: usize,
    },
    /// One word per chunk, trailing whitespace attached.
    Words,
    /// Roughly `size` bytes per chunk, never splitting a character.
    Bytes {
        #[serde(default = "default_size")]
        size: usize,
    },
}

impl Default for Chunking {
    fn default() -> Self {
        Chunking::Chars { size: 1 }
    }
}

impl Chunking {
    /// Split `text`. Concatenating the result yields `text` again.
    pub fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        match *self {
            Chunking::Chars { size } => split_chars(text, size.max(1)),
            Chunking::Words => split_words(text),
            Chunking::Bytes { size } => split_bytes(text, size.max(1)),
        }
    }
}

fn split_chars(text: &str, size: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (count, (idx, _)) in text.char_indices().enumerate() {
        if count > 0 && count % size == 0 {
            out.push(&text[start..idx]);
            start = idx;
        }
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

fn split_words(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_space = false;
    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            in_space = true;
        } else if in_space {
            out.push(&text[start..idx]);
            start = idx;
            in_space = false;
        }
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

fn split_bytes(text: &str, size: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + size).min(text.len());
        while !text.is_char_boundary(end) {
            end += 1;
        }
        out.push(&text[start..end]);
        start = end;
    }
    out
}
