//! Sentence units for synthesis.
//!
//! A unit ends at a run of terminal punctuation (`。？！?!．` or `.`),
//! optionally followed by closing quotes or brackets. An ASCII period only
//! ends a unit when whitespace follows it, so `3.14` and `e.g.` mid-word
//! stay intact; a period at the very end waits for more text or `finish`.

fn is_terminal(c: char) -> bool {
    matches!(c, '。' | '？' | '！' | '?' | '!' | '．' | '.')
}

fn is_closer(c: char) -> bool {
    matches!(c, '」' | '』' | '）' | ')' | '"' | '\'' | '”' | '’')
}

fn has_content(unit: &str) -> bool {
    unit.chars().any(char::is_alphanumeric)
}

/// Split `buffer` into complete units plus the unterminated remainder.
pub fn split_sentences(buffer: &str) -> (Vec<String>, String) {
    let chars: Vec<(usize, char)> = buffer.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        if !is_terminal(chars[i].1) {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while j < chars.len() && (is_terminal(chars[j].1) || is_closer(chars[j].1)) {
            j += 1;
        }

        let period_only = chars[i..j].iter().all(|&(_, c)| c == '.' || is_closer(c));
        if period_only && !matches!(chars.get(j), Some((_, next)) if next.is_whitespace()) {
            i = j;
            continue;
        }

        let end = chars.get(j).map(|&(b, _)| b).unwrap_or(buffer.len());
        let unit = buffer[start..end].trim();
        if has_content(unit) {
            sentences.push(unit.to_string());
        }
        start = end;
        i = j;
    }

    (sentences, buffer[start..].to_string())
}

/// Every unit of a finished text, including an unterminated tail.
pub fn split_all(text: &str) -> Vec<String> {
    let (mut units, rest) = split_sentences(text);
    let rest = rest.trim();
    if has_content(rest) {
        units.push(rest.to_string());
    }
    units
}

/// Accumulates streamed fragments and yields units as soon as they close.
#[derive(Debug, Default)]
pub struct IncrementalSplitter {
    buffer: String,
}

impl IncrementalSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        self.buffer.push_str(fragment);
        let (units, rest) = split_sentences(&self.buffer);
        self.buffer = rest;
        units
    }

    /// The trailing partial unit, if it has any content.
    pub fn finish(self) -> Option<String> {
        let rest = self.buffer.trim();
        has_content(rest).then(|| rest.to_string())
    }
}
