//! Language detection and surface tokenization.
//!
//! The FTS engine's analyzer stack handles Latin-script text but has no
//! segmenter for Korean. Korean text is therefore diverted to a separate
//! whitespace-indexed column populated with pre-segmented surface tokens;
//! queries in the same language are segmented with the same tokenizer
//! before lookup, so index-side and query-side terms line up.
//!
//! Tokens are byte-identical substrings of the input — no normalization —
//! which keeps FTS hits mappable back to source text.

use unicode_segmentation::UnicodeSegmentation;

/// Closed set of language tags the analyzer can assign.
pub const LANG_EN: &str = "en";
pub const LANG_KO: &str = "ko";

/// Languages whose orthography does not mark word boundaries with spaces
/// reliably enough for the default FTS analyzer.
pub fn requires_pretokenization(tag: &str) -> bool {
    tag == LANG_KO
}

/// Detect the dominant language of `text`.
///
/// Returns the tag and an advisory confidence in [0, 1] — the share of
/// script-bearing characters belonging to the winning script. Callers use
/// the tag unconditionally.
pub fn detect(text: &str) -> (&'static str, f32) {
    let mut hangul = 0usize;
    let mut latin = 0usize;
    for ch in text.chars() {
        if is_hangul(ch) {
            hangul += 1;
        } else if ch.is_ascii_alphabetic() {
            latin += 1;
        }
    }
    let total = hangul + latin;
    if total == 0 {
        return (LANG_EN, 0.0);
    }
    if hangul >= latin {
        (LANG_KO, hangul as f32 / total as f32)
    } else {
        (LANG_EN, latin as f32 / total as f32)
    }
}

fn is_hangul(ch: char) -> bool {
    matches!(ch,
        '\u{AC00}'..='\u{D7A3}'   // syllable blocks
        | '\u{1100}'..='\u{11FF}' // jamo
        | '\u{3130}'..='\u{318F}' // compatibility jamo
    )
}

/// Segment Korean text into surface tokens.
///
/// UAX#29 word boundaries give the coarse segments; each Hangul segment is
/// additionally expanded into its character bigrams so that compound words
/// written without spaces still match sub-word queries. Every returned
/// token is a verbatim substring of the input.
pub fn tokenize_korean(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    for word in text.unicode_words() {
        if word.chars().any(is_hangul) {
            tokens.push(word);
            push_bigrams(word, &mut tokens);
        } else {
            tokens.push(word);
        }
    }
    tokens
}

fn push_bigrams<'a>(word: &'a str, out: &mut Vec<&'a str>) {
    let indices: Vec<usize> = word
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(word.len()))
        .collect();
    // indices has char_count + 1 entries; a bigram spans indices[i]..indices[i+2]
    if indices.len() < 4 {
        return; // fewer than 3 chars: the word itself already covers it
    }
    for i in 0..indices.len() - 2 {
        out.push(&word[indices[i]..indices[i + 2]]);
    }
}

/// The whitespace-joined form stored in `tokenized_text` and sent to the
/// whitespace-analyzed FTS column at query time.
pub fn tokenized_form(text: &str, language: &str) -> String {
    if !requires_pretokenization(language) {
        return String::new();
    }
    tokenize_korean(text).join(" ")
}
