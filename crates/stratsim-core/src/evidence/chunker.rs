//! Paragraph-first text chunking with a sliding-window fallback.

use std::sync::OnceLock;

use regex::Regex;

pub const DEFAULT_CHUNK_SIZE: usize = 1200;
pub const DEFAULT_OVERLAP: usize = 200;

fn inline_space() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t]+").expect("static whitespace pattern compiles"))
}

fn blank_lines() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("static newline pattern compiles"))
}

/// Collapse runs of spaces/tabs, cap blank lines at one, trim.
pub fn normalize_text(text: &str) -> String {
    let text = text.replace('\u{00a0}', " ").replace("\r\n", "\n");
    let text = inline_space().replace_all(&text, " ");
    let text = blank_lines().replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Split `text` into chunks of at most `chunk_size` characters.
///
/// Paragraphs are packed greedily; a paragraph longer than `chunk_size` is
/// cut into windows that overlap by `overlap` characters.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size - 1);
    let text = normalize_text(text);
    if text.is_empty() {
        return Vec::new();
    }

    let mut packed: Vec<String> = Vec::new();
    let mut current = String::new();
    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let cur_len = current.chars().count();
        let para_len = para.chars().count();
        if current.is_empty() && para_len <= chunk_size {
            current.push_str(para);
        } else if !current.is_empty() && cur_len + para_len + 2 <= chunk_size {
            current.push_str("\n\n");
            current.push_str(para);
        } else {
            if !current.is_empty() {
                packed.push(std::mem::take(&mut current));
            }
            current.push_str(para);
        }
    }
    if !current.is_empty() {
        packed.push(current);
    }

    let mut out = Vec::with_capacity(packed.len());
    for chunk in packed {
        let chars: Vec<char> = chunk.chars().collect();
        if chars.len() <= chunk_size {
            out.push(chunk);
            continue;
        }
        let mut start = 0;
        loop {
            let end = (start + chunk_size).min(chars.len());
            let window: String = chars[start..end].iter().collect();
            let window = window.trim();
            if !window.is_empty() {
                out.push(window.to_string());
            }
            if end == chars.len() {
                break;
            }
            start = end - overlap;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace() {
        let raw = "  Country\u{00a0}context\t\tand   goals\n\n\n\nNext  ";
        assert_eq!(normalize_text(raw), "Country context and goals\n\nNext");
    }

    #[test]
    fn test_short_paragraphs_are_packed() {
        let chunks = chunk_text("one\n\ntwo\n\nthree", 100, 10);
        assert_eq!(chunks, vec!["one\n\ntwo\n\nthree"]);
    }

    #[test]
    fn test_paragraph_boundary_respected() {
        let a = "a".repeat(60);
        let b = "b".repeat(60);
        let chunks = chunk_text(&format!("{a}\n\n{b}"), 100, 10);
        assert_eq!(chunks, vec![a, b]);
    }

    #[test]
    fn test_long_paragraph_uses_overlapping_windows() {
        let text: String = ('a'..='z').cycle().take(250).collect();
        let chunks = chunk_text(&text, 100, 20);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
        assert_eq!(&chunks[0][80..100], &chunks[1][..20]);
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunk_text(" \n\n\t", DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP).is_empty());
    }
}
