//! Lexical scrubber for Cython-dialect sources.
//!
//! Replaces every string literal and comment body with a synthetic label so
//! the dependency regexes never match inside quoted or commented text. The
//! original text is recoverable through the returned [`LiteralTable`].
//!
//! Quote delimiters stay in place around the label, so downstream patterns
//! still see `"…"` / `'…'` tokens, and the `#` marker of a comment survives
//! with only its body replaced.

use std::collections::HashMap;

/// Label prefix for scrubbed literals. Labels are `<prefix><n>_`.
pub const LABEL_PREFIX: &str = "__pyx_lit_";

/// Mapping from synthetic labels back to the literal contents they replace.
pub type LiteralTable = HashMap<String, String>;

/// Scrub `code`, replacing string literals and comment bodies with labels.
///
/// Returns the scrubbed buffer plus the label table. Labels are unique
/// within one call. An unterminated literal is not an error here: the tail
/// is kept verbatim and the downstream compiler owns the diagnostic.
pub fn strip_string_literals(code: &str, prefix: &str) -> (String, LiteralTable) {
    let bytes = code.as_bytes();
    let len = bytes.len();
    let mut scrubbed = String::with_capacity(len + len / 8);
    let mut literals = LiteralTable::new();
    let mut counter = 0usize;

    // `start` marks the beginning of the pending verbatim slice, `cursor`
    // the scan position. Both always sit on ASCII bytes, so slicing is safe
    // even in the presence of multi-byte characters.
    let mut start = 0usize;
    let mut cursor = 0usize;

    while cursor < len {
        let hash = find_byte(bytes, b'#', cursor);
        let quote = next_quote(bytes, cursor);
        let comment_first = match (hash, quote) {
            (None, None) => break,
            (Some(h), Some(q)) => h < q,
            (Some(_), None) => true,
            (None, Some(_)) => false,
        };

        if comment_first {
            let h = hash.expect("comment position exists");
            scrubbed.push_str(&code[start..=h]);
            counter += 1;
            let label = format!("{prefix}{counter}_");
            let end = find_byte(bytes, b'\n', h);
            let body_end = end.unwrap_or(len);
            literals.insert(label.clone(), code[h + 1..body_end].to_string());
            scrubbed.push_str(&label);
            match end {
                Some(e) => {
                    start = e;
                    cursor = e;
                }
                None => return (scrubbed, literals),
            }
        } else {
            let q = quote.expect("quote position exists");
            let quote_char = bytes[q];
            let triple = q + 2 < len && bytes[q + 1] == quote_char && bytes[q + 2] == quote_char;
            let quote_len = if triple { 3 } else { 1 };
            match find_closing(bytes, quote_char, quote_len, q + quote_len) {
                Some(close) => {
                    scrubbed.push_str(&code[start..q]);
                    counter += 1;
                    let label = format!("{prefix}{counter}_");
                    literals.insert(label.clone(), code[q + quote_len..close].to_string());
                    let delimiter = &code[q..q + quote_len];
                    scrubbed.push_str(delimiter);
                    scrubbed.push_str(&label);
                    scrubbed.push_str(delimiter);
                    cursor = close + quote_len;
                    start = cursor;
                }
                // Unterminated literal: emit the tail as-is.
                None => break,
            }
        }
    }

    scrubbed.push_str(&code[start..]);
    (scrubbed, literals)
}

/// Position of the closing delimiter, honouring backslash escapes and
/// requiring triple delimiters to close triple-quoted literals.
fn find_closing(bytes: &[u8], quote: u8, quote_len: usize, from: usize) -> Option<usize> {
    let mut at = from;
    loop {
        let pos = find_byte(bytes, quote, at)?;
        // Escaped iff preceded by an odd run of backslashes.
        if backslash_run(bytes, pos) % 2 == 1 {
            at = pos + 1;
            continue;
        }
        if quote_len == 3
            && !(pos + 2 < bytes.len() && bytes[pos + 1] == quote && bytes[pos + 2] == quote)
        {
            at = pos + 1;
            continue;
        }
        return Some(pos);
    }
}

fn backslash_run(bytes: &[u8], pos: usize) -> usize {
    let mut n = 0;
    while n < pos && bytes[pos - 1 - n] == b'\\' {
        n += 1;
    }
    n
}

fn find_byte(bytes: &[u8], needle: u8, from: usize) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|&b| b == needle)
        .map(|i| from + i)
}

fn next_quote(bytes: &[u8], from: usize) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|&b| b == b'\'' || b == b'"')
        .map(|i| from + i)
}
