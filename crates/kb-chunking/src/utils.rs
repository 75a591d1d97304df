use regex::Regex;

/// Separator priority, highest first. Matched against `char` sequences so
/// multi-byte text is handled uniformly; every separator here is itself a
/// single `char`, except the paragraph break which is matched separately.
const SEPARATORS: &[&str] = &[
    "\n\n", "\n", "。", "！", "？", ".", "!", "?", "；", ";", "，", ",", " ",
];

/// `(start, end)` offsets into the `chars` slice of a protected region: a
/// split point strictly inside one of these is unsafe.
pub type CharRange = (usize, usize);

/// Locates contiguous runs of Markdown table rows: lines that, once
/// trimmed, start and end with `|` and contain at least two `|`s.
pub fn find_table_boundaries(chars: &[char]) -> Vec<CharRange> {
    let mut boundaries = Vec::new();
    let mut in_table = false;
    let mut table_start = 0usize;
    let mut line_start = 0usize;

    let mut i = 0usize;
    while i <= chars.len() {
        let is_newline = i == chars.len() || chars[i] == '\n';
        if is_newline {
            let line = &chars[line_start..i];
            let trimmed = trim_chars(line);
            let is_table_line = trimmed.first() == Some(&'|')
                && trimmed.last() == Some(&'|')
                && trimmed.iter().filter(|c| **c == '|').count() >= 2
                && !trimmed.is_empty();

            if is_table_line && !in_table {
                in_table = true;
                table_start = line_start;
            } else if !is_table_line && in_table {
                boundaries.push((table_start, line_start));
                in_table = false;
            }

            line_start = i + 1;
        }
        i += 1;
    }

    if in_table {
        boundaries.push((table_start, chars.len()));
    }

    boundaries
}

fn trim_chars(chars: &[char]) -> &[char] {
    let start = chars.iter().position(|c| !c.is_whitespace()).unwrap_or(chars.len());
    let end = chars.iter().rposition(|c| !c.is_whitespace()).map(|i| i + 1).unwrap_or(start);
    &chars[start..end]
}

/// Locates LaTeX formula spans: block `$$...$$` and inline `$...$`
/// (inline excludes `$$` via the surrounding-dollar guard built into the
/// regex, mirroring the Python lookaround).
pub fn find_formula_boundaries(text: &str, chars: &[char]) -> Vec<CharRange> {
    let mut boundaries = Vec::new();

    let block_re = Regex::new(r"(?s)\$\$.+?\$\$").unwrap();
    for m in block_re.find_iter(text) {
        boundaries.push(byte_range_to_char_range(text, chars, m.start(), m.end()));
    }

    // Inline: a single '$', then non-'$'/non-newline content, then a single '$'.
    // Emulates the Python negative lookaround by checking neighboring bytes.
    let inline_re = Regex::new(r"\$[^\$\n]+?\$").unwrap();
    for m in inline_re.find_iter(text) {
        let before_is_dollar = text[..m.start()].ends_with('$');
        let after_is_dollar = text[m.end()..].starts_with('$');
        if !before_is_dollar && !after_is_dollar {
            boundaries.push(byte_range_to_char_range(text, chars, m.start(), m.end()));
        }
    }

    boundaries
}

fn byte_range_to_char_range(text: &str, chars: &[char], byte_start: usize, byte_end: usize) -> CharRange {
    debug_assert_eq!(text.chars().count(), chars.len());
    let char_start = text[..byte_start].chars().count();
    let char_end = text[..byte_end].chars().count();
    (char_start, char_end)
}

pub fn is_safe_split_point(pos: usize, boundaries: &[CharRange]) -> bool {
    !boundaries.iter().any(|&(start, end)| start < pos && pos < end)
}

/// Recursive character splitter (§4.3 shared fallback): tries
/// highest-priority separators within a lookback window, never cutting
/// inside a table or formula span, and falls back to a stepped backward
/// scan before giving up and cutting exactly at the target.
pub fn recursive_split(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= chunk_size {
        return vec![trimmed.to_string()];
    }

    let mut protected = find_table_boundaries(&chars);
    protected.extend(find_formula_boundaries(trimmed, &chars));
    protected.sort_by_key(|&(start, _)| start);

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let end = start + chunk_size;
        if end >= chars.len() {
            let remaining: String = trim_chars(&chars[start..]).iter().collect();
            if !remaining.is_empty() {
                chunks.push(remaining);
            }
            break;
        }

        let split_point = find_split_point(&chars, start, chunk_size, &protected);
        let actual_end = start + split_point;

        let chunk: String = trim_chars(&chars[start..actual_end]).iter().collect();
        if !chunk.is_empty() {
            chunks.push(chunk);
        }

        let mut next_start = actual_end.saturating_sub(overlap);
        if next_start <= actual_end.saturating_sub(chunk_size) && actual_end < chars.len() {
            next_start = actual_end;
        }
        // Forward-progress guard: recursive_split must never spin forever
        // even if `find_split_point` returns a point behind `start`.
        if next_start <= start {
            next_start = actual_end.max(start + 1);
        }
        start = next_start;
    }

    chunks
}

fn find_split_point(chars: &[char], offset: usize, chunk_size: usize, protected: &[CharRange]) -> usize {
    let target_size = chunk_size;
    let text = &chars[offset..];
    let search_start = target_size.saturating_sub(200);
    let search_end = target_size.min(text.len());
    let search_range = &text[search_start.min(search_end)..search_end];

    let mut candidates: Vec<(usize, i64, usize)> = Vec::new();
    for (priority, sep) in SEPARATORS.iter().enumerate() {
        let sep_chars: Vec<char> = sep.chars().collect();
        if let Some(pos) = rfind_subsequence(search_range, &sep_chars) {
            let actual_pos = search_start + pos + sep_chars.len();
            if actual_pos > 0 && actual_pos < text.len() {
                let absolute_pos = offset + actual_pos;
                if is_safe_split_point(absolute_pos, protected) {
                    let distance = target_size as i64 - actual_pos as i64;
                    candidates.push((priority, distance, actual_pos));
                }
            }
        }
    }

    if !candidates.is_empty() {
        candidates.sort_by_key(|&(priority, distance, _)| {
            if distance < 50 {
                (0u8, priority as i64, distance)
            } else {
                (1u8, distance, priority as i64)
            }
        });
        return candidates[0].2;
    }

    let mut probe = target_size as i64;
    let floor = (target_size as i64 - 400).max(0);
    while probe > floor {
        let absolute_pos = offset + probe as usize;
        if is_safe_split_point(absolute_pos, protected) {
            return probe as usize;
        }
        probe -= 10;
    }

    target_size.min(text.len())
}

fn rfind_subsequence(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| &haystack[i..i + needle.len()] == needle)
}

/// Strips a leading run of `#`, then drops any character outside
/// {CJK, ASCII letter/digit, parentheses, whitespace} (§4.3).
pub fn clean_heading(heading: &str) -> String {
    let stripped = heading.trim_start_matches('#').trim();
    let filtered: String = stripped
        .chars()
        .filter(|c| is_heading_char(*c))
        .collect();
    filtered.trim().to_string()
}

fn is_heading_char(c: char) -> bool {
    let is_cjk = ('\u{4e00}'..='\u{9fa5}').contains(&c);
    c.is_ascii_alphanumeric()
        || is_cjk
        || c == '('
        || c == ')'
        || c == '（'
        || c == '）'
        || c.is_whitespace()
}

/// First ~10 chars of a sub-chunk, whitespace collapsed to spaces, used to
/// disambiguate sub-chunk titles (§4.3, §6 bit-exact doc_title format).
pub fn title_prefix(text: &str) -> String {
    text.trim()
        .chars()
        .take(10)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_short_text_when_splitting_then_returns_single_chunk() {
        let chunks = recursive_split("short text", 800, 150);
        assert_eq!(chunks, vec!["short text".to_string()]);
    }

    #[test]
    fn given_empty_text_when_splitting_then_returns_no_chunks() {
        assert!(recursive_split("   ", 800, 150).is_empty());
    }

    #[test]
    fn split_never_cuts_a_markdown_table() {
        let mut body = "Intro paragraph.\n\n".repeat(40);
        body.push_str("| a | b |\n|---|---|\n");
        for i in 0..20 {
            body.push_str(&format!("| row{i} | val{i} |\n"));
        }
        body.push_str("\n\nTrailing text after the table.\n");

        let chunks = recursive_split(&body, 800, 150);
        let table_start = body.find("| a | b |").unwrap();
        let table_end = body.rfind("| row19").unwrap() + "| row19 | val19 |".len();

        let contains_whole_table = chunks.iter().any(|c| {
            let byte_start = body.find(c.as_str());
            byte_start.is_some_and(|s| s <= table_start && s + c.len() >= table_end)
        });
        assert!(contains_whole_table, "table must survive intact in one chunk");
    }

    #[test]
    fn clean_heading_strips_punctuation_but_keeps_cjk_and_parens() {
        assert_eq!(clean_heading("## 概述 (Intro) #1!"), "概述 (Intro) 1");
    }

    #[test]
    fn title_prefix_collapses_newlines_and_truncates() {
        assert_eq!(title_prefix("line one\nline two is long"), "line one l");
    }
}
