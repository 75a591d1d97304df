use regex::Regex;

use crate::heading;
use crate::utils::recursive_split;
use crate::Chunk;

/// Splits on `<!-- Slide number: N -->` markers, drops everything from a
/// `### Notes:` marker onward within each slide, and falls back to the
/// heading strategy when no slide markers are present (§4.3 "Slide"
/// strategy). Oversized slides reuse the page strategy's "第N页" title
/// shape for its sub-chunks — a naming quirk carried over verbatim.
pub fn chunk(base_name: &str, markdown: &str, max_chunk_size: usize) -> Vec<Chunk> {
    let marker_re = Regex::new(r"<!--\s*Slide number:\s*(\d+)\s*-->").unwrap();
    let matches: Vec<_> = marker_re.captures_iter(markdown).collect();

    if matches.is_empty() {
        return heading::chunk(base_name, markdown);
    }

    let notes_re = Regex::new(r"(?i)###\s*Notes:\s*").unwrap();

    let mut chunks = Vec::new();
    for (i, m) in matches.iter().enumerate() {
        let whole = m.get(0).unwrap();
        let slide_num = &m[1];
        let content_start = whole.end();
        let content_end = matches
            .get(i + 1)
            .map(|next| next.get(0).unwrap().start())
            .unwrap_or(markdown.len());
        let raw_content = &markdown[content_start..content_end];

        let slide_content = match notes_re.find(raw_content) {
            Some(notes_match) => raw_content[..notes_match.start()].trim(),
            None => raw_content.trim(),
        };

        if slide_content.is_empty() {
            continue;
        }

        if slide_content.chars().count() > max_chunk_size {
            let overlap = (max_chunk_size as f64 * 0.1) as usize;
            let pieces = recursive_split(slide_content, max_chunk_size, overlap.max(1));
            for (j, piece) in pieces.into_iter().enumerate() {
                chunks.push(Chunk {
                    doc_title: format!("{base_name}_第{slide_num}页_第{}部分", j + 1),
                    chunk_text: piece,
                });
            }
        } else {
            chunks.push(Chunk {
                doc_title: format!("{base_name}_第{slide_num}页"),
                chunk_text: slide_content.to_string(),
            });
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_no_slide_markers_when_chunked_then_falls_back_to_heading_strategy() {
        let chunks = chunk("deck", "## Topic\nbody", 800);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].doc_title, "deck_Topic");
    }

    #[test]
    fn given_slide_with_notes_section_when_chunked_then_notes_are_dropped() {
        let markdown = "<!-- Slide number: 1 -->\nvisible content\n### Notes:\nspeaker notes here\n";
        let chunks = chunk("deck", markdown, 800);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_text, "visible content");
    }

    #[test]
    fn given_slide_with_only_notes_when_chunked_then_it_is_skipped() {
        let markdown = "<!-- Slide number: 1 -->\n### Notes:\nonly notes\n<!-- Slide number: 2 -->\nreal content\n";
        let chunks = chunk("deck", markdown, 800);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].doc_title, "deck_第2页");
    }
}
