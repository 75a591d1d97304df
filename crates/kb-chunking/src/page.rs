use regex::Regex;

use crate::heading;
use crate::utils::recursive_split;
use crate::Chunk;

const SUB_CHUNK_OVERLAP: usize = 150;

/// Splits on `<!-- Page N -->` markers; falls back to the heading
/// strategy when the document carries none (§4.3 "Page" strategy).
pub fn chunk(base_name: &str, markdown: &str, max_chunk_size: usize) -> Vec<Chunk> {
    let marker_re = Regex::new(r"<!--\s*Page\s+(\d+)\s*-->").unwrap();
    let matches: Vec<_> = marker_re.captures_iter(markdown).collect();

    if matches.is_empty() {
        return heading::chunk(base_name, markdown);
    }

    let mut chunks = Vec::new();
    for (i, m) in matches.iter().enumerate() {
        let whole = m.get(0).unwrap();
        let page_num = &m[1];
        let content_start = whole.end();
        let content_end = matches
            .get(i + 1)
            .map(|next| next.get(0).unwrap().start())
            .unwrap_or(markdown.len());
        let page_content = markdown[content_start..content_end].trim();
        if page_content.is_empty() {
            continue;
        }

        if page_content.chars().count() > max_chunk_size {
            let overlap = (max_chunk_size as f64 * 0.1) as usize;
            let pieces = recursive_split(page_content, max_chunk_size, overlap.max(SUB_CHUNK_OVERLAP.min(max_chunk_size / 2)));
            for (j, piece) in pieces.into_iter().enumerate() {
                chunks.push(Chunk {
                    doc_title: format!("{base_name}_第{page_num}页_第{}部分", j + 1),
                    chunk_text: piece,
                });
            }
        } else {
            chunks.push(Chunk {
                doc_title: format!("{base_name}_第{page_num}页"),
                chunk_text: page_content.to_string(),
            });
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_no_page_markers_when_chunked_then_falls_back_to_heading_strategy() {
        let chunks = chunk("doc", "## Section\nbody", 800);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].doc_title, "doc_Section");
    }

    #[test]
    fn given_two_pages_when_chunked_then_each_page_becomes_one_chunk() {
        let markdown = "<!-- Page 1 -->\nfirst page text\n<!-- Page 2 -->\nsecond page text\n";
        let chunks = chunk("doc", markdown, 800);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].doc_title, "doc_第1页");
        assert_eq!(chunks[1].doc_title, "doc_第2页");
    }

    #[test]
    fn given_oversized_page_when_chunked_then_it_is_split_into_numbered_parts() {
        let body = "w ".repeat(1000);
        let markdown = format!("<!-- Page 3 -->\n{body}");
        let chunks = chunk("doc", &markdown, 800);

        assert!(chunks.len() > 1);
        assert!(chunks[0].doc_title.starts_with("doc_第3页_第1部分"));
    }

    #[test]
    fn given_empty_page_content_when_chunked_then_it_is_skipped() {
        let markdown = "<!-- Page 1 -->\n\n<!-- Page 2 -->\nonly content\n";
        let chunks = chunk("doc", markdown, 800);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].doc_title, "doc_第2页");
    }
}
