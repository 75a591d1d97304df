use regex::Regex;

use crate::heading;
use crate::utils::recursive_split;
use crate::Chunk;

/// Splits on `## <sheet name>` markers (the sheet name is kept verbatim,
/// not run through `clean_heading`); sheets past `max_chunk_size * 2`
/// characters are recursively split with a 10% overlap (§4.3 "Sheet"
/// strategy). Falls back to the heading strategy when no sheet markers
/// are present.
pub fn chunk(base_name: &str, markdown: &str, max_chunk_size: usize) -> Vec<Chunk> {
    let marker_re = Regex::new(r"(?m)^##\s+(.+)$").unwrap();
    let matches: Vec<_> = marker_re.captures_iter(markdown).collect();

    if matches.is_empty() {
        return heading::chunk(base_name, markdown);
    }

    let large_threshold = max_chunk_size * 2;
    let large_chunk_size = max_chunk_size;
    let large_overlap = (max_chunk_size as f64 * 0.1) as usize;

    let mut chunks = Vec::new();
    for (i, m) in matches.iter().enumerate() {
        let whole = m.get(0).unwrap();
        let sheet_name = m[1].trim().to_string();
        let content_start = whole.start();
        let content_end = matches
            .get(i + 1)
            .map(|next| next.get(0).unwrap().start())
            .unwrap_or(markdown.len());
        let sheet_content = markdown[content_start..content_end].trim().to_string();

        if sheet_content.chars().count() > large_threshold {
            let pieces = recursive_split(&sheet_content, large_chunk_size, large_overlap.max(1));
            for (j, piece) in pieces.into_iter().enumerate() {
                chunks.push(Chunk {
                    doc_title: format!("{base_name}_{sheet_name}_第{}部分", j + 1),
                    chunk_text: piece,
                });
            }
        } else {
            chunks.push(Chunk {
                doc_title: format!("{base_name}_{sheet_name}"),
                chunk_text: sheet_content,
            });
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_no_sheet_markers_when_chunked_then_falls_back_to_heading_strategy() {
        let chunks = chunk("book", "## Section\nbody", 800);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].doc_title, "book_Section");
    }

    #[test]
    fn given_small_sheet_when_chunked_then_sheet_name_is_kept_verbatim() {
        let markdown = "## Sheet #1 (raw)\nrow data here";
        let chunks = chunk("book", markdown, 800);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].doc_title, "book_Sheet #1 (raw)");
    }

    #[test]
    fn given_large_sheet_when_chunked_then_it_is_split_into_numbered_parts() {
        let body = "v ".repeat(2000);
        let markdown = format!("## Big Sheet\n{body}");
        let chunks = chunk("book", &markdown, 800);

        assert!(chunks.len() > 1);
        assert!(chunks[0].doc_title.starts_with("book_Big Sheet_第1部分"));
    }
}
