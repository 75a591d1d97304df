use regex::Regex;

use crate::utils::{clean_heading, recursive_split, title_prefix};
use crate::Chunk;

const LARGE_SECTION_THRESHOLD: usize = 2000;
const SUB_CHUNK_SIZE: usize = 800;
const SUB_CHUNK_OVERLAP: usize = 150;

/// Splits on `##` headings, then `###` sub-headings, recursively
/// splitting anything still oversized (§4.3 "Heading" strategy).
pub fn chunk(base_name: &str, markdown: &str) -> Vec<Chunk> {
    let h2_re = Regex::new(r"(?m)^##\s+(.+)$").unwrap();
    let h2_matches: Vec<_> = h2_re.captures_iter(markdown).collect();

    if h2_matches.is_empty() {
        return split_by_length(base_name, markdown);
    }

    let mut chunks = Vec::new();
    let first_match_start = h2_re.find(markdown).unwrap().start();
    let intro = markdown[..first_match_start].trim();
    if !intro.is_empty() {
        chunks.push(Chunk {
            doc_title: format!("{base_name}_概述"),
            chunk_text: intro.to_string(),
        });
    }

    for (i, m) in h2_matches.iter().enumerate() {
        let whole = m.get(0).unwrap();
        let h2_name = clean_heading(&m[1]);
        let section_start = whole.start();
        let section_end = h2_matches
            .get(i + 1)
            .map(|next| next.get(0).unwrap().start())
            .unwrap_or(markdown.len());
        let section_text = markdown[section_start..section_end].trim().to_string();

        if section_text.chars().count() > LARGE_SECTION_THRESHOLD {
            chunks.extend(split_large_section(base_name, &h2_name, &section_text));
        } else {
            chunks.push(Chunk {
                doc_title: format!("{base_name}_{h2_name}"),
                chunk_text: section_text,
            });
        }
    }

    chunks
}

fn split_large_section(base_name: &str, h2_name: &str, section_text: &str) -> Vec<Chunk> {
    let h3_re = Regex::new(r"(?m)^###\s+(.+)$").unwrap();
    let h3_matches: Vec<_> = h3_re.captures_iter(section_text).collect();

    if h3_matches.is_empty() {
        return recursive_split(section_text, SUB_CHUNK_SIZE, SUB_CHUNK_OVERLAP)
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let title = if i == 0 {
                    format!("{base_name}_{h2_name}")
                } else {
                    format!("{base_name}_{h2_name}_{}", title_prefix(&text))
                };
                Chunk { doc_title: title, chunk_text: text }
            })
            .collect();
    }

    let mut chunks = Vec::new();
    let first_h3_start = h3_re.find(section_text).unwrap().start();
    let intro = section_text[..first_h3_start].trim();
    if !intro.is_empty() {
        if intro.chars().count() > SUB_CHUNK_SIZE {
            chunks.extend(
                recursive_split(intro, SUB_CHUNK_SIZE, SUB_CHUNK_OVERLAP)
                    .into_iter()
                    .enumerate()
                    .map(|(i, text)| {
                        let title = if i == 0 {
                            format!("{base_name}_{h2_name}")
                        } else {
                            format!("{base_name}_{h2_name}_{}", title_prefix(&text))
                        };
                        Chunk { doc_title: title, chunk_text: text }
                    }),
            );
        } else {
            chunks.push(Chunk {
                doc_title: format!("{base_name}_{h2_name}"),
                chunk_text: intro.to_string(),
            });
        }
    }

    for (i, m) in h3_matches.iter().enumerate() {
        let whole = m.get(0).unwrap();
        let h3_name = clean_heading(&m[1]);
        let sub_start = whole.start();
        let sub_end = h3_matches
            .get(i + 1)
            .map(|next| next.get(0).unwrap().start())
            .unwrap_or(section_text.len());
        let sub_text = section_text[sub_start..sub_end].trim().to_string();

        if sub_text.chars().count() > SUB_CHUNK_SIZE {
            let pieces = recursive_split(&sub_text, SUB_CHUNK_SIZE, SUB_CHUNK_OVERLAP);
            for (j, piece) in pieces.into_iter().enumerate() {
                let title = if j == 0 {
                    format!("{base_name}_{h2_name}_{h3_name}")
                } else {
                    format!("{base_name}_{h2_name}_{h3_name}_{}", title_prefix(&piece))
                };
                chunks.push(Chunk { doc_title: title, chunk_text: piece });
            }
        } else {
            chunks.push(Chunk {
                doc_title: format!("{base_name}_{h2_name}_{h3_name}"),
                chunk_text: sub_text,
            });
        }
    }

    chunks
}

fn split_by_length(base_name: &str, markdown: &str) -> Vec<Chunk> {
    recursive_split(markdown, SUB_CHUNK_SIZE, SUB_CHUNK_OVERLAP)
        .into_iter()
        .map(|text| {
            let title = format!("{base_name}_{}", title_prefix(&text));
            Chunk { doc_title: title, chunk_text: text }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_markdown_with_no_headings_when_chunked_then_falls_back_to_split_by_length() {
        let chunks = chunk("doc", "just plain text, nothing structural here.");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].doc_title.starts_with("doc_"));
    }

    #[test]
    fn given_two_h2_sections_when_chunked_then_each_becomes_its_own_chunk() {
        let markdown = "Intro text.\n\n## First Section\nbody one\n\n## Second Section\nbody two\n";
        let chunks = chunk("doc", markdown);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].doc_title, "doc_概述");
        assert_eq!(chunks[1].doc_title, "doc_First Section");
        assert_eq!(chunks[2].doc_title, "doc_Second Section");
    }

    #[test]
    fn given_oversized_h2_section_without_h3_when_chunked_then_it_is_recursively_split() {
        let body = "x ".repeat(1500);
        let markdown = format!("## Big\n{body}");
        let chunks = chunk("doc", &markdown);

        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].doc_title, "doc_Big");
        assert!(chunks[1].doc_title.starts_with("doc_Big_"));
    }
}
