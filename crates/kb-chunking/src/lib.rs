pub mod heading;
pub mod page;
pub mod sheet;
pub mod slide;
pub mod utils;

use std::path::Path;

/// One chunk produced by a chunking strategy: a title derived from
/// document structure and its verbatim text (§4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub doc_title: String,
    pub chunk_text: String,
}

/// `floor(max_tokens * 0.8 / 1.5)`: leaves headroom for the embedding
/// model's token budget while approximating tokens as 1.5 chars (§4.3).
pub fn max_chunk_size(max_tokens: usize) -> usize {
    ((max_tokens as f64) * 0.8 / 1.5).floor() as usize
}

/// Dispatches to a chunking strategy by the source file's extension
/// (§4.3 strategy table): `.pptx` -> Slide, `.xlsx` -> Sheet, `.pdf` ->
/// Page, everything else -> Heading. `page_chunker.py`'s own existence
/// and its marker-driven fallback make Page the right home for `.pdf`,
/// even though the reference factory wiring routes it to Heading.
pub fn chunk_document(base_name: &str, markdown: &str, source_path: &Path, max_tokens: usize) -> Vec<Chunk> {
    let size = max_chunk_size(max_tokens);
    let ext = source_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("pptx") => slide::chunk(base_name, markdown, size),
        Some("xlsx") => sheet::chunk(base_name, markdown, size),
        Some("pdf") => page::chunk(base_name, markdown, size),
        _ => heading::chunk(base_name, markdown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_chunk_size_matches_default_token_budget() {
        assert_eq!(max_chunk_size(8192), 4369);
    }

    #[test]
    fn given_pptx_path_when_dispatching_then_uses_slide_strategy() {
        let markdown = "<!-- Slide number: 1 -->\nhello\n";
        let chunks = chunk_document("deck", markdown, Path::new("deck.pptx"), 8192);
        assert_eq!(chunks[0].doc_title, "deck_第1页");
    }

    #[test]
    fn given_xlsx_path_when_dispatching_then_uses_sheet_strategy() {
        let markdown = "## Sheet1\ndata\n";
        let chunks = chunk_document("book", markdown, Path::new("book.xlsx"), 8192);
        assert_eq!(chunks[0].doc_title, "book_Sheet1");
    }

    #[test]
    fn given_pdf_path_when_dispatching_then_uses_page_strategy() {
        let markdown = "<!-- Page 1 -->\ncontent\n";
        let chunks = chunk_document("report", markdown, Path::new("report.pdf"), 8192);
        assert_eq!(chunks[0].doc_title, "report_第1页");
    }

    #[test]
    fn given_docx_path_when_dispatching_then_uses_heading_strategy() {
        let markdown = "## Topic\nbody\n";
        let chunks = chunk_document("notes", markdown, Path::new("notes.docx"), 8192);
        assert_eq!(chunks[0].doc_title, "notes_Topic");
    }
}
