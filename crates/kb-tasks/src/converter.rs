use std::path::Path;

use kb_core::{KbError, Result};

/// Converts an original uploaded file into Markdown text. The real
/// multi-format conversion pipeline (PDF/DOCX/PPTX/XLSX -> Markdown) is a
/// non-goal of this core — it is treated as a black box behind this
/// trait, so the processor can be wired against any concrete converter.
pub trait Converter: Send + Sync {
    fn convert(&self, original_path: &Path) -> Result<String>;
}

/// Minimal converter used when the source is already Markdown or plain
/// text: reads the file verbatim. Any other extension is rejected rather
/// than silently mis-converted.
pub struct PassthroughConverter;

impl Converter for PassthroughConverter {
    fn convert(&self, original_path: &Path) -> Result<String> {
        let ext = original_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("md") | Some("txt") => {
                std::fs::read_to_string(original_path).map_err(KbError::from)
            }
            other => Err(KbError::FatalIngest(format!(
                "no converter available for extension {other:?}; wire a real Converter impl"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_markdown_file_when_converted_then_content_is_returned_verbatim() {
        let path = std::env::temp_dir().join(format!("kb-tasks-converter-test-{}.md", std::process::id()));
        std::fs::write(&path, "# Hello\nbody").unwrap();

        let result = PassthroughConverter.convert(&path).unwrap();
        assert_eq!(result, "# Hello\nbody");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn given_unsupported_extension_when_converted_then_returns_fatal_ingest_error() {
        let path = Path::new("/tmp/doc.pdf");
        let result = PassthroughConverter.convert(path);
        assert!(matches!(result, Err(KbError::FatalIngest(_))));
    }
}
