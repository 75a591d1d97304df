use kb_core::Result;
use kb_repositories::{ChunkRepository, FileRepository};
use kb_store::Store;

/// Rebuilds a file's working-copy Markdown from its current chunks (§4.6).
/// Idempotent: re-running over an unchanged chunk set reproduces the same
/// bytes.
pub fn reconcile(store: &Store, file_id: i64) -> Result<()> {
    let file = FileRepository::new(store)
        .find_by_id(file_id)?
        .ok_or_else(|| kb_core::KbError::not_found(format!("file {file_id} not found")))?;

    let chunks = ChunkRepository::new(store).find_by_file_id(file_id)?;

    let mut rendered = String::new();
    for chunk in &chunks {
        rendered.push_str(&render_chunk(&chunk.doc_title, &chunk.chunk_text));
        rendered.push('\n');
    }

    std::fs::write(&file.file_path, rendered)?;
    Ok(())
}

fn render_chunk(doc_title: &str, chunk_text: &str) -> String {
    if chunk_text.trim_start().starts_with('#') {
        format!("{}\n", chunk_text.trim_end())
    } else {
        let heading = heading_for(doc_title);
        format!("{heading}\n{}\n", chunk_text.trim_end())
    }
}

fn heading_for(doc_title: &str) -> String {
    let parts: Vec<&str> = doc_title.split('_').collect();
    match parts.len() {
        0 | 1 => format!("## {doc_title}"),
        2 => format!("## {}", parts[1]),
        _ => format!("### {}", parts.last().unwrap()),
    }
}
