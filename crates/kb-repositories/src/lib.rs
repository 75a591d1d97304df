pub mod chunk_repository;
pub mod file_repository;
pub mod task_repository;
pub mod validate;

pub use chunk_repository::{ChunkRecord, ChunkRepository, NewChunk};
pub use file_repository::{FileRecord, FileRepository, FileStatus};
pub use task_repository::{TaskPayload, TaskRecord, TaskRepository, TaskStatus};
