pub mod chunk_task;
pub mod converter;
pub mod ingest;
pub mod processor;

pub use converter::{Converter, PassthroughConverter};
pub use processor::TaskProcessor;
