//! Downloading media
//!
//! Chunk sizing and range planning, the pull-based chunk stream, and the
//! retriever that writes whole files or byte ranges into a sink.

mod progress;
mod range;
mod retriever;
mod stream;

pub use progress::{human_readable, Progress, ProgressCallback};
pub use range::{align_offset, chunk_size_for, part_count, RangePlan};
pub use retriever::{Retrieval, Retriever};
pub use stream::{ChunkStream, ChunkStreamer, Termination};
