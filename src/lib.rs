//! tgfetch - Media retrieval from Telegram datacenters
//!
//! This library decodes Bot-API file ids, opens authorized sessions on the
//! datacenter that stores a file, and streams the file back in chunks.

pub mod config;
pub mod download;
pub mod error;
pub mod media;
pub mod telegram;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::download::{ChunkStreamer, Retrieval, Retriever, Termination};
    pub use crate::error::{Error, Result};
    pub use crate::media::{DescriptorResolver, FileDescriptor, HasMedia, MediaMessage};
    pub use crate::telegram::{MediaClient, MediaTransport};
}
