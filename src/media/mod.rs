//! Media references
//!
//! Decodes opaque file ids into descriptors and maps them onto the
//! input locations the fetch RPC expects.

mod descriptor;
mod file_id;
mod location;

pub use descriptor::{
    DescriptorResolver, FileDescriptor, HasMedia, MediaAttachment, MediaKind, MediaMessage,
};
pub use file_id::{FileId, FileType, PhotoInfo, ThumbnailSource, CURRENT_MAJOR, CURRENT_MINOR};
pub use location::{InputPeer, Location};
