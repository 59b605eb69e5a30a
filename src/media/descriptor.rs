//! Resolving a message attachment into a file descriptor

use crate::error::{Error, Result};
use crate::media::file_id::{FileId, FileType};
use serde::{Deserialize, Serialize};

/// Attachment kinds that can be downloaded, in lookup order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Audio,
    Document,
    Photo,
    Sticker,
    Animation,
    Video,
    Voice,
    VideoNote,
}

impl MediaKind {
    pub const ALL: [MediaKind; 8] = [
        MediaKind::Audio,
        MediaKind::Document,
        MediaKind::Photo,
        MediaKind::Sticker,
        MediaKind::Animation,
        MediaKind::Video,
        MediaKind::Voice,
        MediaKind::VideoNote,
    ];
}

/// A media item attached to a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    /// Encoded file id
    pub file_id: String,
    /// Declared size in bytes (0 if unknown)
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl MediaAttachment {
    /// Attachment carrying only an encoded id
    pub fn new(file_id: impl Into<String>) -> Self {
        MediaAttachment {
            file_id: file_id.into(),
            ..Default::default()
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.file_size = size;
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

/// Anything that may carry a downloadable attachment
pub trait HasMedia {
    /// The attachment of the given kind, if present
    fn media(&self, kind: MediaKind) -> Option<&MediaAttachment>;
}

/// Minimal message shape: at most one attachment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMessage {
    pub id: i32,
    pub attachment: Option<(MediaKind, MediaAttachment)>,
}

impl MediaMessage {
    pub fn new(id: i32, kind: MediaKind, attachment: MediaAttachment) -> Self {
        MediaMessage {
            id,
            attachment: Some((kind, attachment)),
        }
    }

    /// A message with no attachment (text only)
    pub fn text(id: i32) -> Self {
        MediaMessage {
            id,
            attachment: None,
        }
    }
}

impl HasMedia for MediaMessage {
    fn media(&self, kind: MediaKind) -> Option<&MediaAttachment> {
        match &self.attachment {
            Some((k, attachment)) if *k == kind => Some(attachment),
            _ => None,
        }
    }
}

impl HasMedia for MediaAttachment {
    fn media(&self, _kind: MediaKind) -> Option<&MediaAttachment> {
        Some(self)
    }
}

/// Decoded file id plus the attachment metadata the encoding doesn't carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub file_id: FileId,
    pub declared_size: u64,
    pub mime_type: String,
    pub file_name: String,
}

impl FileDescriptor {
    pub fn dc_id(&self) -> i32 {
        self.file_id.dc_id
    }

    pub fn file_type(&self) -> FileType {
        self.file_id.file_type
    }

    pub fn media_id(&self) -> i64 {
        self.file_id.media_id
    }

    pub fn access_hash(&self) -> i64 {
        self.file_id.access_hash
    }

    pub fn file_reference(&self) -> &[u8] {
        &self.file_id.file_reference
    }

    pub fn thumbnail_size(&self) -> String {
        self.file_id.thumbnail_size()
    }
}

/// Stateless decoder from messages to descriptors
pub struct DescriptorResolver;

impl DescriptorResolver {
    /// Resolve the first downloadable attachment of a message
    pub fn resolve<M: HasMedia + ?Sized>(message: &M) -> Result<FileDescriptor> {
        let attachment = MediaKind::ALL
            .iter()
            .find_map(|&kind| message.media(kind))
            .ok_or(Error::NoDownloadableMedia)?;

        Self::resolve_attachment(attachment)
    }

    /// Resolve a bare encoded file id (size, mime type and name unknown)
    pub fn resolve_encoded(file_id: &str) -> Result<FileDescriptor> {
        Ok(FileDescriptor {
            file_id: FileId::decode(file_id)?,
            declared_size: 0,
            mime_type: String::new(),
            file_name: String::new(),
        })
    }

    fn resolve_attachment(attachment: &MediaAttachment) -> Result<FileDescriptor> {
        Ok(FileDescriptor {
            file_id: FileId::decode(&attachment.file_id)?,
            declared_size: attachment.file_size,
            mime_type: attachment.mime_type.clone().unwrap_or_default(),
            file_name: attachment.file_name.clone().unwrap_or_default(),
        })
    }
}
