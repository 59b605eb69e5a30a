//! Mapping descriptors to `getFile` input locations

use crate::error::{Error, Result};
use crate::media::descriptor::FileDescriptor;
use crate::media::file_id::{FileType, ThumbnailSource};

/// Bot-API ids of channels are offset by this value
const CHANNEL_ID_OFFSET: i64 = -1_000_000_000_000;

/// Peer owning a chat photo
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputPeer {
    User { user_id: i64, access_hash: i64 },
    Chat { chat_id: i64 },
    Channel { channel_id: i64, access_hash: i64 },
}

impl InputPeer {
    /// Peer for a Bot-API style chat id
    pub fn from_chat_id(chat_id: i64, access_hash: i64) -> Result<Self> {
        let peer = if chat_id > 0 {
            InputPeer::User {
                user_id: chat_id,
                access_hash,
            }
        } else if access_hash == 0 {
            let chat_id = chat_id
                .checked_neg()
                .ok_or_else(|| Error::InvalidFileId(format!("chat id {} out of range", chat_id)))?;
            InputPeer::Chat { chat_id }
        } else {
            InputPeer::Channel {
                channel_id: CHANNEL_ID_OFFSET - chat_id,
                access_hash,
            }
        };
        Ok(peer)
    }
}

/// Input location for the file fetch RPC
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    ChatPhoto {
        peer: InputPeer,
        volume_id: i64,
        local_id: i32,
        big: bool,
    },
    Photo {
        id: i64,
        access_hash: i64,
        file_reference: Vec<u8>,
        thumb_size: String,
    },
    Document {
        id: i64,
        access_hash: i64,
        file_reference: Vec<u8>,
        thumb_size: String,
    },
}

impl Location {
    /// Resolve the location for a descriptor
    ///
    /// Chat photos need a peer; plain photos use the photo location; every
    /// other kind is fetched as a document. Fails only for chat ids that
    /// have no peer.
    pub fn resolve(descriptor: &FileDescriptor) -> Result<Self> {
        let file_id = &descriptor.file_id;

        if file_id.file_type == FileType::ChatPhoto {
            if let Some(photo) = &file_id.photo {
                let (chat_id, chat_access_hash, big) = match photo.source {
                    ThumbnailSource::ChatPhotoBig {
                        chat_id,
                        chat_access_hash,
                    } => (chat_id, chat_access_hash, true),
                    ThumbnailSource::ChatPhotoSmall {
                        chat_id,
                        chat_access_hash,
                    } => (chat_id, chat_access_hash, false),
                    _ => (0, 0, false),
                };
                return Ok(Location::ChatPhoto {
                    peer: InputPeer::from_chat_id(chat_id, chat_access_hash)?,
                    volume_id: photo.volume_id,
                    local_id: photo.local_id,
                    big,
                });
            }
        }

        if file_id.file_type == FileType::Photo {
            return Ok(Location::Photo {
                id: file_id.media_id,
                access_hash: file_id.access_hash,
                file_reference: file_id.file_reference.clone(),
                thumb_size: file_id.thumbnail_size(),
            });
        }

        Ok(Location::Document {
            id: file_id.media_id,
            access_hash: file_id.access_hash,
            file_reference: file_id.file_reference.clone(),
            thumb_size: file_id.thumbnail_size(),
        })
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Location::ChatPhoto { .. } => "chat_photo",
            Location::Photo { .. } => "photo",
            Location::Document { .. } => "document",
        }
    }
}
