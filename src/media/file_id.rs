//! Bot-API `file_id` codec
//!
//! A file id is URL-safe base64 over a zero-run-length encoded,
//! little-endian record. The last byte is the major version; from major 4 on
//! the byte before it is the minor version.

use crate::error::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::BufMut;

/// Major version written by [`FileId::encode`]
pub const CURRENT_MAJOR: u8 = 4;

/// Minor version written by [`FileId::encode`]
pub const CURRENT_MINOR: u8 = 30;

const WEB_LOCATION_FLAG: i32 = 1 << 24;
const FILE_REFERENCE_FLAG: i32 = 1 << 25;

/// Kind of media a file id refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum FileType {
    Thumbnail = 0,
    ChatPhoto = 1,
    Photo = 2,
    Voice = 3,
    Video = 4,
    Document = 5,
    Encrypted = 6,
    Temp = 7,
    Sticker = 8,
    Audio = 9,
    Animation = 10,
    EncryptedThumbnail = 11,
    Wallpaper = 12,
    VideoNote = 13,
    SecureRaw = 14,
    Secure = 15,
    Background = 16,
    DocumentAsFile = 17,
}

impl FileType {
    /// Photo-family ids carry volume/local ids and a thumbnail source
    pub fn is_photo(self) -> bool {
        matches!(
            self,
            FileType::Thumbnail
                | FileType::ChatPhoto
                | FileType::Photo
                | FileType::Wallpaper
                | FileType::EncryptedThumbnail
        )
    }
}

impl TryFrom<i32> for FileType {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        use FileType::*;
        let file_type = match value {
            0 => Thumbnail,
            1 => ChatPhoto,
            2 => Photo,
            3 => Voice,
            4 => Video,
            5 => Document,
            6 => Encrypted,
            7 => Temp,
            8 => Sticker,
            9 => Audio,
            10 => Animation,
            11 => EncryptedThumbnail,
            12 => Wallpaper,
            13 => VideoNote,
            14 => SecureRaw,
            15 => Secure,
            16 => Background,
            17 => DocumentAsFile,
            other => {
                return Err(Error::InvalidFileId(format!("unknown file type {}", other)));
            }
        };
        Ok(file_type)
    }
}

/// Where a photo-family file came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailSource {
    Legacy { secret: i64 },
    Thumbnail { file_type: FileType, size: char },
    ChatPhotoSmall { chat_id: i64, chat_access_hash: i64 },
    ChatPhotoBig { chat_id: i64, chat_access_hash: i64 },
    StickerSetThumbnail { set_id: i64, set_access_hash: i64 },
}

impl ThumbnailSource {
    fn id(&self) -> i32 {
        match self {
            ThumbnailSource::Legacy { .. } => 0,
            ThumbnailSource::Thumbnail { .. } => 1,
            ThumbnailSource::ChatPhotoSmall { .. } => 2,
            ThumbnailSource::ChatPhotoBig { .. } => 3,
            ThumbnailSource::StickerSetThumbnail { .. } => 4,
        }
    }
}

/// Photo-specific part of a file id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoInfo {
    pub volume_id: i64,
    pub local_id: i32,
    pub source: ThumbnailSource,
}

/// Decoded file id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileId {
    pub major: u8,
    pub minor: u8,
    pub file_type: FileType,
    pub dc_id: i32,
    /// May be stale; the server rotates references
    pub file_reference: Vec<u8>,
    pub media_id: i64,
    pub access_hash: i64,
    /// Present for photo-family types only
    pub photo: Option<PhotoInfo>,
}

impl FileId {
    /// Decode a file id string
    pub fn decode(encoded: &str) -> Result<Self> {
        let raw = URL_SAFE_NO_PAD
            .decode(encoded.trim().trim_end_matches('='))
            .map_err(|e| Error::InvalidFileId(format!("bad base64: {}", e)))?;
        let decoded = rle_decode(&raw);

        let (&major, rest) = decoded
            .split_last()
            .ok_or_else(|| Error::InvalidFileId("empty file id".to_string()))?;
        let (minor, body) = if major < 4 {
            (0, rest)
        } else {
            let (&minor, body) = rest
                .split_last()
                .ok_or_else(|| Error::InvalidFileId("missing minor version".to_string()))?;
            (minor, body)
        };

        let mut reader = Reader::new(body);
        let type_flags = reader.i32()?;
        let dc_id = reader.i32()?;

        if type_flags & WEB_LOCATION_FLAG != 0 {
            return Err(Error::InvalidFileId(
                "web locations cannot be fetched from a datacenter".to_string(),
            ));
        }
        let has_reference = type_flags & FILE_REFERENCE_FLAG != 0;
        let file_type = FileType::try_from(type_flags & !(WEB_LOCATION_FLAG | FILE_REFERENCE_FLAG))?;

        let file_reference = if has_reference {
            reader.tl_bytes()?.to_vec()
        } else {
            Vec::new()
        };
        let media_id = reader.i64()?;
        let access_hash = reader.i64()?;

        let photo = if file_type.is_photo() {
            let volume_id = reader.i64()?;
            let source_id = if major >= 4 { reader.i32()? } else { 0 };
            let (source, local_id) = match source_id {
                0 => {
                    let secret = reader.i64()?;
                    (ThumbnailSource::Legacy { secret }, reader.i32()?)
                }
                1 => {
                    let thumb_type = FileType::try_from(reader.i32()?)?;
                    let size = u8::try_from(reader.i32()?)
                        .map(char::from)
                        .map_err(|_| Error::InvalidFileId("bad thumbnail size".to_string()))?;
                    let source = ThumbnailSource::Thumbnail {
                        file_type: thumb_type,
                        size,
                    };
                    (source, reader.i32()?)
                }
                2 | 3 => {
                    let chat_id = reader.i64()?;
                    let chat_access_hash = reader.i64()?;
                    let source = if source_id == 2 {
                        ThumbnailSource::ChatPhotoSmall { chat_id, chat_access_hash }
                    } else {
                        ThumbnailSource::ChatPhotoBig { chat_id, chat_access_hash }
                    };
                    (source, reader.i32()?)
                }
                4 => {
                    let set_id = reader.i64()?;
                    let set_access_hash = reader.i64()?;
                    let source = ThumbnailSource::StickerSetThumbnail { set_id, set_access_hash };
                    (source, reader.i32()?)
                }
                other => {
                    return Err(Error::InvalidFileId(format!(
                        "unknown thumbnail source {}",
                        other
                    )));
                }
            };
            Some(PhotoInfo {
                volume_id,
                local_id,
                source,
            })
        } else {
            None
        };

        Ok(FileId {
            major,
            minor,
            file_type,
            dc_id,
            file_reference,
            media_id,
            access_hash,
            photo,
        })
    }

    /// Encode back into the string form
    pub fn encode(&self) -> String {
        let mut buf: Vec<u8> = Vec::with_capacity(64);

        let mut type_flags = self.file_type as i32;
        if !self.file_reference.is_empty() {
            type_flags |= FILE_REFERENCE_FLAG;
        }
        buf.put_i32_le(type_flags);
        buf.put_i32_le(self.dc_id);

        if !self.file_reference.is_empty() {
            write_tl_bytes(&mut buf, &self.file_reference);
        }
        buf.put_i64_le(self.media_id);
        buf.put_i64_le(self.access_hash);

        if let Some(photo) = &self.photo {
            buf.put_i64_le(photo.volume_id);
            if self.major >= 4 {
                buf.put_i32_le(photo.source.id());
            }
            match &photo.source {
                ThumbnailSource::Legacy { secret } => buf.put_i64_le(*secret),
                ThumbnailSource::Thumbnail { file_type, size } => {
                    buf.put_i32_le(*file_type as i32);
                    buf.put_i32_le(*size as i32);
                }
                ThumbnailSource::ChatPhotoSmall { chat_id, chat_access_hash }
                | ThumbnailSource::ChatPhotoBig { chat_id, chat_access_hash } => {
                    buf.put_i64_le(*chat_id);
                    buf.put_i64_le(*chat_access_hash);
                }
                ThumbnailSource::StickerSetThumbnail { set_id, set_access_hash } => {
                    buf.put_i64_le(*set_id);
                    buf.put_i64_le(*set_access_hash);
                }
            }
            buf.put_i32_le(photo.local_id);
        }

        if self.major >= 4 {
            buf.put_u8(self.minor);
        }
        buf.put_u8(self.major);

        URL_SAFE_NO_PAD.encode(rle_encode(&buf))
    }

    /// Thumbnail size class ("" unless this is a sized thumbnail)
    pub fn thumbnail_size(&self) -> String {
        match self.photo.as_ref().map(|p| &p.source) {
            Some(ThumbnailSource::Thumbnail { size, .. }) => size.to_string(),
            _ => String::new(),
        }
    }
}

/// Expand `0x00, n` pairs into `n` zero bytes
fn rle_decode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut zero = false;

    for &b in data {
        if zero {
            out.resize(out.len() + b as usize, 0);
            zero = false;
        } else if b == 0 {
            zero = true;
        } else {
            out.push(b);
        }
    }

    out
}

fn rle_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut run: u8 = 0;

    for &b in data {
        if b == 0 {
            if run == u8::MAX {
                out.extend_from_slice(&[0, run]);
                run = 0;
            }
            run += 1;
        } else {
            if run > 0 {
                out.extend_from_slice(&[0, run]);
                run = 0;
            }
            out.push(b);
        }
    }
    if run > 0 {
        out.extend_from_slice(&[0, run]);
    }

    out
}

fn write_tl_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    let header = if data.len() <= 253 {
        buf.put_u8(data.len() as u8);
        1
    } else {
        buf.put_u8(254);
        buf.put_uint_le(data.len() as u64, 3);
        4
    };
    buf.extend_from_slice(data);
    let padding = (4 - (header + data.len()) % 4) % 4;
    buf.put_bytes(0, padding);
}

/// Bounds-checked little-endian reader
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(Error::InvalidFileId(format!(
                "truncated: needed {} bytes, {} left",
                n,
                self.buf.len()
            )));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn i32(&mut self) -> Result<i32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(i32::from_le_bytes(raw))
    }

    fn i64(&mut self) -> Result<i64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(i64::from_le_bytes(raw))
    }

    fn tl_bytes(&mut self) -> Result<&'a [u8]> {
        let first = self.take(1)?[0];
        let (len, header) = if first <= 253 {
            (first as usize, 1)
        } else {
            let l = self.take(3)?;
            (l[0] as usize | (l[1] as usize) << 8 | (l[2] as usize) << 16, 4)
        };
        let data = self.take(len)?;
        self.take((4 - (header + len) % 4) % 4)?;
        Ok(data)
    }
}
