//! Chunk streaming over repeated `getFile` calls
//!
//! A [`ChunkStream`] is pulled one chunk at a time; each pull issues at most
//! one request, so fetches are strictly sequential and dropping the stream
//! stops it at the next suspension point.
//!
//! Two modes:
//! - parts: a fixed number of `chunk_size` parts starting at an aligned
//!   offset, with the first part trimmed at `first_part_cut` and the last at
//!   `last_part_cut`. One part is a plain range fetch.
//! - drain: read from offset 0 until the datacenter runs out of data or the
//!   known size is reached, advancing by the bytes actually received.

use crate::error::Result;
use crate::media::Location;
use crate::telegram::{ChunkRequest, FileResponse, MediaClient, MediaSession, MAX_CHUNK_SIZE};
use bytes::Bytes;
use futures::Stream;
use std::sync::Arc;
use tracing::{debug, warn};

/// Why a stream stopped producing chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Every requested part was produced (or the known size was reached)
    Completed,
    /// An empty payload arrived while fetching `part`
    EndOfData { part: u64 },
    /// A non-payload response arrived while fetching `part`
    NonPayload { part: u64 },
    /// The fetch at `offset` failed; the error was returned to the consumer
    Failed { offset: u64 },
}

impl Termination {
    /// Whether the remote ended the stream before the expected end
    pub fn is_short(&self) -> bool {
        matches!(self, Termination::EndOfData { .. } | Termination::NonPayload { .. })
    }
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Parts {
        part_count: u64,
        first_part_cut: usize,
        last_part_cut: Option<usize>,
    },
    Drain {
        total_size: Option<u64>,
    },
}

/// Builds chunk streams on top of a [`MediaClient`]
#[derive(Clone)]
pub struct ChunkStreamer {
    client: Arc<MediaClient>,
}

impl ChunkStreamer {
    pub fn new(client: Arc<MediaClient>) -> Self {
        ChunkStreamer { client }
    }

    /// Stream `part_count` parts of `chunk_size` bytes starting at `offset`
    ///
    /// `last_part_cut` of `None` keeps the last part whole.
    #[allow(clippy::too_many_arguments)]
    pub fn stream(
        &self,
        session: Arc<MediaSession>,
        location: Location,
        offset: u64,
        chunk_size: u32,
        part_count: u64,
        first_part_cut: usize,
        last_part_cut: Option<usize>,
    ) -> ChunkStream {
        ChunkStream::new(
            self.client.clone(),
            session,
            location,
            offset,
            chunk_size,
            Mode::Parts {
                part_count,
                first_part_cut,
                last_part_cut,
            },
        )
    }

    /// Stream a whole file from offset 0
    ///
    /// `total_size` of `None` (or 0) reads until the datacenter returns no data.
    pub fn drain(
        &self,
        session: Arc<MediaSession>,
        location: Location,
        chunk_size: u32,
        total_size: Option<u64>,
    ) -> ChunkStream {
        ChunkStream::new(
            self.client.clone(),
            session,
            location,
            0,
            chunk_size,
            Mode::Drain {
                total_size: total_size.filter(|&size| size > 0),
            },
        )
    }
}

/// Pull-based sequence of file chunks; not restartable
pub struct ChunkStream {
    client: Arc<MediaClient>,
    session: Arc<MediaSession>,
    request: ChunkRequest,
    mode: Mode,
    current_part: u64,
    yielded: u64,
    termination: Option<Termination>,
}

impl ChunkStream {
    fn new(
        client: Arc<MediaClient>,
        session: Arc<MediaSession>,
        location: Location,
        offset: u64,
        chunk_size: u32,
        mode: Mode,
    ) -> Self {
        let limit = chunk_size.clamp(1, MAX_CHUNK_SIZE);
        if limit != chunk_size {
            debug!("Chunk size {} clamped to {}", chunk_size, limit);
        }

        ChunkStream {
            client,
            session,
            request: ChunkRequest {
                location,
                offset,
                limit,
            },
            mode,
            current_part: 1,
            yielded: 0,
            termination: None,
        }
    }

    /// Next chunk; `Ok(None)` is a clean end, `Err` a failed fetch
    ///
    /// Once either is returned every further call yields `Ok(None)`.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.termination.is_some() {
            return Ok(None);
        }

        match self.mode {
            Mode::Parts {
                part_count,
                first_part_cut,
                last_part_cut,
            } => self.next_part(part_count, first_part_cut, last_part_cut).await,
            Mode::Drain { total_size } => self.next_drained(total_size).await,
        }
    }

    async fn next_part(
        &mut self,
        part_count: u64,
        first_part_cut: usize,
        last_part_cut: Option<usize>,
    ) -> Result<Option<Bytes>> {
        if self.current_part > part_count {
            return Ok(self.finish(Termination::Completed));
        }

        let payload = match self.fetch_payload().await? {
            Some(payload) => payload,
            None => return Ok(None),
        };

        // The offset moves by the request size, not by what came back
        self.request.offset += u64::from(self.request.limit);

        let part = self.current_part;
        let chunk = if part_count == 1 {
            slice(&payload, first_part_cut, last_part_cut)
        } else if part == 1 {
            slice(&payload, first_part_cut, None)
        } else if part < part_count {
            payload
        } else {
            slice(&payload, 0, last_part_cut)
        };

        if part_count == 1 {
            self.finish(Termination::Completed);
        } else {
            self.current_part += 1;
        }

        self.yielded += chunk.len() as u64;
        Ok(Some(chunk))
    }

    async fn next_drained(&mut self, total_size: Option<u64>) -> Result<Option<Bytes>> {
        if let Some(total) = total_size {
            if self.request.offset >= total {
                return Ok(self.finish(Termination::Completed));
            }
        }

        let payload = match self.fetch_payload().await? {
            Some(payload) => payload,
            None => return Ok(None),
        };

        self.request.offset += payload.len() as u64;
        self.current_part += 1;
        self.yielded += payload.len() as u64;
        Ok(Some(payload))
    }

    /// Fetch at the current offset; `None` means the stream just ended cleanly
    async fn fetch_payload(&mut self) -> Result<Option<Bytes>> {
        let part = self.current_part;

        let response = match self.client.fetch(&self.session, &self.request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    "Stream for {} location stopped at offset {}: {}",
                    self.request.location.kind(),
                    self.request.offset,
                    e
                );
                self.finish(Termination::Failed {
                    offset: self.request.offset,
                });
                return Err(e);
            }
        };

        match response {
            FileResponse::Payload(bytes) if bytes.is_empty() => {
                debug!("No more data at offset {} (part {})", self.request.offset, part);
                Ok(self.finish(Termination::EndOfData { part }))
            }
            FileResponse::Payload(bytes) => Ok(Some(bytes)),
            FileResponse::Other(kind) => {
                warn!("Unusable {} response at offset {}", kind, self.request.offset);
                Ok(self.finish(Termination::NonPayload { part }))
            }
        }
    }

    fn finish(&mut self, termination: Termination) -> Option<Bytes> {
        self.termination = Some(termination);
        None
    }

    /// Why the stream ended, once it has
    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// Total bytes handed to the consumer so far
    pub fn bytes_yielded(&self) -> u64 {
        self.yielded
    }

    /// Offset the next request would use
    pub fn offset(&self) -> u64 {
        self.request.offset
    }

    /// Request byte limit after clamping
    pub fn limit(&self) -> u32 {
        self.request.limit
    }

    /// Adapt into a `futures::Stream`; ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            match stream.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), stream)),
                Ok(None) => None,
                Err(e) => Some((Err(e), stream)),
            }
        })
    }
}

/// `bytes[start..end]`, clamped to the payload like a slice in a dynamic language
fn slice(bytes: &Bytes, start: usize, end: Option<usize>) -> Bytes {
    let end = end.unwrap_or(bytes.len()).min(bytes.len());
    let start = start.min(end);
    bytes.slice(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DownloadConfig;
    use crate::error::Error;
    use crate::telegram::testing::{home, pattern, MockTransport, HOME_DC};
    use crate::telegram::RpcError;
    use futures::TryStreamExt;

    const CHUNK: u32 = 4096;

    fn location() -> Location {
        Location::Document {
            id: 10,
            access_hash: 20,
            file_reference: vec![1],
            thumb_size: String::new(),
        }
    }

    async fn streamer(transport: &Arc<MockTransport>) -> (ChunkStreamer, Arc<MediaSession>) {
        let client = Arc::new(MediaClient::new(
            transport.clone(),
            home(),
            DownloadConfig::default(),
        ));
        let session = client.session(HOME_DC).await.unwrap();
        (ChunkStreamer::new(client), session)
    }

    async fn collect(stream: &mut ChunkStream) -> Result<Vec<Bytes>> {
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next_chunk().await? {
            chunks.push(chunk);
        }
        Ok(chunks)
    }

    #[tokio::test]
    async fn test_single_part_range() {
        let data = pattern(3 * CHUNK as usize);
        let transport = Arc::new(MockTransport::serving(data.clone(), 0));
        let (streamer, session) = streamer(&transport).await;

        let mut stream = streamer.stream(session, location(), 4096, CHUNK, 1, 10, Some(300));
        let chunks = collect(&mut stream).await.unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(&chunks[0][..], &data[4096 + 10..4096 + 300]);
        assert_eq!(stream.termination(), Some(Termination::Completed));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_single_part_to_end() {
        let data = pattern(1000);
        let transport = Arc::new(MockTransport::serving(data.clone(), 0));
        let (streamer, session) = streamer(&transport).await;

        let mut stream = streamer.stream(session, location(), 0, CHUNK, 1, 250, None);
        let chunks = collect(&mut stream).await.unwrap();

        assert_eq!(chunks, vec![Bytes::copy_from_slice(&data[250..])]);
    }

    #[tokio::test]
    async fn test_multi_part_trims_first_and_last() {
        let data = pattern(4 * CHUNK as usize);
        let transport = Arc::new(MockTransport::serving(data.clone(), 0));
        let (streamer, session) = streamer(&transport).await;

        let mut stream = streamer.stream(session, location(), 0, CHUNK, 3, 100, Some(50));
        let chunks = collect(&mut stream).await.unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), CHUNK as usize - 100);
        assert_eq!(chunks[1].len(), CHUNK as usize);
        assert_eq!(chunks[2].len(), 50);

        let joined: Vec<u8> = chunks.concat();
        assert_eq!(joined, &data[100..2 * CHUNK as usize + 50]);
        assert_eq!(transport.request_offsets(), vec![0, 4096, 8192]);
        assert_eq!(stream.bytes_yielded(), joined.len() as u64);
    }

    #[tokio::test]
    async fn test_chunk_size_clamped_to_protocol_max() {
        let transport = Arc::new(MockTransport::serving(pattern(100), 0));
        let (streamer, session) = streamer(&transport).await;

        let mut stream = streamer.stream(session, location(), 0, 4 * 1024 * 1024, 1, 0, None);
        assert_eq!(stream.limit(), MAX_CHUNK_SIZE);

        collect(&mut stream).await.unwrap();
        assert_eq!(transport.requests.lock()[0].limit, MAX_CHUNK_SIZE);
    }

    #[tokio::test]
    async fn test_short_stream_is_clean_end() {
        // file ends inside part 2 of 4
        let data = pattern(CHUNK as usize + 10);
        let transport = Arc::new(MockTransport::serving(data, 0));
        let (streamer, session) = streamer(&transport).await;

        let mut stream = streamer.stream(session, location(), 0, CHUNK, 4, 0, None);
        let chunks = collect(&mut stream).await.unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].len(), 10);
        assert_eq!(stream.termination(), Some(Termination::EndOfData { part: 3 }));
        assert!(stream.termination().unwrap().is_short());
    }

    #[tokio::test]
    async fn test_non_payload_ends_stream() {
        let transport = Arc::new(MockTransport::scripted(vec![
            Ok(FileResponse::Payload(Bytes::from(pattern(CHUNK as usize)))),
            Ok(FileResponse::Other("upload.fileCdnRedirect".to_string())),
        ]));
        let (streamer, session) = streamer(&transport).await;

        let mut stream = streamer.stream(session, location(), 0, CHUNK, 3, 0, None);
        let chunks = collect(&mut stream).await.unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(stream.termination(), Some(Termination::NonPayload { part: 2 }));
    }

    #[tokio::test]
    async fn test_initial_failure_is_reported() {
        let transport = Arc::new(MockTransport::scripted(vec![Err(RpcError::Transport(
            "connection reset".to_string(),
        ))]));
        let (streamer, session) = streamer(&transport).await;

        let mut stream = streamer.stream(session, location(), 0, CHUNK, 2, 0, None);

        assert!(matches!(
            stream.next_chunk().await,
            Err(Error::TransientFetchFailure { offset: 0, .. })
        ));
        assert_eq!(stream.termination(), Some(Termination::Failed { offset: 0 }));
        assert!(stream.next_chunk().await.unwrap().is_none());
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_offset_advances_by_limit_not_received_length() {
        let transport = Arc::new(MockTransport::serving(pattern(3 * CHUNK as usize), 1000));
        let (streamer, session) = streamer(&transport).await;

        let mut stream = streamer.stream(session, location(), 0, CHUNK, 2, 0, None);
        let chunks = collect(&mut stream).await.unwrap();

        assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), 2000);
        assert_eq!(transport.request_offsets(), vec![0, 4096]);
    }

    #[tokio::test]
    async fn test_zero_parts_issue_no_request() {
        let transport = Arc::new(MockTransport::serving(pattern(10), 0));
        let (streamer, session) = streamer(&transport).await;

        let mut stream = streamer.stream(session, location(), 0, CHUNK, 0, 0, None);

        assert!(stream.next_chunk().await.unwrap().is_none());
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_drain_advances_by_received_length() {
        let data = pattern(500);
        let transport = Arc::new(MockTransport::serving(data.clone(), 100));
        let (streamer, session) = streamer(&transport).await;

        let mut stream = streamer.drain(session, location(), CHUNK, Some(500));
        let chunks = collect(&mut stream).await.unwrap();

        assert_eq!(chunks.concat(), data);
        assert_eq!(transport.request_offsets(), vec![0, 100, 200, 300, 400]);
        assert_eq!(stream.termination(), Some(Termination::Completed));
    }

    #[tokio::test]
    async fn test_drain_unknown_size_stops_on_empty() {
        let transport = Arc::new(MockTransport::serving(pattern(250), 100));
        let (streamer, session) = streamer(&transport).await;

        let mut stream = streamer.drain(session, location(), CHUNK, None);
        let chunks = collect(&mut stream).await.unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(transport.request_count(), 4);
        assert_eq!(stream.termination(), Some(Termination::EndOfData { part: 4 }));
    }

    #[tokio::test]
    async fn test_into_stream() {
        let data = pattern(2 * CHUNK as usize);
        let transport = Arc::new(MockTransport::serving(data.clone(), 0));
        let (streamer, session) = streamer(&transport).await;

        let chunks: Vec<Bytes> = streamer
            .stream(session, location(), 0, CHUNK, 2, 0, None)
            .into_stream()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(chunks.concat(), data);
    }
}
