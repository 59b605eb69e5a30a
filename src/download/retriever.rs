//! Whole-file and byte-range retrieval
//!
//! Resolves a message to its file, opens a session on the datacenter that
//! stores it and pipes the chunk stream into an async sink, checking the
//! total against the size the message declared.

use crate::download::progress::{human_readable, ProgressCallback, ProgressTracker};
use crate::download::range::{chunk_size_for, part_count, RangePlan};
use crate::download::stream::{ChunkStream, ChunkStreamer, Termination};
use crate::error::{Error, Result};
use crate::media::{DescriptorResolver, FileDescriptor, HasMedia, Location};
use crate::telegram::MediaClient;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of a successful retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieval {
    pub id: Uuid,
    pub written: u64,
    /// Size the message declared (range length for range retrievals)
    pub declared: u64,
    pub chunk_size: u32,
    /// Request count the chunk heuristic expects
    pub expected_parts: u64,
    pub termination: Termination,
}

/// Downloads message media through a [`MediaClient`]
pub struct Retriever {
    client: Arc<MediaClient>,
    streamer: ChunkStreamer,
    progress: Option<ProgressCallback>,
}

impl Retriever {
    pub fn new(client: Arc<MediaClient>) -> Self {
        Retriever {
            streamer: ChunkStreamer::new(client.clone()),
            client,
            progress: None,
        }
    }

    /// Report progress after every chunk written
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn client(&self) -> &Arc<MediaClient> {
        &self.client
    }

    /// Stream the whole file attached to `message`
    pub async fn stream_message<M: HasMedia + ?Sized>(
        &self,
        message: &M,
    ) -> Result<(FileDescriptor, ChunkStream)> {
        let descriptor = DescriptorResolver::resolve(message)?;
        let stream = self.drain_descriptor(&descriptor).await?;
        Ok((descriptor, stream))
    }

    /// Stream the inclusive byte range `from..=until` of the attached file
    pub async fn stream_range<M: HasMedia + ?Sized>(
        &self,
        message: &M,
        from: u64,
        until: u64,
    ) -> Result<(RangePlan, ChunkStream)> {
        let descriptor = DescriptorResolver::resolve(message)?;
        let size = descriptor.declared_size;
        if from > until || (size > 0 && until >= size) {
            return Err(Error::InvalidRange { from, until, size });
        }

        let location = Location::resolve(&descriptor)?;
        let plan = RangePlan::new(from, until, self.client.chunk_size_limit());
        let session = self.client.session(descriptor.dc_id()).await?;
        let stream = self.streamer.stream(
            session,
            location,
            plan.offset,
            plan.chunk_size,
            plan.part_count,
            plan.first_part_cut,
            Some(plan.last_part_cut),
        );
        Ok((plan, stream))
    }

    /// Download the attached file into `sink`
    pub async fn retrieve_to_sink<M, W>(&self, message: &M, sink: &mut W) -> Result<Retrieval>
    where
        M: HasMedia + ?Sized,
        W: AsyncWrite + Unpin + Send,
    {
        let descriptor = DescriptorResolver::resolve(message)?;
        self.retrieve_descriptor(&descriptor, sink).await
    }

    /// Download the inclusive byte range `from..=until` into `sink`
    pub async fn retrieve_range<M, W>(
        &self,
        message: &M,
        from: u64,
        until: u64,
        sink: &mut W,
    ) -> Result<Retrieval>
    where
        M: HasMedia + ?Sized,
        W: AsyncWrite + Unpin + Send,
    {
        let id = Uuid::new_v4();
        let (plan, mut stream) = self.stream_range(message, from, until).await?;
        let expected = plan.len();
        debug!(
            "[{}] Range {}-{}: {} parts of {} bytes from offset {}",
            id, from, until, plan.part_count, plan.chunk_size, plan.offset
        );

        let written = self.pipe(&mut stream, expected, sink).await?;
        let retrieval = Retrieval {
            id,
            written,
            declared: expected,
            chunk_size: plan.chunk_size,
            expected_parts: plan.part_count,
            termination: stream.termination().unwrap_or(Termination::Completed),
        };
        verify(&retrieval)?;
        Ok(retrieval)
    }

    /// Download the attached file to `path`
    ///
    /// Parent directories are created. A failed retrieval leaves any existing
    /// file at `path` untouched.
    pub async fn retrieve_to_path<M, P>(&self, message: &M, path: P) -> Result<Retrieval>
    where
        M: HasMedia + ?Sized,
        P: AsRef<Path>,
    {
        let descriptor = DescriptorResolver::resolve(message)?;
        self.write_descriptor_to(&descriptor, path.as_ref()).await
    }

    /// Download the attached file into the configured download directory
    ///
    /// The file keeps its declared name; unnamed files are called
    /// `<type>_<media id>`.
    pub async fn retrieve_to_dir<M: HasMedia + ?Sized>(
        &self,
        message: &M,
    ) -> Result<(PathBuf, Retrieval)> {
        let descriptor = DescriptorResolver::resolve(message)?;
        let path = self
            .client
            .config()
            .download_dir
            .join(local_file_name(&descriptor));

        let retrieval = self.write_descriptor_to(&descriptor, &path).await?;
        Ok((path, retrieval))
    }

    /// Download into a temporary sibling of `path`, renamed over `path` on success
    async fn write_descriptor_to(&self, descriptor: &FileDescriptor, path: &Path) -> Result<Retrieval> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        tokio::fs::create_dir_all(parent).await?;

        let (file, temp_path) = tempfile::Builder::new()
            .prefix(".tgfetch-")
            .suffix(".part")
            .tempfile_in(parent)?
            .into_parts();
        let mut writer = BufWriter::new(tokio::fs::File::from_std(file));

        // Dropping `temp_path` on any early return removes the partial file
        let retrieval = self.retrieve_descriptor(descriptor, &mut writer).await?;
        drop(writer);

        temp_path.persist(path).map_err(|e| Error::Io(e.error))?;
        info!(
            "Saved {} to {}",
            human_readable(retrieval.written),
            path.display()
        );
        Ok(retrieval)
    }

    async fn retrieve_descriptor<W>(&self, descriptor: &FileDescriptor, sink: &mut W) -> Result<Retrieval>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let id = Uuid::new_v4();
        let declared = descriptor.declared_size;
        let chunk_size = self.chunk_size_for(declared);
        let expected_parts = part_count(declared, chunk_size);

        info!(
            "[{}] Retrieving {:?} {} from DC {} ({} bytes, {} x {} byte parts)",
            id,
            descriptor.file_type(),
            descriptor.media_id(),
            descriptor.dc_id(),
            declared,
            expected_parts,
            chunk_size
        );

        let mut stream = self.drain_descriptor(descriptor).await?;
        let written = self.pipe(&mut stream, declared, sink).await.map_err(|e| {
            warn!("[{}] Retrieval failed after {} bytes: {}", id, stream.bytes_yielded(), e);
            e
        })?;

        let retrieval = Retrieval {
            id,
            written,
            declared,
            chunk_size,
            expected_parts,
            termination: stream.termination().unwrap_or(Termination::Completed),
        };
        verify(&retrieval)?;

        debug!("[{}] Retrieved {} bytes ({:?})", id, written, retrieval.termination);
        Ok(retrieval)
    }

    async fn drain_descriptor(&self, descriptor: &FileDescriptor) -> Result<ChunkStream> {
        let location = Location::resolve(descriptor)?;
        let session = self.client.session(descriptor.dc_id()).await?;
        let declared = descriptor.declared_size;
        Ok(self.streamer.drain(
            session,
            location,
            self.chunk_size_for(declared),
            Some(declared),
        ))
    }

    fn chunk_size_for(&self, declared: u64) -> u32 {
        chunk_size_for(declared).min(self.client.chunk_size_limit())
    }

    /// Write every chunk of `stream` to `sink`, then flush
    async fn pipe<W>(&self, stream: &mut ChunkStream, declared: u64, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut tracker = ProgressTracker::new(declared);

        while let Some(chunk) = stream.next_chunk().await? {
            sink.write_all(&chunk).await?;
            let progress = tracker.advance(chunk.len());
            if let Some(callback) = &self.progress {
                callback(&progress);
            }
        }
        sink.flush().await?;

        Ok(tracker.written())
    }
}

fn verify(retrieval: &Retrieval) -> Result<()> {
    if retrieval.written == 0 {
        return Err(Error::EmptyRetrieval);
    }
    if retrieval.written < retrieval.declared {
        return Err(Error::IncompleteRetrieval {
            written: retrieval.written,
            declared: retrieval.declared,
        });
    }
    Ok(())
}

/// File name to save a descriptor under, stripped of any directory part
fn local_file_name(descriptor: &FileDescriptor) -> String {
    let declared = Path::new(&descriptor.file_name)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty());

    match declared {
        Some(name) => name.to_string(),
        None => format!(
            "{}_{}",
            format!("{:?}", descriptor.file_type()).to_lowercase(),
            descriptor.media_id()
        ),
    }
}
