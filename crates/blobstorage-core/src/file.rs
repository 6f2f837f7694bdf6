use std::{
    fmt,
    io::{self, Read, Seek, SeekFrom, Write},
    str::FromStr,
    sync::Arc,
};

use tempfile::SpooledTempFile;
use tracing::{debug, error, info, warn};

use crate::{BlobBlock, BlobService, ServiceError, StorageError, block::block_id};

/// Downloads always use a single sequential connection.
const READ_MAX_CONNECTIONS: usize = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

impl OpenMode {
    fn label(self) -> &'static str {
        match self {
            OpenMode::Read => "reading",
            OpenMode::Write => "writing",
        }
    }
}

impl FromStr for OpenMode {
    type Err = StorageError;

    /// Accepts the usual file mode strings: `r`, `rb`, `rt`, `w`, `wb`, `wt`.
    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        match mode {
            "r" | "rb" | "rt" => Ok(OpenMode::Read),
            "w" | "wb" | "wt" => Ok(OpenMode::Write),
            other => Err(StorageError::InvalidMode(other.to_string())),
        }
    }
}

/// File-like handle on a single blob.
///
/// Read handles hold the whole blob locally. Write handles stream the data to
/// the service in blocks of `buffer_size` bytes and commit the block list
/// when closed or dropped.
pub struct BlobFile {
    name: String,
    inner: Inner,
}

enum Inner {
    Reader(SpooledTempFile),
    Writer(BlockWriter),
}

impl BlobFile {
    pub(crate) fn open_read(
        service: Arc<dyn BlobService>,
        container: &str,
        name: &str,
        max_memory_size: usize,
    ) -> Result<Self, StorageError> {
        let mut spool = SpooledTempFile::new(max_memory_size);
        let props = service.get_blob_to_stream(container, name, &mut spool, READ_MAX_CONNECTIONS)?;
        spool.seek(SeekFrom::Start(0))?;
        debug!(container, blob = name, bytes = props.content_length, "downloaded blob");

        Ok(Self {
            name: name.to_string(),
            inner: Inner::Reader(spool),
        })
    }

    pub(crate) fn open_write(
        service: Arc<dyn BlobService>,
        container: &str,
        name: &str,
        buffer_size: usize,
    ) -> Result<Self, StorageError> {
        // An empty blob exists from here on, so a writer that never commits
        // leaves empty content behind rather than a partial blob.
        service.create_blob(container, name)?;
        debug!(container, blob = name, buffer_size, "opened blob for writing");

        Ok(Self {
            name: name.to_string(),
            inner: Inner::Writer(BlockWriter {
                service,
                container: container.to_string(),
                name: name.to_string(),
                buffer_size,
                buffer: Vec::new(),
                blocks: Vec::new(),
                state: WriterState::Open,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> OpenMode {
        match self.inner {
            Inner::Reader(_) => OpenMode::Read,
            Inner::Writer(_) => OpenMode::Write,
        }
    }

    /// Appends text or bytes to a write handle, uploading every full block.
    pub fn write_content(&mut self, data: impl AsRef<[u8]>) -> Result<(), StorageError> {
        match &mut self.inner {
            Inner::Writer(writer) => writer.append(data.as_ref()),
            Inner::Reader(_) => Err(unsupported(OpenMode::Read, "write")),
        }
    }

    /// Reads everything left in a read handle.
    pub fn read_content(&mut self) -> Result<Vec<u8>, StorageError> {
        let mut content = Vec::new();
        match &mut self.inner {
            Inner::Reader(spool) => {
                spool.read_to_end(&mut content)?;
                Ok(content)
            }
            Inner::Writer(_) => Err(unsupported(OpenMode::Write, "read")),
        }
    }

    /// Finishes the handle. For writers this uploads the buffered tail and
    /// commits the block list; any failure is returned to the caller.
    pub fn close(mut self) -> Result<(), StorageError> {
        match &mut self.inner {
            Inner::Writer(writer) => writer.finish(),
            Inner::Reader(_) => Ok(()),
        }
    }
}

impl fmt::Debug for BlobFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobFile")
            .field("name", &self.name)
            .field("mode", &self.mode())
            .finish()
    }
}

impl Read for BlobFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            Inner::Reader(spool) => spool.read(buf),
            Inner::Writer(_) => Err(unsupported(OpenMode::Write, "read").into()),
        }
    }
}

impl Seek for BlobFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.inner {
            Inner::Reader(spool) => spool.seek(pos),
            Inner::Writer(_) => Err(unsupported(OpenMode::Write, "seek").into()),
        }
    }
}

impl Write for BlobFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_content(buf)?;
        Ok(buf.len())
    }

    /// Full blocks are uploaded as soon as they fill up and the tail is only
    /// sent on close, so there is nothing to push here.
    fn flush(&mut self) -> io::Result<()> {
        match &self.inner {
            Inner::Writer(_) => Ok(()),
            Inner::Reader(_) => Err(unsupported(OpenMode::Read, "flush").into()),
        }
    }
}

fn unsupported(mode: OpenMode, operation: &'static str) -> StorageError {
    StorageError::Unsupported {
        mode: mode.label(),
        operation,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WriterState {
    Open,
    /// A remote call failed; the block list must never be committed.
    Poisoned,
    Finished,
}

struct BlockWriter {
    service: Arc<dyn BlobService>,
    container: String,
    name: String,
    buffer_size: usize,
    buffer: Vec<u8>,
    blocks: Vec<BlobBlock>,
    state: WriterState,
}

impl BlockWriter {
    fn append(&mut self, data: &[u8]) -> Result<(), StorageError> {
        if self.state == WriterState::Poisoned {
            return Err(StorageError::Poisoned(self.name.clone()));
        }
        self.buffer.extend_from_slice(data);

        while self.buffer.len() >= self.buffer_size {
            if let Err(err) = self.stage(self.buffer_size) {
                self.state = WriterState::Poisoned;
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Uploads the first `len` buffered bytes as the next block.
    ///
    /// The bytes leave the buffer in the same step the block id is recorded,
    /// so an unwind at any point never leaves data both staged and buffered.
    fn stage(&mut self, len: usize) -> Result<(), ServiceError> {
        let id = block_id(&self.name, self.blocks.len() + 1);
        self.service
            .put_block(&self.container, &self.name, &self.buffer[..len], &id)?;
        self.buffer.drain(..len);
        self.blocks.push(BlobBlock::new(id));
        debug!(
            container = %self.container,
            blob = %self.name,
            block = self.blocks.len(),
            bytes = len,
            "staged block"
        );
        Ok(())
    }

    /// Runs at most once per writer, whichever of `close` or `drop` comes first.
    fn finish(&mut self) -> Result<(), StorageError> {
        let state = std::mem::replace(&mut self.state, WriterState::Finished);
        match state {
            WriterState::Finished => return Ok(()),
            WriterState::Poisoned => return Err(StorageError::Poisoned(self.name.clone())),
            WriterState::Open => {}
        }

        if !self.buffer.is_empty() {
            self.stage(self.buffer.len())?;
        }
        self.service
            .put_block_list(&self.container, &self.name, &self.blocks)?;
        info!(
            container = %self.container,
            blob = %self.name,
            blocks = self.blocks.len(),
            "committed block list"
        );
        Ok(())
    }
}

impl Drop for BlockWriter {
    fn drop(&mut self) {
        match self.state {
            WriterState::Finished => {}
            WriterState::Poisoned => {
                warn!(blob = %self.name, "dropping failed blob writer without committing");
                self.state = WriterState::Finished;
            }
            WriterState::Open => {
                if let Err(err) = self.finish() {
                    error!(blob = %self.name, error = %err, "failed to commit blob on drop");
                }
            }
        }
    }
}
