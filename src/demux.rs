//! Response demultiplexing
//!
//! Consumes the model's streamed response, writing every image part to its own
//! numbered file and routing text parts to the log.

use crate::ai::mime::extension_for_mime;
use crate::models::{GenerationOutcome, ResponseChunk, ResponsePart};
use crate::{Error, Result};
use futures::{Stream, StreamExt};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Fixed prefix of every generated artifact file name.
pub const ARTIFACT_PREFIX: &str = "remixed_image_";

/// Indices tried before giving up on a taken timestamp.
const MAX_NAME_ATTEMPTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxState {
    Streaming,
    Done,
    Failed,
}

/// What a finished (or failed) stream produced.
#[derive(Debug)]
pub struct DemuxReport {
    pub artifacts: Vec<String>,
    pub texts: Vec<String>,
    pub state: DemuxState,
    pub failure: Option<Error>,
}

impl DemuxReport {
    /// A stream that ended cleanly without any image is still a failure.
    pub fn into_result(self) -> Result<GenerationOutcome> {
        if let Some(err) = self.failure {
            return Err(err);
        }
        if self.artifacts.is_empty() {
            return Err(Error::EmptyResult);
        }
        Ok(GenerationOutcome {
            artifacts: self.artifacts,
            texts: self.texts,
        })
    }
}

pub struct ResponseDemultiplexer {
    output_dir: PathBuf,
    timestamp: i64,
    next_index: usize,
    state: DemuxState,
    artifacts: Vec<String>,
    texts: Vec<String>,
}

impl ResponseDemultiplexer {
    /// Artifacts are stamped with the current time in whole seconds.
    pub fn new(output_dir: &Path) -> Self {
        Self::with_timestamp(output_dir, chrono::Utc::now().timestamp())
    }

    pub fn with_timestamp(output_dir: &Path, timestamp: i64) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            timestamp,
            next_index: 0,
            state: DemuxState::Streaming,
            artifacts: Vec::new(),
            texts: Vec::new(),
        }
    }

    pub fn state(&self) -> DemuxState {
        self.state
    }

    fn artifact_name(&self, mime_type: &str) -> String {
        format!(
            "{}{}_{}.{}",
            ARTIFACT_PREFIX,
            self.timestamp,
            self.next_index,
            extension_for_mime(mime_type)
        )
    }

    /// Handle one chunk. A write failure moves the demultiplexer to `Failed`.
    pub async fn accept(&mut self, chunk: ResponseChunk) -> Result<()> {
        if self.state != DemuxState::Streaming {
            return Err(Error::Invariant(format!(
                "Chunk received after stream reached {:?}",
                self.state
            )));
        }

        for part in chunk.parts {
            match part {
                ResponsePart::Image { data, mime_type } => {
                    if let Err(e) = self.write_artifact(&data, &mime_type).await {
                        self.state = DemuxState::Failed;
                        return Err(e);
                    }
                }
                ResponsePart::Text(text) => {
                    info!("Model text: {}", text);
                    self.texts.push(text);
                }
            }
        }
        Ok(())
    }

    async fn write_artifact(&mut self, data: &[u8], mime_type: &str) -> Result<()> {
        let (name, path, file) = self.create_artifact_file(mime_type).await?;
        write_or_discard(file, &path, data).await?;

        info!("File saved to: {}", path.display());
        self.artifacts.push(name);
        self.next_index += 1;
        Ok(())
    }

    /// Claim the next free artifact name. Another run that started in the same
    /// second may already hold some indices; those are skipped, never reused.
    async fn create_artifact_file(&mut self, mime_type: &str) -> Result<(String, PathBuf, File)> {
        let mut attempts = 1;
        loop {
            let name = self.artifact_name(mime_type);
            let path = self.output_dir.join(&name);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((name, path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempts < MAX_NAME_ATTEMPTS => {
                    debug!("{} already exists, trying the next index", name);
                    self.next_index += 1;
                    attempts += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Drain `stream` until it ends or errors.
    pub async fn consume<S>(mut self, stream: S) -> DemuxReport
    where
        S: Stream<Item = Result<ResponseChunk>>,
    {
        let mut stream = std::pin::pin!(stream);
        let mut failure = None;

        while let Some(item) = stream.next().await {
            let outcome = match item {
                Ok(chunk) if chunk.is_empty() => continue,
                Ok(chunk) => self.accept(chunk).await,
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                warn!(
                    "Response stream failed after {} artifact(s): {}",
                    self.artifacts.len(),
                    e
                );
                self.state = DemuxState::Failed;
                failure = Some(e);
                break;
            }
        }

        if failure.is_none() {
            self.state = DemuxState::Done;
        }

        DemuxReport {
            artifacts: self.artifacts,
            texts: self.texts,
            state: self.state,
            failure,
        }
    }
}

/// Write and flush `data`, removing the file at `path` if either step fails.
async fn write_or_discard<W>(mut writer: W, path: &Path, data: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut written = writer.write_all(data).await;
    if written.is_ok() {
        written = writer.flush().await;
    }
    drop(writer);

    if written.is_err() {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("Could not remove partial artifact {}: {}", path.display(), e);
        }
    }
    written
}
