//! Envelope framing for the engine socket.
//!
//! Each envelope travels as `Content-Length: N\r\n\r\n{json}`. This module
//! provides [`EnvelopeReader`] and [`EnvelopeWriter`] over any async byte
//! stream, so the same code serves TCP halves and in-memory test buffers.

use anyhow::{Context, Result, bail};
use enginelink_types::Envelope;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Largest accepted frame body, in bytes.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

const CONTENT_LENGTH: &str = "Content-Length";

/// A complete frame arrived but its body did not decode as an envelope.
///
/// The stream is still positioned at the next frame boundary, so readers
/// may skip the frame and keep going.
#[derive(Debug, Error)]
#[error("frame body is not an envelope")]
pub struct UndecodableFrame(#[source] pub serde_json::Error);

/// Value of a `Content-Length` header line, or `None` for any other header.
fn content_length_header(line: &str) -> Result<Option<usize>> {
    let Some((name, value)) = line.split_once(':') else {
        return Ok(None);
    };
    if !name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
        return Ok(None);
    }
    let len = value
        .trim()
        .parse()
        .with_context(|| format!("bad {CONTENT_LENGTH} {:?}", value.trim()))?;
    Ok(Some(len))
}

/// Reads framed envelopes from an async reader.
pub struct EnvelopeReader<R> {
    inner: BufReader<R>,
    line: String,
}

impl<R: AsyncRead + Unpin> EnvelopeReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            line: String::new(),
        }
    }

    /// Read the next envelope.
    ///
    /// Returns `Ok(None)` on EOF before any header byte (clean close).
    /// Returns `Err` on malformed headers, oversized frames and truncated
    /// bodies. A body that is not an envelope yields an error carrying
    /// [`UndecodableFrame`], after which the reader can continue.
    pub async fn read_envelope(&mut self) -> Result<Option<Envelope>> {
        let Some(len) = self.next_frame_len().await? else {
            return Ok(None);
        };
        if len > MAX_FRAME_BYTES {
            bail!("frame of {len} bytes is over the {MAX_FRAME_BYTES} byte limit");
        }

        let mut body = vec![0u8; len];
        self.inner
            .read_exact(&mut body)
            .await
            .with_context(|| format!("reading {len} byte frame body"))?;

        match serde_json::from_slice(&body) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(e) => Err(UndecodableFrame(e).into()),
        }
    }

    /// Consume one header block and return its declared body length.
    async fn next_frame_len(&mut self) -> Result<Option<usize>> {
        let mut declared = None;
        let mut first = true;

        loop {
            self.line.clear();
            let n = self
                .inner
                .read_line(&mut self.line)
                .await
                .context("reading frame header")?;
            if n == 0 {
                if first {
                    return Ok(None);
                }
                bail!("stream ended inside a frame header");
            }
            first = false;

            let header = self.line.trim();
            if header.is_empty() {
                return declared
                    .map(Some)
                    .with_context(|| format!("frame header has no {CONTENT_LENGTH}"));
            }
            if let Some(len) = content_length_header(header)? {
                declared = Some(len);
            }
        }
    }
}

/// Writes framed envelopes to an async writer.
pub struct EnvelopeWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> EnvelopeWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_envelope(&mut self, envelope: &Envelope) -> Result<()> {
        let body = serde_json::to_vec(envelope).context("encoding envelope")?;
        let mut frame = format!("{CONTENT_LENGTH}: {}\r\n\r\n", body.len()).into_bytes();
        frame.extend_from_slice(&body);

        self.writer
            .write_all(&frame)
            .await
            .with_context(|| format!("sending {} envelope", envelope.kind()))?;
        self.writer.flush().await.context("flushing envelope")
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
