//! Incremental decoder for image pull progress feeds.
//!
//! The runtime reports pull progress as a stream of JSON objects written
//! back to back with no delimiter. Chunks may split an object anywhere, so
//! the decoder buffers bytes and only yields complete values.

use serde::Deserialize;

use platconf_core::error::PullError;

/// One progress event of an image pull.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProgressMessage {
    /// Human readable status, e.g. "Downloading"
    pub status: String,
    /// Layer ID the event refers to
    pub id: String,
    /// Progress bar text
    pub progress: String,
    /// Error reported by the runtime; non-empty means the pull failed
    pub error: String,
}

/// Buffering decoder over a concatenated JSON stream.
#[derive(Debug)]
pub struct ProgressDecoder {
    image: String,
    buffer: Vec<u8>,
}

impl ProgressDecoder {
    /// Create a decoder for the progress feed of `image`.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            buffer: Vec::new(),
        }
    }

    /// Feed a chunk and return every message it completed.
    ///
    /// A message carrying an error fails immediately.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<ProgressMessage>, PullError> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        let mut consumed = 0;
        {
            let mut stream =
                serde_json::Deserializer::from_slice(&self.buffer).into_iter::<ProgressMessage>();
            loop {
                match stream.next() {
                    Some(Ok(message)) => {
                        consumed = stream.byte_offset();
                        if !message.error.is_empty() {
                            return Err(PullError::Registry {
                                image: self.image.clone(),
                                message: message.error,
                            });
                        }
                        messages.push(message);
                    }
                    // Incomplete value, wait for more bytes.
                    Some(Err(e)) if e.is_eof() => break,
                    Some(Err(e)) => {
                        return Err(PullError::Decode {
                            image: self.image.clone(),
                            message: e.to_string(),
                        })
                    }
                    None => {
                        consumed = stream.byte_offset();
                        break;
                    }
                }
            }
        }
        self.buffer.drain(..consumed);

        Ok(messages)
    }

    /// Signal the end of the stream.
    ///
    /// Leftover bytes other than whitespace mean the stream was cut off
    /// in the middle of a value.
    pub fn finish(self) -> Result<(), PullError> {
        if self.buffer.iter().all(u8::is_ascii_whitespace) {
            Ok(())
        } else {
            Err(PullError::UnexpectedEof { image: self.image })
        }
    }
}
