//! Streaming Chat Response
//!
//! The chat endpoint delivers its response body as a sequence of text
//! fragments rather than one JSON payload. [`ChatStream`] exposes that body
//! as a lazy [`futures::Stream`] of decoded fragments: the caller iterates,
//! each item is one fragment in arrival order, exhaustion is successful
//! completion, and an `Err` item is terminal.
//!
//! Fragment boundaries are arbitrary byte chunking - a multi-byte UTF-8
//! character may be split across two reads, so the decoder carries
//! incomplete trailing sequences between chunks.
//!
//! Cancellation is cooperative: an [`AbortHandle`] flipped between fragment
//! reads terminates the stream with [`ClientError::Aborted`]. Dropping the
//! stream also cancels the underlying request.

use std::borrow::Cow;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, TryStreamExt};

use crate::error::ClientError;

/// Cooperative cancellation flag for a [`ChatStream`]
///
/// Cloneable so a UI can keep a handle while the stream is being driven
/// elsewhere. Aborting takes effect at the next fragment boundary.
#[derive(Clone, Debug, Default)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    /// Create a fresh, un-aborted handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the stream this handle belongs to.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }
}

/// Incremental UTF-8 decoder that carries incomplete sequences across reads
#[derive(Debug, Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    /// Decode the next chunk, holding back any incomplete trailing sequence.
    ///
    /// Returns the decoded text, which is empty when the whole chunk was
    /// carried over.
    fn push(&mut self, chunk: &[u8]) -> Result<String, ClientError> {
        let bytes: Cow<'_, [u8]> = if self.pending.is_empty() {
            Cow::Borrowed(chunk)
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(chunk);
            Cow::Owned(joined)
        };

        match std::str::from_utf8(&bytes) {
            Ok(text) => Ok(text.to_owned()),
            Err(err) => {
                if err.error_len().is_some() {
                    return Err(ClientError::Stream {
                        message: "response body is not valid UTF-8".to_string(),
                    });
                }
                // Incomplete sequence at the tail: emit the valid prefix,
                // carry the rest into the next read.
                let valid = err.valid_up_to();
                self.pending = bytes[valid..].to_vec();
                Ok(String::from_utf8_lossy(&bytes[..valid]).into_owned())
            }
        }
    }

    /// Check that no partial character is left at end-of-stream.
    fn finish(&mut self) -> Result<(), ClientError> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            self.pending.clear();
            Err(ClientError::Stream {
                message: "response body ended inside a multi-byte character".to_string(),
            })
        }
    }
}

/// Boxed source of raw body chunks
type ByteSource = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// One streaming chat response
///
/// Yields `Result<String, ClientError>` items: decoded fragments in the
/// exact order the backend produced them, never duplicated. After a terminal
/// item (error or exhaustion) the stream yields only `None`. Each
/// `ChatStream` is independent; there is no cross-call state.
pub struct ChatStream {
    source: ByteSource,
    decoder: Utf8Carry,
    aggregate: String,
    abort: AbortHandle,
    finished: bool,
}

impl ChatStream {
    /// Wrap an HTTP response whose status was already verified as success.
    pub(crate) fn from_response(response: reqwest::Response) -> Self {
        Self::from_bytes(response.bytes_stream().map_err(|err| ClientError::Stream {
            message: err.to_string(),
        }))
    }

    /// Build a stream from raw body chunks.
    ///
    /// This is how fakes and tests feed scripted fragments through the same
    /// decoding path the real transport uses.
    pub fn from_bytes<S>(source: S) -> Self
    where
        S: Stream<Item = Result<Bytes, ClientError>> + Send + 'static,
    {
        Self {
            source: Box::pin(source),
            decoder: Utf8Carry::default(),
            aggregate: String::new(),
            abort: AbortHandle::new(),
            finished: false,
        }
    }

    /// Handle for cancelling this stream between fragment reads.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// The concatenation of every fragment yielded so far.
    #[must_use]
    pub fn aggregate(&self) -> &str {
        &self.aggregate
    }

    /// Consume the stream and return the accumulated text.
    #[must_use]
    pub fn into_aggregate(self) -> String {
        self.aggregate
    }

    /// Whether the stream reached a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Stream for ChatStream {
    type Item = Result<String, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.finished {
            return Poll::Ready(None);
        }

        if this.abort.is_aborted() {
            this.finished = true;
            return Poll::Ready(Some(Err(ClientError::Aborted)));
        }

        loop {
            match this.source.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => {
                    this.finished = true;
                    return match this.decoder.finish() {
                        Ok(()) => Poll::Ready(None),
                        Err(err) => Poll::Ready(Some(Err(err))),
                    };
                }
                Poll::Ready(Some(Err(err))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(Some(Ok(chunk))) => match this.decoder.push(&chunk) {
                    // Whole chunk held back as a partial character: keep reading.
                    Ok(text) if text.is_empty() => {}
                    Ok(text) => {
                        this.aggregate.push_str(&text);
                        return Poll::Ready(Some(Ok(text)));
                    }
                    Err(err) => {
                        this.finished = true;
                        return Poll::Ready(Some(Err(err)));
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;

    fn scripted(chunks: Vec<Result<&'static [u8], ClientError>>) -> ChatStream {
        ChatStream::from_bytes(futures::stream::iter(
            chunks
                .into_iter()
                .map(|chunk| chunk.map(Bytes::from_static)),
        ))
    }

    async fn collect_ok(stream: &mut ChatStream) -> Vec<String> {
        let mut fragments = Vec::new();
        while let Some(item) = stream.next().await {
            fragments.push(item.unwrap());
        }
        fragments
    }

    #[test]
    fn test_decoder_passthrough() {
        let mut decoder = Utf8Carry::default();
        assert_eq!(decoder.push(b"hola").unwrap(), "hola");
        assert_eq!(decoder.push(b" mundo").unwrap(), " mundo");
        decoder.finish().unwrap();
    }

    #[test]
    fn test_decoder_split_two_byte_character() {
        // "¿" is C2 BF.
        let mut decoder = Utf8Carry::default();
        assert_eq!(decoder.push(b"\xC2").unwrap(), "");
        assert_eq!(decoder.push(b"\xBFeh?").unwrap(), "¿eh?");
        decoder.finish().unwrap();
    }

    #[test]
    fn test_decoder_split_four_byte_character() {
        // "🦀" is F0 9F A6 80, split one byte per chunk.
        let mut decoder = Utf8Carry::default();
        assert_eq!(decoder.push(b"\xF0").unwrap(), "");
        assert_eq!(decoder.push(b"\x9F").unwrap(), "");
        assert_eq!(decoder.push(b"\xA6").unwrap(), "");
        assert_eq!(decoder.push(b"\x80").unwrap(), "🦀");
        decoder.finish().unwrap();
    }

    #[test]
    fn test_decoder_rejects_invalid_bytes() {
        let mut decoder = Utf8Carry::default();
        assert!(matches!(
            decoder.push(b"ok\xFFnope"),
            Err(ClientError::Stream { .. })
        ));
    }

    #[test]
    fn test_decoder_rejects_truncated_tail() {
        let mut decoder = Utf8Carry::default();
        assert_eq!(decoder.push(b"adi\xC3").unwrap(), "adi");
        assert!(matches!(decoder.finish(), Err(ClientError::Stream { .. })));
    }

    #[tokio::test]
    async fn test_fragments_in_order_and_aggregate() {
        let mut stream = scripted(vec![
            Ok(b"Hola".as_slice()),
            Ok(b", \xC2\xBFen".as_slice()),
            Ok(b" qu\xC3\xA9 puedo ayudarte?".as_slice()),
        ]);

        let fragments = collect_ok(&mut stream).await;
        assert_eq!(fragments, vec!["Hola", ", ¿en", " qué puedo ayudarte?"]);
        assert_eq!(stream.aggregate(), "Hola, ¿en qué puedo ayudarte?");
        assert!(stream.is_finished());
    }

    #[tokio::test]
    async fn test_multibyte_split_across_fragments() {
        // "¿" split between the first and second chunk.
        let mut stream = scripted(vec![
            Ok(b"Hola, \xC2".as_slice()),
            Ok(b"\xBFqu\xC3\xA9?".as_slice()),
        ]);

        let fragments = collect_ok(&mut stream).await;
        assert_eq!(fragments, vec!["Hola, ", "¿qué?"]);
        assert_eq!(stream.aggregate(), "Hola, ¿qué?");
    }

    #[tokio::test]
    async fn test_error_is_terminal() {
        let mut stream = scripted(vec![
            Ok(b"partial".as_slice()),
            Err(ClientError::Stream {
                message: "connection reset".to_string(),
            }),
            Ok(b"never delivered".as_slice()),
        ]);

        assert_eq!(stream.next().await.unwrap().unwrap(), "partial");
        assert!(matches!(
            stream.next().await,
            Some(Err(ClientError::Stream { .. }))
        ));
        assert!(stream.next().await.is_none());
        assert_eq!(stream.aggregate(), "partial");
    }

    #[tokio::test]
    async fn test_truncated_tail_is_stream_error() {
        let mut stream = scripted(vec![Ok(b"adi\xC3".as_slice())]);
        assert_eq!(stream.next().await.unwrap().unwrap(), "adi");
        assert!(matches!(
            stream.next().await,
            Some(Err(ClientError::Stream { .. }))
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_abort_between_fragments() {
        let mut stream = scripted(vec![Ok(b"uno".as_slice()), Ok(b"dos".as_slice())]);
        let abort = stream.abort_handle();

        assert_eq!(stream.next().await.unwrap().unwrap(), "uno");
        abort.abort();
        assert!(matches!(stream.next().await, Some(Err(ClientError::Aborted))));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_body_completes() {
        let mut stream = scripted(vec![]);
        assert!(stream.next().await.is_none());
        assert_eq!(stream.aggregate(), "");
        assert!(stream.is_finished());
    }
}
