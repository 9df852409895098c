//! §4.5 Stream Runtime: emits protocol-correct framed messages from a
//! handler that produces a sequence of values. Header emission is lazy
//! (first `send`); flushing batches bursts behind a `FlushPeriod`; client-
//! and bidi-streaming are reserved shapes dispatch always answers
//! `unimplemented` for (§4.5, unchanged by any redesign note).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::HeaderMap;
use prost_reflect::DynamicMessage;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::dispatch::protocol::{PayloadEncoding, Protocol};
use crate::error::PolyError;
use crate::framing::{connect, grpc, grpc_web};
use crate::metadata::render_trailer_block;

pub const DEFAULT_FLUSH_PERIOD: Duration = Duration::from_millis(10);

/// One emitted chunk, already framed for the wire. The transport layer
/// just writes these in order.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    Headers(HeaderMap),
    Data(Bytes),
    /// Marks the point the transport must flush regardless of batching.
    Flush,
    Trailers(HeaderMap),
}

struct Inner {
    protocol: Protocol,
    encoding: PayloadEncoding,
    flush_period: Duration,
    headers_sent: AtomicBool,
    last_flush: Mutex<Instant>,
    sink: mpsc::Sender<StreamChunk>,
    cancellation: CancellationToken,
}

/// Handed to a server-streaming handler. `send` is not `Sync`-safe to call
/// concurrently (§4.5: "safe to call from one goroutine only"); callers
/// that need concurrent producers must externally serialize, e.g. behind a
/// single task that owns the stream.
pub struct ServerStream {
    inner: std::sync::Arc<Inner>,
    response_headers: HeaderMap,
}

impl ServerStream {
    pub fn new(
        protocol: Protocol,
        encoding: PayloadEncoding,
        response_headers: HeaderMap,
        cancellation: CancellationToken,
        flush_period: Duration,
    ) -> (Self, mpsc::Receiver<StreamChunk>) {
        let (tx, rx) = mpsc::channel(32);
        let stream = ServerStream {
            inner: std::sync::Arc::new(Inner {
                protocol,
                encoding,
                flush_period,
                headers_sent: AtomicBool::new(false),
                last_flush: Mutex::new(Instant::now() - flush_period),
                sink: tx,
                cancellation,
            }),
            response_headers,
        };
        (stream, rx)
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.cancellation.is_cancelled()
    }

    /// Send one message. Emits headers first if this is the first call.
    pub async fn send(&mut self, msg: &DynamicMessage) -> Result<(), PolyError> {
        if self.inner.cancellation.is_cancelled() {
            return Err(PolyError::canceled());
        }

        if !self.inner.headers_sent.swap(true, Ordering::SeqCst) {
            let headers = std::mem::take(&mut self.response_headers);
            let _ = self.inner.sink.send(StreamChunk::Headers(headers)).await;
        }

        let payload = match self.inner.encoding {
            PayloadEncoding::Json => {
                let mut buf = Vec::new();
                let mut ser = serde_json::Serializer::new(&mut buf);
                use serde::Serialize;
                msg.serialize(&mut ser)
                    .map_err(|e| PolyError::internal(format!("stream json encode failed: {e}")))?;
                buf
            }
            PayloadEncoding::Proto => {
                use prost::Message;
                let mut buf = Vec::new();
                msg.encode(&mut buf)
                    .map_err(|e| PolyError::internal(format!("stream proto encode failed: {e}")))?;
                buf
            }
        };

        let framed = match self.inner.protocol {
            Protocol::Grpc => grpc::encode_frame(&payload, false)
                .map_err(|e| PolyError::internal(e.to_string()))?,
            Protocol::GrpcWeb => grpc_web::encode_data_frame(&payload, false),
            Protocol::Connect => connect::encode_data(&payload),
            Protocol::JsonRpc => payload,
        };

        let _ = self.inner.sink.send(StreamChunk::Data(Bytes::from(framed))).await;

        // §4.5 "smart flushing": only flush if FlushPeriod has elapsed.
        let mut last_flush = self.inner.last_flush.lock().await;
        if last_flush.elapsed() >= self.inner.flush_period {
            let _ = self.inner.sink.send(StreamChunk::Flush).await;
            *last_flush = Instant::now();
        }

        Ok(())
    }

    /// Finalize the stream, unconditionally flushing and emitting the
    /// protocol-correct terminator (§4.5).
    pub async fn finish(self, result: Result<(), PolyError>, trailers: HeaderMap) {
        match self.inner.protocol {
            Protocol::Connect => {
                let body = connect::encode_end_of_stream(&crate::framing::connect::EndStreamPayload {
                    error: result.as_ref().err().map(crate::framing::connect::ConnectErrorBody::from),
                    metadata: Default::default(),
                });
                let _ = self.inner.sink.send(StreamChunk::Data(Bytes::from(body))).await;
                let _ = self.inner.sink.send(StreamChunk::Flush).await;
            }
            Protocol::Grpc => {
                // Trailers ride the HTTP/2 trailer frame; no explicit flush
                // (§4.5: "the HTTP/2 transport flushes trailers when the
                // handler returns").
                let mut trailers = trailers;
                set_grpc_status(&mut trailers, &result);
                let _ = self.inner.sink.send(StreamChunk::Trailers(trailers)).await;
            }
            Protocol::GrpcWeb => {
                let mut trailers = trailers;
                set_grpc_status(&mut trailers, &result);
                let block = render_trailer_block(&trailers);
                let _ = self.inner.sink.send(StreamChunk::Data(Bytes::from(grpc_web::encode_trailer_frame(&block)))).await;
                let _ = self.inner.sink.send(StreamChunk::Flush).await;
            }
            Protocol::JsonRpc => {
                let _ = self.inner.sink.send(StreamChunk::Flush).await;
            }
        }
    }
}

fn set_grpc_status(trailers: &mut HeaderMap, result: &Result<(), PolyError>) {
    let (code, message) = match result {
        Ok(()) => (0u32, String::new()),
        Err(err) => (err.code.to_grpc_code(), err.message.clone()),
    };
    trailers.insert("grpc-status", code.to_string().parse().unwrap());
    trailers.insert("grpc-message", message.parse().unwrap_or_else(|_| "".parse().unwrap()));
}

/// Reserved client-streaming shape. Dispatch returns `unimplemented` for
/// any method registered with this kind (§4.5); the type exists so a
/// `Service` registration can record the intended signature ahead of a
/// future implementation.
pub struct ClientStream {
    _receiver: mpsc::Receiver<DynamicMessage>,
}

/// Reserved bidi-streaming shape; see [`ClientStream`].
pub struct BidiStream {
    _receiver: mpsc::Receiver<DynamicMessage>,
    _responder: ServerStream,
}
