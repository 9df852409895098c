//! Minimal hyper transport: decodes an incoming HTTP request into
//! [`IncomingRequest`], calls [`Router::route`], and re-encodes the
//! [`DispatchResponse`] back to an HTTP response. `polyrpc_core` stays
//! transport-agnostic (§4.3 is built on bare `hyper`/`http` types, not a
//! bundled server), so each binary that wants to actually listen on a socket
//! owns this translation itself.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use polyrpc_core::dispatch::DispatchResponse;
use polyrpc_core::router::IncomingRequest;
use polyrpc_core::stream::StreamChunk;
use polyrpc_core::Router;
use tokio::net::TcpListener;

pub async fn serve(router: Arc<Router>, addr: std::net::SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(local_addr = %listener.local_addr()?, "listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let router = router.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let router = router.clone();
                async move { Ok::<_, Infallible>(handle(router, req).await) }
            });

            if let Err(err) = auto::Builder::new(TokioExecutor::new()).serve_connection(io, service).await {
                tracing::debug!(%peer, error = %err, "connection closed with error");
            }
        });
    }
}

async fn handle(router: Arc<Router>, req: Request<Incoming>) -> http::Response<BoxBody<Bytes, Infallible>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let headers = req.headers().clone();
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => Bytes::new(),
    };

    let response = router.route(IncomingRequest { method, path, headers, body }).await;
    to_http_response(response).await
}

async fn to_http_response(resp: DispatchResponse) -> http::Response<BoxBody<Bytes, Infallible>> {
    if resp.stream.is_some() {
        return streaming_response(resp).await;
    }

    let mut response = http::Response::new(match resp.trailers {
        Some(trailers) => {
            let body = resp.body;
            BoxBody::new(StreamBody::new(async_stream::stream! {
                yield Ok::<_, Infallible>(Frame::data(body));
                yield Ok::<_, Infallible>(Frame::trailers(trailers));
            }))
        }
        None => BoxBody::new(Full::new(resp.body)),
    });
    *response.status_mut() = resp.status;
    *response.headers_mut() = resp.headers;
    response
}

/// Server-streaming responses carry their headers lazily: the transport
/// must drain the first channel item (always `StreamChunk::Headers`) before
/// the response head can be finalized.
async fn streaming_response(resp: DispatchResponse) -> http::Response<BoxBody<Bytes, Infallible>> {
    let mut rx = resp.stream.expect("checked by caller");
    let mut headers = resp.headers;

    if let Some(StreamChunk::Headers(stream_headers)) = rx.recv().await {
        headers.extend(stream_headers);
    }

    let body = async_stream::stream! {
        while let Some(chunk) = rx.recv().await {
            match chunk {
                StreamChunk::Data(bytes) => yield Ok::<_, Infallible>(Frame::data(bytes)),
                StreamChunk::Trailers(trailers) => yield Ok::<_, Infallible>(Frame::trailers(trailers)),
                StreamChunk::Flush | StreamChunk::Headers(_) => {}
            }
        }
    };

    let mut response = http::Response::new(BoxBody::new(StreamBody::new(body)));
    *response.status_mut() = resp.status;
    *response.headers_mut() = headers;
    response
}
