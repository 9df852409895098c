mod service;

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use clap::Parser;
use http::HeaderMap;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto;
use polyrpc_core::dispatch::DispatchResponse;
use polyrpc_core::router::IncomingRequest;
use polyrpc_core::stream::StreamChunk;
use polyrpc_core::{Router, RouterOptions};
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "echoserver", about = "Demo polyrpc server: Connect, gRPC, gRPC-Web and JSON-RPC on one port")]
struct Cli {
    /// Port to listen on (0 for ephemeral)
    #[arg(short = 'p', long = "port", default_value_t = 0)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut router = Router::new(RouterOptions::default());
    let (echoer, echoer_descriptors) = service::build_echoer()?;
    router.register_service(echoer, echoer_descriptors)?;
    let (greeter, greeter_descriptors) = service::build_greeter()?;
    router.register_service(greeter, greeter_descriptors)?;
    let router = Arc::new(router);

    let addr: std::net::SocketAddr = format!("127.0.0.1:{}", cli.port).parse()?;
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

            if let Err(err) = auto::Builder::new(hyper_util::rt::TokioExecutor::new())
                .serve_connection(io, service)
                .await
            {
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

    let response = router
        .route(IncomingRequest { method, path, headers, body })
        .await;

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

/// Server-streaming responses carry their headers lazily: the first item on
/// the channel is always a `StreamChunk::Headers` emitted on the handler's
/// first `send()`, so the response head isn't finalized until we drain it.
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
                // `Flush` is a hint for a buffered transport; hyper flushes
                // each frame as it's written, so there's nothing to do here.
                StreamChunk::Flush | StreamChunk::Headers(_) => {}
            }
        }
    };

    let mut response = http::Response::new(BoxBody::new(StreamBody::new(body)));
    *response.status_mut() = resp.status;
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_streaming_response_carries_status_and_body() {
        let resp = DispatchResponse {
            status: http::StatusCode::OK,
            headers: HeaderMap::new(),
            trailers: None,
            body: Bytes::from_static(b"hi"),
            stream: None,
        };
        let http_resp = to_http_response(resp).await;
        assert_eq!(http_resp.status(), http::StatusCode::OK);
    }
}
