//! §3 data model: `Service`, `Method`, and the per-request `HandlerContext`.
//! A `Service` is built at startup and never mutated once serving begins;
//! `HandlerContext`s are pooled per spec.md §5 and cleared before reuse.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use http::{Extensions, HeaderMap};
use prost_reflect::DynamicMessage;
use tokio_util::sync::CancellationToken;

use crate::error::PolyError;
use crate::pool::Pool;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// How a method's handler produces its output (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Unary,
    ServerStream,
    ClientStream,
    BidiStream,
}

/// Per-request working state threaded through the interceptor chain and
/// into the handler. Taken from [`HandlerContextPool`] on entry to dispatch
/// and returned on exit; `reset` clears everything so a reused context
/// never leaks state across requests.
pub struct HandlerContext {
    pub method_name: String,
    pub deadline: Option<Instant>,
    pub cancellation: CancellationToken,
    pub request_headers: HeaderMap,
    pub response_headers: HeaderMap,
    pub response_trailers: HeaderMap,
    pub values: Extensions,
}

impl HandlerContext {
    fn new() -> Self {
        HandlerContext {
            method_name: String::new(),
            deadline: None,
            cancellation: CancellationToken::new(),
            request_headers: HeaderMap::new(),
            response_headers: HeaderMap::new(),
            response_trailers: HeaderMap::new(),
            values: Extensions::new(),
        }
    }

    fn reset(&mut self) {
        self.method_name.clear();
        self.deadline = None;
        self.cancellation = CancellationToken::new();
        self.request_headers.clear();
        self.response_headers.clear();
        self.response_trailers.clear();
        self.values = Extensions::new();
    }

    pub fn is_canceled(&self) -> bool {
        self.cancellation.is_cancelled()
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Pooled [`HandlerContext`] allocator (§5: "handler contexts" are one of
/// the pooled object kinds, acquired on entry to a hot path and released on
/// exit).
pub struct HandlerContextPool {
    pool: Pool<HandlerContext>,
}

impl HandlerContextPool {
    pub fn new(capacity: usize) -> Self {
        HandlerContextPool {
            pool: Pool::new(capacity),
        }
    }

    pub fn acquire(&self) -> HandlerContext {
        match self.pool.take() {
            Some(mut ctx) => {
                ctx.reset();
                ctx
            }
            None => HandlerContext::new(),
        }
    }

    pub fn release(&self, ctx: HandlerContext) {
        self.pool.put(ctx);
    }
}

impl Default for HandlerContextPool {
    fn default() -> Self {
        Self::new(128)
    }
}

/// A unary handler invocation, type-erased to `DynamicMessage` in and out.
/// Native-struct handlers are adapted to this shape at registration time by
/// the caller (conversion via `schema::Reflect` + the codec's struct
/// bridge), mirroring how `grpcurl-core`'s `DynamicCodec` lets a generic
/// dispatch path stay oblivious to the concrete message type.
pub type UnaryHandler =
    Arc<dyn Fn(HandlerContext, DynamicMessage) -> BoxFuture<'static, (HandlerContext, Result<DynamicMessage, PolyError>)> + Send + Sync>;

/// A server-streaming handler invocation. The `ServerStream` sink lives in
/// `stream.rs`; this module only needs its type name.
pub type ServerStreamHandler = Arc<
    dyn Fn(HandlerContext, DynamicMessage, crate::stream::ServerStream) -> BoxFuture<'static, (HandlerContext, Result<(), PolyError>)>
        + Send
        + Sync,
>;

#[derive(Clone)]
pub enum Handler {
    Unary(UnaryHandler),
    ServerStream(ServerStreamHandler),
    /// Reserved shapes (§4.5): the factory exists so registration can record
    /// them, but dispatch always returns `unimplemented` for these.
    ClientStream,
    BidiStream,
}

/// Method-level interceptor chain entries run before service-level ones,
/// applied in reverse so the first-registered interceptor ends up
/// outermost (§4.3). `next` is the already-composed continuation: calling
/// it invokes the rest of the chain (or the handler itself, at the
/// innermost position).
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn call(&self, ctx: HandlerContext, req: DynamicMessage, next: NextUnary) -> (HandlerContext, Result<DynamicMessage, PolyError>);
}

pub type NextUnary =
    Arc<dyn Fn(HandlerContext, DynamicMessage) -> BoxFuture<'static, (HandlerContext, Result<DynamicMessage, PolyError>)> + Send + Sync>;

/// Compose a handler wrapped by `interceptors`, applied so the first
/// element of the slice runs outermost (callers pass method interceptors
/// then service interceptors, in that order, matching §4.3's "method-level
/// first, then service-level, applied in reverse").
pub fn compose_chain(interceptors: &[Arc<dyn Interceptor>], base: UnaryHandler) -> UnaryHandler {
    let mut current = base;
    for interceptor in interceptors.iter().rev() {
        let interceptor = interceptor.clone();
        let inner = current.clone();
        current = Arc::new(move |ctx: HandlerContext, req: DynamicMessage| {
            let interceptor = interceptor.clone();
            let inner = inner.clone();
            Box::pin(async move { interceptor.call(ctx, req, inner).await })
        });
    }
    current
}

/// One RPC method (§3).
#[derive(Clone)]
pub struct Method {
    pub name: String,
    pub stream_kind: StreamKind,
    pub input_type: String,
    pub output_type: String,
    pub handler: Handler,
    pub interceptors: Vec<Arc<dyn Interceptor>>,
    pub validate: Option<Arc<dyn Fn(&DynamicMessage) -> Result<(), PolyError> + Send + Sync>>,
    pub description: Option<String>,
}

impl Method {
    pub fn unary(name: impl Into<String>, input_type: impl Into<String>, output_type: impl Into<String>, handler: UnaryHandler) -> Self {
        Method {
            name: name.into(),
            stream_kind: StreamKind::Unary,
            input_type: input_type.into(),
            output_type: output_type.into(),
            handler: Handler::Unary(handler),
            interceptors: Vec::new(),
            validate: None,
            description: None,
        }
    }

    pub fn server_stream(
        name: impl Into<String>,
        input_type: impl Into<String>,
        output_type: impl Into<String>,
        handler: ServerStreamHandler,
    ) -> Self {
        Method {
            name: name.into(),
            stream_kind: StreamKind::ServerStream,
            input_type: input_type.into(),
            output_type: output_type.into(),
            handler: Handler::ServerStream(handler),
            interceptors: Vec::new(),
            validate: None,
            description: None,
        }
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn with_validate(mut self, validate: Arc<dyn Fn(&DynamicMessage) -> Result<(), PolyError> + Send + Sync>) -> Self {
        self.validate = Some(validate);
        self
    }
}

/// Per-service registration options (§3).
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
    pub validation: bool,
    pub reflection: bool,
    pub edition: Option<String>,
    pub description: Option<String>,
    pub service_config: Option<serde_json::Value>,
}

/// A named group of methods. Created at startup, mutated only during
/// registration, never after serving begins (§3).
pub struct Service {
    pub name: String,
    pub options: ServiceOptions,
    pub interceptors: Vec<Arc<dyn Interceptor>>,
    methods: HashMap<String, Method>,
}

impl Service {
    pub fn new(name: impl Into<String>, options: ServiceOptions) -> Self {
        Service {
            name: name.into(),
            options,
            interceptors: Vec::new(),
            methods: HashMap::new(),
        }
    }

    pub fn register(&mut self, method: Method) {
        self.methods.insert(method.name.clone(), method);
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.methods.values()
    }
}
