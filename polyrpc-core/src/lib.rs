//! Core multi-protocol RPC pipeline: Connect, gRPC, gRPC-Web and JSON-RPC
//! dispatch over one port from plain native-struct handlers. No `.proto`
//! files or build-time codegen; message shapes are derived from Rust types
//! at registration time via [`schema::Reflect`].
//!
//! Dependency order (leaves first): framing → codec → schema → dispatch →
//! stream → router.

pub mod codec;
pub mod dispatch;
pub mod error;
pub mod framing;
pub mod metadata;
pub mod openapi;
pub mod pool;
pub mod proto_text;
pub mod retry;
pub mod router;
pub mod schema;
pub mod service;
pub mod stream;

pub use error::{PolyCode, PolyError, Result};
pub use router::{IncomingRequest, Router, RouterOptions};
pub use schema::{MethodSpec, Reflect, SchemaBuilder};
pub use service::{HandlerContext, HandlerContextPool, Method, Service, ServiceOptions};
