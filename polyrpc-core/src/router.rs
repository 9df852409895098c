//! §4.6 Router: per-path dispatch across every registered service, CORS
//! preflight, and the descriptor-backed auxiliary endpoints (`/openapi.json`,
//! `/proto`, `/proto/<file>`, `/proto.zip`).

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method as HttpMethod, StatusCode};
use prost_reflect::{DescriptorPool, MessageDescriptor};
use prost_types::FileDescriptorSet;

use crate::codec::{Codec, CodecOptions};
use crate::dispatch::{self, protocol::detect, DispatchResponse, RequestMeta};
use crate::error::PolyError;
use crate::retry::{RetryInterceptor, RetryThrottle, ServiceConfig};
use crate::service::{HandlerContextPool, Service};

#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub jsonrpc_path: String,
    pub openapi_enabled: bool,
    pub proto_export_enabled: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        RouterOptions {
            jsonrpc_path: "/jsonrpc".to_string(),
            openapi_enabled: true,
            proto_export_enabled: true,
        }
    }
}

pub struct IncomingRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Dispatches across every registered service on one port. Built once at
/// startup (`register_service` for each), then read-only for the life of
/// the listener, matching §5's "methods map is write-once, read-only at
/// serve time" for the whole router, not just one service.
pub struct Router {
    options: RouterOptions,
    descriptor_pool: DescriptorPool,
    services: HashMap<String, Service>,
    codecs: HashMap<(String, String), (Codec, Codec)>,
    /// JSON-RPC method names are bare, not service-qualified (§6); first
    /// registration wins on a name collision.
    jsonrpc_index: HashMap<String, (String, String)>,
    ctx_pool: HandlerContextPool,
}

impl Router {
    pub fn new(options: RouterOptions) -> Self {
        Router {
            options,
            descriptor_pool: DescriptorPool::new(),
            services: HashMap::new(),
            codecs: HashMap::new(),
            jsonrpc_index: HashMap::new(),
            ctx_pool: HandlerContextPool::default(),
        }
    }

    /// Register a service and the file descriptor set its methods' messages
    /// live in (built by `SchemaBuilder::build_complete_file_descriptor_set`).
    pub fn register_service(&mut self, mut service: Service, descriptor_set: FileDescriptorSet) -> Result<(), PolyError> {
        self.descriptor_pool
            .add_file_descriptor_set(descriptor_set)
            .map_err(|e| PolyError::internal(format!("descriptor registration failed: {e}")))?;

        // §6: a service carrying a parsed retry service config gets a retry
        // interceptor that drives `ServiceConfig`/`RetryThrottle` for every
        // method the config names; methods it doesn't name pass straight
        // through.
        if let Some(value) = service.options.service_config.clone() {
            let config: ServiceConfig = serde_json::from_value(value)
                .map_err(|e| PolyError::invalid_argument(format!("invalid retry service config: {e}")))?;
            config.validate()?;
            let throttle = config.retry_throttling.clone().map(|t| Arc::new(RetryThrottle::new(t)));
            let service_name = service.name.clone();
            service = service.with_interceptor(Arc::new(RetryInterceptor::new(service_name, config, throttle)));
        }

        for method in service.methods() {
            let input = self.resolve(&method.input_type)?;
            let output = self.resolve(&method.output_type)?;
            let codec_in = Codec::new(input, CodecOptions::default());
            let codec_out = Codec::new(output, CodecOptions::default());
            self.codecs.insert((service.name.clone(), method.name.clone()), (codec_in, codec_out));

            if self.jsonrpc_index.contains_key(&method.name) {
                tracing::debug!(method = %method.name, "json-rpc method name already registered by another service, keeping first");
            } else {
                self.jsonrpc_index.insert(method.name.clone(), (service.name.clone(), method.name.clone()));
            }
        }

        self.services.insert(service.name.clone(), service);
        Ok(())
    }

    fn resolve(&self, type_name: &str) -> Result<MessageDescriptor, PolyError> {
        self.descriptor_pool
            .get_message_by_name(type_name)
            .ok_or_else(|| PolyError::internal(format!("unresolved message type {type_name}")))
    }

    pub async fn route(&self, req: IncomingRequest) -> DispatchResponse {
        let origin = req.headers.get("origin").cloned();

        if req.method == HttpMethod::OPTIONS {
            return self.preflight_response(origin.as_ref());
        }

        let mut response = match self.classify(&req.path) {
            RoutedPath::Rpc(service_name, method_name) => self.dispatch_rpc(&service_name, &method_name, req).await,
            RoutedPath::JsonRpc => self.dispatch_jsonrpc(req).await,
            RoutedPath::OpenApi if self.options.openapi_enabled => self.serve_openapi(),
            RoutedPath::ProtoList if self.options.proto_export_enabled => self.serve_proto_list(),
            RoutedPath::ProtoFile(name) if self.options.proto_export_enabled => self.serve_proto_file(&name),
            RoutedPath::ProtoZip if self.options.proto_export_enabled => self.serve_proto_zip(),
            _ => self.unknown_path_response(&req),
        };

        if let Some(origin) = origin {
            apply_cors(&mut response.headers, &origin);
        }
        response
    }

    fn classify(&self, path: &str) -> RoutedPath {
        if path == self.options.jsonrpc_path {
            return RoutedPath::JsonRpc;
        }
        if path == "/openapi.json" {
            return RoutedPath::OpenApi;
        }
        if path == "/proto.zip" {
            return RoutedPath::ProtoZip;
        }
        if path == "/proto" {
            return RoutedPath::ProtoList;
        }
        if let Some(file) = path.strip_prefix("/proto/") {
            return RoutedPath::ProtoFile(file.to_string());
        }
        // Exact match on `/<package>.<Service>/<Method>` (§4.6). There is no
        // longest-prefix fallback here: every registered RPC, including
        // reflection, is itself one exact service/method path.
        if let Some(idx) = path.rfind('/') {
            if idx > 0 {
                let service_name = &path[1..idx];
                let method_name = &path[idx + 1..];
                if self.services.contains_key(service_name) {
                    return RoutedPath::Rpc(service_name.to_string(), method_name.to_string());
                }
            }
        }
        RoutedPath::NotFound
    }

    async fn dispatch_rpc(&self, service_name: &str, method_name: &str, req: IncomingRequest) -> DispatchResponse {
        let Some(service) = self.services.get(service_name) else {
            return self.unknown_path_response(&req);
        };
        let Some((codec_in, codec_out)) = self.codecs.get(&(service_name.to_string(), method_name.to_string())) else {
            return self.unknown_path_response(&req);
        };
        let meta = RequestMeta {
            http_method: req.method,
            headers: req.headers,
            is_jsonrpc_route: false,
        };
        dispatch::dispatch_rpc(service, method_name, &meta, req.body, &self.ctx_pool, codec_in, codec_out).await
    }

    async fn dispatch_jsonrpc(&self, req: IncomingRequest) -> DispatchResponse {
        let jsonrpc_index = &self.jsonrpc_index;
        let services = &self.services;
        dispatch::dispatch_jsonrpc(
            |method_name| {
                let (service_name, _) = jsonrpc_index.get(method_name)?;
                services.get(service_name)
            },
            &req.body,
            &self.ctx_pool,
            |method_name| {
                let (service_name, rpc_method) = jsonrpc_index.get(method_name)?;
                let (codec_in, codec_out) = self.codecs.get(&(service_name.clone(), rpc_method.clone()))?;
                Some((
                    Codec::new(codec_in.descriptor().clone(), CodecOptions::default()),
                    Codec::new(codec_out.descriptor().clone(), CodecOptions::default()),
                ))
            },
        )
        .await
    }

    fn unknown_path_response(&self, req: &IncomingRequest) -> DispatchResponse {
        let detected = detect(&req.headers, req.path == self.options.jsonrpc_path);
        let wants_json = detected.encoding == crate::dispatch::protocol::PayloadEncoding::Json;
        if detected.protocol == crate::dispatch::protocol::Protocol::Connect && !req.headers.contains_key("content-type") {
            // A bare unrecognized path with no protocol signal at all: plain 404.
            return DispatchResponse {
                status: StatusCode::NOT_FOUND,
                headers: HeaderMap::new(),
                trailers: None,
                body: Bytes::new(),
                stream: None,
            };
        }
        let err = PolyError::not_found(format!("no route for {}", req.path));
        DispatchResponse::from_error(&err, detected.protocol, wants_json)
    }

    fn preflight_response(&self, origin: Option<&HeaderValue>) -> DispatchResponse {
        let mut headers = HeaderMap::new();
        if let Some(origin) = origin {
            apply_cors(&mut headers, origin);
        }
        DispatchResponse {
            status: StatusCode::OK,
            headers,
            trailers: None,
            body: Bytes::new(),
            stream: None,
        }
    }

    fn serve_openapi(&self) -> DispatchResponse {
        let doc = crate::openapi::build(&self.descriptor_pool, &self.services);
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        DispatchResponse {
            status: StatusCode::OK,
            headers,
            trailers: None,
            body: Bytes::from(serde_json::to_vec(&doc).unwrap_or_default()),
            stream: None,
        }
    }

    fn proto_files(&self) -> Vec<String> {
        let mut names: Vec<String> = self.descriptor_pool.files().map(|f| f.name().to_string()).collect();
        names.sort();
        names
    }

    fn serve_proto_list(&self) -> DispatchResponse {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        DispatchResponse {
            status: StatusCode::OK,
            headers,
            trailers: None,
            body: Bytes::from(serde_json::to_vec(&self.proto_files()).unwrap_or_default()),
            stream: None,
        }
    }

    fn serve_proto_file(&self, name: &str) -> DispatchResponse {
        let Some(file) = self.descriptor_pool.get_file_by_name(name) else {
            return DispatchResponse {
                status: StatusCode::NOT_FOUND,
                headers: HeaderMap::new(),
                trailers: None,
                body: Bytes::new(),
                stream: None,
            };
        };
        let text = crate::proto_text::format_proto_file(&file);
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/plain; charset=utf-8"));
        DispatchResponse {
            status: StatusCode::OK,
            headers,
            trailers: None,
            body: Bytes::from(text),
            stream: None,
        }
    }

    fn serve_proto_zip(&self) -> DispatchResponse {
        use std::io::Write;
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let options = zip::write::SimpleFileOptions::default();
            for name in self.proto_files() {
                let file = self.descriptor_pool.get_file_by_name(&name).expect("listed file exists");
                let text = crate::proto_text::format_proto_file(&file);
                if writer.start_file(&name, options).is_err() {
                    continue;
                }
                let _ = writer.write_all(text.as_bytes());
            }
            let _ = writer.finish();
        }
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/zip"));
        DispatchResponse {
            status: StatusCode::OK,
            headers,
            trailers: None,
            body: Bytes::from(buf),
            stream: None,
        }
    }
}

enum RoutedPath {
    Rpc(String, String),
    JsonRpc,
    OpenApi,
    ProtoList,
    ProtoFile(String),
    ProtoZip,
    NotFound,
}

fn apply_cors(headers: &mut HeaderMap, origin: &HeaderValue) {
    headers.insert("access-control-allow-origin", origin.clone());
    headers.insert("access-control-allow-credentials", HeaderValue::from_static("true"));
    headers.insert("access-control-allow-methods", HeaderValue::from_static("GET, POST, OPTIONS"));
    headers.insert("access-control-allow-headers", HeaderValue::from_static("*"));
    headers.insert("access-control-expose-headers", HeaderValue::from_static("*"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{Method as RpcMethod, ServiceOptions};
    use prost_types::{field_descriptor_proto::Label, field_descriptor_proto::Type, DescriptorProto, FieldDescriptorProto, FileDescriptorProto, MethodDescriptorProto, ServiceDescriptorProto};

    fn echo_descriptor_set() -> FileDescriptorSet {
        FileDescriptorSet {
            file: vec![FileDescriptorProto {
                name: Some("router_test.proto".to_string()),
                package: Some("rt.v1".to_string()),
                message_type: vec![DescriptorProto {
                    name: Some("Echo".to_string()),
                    field: vec![FieldDescriptorProto {
                        name: Some("text".to_string()),
                        number: Some(1),
                        label: Some(Label::Optional as i32),
                        r#type: Some(Type::String as i32),
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                service: vec![ServiceDescriptorProto {
                    name: Some("Echoer".to_string()),
                    method: vec![MethodDescriptorProto {
                        name: Some("Echo".to_string()),
                        input_type: Some(".rt.v1.Echo".to_string()),
                        output_type: Some(".rt.v1.Echo".to_string()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                syntax: Some("proto3".to_string()),
                ..Default::default()
            }],
        }
    }

    fn build_router() -> Router {
        let handler: crate::service::UnaryHandler = std::sync::Arc::new(|ctx, req| Box::pin(async move { (ctx, Ok(req)) }));
        let mut service = Service::new("rt.v1.Echoer", ServiceOptions::default());
        service.register(RpcMethod::unary("Echo", "rt.v1.Echo", "rt.v1.Echo", handler));

        let mut router = Router::new(RouterOptions::default());
        router.register_service(service, echo_descriptor_set()).unwrap();
        router
    }

    #[tokio::test]
    async fn routes_exact_rpc_path() {
        let router = build_router();
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        let req = IncomingRequest {
            method: HttpMethod::POST,
            path: "/rt.v1.Echoer/Echo".to_string(),
            headers,
            body: Bytes::from_static(br#"{"text":"hi"}"#),
        };
        let resp = router.route(req).await;
        assert_eq!(resp.status, StatusCode::OK);
        assert!(String::from_utf8_lossy(&resp.body).contains("hi"));
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let router = build_router();
        let req = IncomingRequest {
            method: HttpMethod::POST,
            path: "/nope".to_string(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        };
        let resp = router.route(req).await;
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn options_with_origin_short_circuits_with_cors_headers() {
        let router = build_router();
        let mut headers = HeaderMap::new();
        headers.insert("origin", HeaderValue::from_static("https://example.com"));
        let req = IncomingRequest {
            method: HttpMethod::OPTIONS,
            path: "/rt.v1.Echoer/Echo".to_string(),
            headers,
            body: Bytes::new(),
        };
        let resp = router.route(req).await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.headers.get("access-control-allow-origin").unwrap(), "https://example.com");
    }

    #[tokio::test]
    async fn jsonrpc_route_dispatches_by_bare_method_name() {
        let router = build_router();
        let req = IncomingRequest {
            method: HttpMethod::POST,
            path: "/jsonrpc".to_string(),
            headers: HeaderMap::new(),
            body: Bytes::from_static(br#"{"jsonrpc":"2.0","method":"Echo","params":{"text":"hi"},"id":1}"#),
        };
        let resp = router.route(req).await;
        assert!(String::from_utf8_lossy(&resp.body).contains("hi"));
    }

    #[test]
    fn proto_file_round_trips_through_text_renderer() {
        let router = build_router();
        let resp = router.serve_proto_file("router_test.proto");
        assert!(String::from_utf8_lossy(&resp.body).contains("message Echo"));
    }
}
