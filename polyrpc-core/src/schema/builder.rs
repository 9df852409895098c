//! Assembles `FileDescriptorProto`/`DescriptorProto` graphs from
//! [`TypeDescriptor`]s, the way `grpcurl-core`'s `descriptor.rs` assembles a
//! `DescriptorPool` from a `FileDescriptorSet` — except here the set is
//! built from native Rust structs instead of read off the wire.
//!
//! Raw `FieldDescriptorProto`/`DescriptorProto` assembly (field numbers,
//! oneofs, map-entry synthesis) follows the shape used in
//! `examples/other_examples/...tonic-rest-build-src-descriptor.rs.rs`.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
    MessageOptions, MethodDescriptorProto, OneofDescriptorProto, ServiceDescriptorProto,
};

use super::{FieldKind, FieldSpec, Scalar, TypeDescriptor};
use crate::error::PolyError;

/// One RPC method to include in a built `FileDescriptorSet`'s service
/// descriptor (§4.1 "a service descriptor whose methods carry
/// `client_streaming`/`server_streaming` flags").
pub struct MethodSpec {
    pub name: &'static str,
    pub input: fn() -> TypeDescriptor,
    pub output: fn() -> TypeDescriptor,
    pub client_streaming: bool,
    pub server_streaming: bool,
}

/// Builds Protobuf descriptors for one `(package, syntax, edition)` key.
/// Builders are meant to be shared process-wide for identical keys (§4.1);
/// callers typically hold one behind an `Arc` in a global registry keyed the
/// same way.
pub struct SchemaBuilder {
    package: String,
    edition: Option<String>,
    messages: RwLock<HashMap<String, DescriptorProto>>,
    in_progress: RwLock<HashSet<String>>,
    dependencies: RwLock<HashSet<String>>,
    imported_files: RwLock<ImportedFiles>,
}

#[derive(Default)]
struct ImportedFiles {
    seen: HashSet<String>,
    files: Vec<FileDescriptorProto>,
}

struct FieldBuildCtx {
    nested: Vec<DescriptorProto>,
    oneof_names: Vec<String>,
    oneof_index: HashMap<&'static str, i32>,
}

impl SchemaBuilder {
    pub fn new(package: impl Into<String>) -> Self {
        SchemaBuilder {
            package: package.into(),
            edition: None,
            messages: RwLock::new(HashMap::new()),
            in_progress: RwLock::new(HashSet::new()),
            dependencies: RwLock::new(HashSet::new()),
            imported_files: RwLock::new(ImportedFiles::default()),
        }
    }

    /// Builds for one `(package, syntax, edition)` key, reading `edition`
    /// off a service's registration options (§4.1) instead of leaving it an
    /// unread field on [`crate::service::ServiceOptions`].
    pub fn for_service(package: impl Into<String>, options: &crate::service::ServiceOptions) -> Self {
        SchemaBuilder {
            package: package.into(),
            edition: options.edition.clone(),
            messages: RwLock::new(HashMap::new()),
            in_progress: RwLock::new(HashSet::new()),
            dependencies: RwLock::new(HashSet::new()),
            imported_files: RwLock::new(ImportedFiles::default()),
        }
    }

    /// Short-circuits descriptor derivation for a type that is already a
    /// generated Protobuf message: instead of walking a [`super::Reflect`]
    /// impl, import the message's own file and its full transitive
    /// dependency closure directly, the way `grpcurl-core`'s
    /// `collect_transitive_deps` assembles a `FileDescriptorSet` from a
    /// resolved symbol's `parent_file()` (deps before self, so the set is
    /// already in a valid load order).
    pub fn import_generated_message<M: prost_reflect::ReflectMessage>(&self, sample: &M) -> String {
        let descriptor = sample.descriptor();
        let full_name = descriptor.full_name().to_string();
        let file = descriptor.parent_file();
        self.collect_transitive_file(&file);
        self.dependencies.write().unwrap().insert(file.name().to_string());
        full_name
    }

    fn collect_transitive_file(&self, fd: &prost_reflect::FileDescriptor) {
        let name = fd.name().to_string();
        if self.imported_files.read().unwrap().seen.contains(&name) {
            return;
        }
        for dep in fd.dependencies() {
            self.collect_transitive_file(&dep);
        }
        let mut imported = self.imported_files.write().unwrap();
        if imported.seen.insert(name) {
            imported.files.push(fd.file_descriptor_proto().clone());
        }
    }

    /// Derive a `MessageDescriptor` for `td`, caching by full name. Returns
    /// the fully-qualified Protobuf type name (e.g. `pkg.User`), or the
    /// canonical WKT name if `td` is itself a well-known type.
    pub fn build_message(&self, td: TypeDescriptor) -> Result<String, PolyError> {
        if let Some(wkt) = td.wkt {
            self.dependencies.write().unwrap().insert(wkt.proto_file().to_string());
            return Ok(wkt.full_name().to_string());
        }

        let full_name = format!("{}.{}", self.package, td.name);

        if self.messages.read().unwrap().contains_key(&full_name) {
            return Ok(full_name);
        }

        {
            let mut in_progress = self.in_progress.write().unwrap();
            if in_progress.contains(&full_name) {
                // Cycle: the placeholder registered below for this name will
                // be populated by the outer call that is already building it.
                return Ok(full_name);
            }
            in_progress.insert(full_name.clone());
        }

        // Allocate the named placeholder before recursing into fields, per
        // §9: a descendant that refers back to this type resolves to this
        // placeholder entry instead of recursing forever.
        self.messages.write().unwrap().entry(full_name.clone()).or_insert_with(|| {
            DescriptorProto {
                name: Some(td.name.to_string()),
                ..Default::default()
            }
        });

        let mut ctx = FieldBuildCtx {
            nested: Vec::new(),
            oneof_names: Vec::new(),
            oneof_index: HashMap::new(),
        };

        let mut fields = Vec::with_capacity(td.fields.len());
        for spec in td.fields {
            if spec.skip {
                continue;
            }
            fields.push(self.build_field(spec, &mut ctx)?);
        }

        let descriptor = DescriptorProto {
            name: Some(td.name.to_string()),
            field: fields,
            nested_type: ctx.nested,
            oneof_decl: ctx
                .oneof_names
                .into_iter()
                .map(|name| OneofDescriptorProto {
                    name: Some(name),
                    options: None,
                })
                .collect(),
            ..Default::default()
        };

        self.messages.write().unwrap().insert(full_name.clone(), descriptor);
        self.in_progress.write().unwrap().remove(&full_name);
        Ok(full_name)
    }

    fn build_field(&self, spec: &FieldSpec, ctx: &mut FieldBuildCtx) -> Result<FieldDescriptorProto, PolyError> {
        if let Some(key) = spec.map_key {
            return self.build_map_field(spec, key, ctx);
        }

        let mut field = FieldDescriptorProto {
            name: Some(spec.proto_field_name()),
            number: Some(spec.number as i32),
            label: Some(if spec.repeated {
                Label::Repeated as i32
            } else {
                Label::Optional as i32
            }),
            proto3_optional: Some(spec.optional && !spec.repeated),
            ..Default::default()
        };

        self.fill_field_type(&mut field, spec.kind)?;

        if let Some(group) = spec.oneof_group {
            field.oneof_index = Some(self.oneof_index_for(group, ctx));
            // A field inside a oneof is never itself repeated or separately
            // optional; presence is tracked by the oneof discriminant.
            field.label = Some(Label::Optional as i32);
        }

        Ok(field)
    }

    fn build_map_field(&self, spec: &FieldSpec, key: Scalar, ctx: &mut FieldBuildCtx) -> Result<FieldDescriptorProto, PolyError> {
        if !matches!(
            key,
            Scalar::String | Scalar::Int32 | Scalar::Int64 | Scalar::UInt32 | Scalar::UInt64
        ) {
            return Err(PolyError::invalid_argument(format!(
                "unsupported map key kind on field {}",
                spec.rust_name
            )));
        }

        let entry_name = format!("{}Entry", capitalize(&spec.proto_field_name()));

        let key_field = FieldDescriptorProto {
            name: Some("key".to_string()),
            number: Some(1),
            label: Some(Label::Optional as i32),
            r#type: Some(scalar_to_proto_type(key) as i32),
            ..Default::default()
        };
        let mut value_field = FieldDescriptorProto {
            name: Some("value".to_string()),
            number: Some(2),
            label: Some(Label::Optional as i32),
            ..Default::default()
        };
        self.fill_field_type(&mut value_field, spec.kind)?;

        ctx.nested.push(DescriptorProto {
            name: Some(entry_name.clone()),
            field: vec![key_field, value_field],
            options: Some(MessageOptions {
                map_entry: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        });

        Ok(FieldDescriptorProto {
            name: Some(spec.proto_field_name()),
            number: Some(spec.number as i32),
            label: Some(Label::Repeated as i32),
            r#type: Some(Type::Message as i32),
            type_name: Some(entry_name),
            ..Default::default()
        })
    }

    fn fill_field_type(&self, field: &mut FieldDescriptorProto, kind: FieldKind) -> Result<(), PolyError> {
        match kind {
            FieldKind::Scalar(scalar) => {
                field.r#type = Some(scalar_to_proto_type(scalar) as i32);
            }
            FieldKind::Message(td_fn) => {
                let full_name = self.build_message(td_fn())?;
                field.r#type = Some(Type::Message as i32);
                field.type_name = Some(format!(".{}", full_name));
            }
            FieldKind::WellKnown(wkt) => {
                self.dependencies.write().unwrap().insert(wkt.proto_file().to_string());
                field.r#type = Some(Type::Message as i32);
                field.type_name = Some(format!(".{}", wkt.full_name()));
            }
        }
        Ok(())
    }

    fn oneof_index_for(&self, group: &'static str, ctx: &mut FieldBuildCtx) -> i32 {
        if let Some(idx) = ctx.oneof_index.get(group) {
            return *idx;
        }
        let idx = ctx.oneof_names.len() as i32;
        ctx.oneof_names.push(group.to_string());
        ctx.oneof_index.insert(group, idx);
        idx
    }

    /// Assemble one file containing every message built so far (sorted by
    /// name for determinism, §4.1) plus a service descriptor derived from
    /// `methods`, wrapped in a `FileDescriptorSet` alongside the WKT files
    /// it depends on.
    pub fn build_complete_file_descriptor_set(
        &self,
        service_name: &str,
        file_path: &str,
        methods: &[MethodSpec],
    ) -> Result<FileDescriptorSet, PolyError> {
        let mut rpcs = Vec::with_capacity(methods.len());
        for m in methods {
            let input = self.build_message((m.input)())?;
            let output = self.build_message((m.output)())?;
            rpcs.push(MethodDescriptorProto {
                name: Some(m.name.to_string()),
                input_type: Some(format!(".{input}")),
                output_type: Some(format!(".{output}")),
                client_streaming: Some(m.client_streaming),
                server_streaming: Some(m.server_streaming),
                options: None,
            });
        }

        let mut messages: Vec<DescriptorProto> = self
            .messages
            .read()
            .unwrap()
            .values()
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.name.cmp(&b.name));

        let mut dependencies: Vec<String> = self.dependencies.read().unwrap().iter().cloned().collect();
        dependencies.sort();

        // DescriptorPool resolves `dependency` entries against files actually
        // present in the set; ship the real WKT descriptors alongside so
        // importing one never fails to resolve.
        let wkt_files: Vec<FileDescriptorProto> = dependencies
            .iter()
            .filter_map(|dep| super::wkt::well_known_file_descriptor(dep))
            .collect();
        let imported_files = self.imported_files.read().unwrap().files.clone();

        let file = FileDescriptorProto {
            name: Some(file_path.to_string()),
            package: Some(self.package.clone()),
            dependency: dependencies,
            message_type: messages,
            service: vec![ServiceDescriptorProto {
                name: Some(service_name.to_string()),
                method: rpcs,
                options: None,
            }],
            // `(package, syntax, edition)` (§4.1): a builder constructed via
            // `for_service` with an edition set emits `"editions"`; every
            // other builder keeps emitting plain proto3.
            syntax: Some(if self.edition.is_some() { "editions".to_string() } else { "proto3".to_string() }),
            ..Default::default()
        };

        let mut all_files = wkt_files;
        all_files.extend(imported_files);
        all_files.push(file);
        Ok(FileDescriptorSet { file: all_files })
    }
}

fn scalar_to_proto_type(scalar: Scalar) -> Type {
    match scalar {
        Scalar::Bool => Type::Bool,
        Scalar::Int32 => Type::Int32,
        Scalar::Int64 => Type::Int64,
        Scalar::UInt32 => Type::Uint32,
        Scalar::UInt64 => Type::Uint64,
        Scalar::Float32 => Type::Float,
        Scalar::Float64 => Type::Double,
        Scalar::String => Type::String,
        Scalar::Bytes => Type::Bytes,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
