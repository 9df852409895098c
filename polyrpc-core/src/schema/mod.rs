//! §4.1 Schema Builder: derives a Protobuf `FileDescriptorSet` from native
//! struct types via a reflection facility.
//!
//! Rust has no runtime type introspection, so the "reflection facility" the
//! design notes (§9) call for is modeled as a trait, [`Reflect`], that a
//! native type implements to hand the builder a static field list. This is
//! the same shape `serde`'s `#[derive(Serialize)]` and `prost`'s
//! `#[derive(Message)]` already generate for their own purposes — we simply
//! define our own minimal version of it for descriptor derivation, since
//! this crate does not ship a derive macro (out of scope per the design
//! notes: "implementations without generics should emit per-method
//! adaptors"; the equivalent call for reflection is to hand-write or
//! generate `Reflect` impls, not to require one here).

mod builder;
pub mod wkt;

pub use builder::{MethodSpec, SchemaBuilder};
pub use wkt::WellKnown;

use prost_reflect::DynamicMessage;

use crate::error::PolyError;

/// Reject a message with more than one field set inside the same `oneof`
/// (§4.1/§4.3 Validation). `prost_reflect`'s own decode never enforces this:
/// setting one field of a oneof just clears whichever sibling held the
/// discriminant before, so a message built field-by-field outside of decode
/// can still end up with two set at once.
pub fn validate_oneofs(msg: &DynamicMessage) -> Result<(), PolyError> {
    for oneof in msg.descriptor().oneofs() {
        let mut set_fields = oneof.fields().filter(|field| msg.has_field(field));
        if set_fields.next().is_some() && set_fields.next().is_some() {
            return Err(PolyError::invalid_argument(format!(
                "more than one field set in oneof '{}'",
                oneof.name()
            )));
        }
    }
    Ok(())
}

/// Scalar Protobuf kinds a field can hold, mirroring §4.1's scalar mapping
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    Bool,
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    Bytes,
}

/// What kind of value a field holds.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Scalar(Scalar),
    Message(fn() -> TypeDescriptor),
    WellKnown(WellKnown),
}

/// One field of a reflected struct.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// The Rust field's identifier, used to derive a snake_case proto name
    /// when no `proto_name` override is given.
    pub rust_name: &'static str,
    /// Proto field name, taken from a `json` tag's first segment if present
    /// (§4.1). `None` means "derive from `rust_name`".
    pub proto_name: Option<&'static str>,
    /// Field number, assigned in declaration order starting at 1 (§4.1;
    /// §9 flags this as brittle under refactoring — callers may set an
    /// explicit number via this field instead of relying on position).
    pub number: u32,
    pub kind: FieldKind,
    /// Slice field → repeated.
    pub repeated: bool,
    /// Pointer field → explicit "optional" (presence-tracked).
    pub optional: bool,
    /// Map field → Protobuf map entry. The key is always string or an
    /// integer scalar per §4.1; the value kind is carried in `kind`.
    pub map_key: Option<Scalar>,
    /// Fields sharing the same group name are emitted under one `oneof`
    /// (§4.1). `None` means the field is not part of a oneof.
    pub oneof_group: Option<&'static str>,
    /// `true` for a field whose json tag is `"-"`: skipped entirely.
    pub skip: bool,
}

impl FieldSpec {
    /// A plain required scalar field — the common case.
    pub const fn scalar(rust_name: &'static str, number: u32, scalar: Scalar) -> Self {
        FieldSpec {
            rust_name,
            proto_name: None,
            number,
            kind: FieldKind::Scalar(scalar),
            repeated: false,
            optional: false,
            map_key: None,
            oneof_group: None,
            skip: false,
        }
    }

    pub const fn message(rust_name: &'static str, number: u32, td: fn() -> TypeDescriptor) -> Self {
        FieldSpec {
            rust_name,
            proto_name: None,
            number,
            kind: FieldKind::Message(td),
            repeated: false,
            optional: false,
            map_key: None,
            oneof_group: None,
            skip: false,
        }
    }

    pub const fn well_known(rust_name: &'static str, number: u32, wkt: WellKnown) -> Self {
        FieldSpec {
            rust_name,
            proto_name: None,
            number,
            kind: FieldKind::WellKnown(wkt),
            repeated: false,
            optional: false,
            map_key: None,
            oneof_group: None,
            skip: false,
        }
    }

    pub const fn with_proto_name(mut self, name: &'static str) -> Self {
        self.proto_name = Some(name);
        self
    }

    pub const fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub const fn map(mut self, key: Scalar) -> Self {
        self.map_key = Some(key);
        self
    }

    pub const fn oneof(mut self, group: &'static str) -> Self {
        self.oneof_group = Some(group);
        self
    }

    /// Derive the wire proto field name: the `json`-tag-equivalent override
    /// if present, else snake_case of the Rust field name (§4.1).
    pub fn proto_field_name(&self) -> String {
        match self.proto_name {
            Some(name) => name.to_string(),
            None => to_snake_case(self.rust_name),
        }
    }
}

/// The static description a [`Reflect`] type hands the builder: its bare
/// message name, its fields in declaration order, and whether it is itself
/// a well-known type (in which case the builder imports rather than
/// redefines it).
#[derive(Debug, Clone, Copy)]
pub struct TypeDescriptor {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
    pub wkt: Option<WellKnown>,
}

/// Implemented by native struct types that the schema builder can turn into
/// a Protobuf message descriptor. See the module docs for why this exists
/// instead of compiler-provided reflection.
pub trait Reflect: 'static {
    fn type_descriptor() -> TypeDescriptor;
}

/// Convert an identifier like `userId` or `UserId` to `user_id`, matching
/// §4.1's fallback naming rule.
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i != 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
