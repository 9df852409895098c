use std::sync::{Arc, RwLock};

use prost_reflect::{DynamicMessage, MessageDescriptor};

use super::pgo::{FieldProfile, Sampler};

/// The "compiled message type" of spec.md §3: a read-only descriptor plus
/// whatever the PGO manager has learned about it so far. Read-only means
/// sampling and recompilation never mutate the descriptor itself, only the
/// side-table profile consulted by the encode path.
pub struct CompiledType {
    descriptor: MessageDescriptor,
    sampler: Sampler,
    profile: RwLock<Option<Arc<FieldProfile>>>,
}

const DEFAULT_SAMPLE_RATE: f64 = 0.1;

impl CompiledType {
    pub fn new(descriptor: MessageDescriptor) -> Self {
        CompiledType {
            descriptor,
            sampler: Sampler::new(DEFAULT_SAMPLE_RATE),
            profile: RwLock::new(None),
        }
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.descriptor
    }

    pub fn record_sample(&self, msg: &DynamicMessage) {
        self.sampler.maybe_record(msg);
    }

    pub fn active_profile(&self) -> Option<Arc<FieldProfile>> {
        self.profile.read().unwrap().clone()
    }

    /// `RecompileAll()`: fold every sample seen so far into a fresh profile
    /// and swap it in. Subsequent encode/decode sees it transparently.
    pub fn recompile(&self) {
        let profile = self.sampler.recompile();
        *self.profile.write().unwrap() = Some(Arc::new(profile));
        tracing::debug!(message = %self.descriptor.full_name(), "recompiled PGO profile");
    }
}
