//! Profile-guided optimization (§4.2): sample a fraction of decodes to
//! learn which fields are actually present and in what order, then let
//! `recompile_all` swap in a profile that downstream encode/decode can use
//! as a sizing/ordering hint. Decode results are always identical with or
//! without a profile; PGO is strictly a speed optimization, never a
//! semantic one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use prost::Message;
use prost_reflect::DynamicMessage;

/// The product of a `recompile_all()` run: field numbers ordered by
/// observed frequency (most common first) plus an average encoded-length
/// hint used to pre-size output buffers.
#[derive(Debug, Clone, Default)]
pub struct FieldProfile {
    pub field_order: Vec<u32>,
    pub avg_len_hint: usize,
}

/// Samples a configurable fraction of decoded messages for one compiled
/// type. Thread-safe; the sampling gate and the count table are
/// independent so a burst of concurrent decodes never blocks on a single
/// lock for the common "not sampled" case.
pub struct Sampler {
    rate: f64,
    counts: RwLock<HashMap<u32, u64>>,
    total_len: AtomicU64,
    total_samples: AtomicU64,
}

impl Sampler {
    pub fn new(rate: f64) -> Self {
        Sampler {
            rate: rate.clamp(0.0, 1.0),
            counts: RwLock::new(HashMap::new()),
            total_len: AtomicU64::new(0),
            total_samples: AtomicU64::new(0),
        }
    }

    /// Called after every successful decode. Records the message's present
    /// fields for roughly `rate` of calls.
    pub fn maybe_record(&self, msg: &DynamicMessage) {
        if self.rate <= 0.0 {
            return;
        }
        if self.rate < 1.0 && rand::random::<f64>() >= self.rate {
            return;
        }
        let mut counts = self.counts.write().unwrap();
        for field in msg.descriptor().fields() {
            if msg.has_field(&field) {
                *counts.entry(field.number()).or_insert(0) += 1;
            }
        }
        drop(counts);
        self.total_len.fetch_add(msg.encoded_len() as u64, Ordering::Relaxed);
        self.total_samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Produce a profile from everything sampled so far. Does not reset the
    /// counters; a later `recompile` sees a cumulative picture.
    pub fn recompile(&self) -> FieldProfile {
        let counts = self.counts.read().unwrap();
        let mut field_order: Vec<(u32, u64)> = counts.iter().map(|(&n, &c)| (n, c)).collect();
        field_order.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let samples = self.total_samples.load(Ordering::Relaxed).max(1);
        let avg_len_hint = (self.total_len.load(Ordering::Relaxed) / samples) as usize;

        FieldProfile {
            field_order: field_order.into_iter().map(|(n, _)| n).collect(),
            avg_len_hint: avg_len_hint.max(16),
        }
    }
}

/// Encode a message, using the profile's length hint to pre-size the
/// output buffer when available. The wire bytes produced are identical to
/// an unprofiled encode; only the allocation strategy differs.
pub fn encode_with_profile(msg: &DynamicMessage, profile: Option<&FieldProfile>) -> Vec<u8> {
    let hint = profile.map(|p| p.avg_len_hint).unwrap_or(128);
    let mut buf = Vec::with_capacity(hint);
    msg.encode(&mut buf).expect("encoding into a Vec<u8> is infallible");
    buf
}
