//! Versioned, namespaced, concurrently accessed store — generalizes the
//! teacher's single-namespace `ArcSwap`-backed `MemoryStore` (spec.md §3,
//! §4.1, §5).

use crate::models::{FeatureFlag, Segment};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A versioned store entry. Tombstones (`deleted == true`) still occupy
/// the slot and block older-versioned upserts, per spec.md §3/§4.1.
#[derive(Debug, Clone)]
pub struct Item<T> {
    pub version: u64,
    pub deleted: bool,
    pub payload: Option<T>,
}

impl<T> Item<T> {
    pub fn live(version: u64, payload: T) -> Self {
        Self {
            version,
            deleted: false,
            payload: Some(payload),
        }
    }

    pub fn tombstone(version: u64) -> Self {
        Self {
            version,
            deleted: true,
            payload: None,
        }
    }
}

/// Operations every backing store must provide. Deliberately concrete over
/// the two namespaces §6 names (`"flags"`, `"segments"`) rather than a
/// stringly-typed generic namespace API — see `DESIGN.md`.
pub trait Store: Send + Sync {
    fn initialized(&self) -> bool;

    fn init(
        &self,
        flags: HashMap<String, Item<FeatureFlag>>,
        segments: HashMap<String, Item<Segment>>,
    );

    fn get_flag(&self, key: &str) -> Option<FeatureFlag>;
    fn get_segment(&self, key: &str) -> Option<Segment>;
    fn all_flags(&self) -> HashMap<String, FeatureFlag>;
    fn all_segments(&self) -> HashMap<String, Segment>;

    /// Applies the write iff `item.version > existing.version` or no
    /// existing entry. Returns whether the write was applied.
    fn upsert_flag(&self, key: &str, item: Item<FeatureFlag>) -> bool;
    fn upsert_segment(&self, key: &str, item: Item<Segment>) -> bool;

    fn destroy(&self);
}

/// A single namespace: a version-CAS map behind an `ArcSwap`, exactly the
/// teacher's `ArcSwap<HashMap<String, FeatureFlagState>>` generalized to
/// carry version/tombstone metadata and to apply writes via `rcu` instead
/// of an unconditional `store`.
struct Namespace<T: Clone> {
    items: ArcSwap<HashMap<String, Item<T>>>,
}

impl<T: Clone> Namespace<T> {
    fn new() -> Self {
        Self {
            items: ArcSwap::new(Arc::new(HashMap::new())),
        }
    }

    fn init(&self, items: HashMap<String, Item<T>>) {
        self.items.store(Arc::new(items));
    }

    fn get(&self, key: &str) -> Option<T> {
        self.items
            .load()
            .get(key)
            .filter(|item| !item.deleted)
            .and_then(|item| item.payload.clone())
    }

    fn all(&self) -> HashMap<String, T> {
        self.items
            .load()
            .iter()
            .filter(|(_, item)| !item.deleted)
            .filter_map(|(key, item)| item.payload.clone().map(|p| (key.clone(), p)))
            .collect()
    }

    /// Compare-and-swap on `version` only; ties lose. This is the same
    /// algorithm spec.md §4.1 describes as a reader-writer lock, expressed
    /// as a lock-free retry loop: `rcu`'s closure only ever touches this
    /// namespace's own data, so no lock is held across calls into user
    /// code or across evaluator recursion (spec.md §5).
    fn upsert(&self, key: &str, item: Item<T>) -> bool {
        let mut applied = false;
        self.items.rcu(|current| {
            let should_apply = match current.get(key) {
                Some(existing) => item.version > existing.version,
                None => true,
            };
            applied = should_apply;
            if should_apply {
                let mut next = (**current).clone();
                next.insert(key.to_string(), item.clone());
                next
            } else {
                Arc::clone(current)
            }
        });
        applied
    }

    fn destroy(&self) {
        self.items.store(Arc::new(HashMap::new()));
    }
}

/// The default in-process store: a reader-writer-lock-equivalent,
/// lock-free snapshot store over the two required namespaces.
pub struct MemoryStore {
    flags: Namespace<FeatureFlag>,
    segments: Namespace<Segment>,
    init: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            flags: Namespace::new(),
            segments: Namespace::new(),
            init: AtomicBool::new(false),
        }
    }
}

impl Store for MemoryStore {
    fn initialized(&self) -> bool {
        self.init.load(Ordering::Acquire)
    }

    fn init(
        &self,
        flags: HashMap<String, Item<FeatureFlag>>,
        segments: HashMap<String, Item<Segment>>,
    ) {
        self.flags.init(flags);
        self.segments.init(segments);
        self.init.store(true, Ordering::Release);
    }

    fn get_flag(&self, key: &str) -> Option<FeatureFlag> {
        self.flags.get(key)
    }

    fn get_segment(&self, key: &str) -> Option<Segment> {
        self.segments.get(key)
    }

    fn all_flags(&self) -> HashMap<String, FeatureFlag> {
        self.flags.all()
    }

    fn all_segments(&self) -> HashMap<String, Segment> {
        self.segments.all()
    }

    fn upsert_flag(&self, key: &str, item: Item<FeatureFlag>) -> bool {
        self.flags.upsert(key, item)
    }

    fn upsert_segment(&self, key: &str, item: Item<Segment>) -> bool {
        self.segments.upsert(key, item)
    }

    fn destroy(&self) {
        self.flags.destroy();
        self.segments.destroy();
        self.init.store(false, Ordering::Release);
    }
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn initialized(&self) -> bool {
        self.as_ref().initialized()
    }

    fn init(
        &self,
        flags: HashMap<String, Item<FeatureFlag>>,
        segments: HashMap<String, Item<Segment>>,
    ) {
        self.as_ref().init(flags, segments)
    }

    fn get_flag(&self, key: &str) -> Option<FeatureFlag> {
        self.as_ref().get_flag(key)
    }

    fn get_segment(&self, key: &str) -> Option<Segment> {
        self.as_ref().get_segment(key)
    }

    fn all_flags(&self) -> HashMap<String, FeatureFlag> {
        self.as_ref().all_flags()
    }

    fn all_segments(&self) -> HashMap<String, Segment> {
        self.as_ref().all_segments()
    }

    fn upsert_flag(&self, key: &str, item: Item<FeatureFlag>) -> bool {
        self.as_ref().upsert_flag(key, item)
    }

    fn upsert_segment(&self, key: &str, item: Item<Segment>) -> bool {
        self.as_ref().upsert_segment(key, item)
    }

    fn destroy(&self) {
        self.as_ref().destroy()
    }
}
