//! Test builders, in the style of the teacher's `test_utils::FlagBuilder`,
//! generalized to rules, prerequisites, and rollouts.

use crate::models::{
    Clause, FeatureFlag, Prerequisite, Rollout, Rule, Segment, Target, VariationOrRollout,
    WeightedVariation,
};
use crate::operators::Operator;
use crate::store::{Item, MemoryStore, Store};
use crate::value::Value;
use std::sync::Arc;

/// A pre-wired in-memory store for tests: always initialized, with
/// convenience methods to seed flags/segments.
#[derive(Clone)]
pub struct MemoryStoreHarness {
    store: Arc<MemoryStore>,
}

impl MemoryStoreHarness {
    pub fn empty() -> Self {
        let store = Arc::new(MemoryStore::new());
        store.init(Default::default(), Default::default());
        Self { store }
    }

    pub fn add_flag(&mut self, flag: FeatureFlag) {
        let version = flag.version;
        self.store.upsert_flag(&flag.key.clone(), Item::live(version, flag));
    }

    pub fn add_segment(&mut self, segment: Segment) {
        let version = segment.version;
        self.store
            .upsert_segment(&segment.key.clone(), Item::live(version, segment));
    }

    pub fn clone_handle(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.store)
    }
}

impl Store for MemoryStoreHarness {
    fn initialized(&self) -> bool {
        self.store.initialized()
    }

    fn init(
        &self,
        flags: std::collections::HashMap<String, Item<FeatureFlag>>,
        segments: std::collections::HashMap<String, Item<Segment>>,
    ) {
        self.store.init(flags, segments)
    }

    fn get_flag(&self, key: &str) -> Option<FeatureFlag> {
        self.store.get_flag(key)
    }

    fn get_segment(&self, key: &str) -> Option<Segment> {
        self.store.get_segment(key)
    }

    fn all_flags(&self) -> std::collections::HashMap<String, FeatureFlag> {
        self.store.all_flags()
    }

    fn all_segments(&self) -> std::collections::HashMap<String, Segment> {
        self.store.all_segments()
    }

    fn upsert_flag(&self, key: &str, item: Item<FeatureFlag>) -> bool {
        self.store.upsert_flag(key, item)
    }

    fn upsert_segment(&self, key: &str, item: Item<Segment>) -> bool {
        self.store.upsert_segment(key, item)
    }

    fn destroy(&self) {
        self.store.destroy()
    }
}

/// Builds a `FeatureFlag` with a two-way boolean variation set by default,
/// mirroring the teacher's `FlagBuilder` defaults (`variations: [false, true]`).
pub struct FlagBuilder(FeatureFlag);

impl FlagBuilder {
    pub fn new(key: impl Into<String>) -> Self {
        Self(FeatureFlag {
            key: key.into(),
            version: 1,
            deleted: false,
            on: true,
            salt: "test-salt".to_string(),
            sel: String::new(),
            prerequisites: Vec::new(),
            targets: Vec::new(),
            rules: Vec::new(),
            fallthrough: VariationOrRollout {
                variation: Some(0),
                rollout: None,
            },
            off_variation: Some(0),
            variations: vec![Value::Bool(false), Value::Bool(true)],
            track_events: false,
            debug_events_until_date: None,
            client_side: false,
        })
    }

    pub fn off(mut self) -> Self {
        self.0.on = false;
        self
    }

    pub fn on(mut self) -> Self {
        self.0.on = true;
        self
    }

    pub fn version(mut self, v: u64) -> Self {
        self.0.version = v;
        self
    }

    pub fn salt(mut self, s: impl Into<String>) -> Self {
        self.0.salt = s.into();
        self
    }

    pub fn track_events(mut self, v: bool) -> Self {
        self.0.track_events = v;
        self
    }

    pub fn variations(mut self, vs: Vec<Value>) -> Self {
        self.0.variations = vs;
        self
    }

    pub fn off_variation(mut self, idx: usize) -> Self {
        self.0.off_variation = Some(idx);
        self
    }

    pub fn fallthrough_variation(mut self, idx: usize) -> Self {
        self.0.fallthrough = VariationOrRollout {
            variation: Some(idx),
            rollout: None,
        };
        self
    }

    pub fn fallthrough_rollout(mut self, weighted: Vec<(usize, u32)>) -> Self {
        self.0.fallthrough = VariationOrRollout {
            variation: None,
            rollout: Some(Rollout {
                bucket_by: None,
                variations: weighted
                    .into_iter()
                    .map(|(variation, weight)| WeightedVariation { variation, weight })
                    .collect(),
            }),
        };
        self
    }

    pub fn target(mut self, variation: usize, values: Vec<&str>) -> Self {
        self.0.targets.push(Target {
            values: values.into_iter().map(|s| s.to_string()).collect(),
            variation,
        });
        self
    }

    pub fn prerequisite(mut self, key: impl Into<String>, variation: usize) -> Self {
        self.0.prerequisites.push(Prerequisite {
            key: key.into(),
            variation,
        });
        self
    }

    /// Adds a rule matching `attribute == value` (via the `in` operator)
    /// for every `(attribute, value)` pair, resolving to a rollout.
    pub fn rule_rollout(
        mut self,
        id: impl Into<String>,
        clauses: Vec<(&str, &str)>,
        weighted: Vec<(usize, u32)>,
    ) -> Self {
        self.0.rules.push(Rule {
            id: id.into(),
            clauses: clauses
                .into_iter()
                .map(|(attribute, value)| Clause {
                    attribute: attribute.to_string(),
                    op: Operator::In,
                    values: vec![Value::Text(value.to_string())],
                    negate: false,
                })
                .collect(),
            variation_or_rollout: VariationOrRollout {
                variation: None,
                rollout: Some(Rollout {
                    bucket_by: None,
                    variations: weighted
                        .into_iter()
                        .map(|(variation, weight)| WeightedVariation { variation, weight })
                        .collect(),
                }),
            },
            track_events: None,
        });
        self
    }

    pub fn rule_variation(
        mut self,
        id: impl Into<String>,
        clauses: Vec<(&str, &str)>,
        variation: usize,
    ) -> Self {
        self.0.rules.push(Rule {
            id: id.into(),
            clauses: clauses
                .into_iter()
                .map(|(attribute, value)| Clause {
                    attribute: attribute.to_string(),
                    op: Operator::In,
                    values: vec![Value::Text(value.to_string())],
                    negate: false,
                })
                .collect(),
            variation_or_rollout: VariationOrRollout {
                variation: Some(variation),
                rollout: None,
            },
            track_events: None,
        });
        self
    }

    pub fn build(self) -> FeatureFlag {
        self.0
    }
}

/// Constructs a minimal live flag at a given version, for store tests that
/// don't care about evaluation semantics.
pub fn flag_with_version(key: &str, version: u64) -> FeatureFlag {
    FlagBuilder::new(key).version(version).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_are_a_boolean_flag() {
        let flag = FlagBuilder::new("f").build();
        assert!(flag.on);
        assert_eq!(flag.variations, vec![Value::Bool(false), Value::Bool(true)]);
    }
}
