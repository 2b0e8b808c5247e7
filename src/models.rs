//! Flag and segment data model, hand-written against the wire format in
//! spec.md §6 (the teacher generated its models from an OpenAPI schema that
//! isn't part of this workspace — see `DESIGN.md`).

use crate::operators::Operator;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A single evaluatable flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub key: String,
    pub version: u64,
    #[serde(default)]
    pub deleted: bool,
    pub on: bool,
    #[serde(default)]
    pub salt: String,
    #[serde(default)]
    pub sel: String,
    #[serde(default)]
    pub prerequisites: Vec<Prerequisite>,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    pub fallthrough: VariationOrRollout,
    #[serde(rename = "offVariation")]
    pub off_variation: Option<usize>,
    pub variations: Vec<Value>,
    #[serde(rename = "trackEvents", default)]
    pub track_events: bool,
    #[serde(rename = "debugEventsUntilDate", default)]
    pub debug_events_until_date: Option<i64>,
    #[serde(rename = "clientSide", default)]
    pub client_side: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prerequisite {
    pub key: String,
    pub variation: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub values: Vec<String>,
    pub variation: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub clauses: Vec<Clause>,
    #[serde(flatten)]
    pub variation_or_rollout: VariationOrRollout,
    #[serde(rename = "trackEvents", default)]
    pub track_events: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clause {
    pub attribute: String,
    pub op: Operator,
    pub values: Vec<Value>,
    #[serde(default)]
    pub negate: bool,
}

/// Exactly one of a fixed variation or a weighted rollout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariationOrRollout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout: Option<Rollout>,
}

pub type Fallthrough = VariationOrRollout;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rollout {
    #[serde(rename = "bucketBy", default, skip_serializing_if = "Option::is_none")]
    pub bucket_by: Option<String>,
    pub variations: Vec<WeightedVariation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedVariation {
    pub variation: usize,
    pub weight: u32,
}

/// A reusable, named set of users.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Segment {
    pub key: String,
    pub version: u64,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub included: Vec<String>,
    #[serde(default)]
    pub excluded: Vec<String>,
    #[serde(default)]
    pub rules: Vec<SegmentRule>,
    #[serde(default)]
    pub salt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRule {
    #[serde(default)]
    pub clauses: Vec<Clause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout: Option<SegmentRollout>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRollout {
    pub weight: u32,
    #[serde(rename = "bucketBy", default, skip_serializing_if = "Option::is_none")]
    pub bucket_by: Option<String>,
}
