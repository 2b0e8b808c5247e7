//! Off/prerequisite/target/rules/fallthrough evaluation pipeline, per
//! spec.md §4.5. Carried from the teacher's `Evaluation`/`Evaluator`
//! control flow, generalized to real rule support, attribute-aware
//! bucketing, and a typed `Details`/`Reason` result (the teacher stubbed
//! rule evaluation out entirely and hardcoded bucketing to `user.key`).

use crate::clause;
use crate::config::Config;
use crate::hasher;
use crate::models::{FeatureFlag, VariationOrRollout};
use crate::store::Store;
use crate::user::User;
use crate::value::Value;
use std::collections::HashSet;
use tracing::warn;

/// Why a particular variation was chosen (or not).
#[derive(Debug, Clone, PartialEq)]
pub enum Reason {
    Off,
    Fallthrough,
    TargetMatch,
    RuleMatch { rule_index: usize, rule_id: String },
    PrerequisiteFailed { prerequisite_key: String },
    Error(ErrorKind),
}

/// Categorized evaluation error, per spec.md §6/§7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error("requested flag was not found")]
    FlagNotFound,
    #[error("user was not specified")]
    UserNotSpecified,
    #[error("flag data is malformed")]
    MalformedFlag,
    #[error("client is not ready")]
    ClientNotReady,
    #[error("variation value did not match the requested type")]
    WrongType,
    #[error("an unexpected exception occurred during evaluation")]
    Exception,
}

/// The full result of an evaluation: the chosen value, its variation
/// index (absent on error/off-without-offVariation), and the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct Details {
    pub value: Value,
    pub variation_index: Option<usize>,
    pub reason: Reason,
}

impl Details {
    fn error(kind: ErrorKind) -> Self {
        Self {
            value: Value::Null,
            variation_index: None,
            reason: Reason::Error(kind),
        }
    }
}

/// One prerequisite flag touched during a top-level evaluation, recorded
/// so the caller can shape a feature-request event for it (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct PrerequisiteEval {
    pub flag_key: String,
    pub version: u64,
    pub details: Details,
    pub prereq_of: String,
    pub track_events: bool,
    pub debug_events_until_date: Option<i64>,
}

/// The outcome of evaluating one top-level flag: its own details plus
/// every prerequisite touched along the way, in evaluation order, plus
/// the evaluated flag's own event-shaping fields (spec.md §4.6) so the
/// caller can build a `FeatureRequestEvent` without a second store lookup.
#[derive(Debug, Clone)]
pub struct EvalResult {
    pub details: Details,
    pub prerequisite_evals: Vec<PrerequisiteEval>,
    pub flag_version: u64,
    pub flag_track_events: bool,
    pub flag_debug_events_until_date: Option<i64>,
}

/// Looks up a flag's offVariation, or `Value::Null` when absent.
fn off_value(flag: &FeatureFlag) -> Details {
    match flag.off_variation {
        None => Details {
            value: Value::Null,
            variation_index: None,
            reason: Reason::Off,
        },
        Some(idx) => match flag.variations.get(idx) {
            Some(v) => Details {
                value: v.clone(),
                variation_index: Some(idx),
                reason: Reason::Off,
            },
            None => {
                warn!(flag = %flag.key, idx, "offVariation index out of range");
                Details::error(ErrorKind::MalformedFlag)
            }
        },
    }
}

fn prerequisite_failed(flag: &FeatureFlag, prerequisite_key: &str) -> Details {
    let mut d = off_value(flag);
    d.reason = Reason::PrerequisiteFailed {
        prerequisite_key: prerequisite_key.to_string(),
    };
    d
}

fn lookup_variation(flag: &FeatureFlag, idx: usize, reason: Reason) -> Details {
    match flag.variations.get(idx) {
        Some(v) => Details {
            value: v.clone(),
            variation_index: Some(idx),
            reason,
        },
        None => {
            warn!(flag = %flag.key, idx, "variation index out of range");
            Details::error(ErrorKind::MalformedFlag)
        }
    }
}

/// Resolves a `VariationOrRollout` (fallthrough or a rule's) to a variation.
fn resolve_variation_or_rollout(
    flag: &FeatureFlag,
    vor: &VariationOrRollout,
    user: &User,
    reason: Reason,
) -> Details {
    if let Some(idx) = vor.variation {
        return lookup_variation(flag, idx, reason);
    }

    let rollout = match &vor.rollout {
        Some(r) => r,
        None => return Details::error(ErrorKind::MalformedFlag),
    };
    if rollout.variations.is_empty() {
        return Details::error(ErrorKind::MalformedFlag);
    }

    let total_weight: u32 = rollout.variations.iter().map(|wv| wv.weight).sum();
    if total_weight == 0 {
        return Details::error(ErrorKind::MalformedFlag);
    }

    let bucket_by = rollout.bucket_by.as_deref().unwrap_or("key");
    let attr_text = match user.attribute(bucket_by).and_then(|v| v.as_bucketable_text()) {
        Some(text) => text,
        None => return Details::error(ErrorKind::MalformedFlag),
    };

    let bucket = hasher::bucket(&flag.key, &flag.salt, &attr_text, user.secondary.as_deref());

    let mut cumulative = 0.0f64;
    for wv in &rollout.variations {
        cumulative += wv.weight as f64 / 100_000.0;
        if bucket < cumulative {
            return lookup_variation(flag, wv.variation, reason);
        }
    }
    // Floating-point edge case: weights summed to slightly under 1.0.
    // Fall back to the last bucket rather than erroring, matching the
    // reference SDKs' rollout behavior.
    let last = rollout.variations.last().expect("checked non-empty above");
    lookup_variation(flag, last.variation, reason)
}

/// Evaluates `flag` for `user`, recursing into prerequisites and
/// appending every prerequisite touched to `trail`. `visited` guards
/// against prerequisite cycles across the whole top-level call.
fn evaluate_recursive(
    store: &dyn Store,
    flag: &FeatureFlag,
    user: &User,
    visited: &mut HashSet<String>,
    trail: &mut Vec<PrerequisiteEval>,
) -> Details {
    if !visited.insert(flag.key.clone()) {
        warn!(flag = %flag.key, "prerequisite cycle detected");
        return Details::error(ErrorKind::MalformedFlag);
    }

    if !flag.on {
        return off_value(flag);
    }

    for prereq in &flag.prerequisites {
        let prereq_flag = match store.get_flag(&prereq.key) {
            Some(f) => f,
            None => {
                warn!(flag = %flag.key, prereq = %prereq.key, "prerequisite flag not found");
                return prerequisite_failed(flag, &prereq.key);
            }
        };

        let prereq_details = evaluate_recursive(store, &prereq_flag, user, visited, trail);
        let prereq_on = prereq_flag.on;
        let prereq_version = prereq_flag.version;
        let prereq_track_events = prereq_flag.track_events;
        let prereq_debug_until = prereq_flag.debug_events_until_date;
        let matched = prereq_on && prereq_details.variation_index == Some(prereq.variation);

        trail.push(PrerequisiteEval {
            flag_key: prereq.key.clone(),
            version: prereq_version,
            details: prereq_details,
            prereq_of: flag.key.clone(),
            track_events: prereq_track_events,
            debug_events_until_date: prereq_debug_until,
        });

        if !matched {
            return prerequisite_failed(flag, &prereq.key);
        }
    }

    for target in &flag.targets {
        if target.values.iter().any(|v| v == &user.key) {
            return lookup_variation(flag, target.variation, Reason::TargetMatch);
        }
    }

    for (index, rule) in flag.rules.iter().enumerate() {
        if rule.clauses.iter().all(|c| clause::matches(c, user, store)) {
            let reason = Reason::RuleMatch {
                rule_index: index,
                rule_id: rule.id.clone(),
            };
            return resolve_variation_or_rollout(flag, &rule.variation_or_rollout, user, reason);
        }
    }

    resolve_variation_or_rollout(flag, &flag.fallthrough, user, Reason::Fallthrough)
}

/// Evaluates flags by reading from a [`Store`] and running the rule-based
/// decision pipeline in spec.md §4.5.
pub struct Evaluator<S> {
    store: S,
    config: Config,
}

impl<S: Store> Evaluator<S> {
    pub fn new(store: S, config: Config) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Evaluates a single flag for `user`, per the pipeline in spec.md §4.5.
    pub fn evaluate(&self, flag_key: &str, user: &User) -> EvalResult {
        if self.config.offline {
            return Self::error_result(ErrorKind::ClientNotReady);
        }
        if !self.store.initialized() {
            return Self::error_result(ErrorKind::ClientNotReady);
        }
        if user.key.is_empty() {
            return Self::error_result(ErrorKind::UserNotSpecified);
        }

        let flag = match self.store.get_flag(flag_key) {
            Some(f) => f,
            None => return Self::error_result(ErrorKind::FlagNotFound),
        };

        let mut visited = HashSet::new();
        let mut trail = Vec::new();
        let details = evaluate_recursive(&self.store, &flag, user, &mut visited, &mut trail);
        EvalResult {
            details,
            prerequisite_evals: trail,
            flag_version: flag.version,
            flag_track_events: flag.track_events,
            flag_debug_events_until_date: flag.debug_events_until_date,
        }
    }

    fn error_result(kind: ErrorKind) -> EvalResult {
        EvalResult {
            details: Details::error(kind),
            prerequisite_evals: Vec::new(),
            flag_version: 0,
            flag_track_events: false,
            flag_debug_events_until_date: None,
        }
    }
}
