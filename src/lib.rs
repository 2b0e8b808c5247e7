//! Server-side feature flag evaluation SDK.
//!
//! [`DefaultClient`] is glue code on top of the smaller building blocks:
//! a [`store::Store`] populated by a [`source::Source`]/[`consumer::Consumer`]
//! pair, an [`evaluator::Evaluator`] that runs the rule-based decision
//! pipeline, and an [`events::EventSink`] that receives a shaped event per
//! evaluation.

use crate::{
    config::Config,
    consumer::{Consumer, ReadError},
    evaluator::{Details, ErrorKind, EvalResult, Evaluator, PrerequisiteEval, Reason},
    events::{Event, EventSink, FeatureRequestEvent, NullSink},
    source::{Source, SseSource},
    store::{MemoryStore, Store},
    user::User,
    value::Value,
};
use std::{
    collections::HashMap,
    error::Error as StdError,
    fmt,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

pub mod clause;
pub mod config;
pub mod consumer;
pub mod evaluator;
pub mod events;
pub mod hasher;
pub mod message;
pub mod models;
pub mod operators;
pub mod segment;
pub mod source;
pub mod store;
#[cfg(test)]
pub mod test_utils;
pub mod user;
pub mod value;

#[derive(Debug, thiserror::Error)]
pub enum StartError<CE>
where
    CE: fmt::Debug + Clone + StdError + 'static,
{
    #[error("Already started, can't start multiple times")]
    AlreadyStarted,

    #[error("Failed to start reading from source: {0}")]
    Start(#[from] ReadError<CE>),
}

#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("Invalid SDK token: {0}")]
    InvalidToken(#[from] http::header::InvalidHeaderValue),
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_millis() as i64
}

/// A typed evaluation result: the requested flag's value, cast to `T`, plus
/// its variation index and [`Reason`].
#[derive(Debug, Clone, PartialEq)]
pub struct VariationDetails<T> {
    pub value: T,
    pub variation_index: Option<usize>,
    pub reason: Reason,
}

/// Client providing the idiomatic way of retrieving
/// variation values for flags.
///
/// Glue code on top of the smaller building blocks.
pub struct DefaultClient<ST, SRC> {
    store: Arc<ST>,
    evaluator: Evaluator<Arc<ST>>,
    config: Config,
    events: Arc<dyn EventSink>,
    source: Option<SRC>,
}

impl DefaultClient<MemoryStore, SseSource> {
    /// Create a feature flagging client streaming from the default SSE
    /// endpoint, authenticated with `token`.
    pub fn with_token(token: String) -> Result<Self, CreateError> {
        http::HeaderValue::from_str(&token)?;
        let source = SseSource::new(&token);
        let store = Arc::new(MemoryStore::new());
        Ok(Self::new(store, source, Config::default()))
    }
}

impl<ST, SRC> DefaultClient<ST, SRC>
where
    ST: Store,
{
    /// Make a client with custom components, discarding every emitted event.
    pub fn new<STA: Into<Arc<ST>>>(store: STA, source: SRC, config: Config) -> Self {
        Self::with_events(store, source, config, Arc::new(NullSink))
    }

    /// Make a client with custom components and a custom event sink.
    pub fn with_events<STA: Into<Arc<ST>>>(
        store: STA,
        source: SRC,
        config: Config,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let store = store.into();
        let evaluator = Evaluator::new(Arc::clone(&store), config.clone());
        Self {
            evaluator,
            store,
            config,
            events,
            source: Some(source),
        }
    }

    /// Start consuming data in the client.
    ///
    /// Future resolves once the initial data has been read.
    /// Drop the future to ignore the startup. It will still
    /// happen in the background.
    pub async fn start(&mut self) -> Result<(), StartError<ST::Error>>
    where
        ST: Consumer<SRC> + Send + Sync + 'static,
        ST::Error: StdError + Clone + Send + Sync,
        SRC: Source + Send + 'static,
        SRC::Stream: Unpin + Send,
        SRC::Error: StdError + Send,
    {
        let source = self.source.take().ok_or(StartError::AlreadyStarted)?;
        let store = Arc::clone(&self.store);
        store.read_from(source).await.map_err(Into::into)
    }

    /// Export every flag currently in the underlying [`Store`].
    pub fn all_flags(&self) -> HashMap<String, models::FeatureFlag> {
        self.store.all_flags()
    }

    fn shape_events(&self, flag_key: &str, user: &User, default: &Value, result: &EvalResult) {
        let (redacted_user, _) = user.to_redacted_json(&self.config);
        let creation_date = now_millis();
        for prereq in &result.prerequisite_evals {
            self.events.send(Event::FeatureRequest(feature_request_event(
                prereq,
                &redacted_user,
                creation_date,
            )));
        }
        self.events.send(Event::FeatureRequest(FeatureRequestEvent {
            key: flag_key.to_string(),
            user: redacted_user,
            variation: result.details.variation_index,
            value: result.details.value.clone(),
            default: default.clone(),
            reason: result.details.reason.clone(),
            version: result.flag_version,
            track_events: result.flag_track_events,
            debug_events_until_date: result.flag_debug_events_until_date,
            prereq_of: None,
            creation_date,
        }));
    }

    /// Evaluates `flag_key` for `user` without type coercion, returning the
    /// raw [`Details`] and emitting the corresponding feature-request event(s).
    pub fn json_variation_details(&self, flag_key: &str, user: &User, default: Value) -> Details {
        let result = self.evaluator.evaluate(flag_key, user);
        self.shape_events(flag_key, user, &default, &result);
        if result.details.value.is_null() && matches!(result.details.reason, Reason::Error(_)) {
            return Details {
                value: default,
                variation_index: result.details.variation_index,
                reason: result.details.reason,
            };
        }
        result.details
    }

    pub fn json_variation(&self, flag_key: &str, user: &User, default: Value) -> Value {
        self.json_variation_details(flag_key, user, default).value
    }

    pub fn bool_variation_details(&self, flag_key: &str, user: &User, default: bool) -> VariationDetails<bool> {
        self.typed_variation(flag_key, user, default, Value::as_bool)
    }

    pub fn bool_variation(&self, flag_key: &str, user: &User, default: bool) -> bool {
        self.bool_variation_details(flag_key, user, default).value
    }

    pub fn double_variation_details(&self, flag_key: &str, user: &User, default: f64) -> VariationDetails<f64> {
        self.typed_variation(flag_key, user, default, Value::as_f64)
    }

    pub fn double_variation(&self, flag_key: &str, user: &User, default: f64) -> f64 {
        self.double_variation_details(flag_key, user, default).value
    }

    /// Like [`Self::double_variation`], truncated toward zero.
    pub fn int_variation_details(&self, flag_key: &str, user: &User, default: i64) -> VariationDetails<i64> {
        self.typed_variation(flag_key, user, default as f64, Value::as_f64)
            .map(|f| f.trunc() as i64)
    }

    pub fn int_variation(&self, flag_key: &str, user: &User, default: i64) -> i64 {
        self.int_variation_details(flag_key, user, default).value
    }

    pub fn string_variation_details(
        &self,
        flag_key: &str,
        user: &User,
        default: impl Into<String>,
    ) -> VariationDetails<String> {
        self.typed_variation(flag_key, user, default.into(), |v| v.as_str().map(str::to_owned))
    }

    pub fn string_variation(&self, flag_key: &str, user: &User, default: impl Into<String>) -> String {
        self.string_variation_details(flag_key, user, default).value
    }

    fn typed_variation<T: Clone + Into<Value>>(
        &self,
        flag_key: &str,
        user: &User,
        default: T,
        extract: impl Fn(&Value) -> Option<T>,
    ) -> VariationDetails<T> {
        let default_value: Value = default.clone().into();
        let details = self.json_variation_details(flag_key, user, default_value);
        match extract(&details.value) {
            Some(value) => VariationDetails {
                value,
                variation_index: details.variation_index,
                reason: details.reason,
            },
            None => VariationDetails {
                value: default,
                variation_index: None,
                reason: Reason::Error(ErrorKind::WrongType),
            },
        }
    }
}

impl<T> VariationDetails<T> {
    fn map<U>(self, f: impl FnOnce(T) -> U) -> VariationDetails<U> {
        VariationDetails {
            value: f(self.value),
            variation_index: self.variation_index,
            reason: self.reason,
        }
    }
}

fn feature_request_event(
    prereq: &PrerequisiteEval,
    user: &Value,
    creation_date: i64,
) -> FeatureRequestEvent {
    FeatureRequestEvent {
        key: prereq.flag_key.clone(),
        user: user.clone(),
        variation: prereq.details.variation_index,
        value: prereq.details.value.clone(),
        default: Value::Null,
        reason: prereq.details.reason.clone(),
        version: prereq.version,
        track_events: prereq.track_events,
        debug_events_until_date: prereq.debug_events_until_date,
        prereq_of: Some(prereq.prereq_of.clone()),
        creation_date,
    }
}
