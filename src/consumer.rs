use crate::{
    message::{InitData, Message, Update},
    source::Source,
    store::{Item, MemoryStore, Store},
};
use futures::{future, future::BoxFuture, Future, FutureExt, StreamExt};
use std::{
    collections::HashMap,
    convert::Infallible,
    error::Error as StdError,
    fmt,
    sync::Arc,
};
use tokio::{sync::watch, task};
use tracing::{info, warn};

#[derive(Clone, Debug, thiserror::Error)]
pub enum ReadError<E>
where
    E: Clone + fmt::Debug + StdError + 'static,
{
    #[error("Background task stopped before sending result")]
    TaskDropped,

    #[error("Starting stream failed 4 times in a row")]
    RetryFailed,

    #[error(transparent)]
    Inner(#[from] E),
}

/// Represents the state of a [Consumer]
/// after consuming a message
pub enum InitState {
    Pending,
    Done,
}

/// A Consumer reads messages from a source and persists them
///
/// Should be implemented for any [Store](crate::store::Store)
/// when intended for prod
pub trait Consumer<S> {
    type Error;
    type Future: Future<Output = Result<InitState, Self::Error>> + Send;

    /// Process a single message coming from a [Source]
    ///
    /// Receives a unique reference only, so it stays portable and
    /// queries on stores can be made concurrently.
    /// Use atomic updates or an inner mutex to mutate.
    fn consume(&self, msg: Message) -> Self::Future;

    /// Start reading messages from a stream and provide readiness signaling
    /// and retries.
    ///
    /// Usually just wraps [`consume`] in a background task.
    ///
    /// Default impl will abort after 4 consecutive stream failures.
    /// Waits until the consumer got the init data (transitioned to InitState::Done).
    ///
    /// When not interested in readiness, just drop the returned future. This has no
    /// bad consequences.
    fn read_from(
        self: Arc<Self>,
        source: S,
    ) -> BoxFuture<'static, Result<(), ReadError<Self::Error>>>
    where
        Self: Send + Sync + 'static,
        Self::Error: fmt::Debug + StdError + Clone + Sync + Send,
        S: Source + Send + 'static,
        S::Stream: Unpin + Send,
        S::Error: fmt::Display + Send,
    {
        let (init_tx, mut init_rx) =
            watch::channel::<Option<Result<(), ReadError<Self::Error>>>>(None);

        task::spawn(async move {
            let mut stream = source.stream();
            let mut failures = 0;
            while failures < 4 {
                let msg = match stream.next().await {
                    Some(Ok(msg)) => msg,
                    Some(Err(error)) => {
                        failures += 1;
                        warn!(%error, "failed processing event, restarting stream");
                        stream = source.stream();
                        continue;
                    }
                    None => return,
                };
                failures = 0;

                match self.consume(msg).await {
                    Err(e) => {
                        let _ = init_tx.send(Some(Err(e.into())));
                    }
                    Ok(InitState::Done) => {
                        let _ = init_tx.send(Some(Ok(())));
                    }
                    Ok(InitState::Pending) => {}
                };
            }

            let _ = init_tx.send(Some(Err(ReadError::RetryFailed)));
        });

        async move {
            if init_rx.borrow().is_none() {
                init_rx
                    .changed()
                    .await
                    .map_err(|_| ReadError::TaskDropped)?;
            }
            // safe to unwrap: if it's still None at this point, it's a bug
            let res = init_rx.borrow().as_ref().cloned().unwrap();
            res
        }
        .boxed()
    }
}

fn items_from<T>(records: HashMap<String, T>, version_of: impl Fn(&T) -> u64) -> HashMap<String, Item<T>> {
    records
        .into_iter()
        .map(|(key, record)| {
            let version = version_of(&record);
            (key, Item::live(version, record))
        })
        .collect()
}

/// Applies a parsed stream [`Message`] to a [`MemoryStore`], generalizing
/// the teacher's single-namespace put/patch/delete handling to both the
/// flags and segments namespaces.
impl<S> Consumer<S> for MemoryStore {
    type Error = Infallible;
    type Future = future::Ready<Result<InitState, Self::Error>>;

    fn consume(&self, msg: Message) -> Self::Future {
        match msg {
            Message::Put(InitData { flags, segments }) => {
                let flags = items_from(flags, |f| f.version);
                let segments = items_from(segments, |s| s.version);
                self.init(flags, segments);
            }
            Message::Patch(Update::Flag { key, data: Some(flag), .. }) => {
                if !self.initialized() {
                    warn!("ignoring flag update sent before init");
                    return future::ready(Ok(InitState::Pending));
                }
                let version = flag.version;
                if !self.upsert_flag(&key, Item::live(version, flag)) {
                    info!(key, "flag already up-to-date, ignoring");
                }
            }
            Message::Delete(Update::Flag { key, version: Some(version), .. }) => {
                if !self.initialized() {
                    warn!("ignoring flag delete sent before init");
                    return future::ready(Ok(InitState::Pending));
                }
                if !self.upsert_flag(&key, Item::tombstone(version)) {
                    info!(key, "delete already superseded, ignoring");
                }
            }
            Message::Patch(Update::Segment { key, data: Some(segment), .. }) => {
                if !self.initialized() {
                    warn!("ignoring segment update sent before init");
                    return future::ready(Ok(InitState::Pending));
                }
                let version = segment.version;
                if !self.upsert_segment(&key, Item::live(version, segment)) {
                    info!(key, "segment already up-to-date, ignoring");
                }
            }
            Message::Delete(Update::Segment { key, version: Some(version), .. }) => {
                if !self.initialized() {
                    warn!("ignoring segment delete sent before init");
                    return future::ready(Ok(InitState::Pending));
                }
                if !self.upsert_segment(&key, Item::tombstone(version)) {
                    info!(key, "delete already superseded, ignoring");
                }
            }
            msg => {
                warn!(?msg, "unknown update, missing some info or not yet implemented");
            }
        };
        future::ready(Ok(InitState::Done))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::flag_with_version;

    fn dummy_flag(key: &str, version: u64) -> crate::models::FeatureFlag {
        flag_with_version(key, version)
    }

    #[tokio::test]
    async fn put_initializes_store() {
        let store = MemoryStore::new();
        let mut flags = HashMap::new();
        flags.insert("f".to_string(), dummy_flag("f", 1));
        Consumer::<()>::consume(&store, Message::Put(InitData { flags, segments: HashMap::new() }))
            .await
            .unwrap();
        assert!(store.initialized());
        assert_eq!(store.get_flag("f").unwrap().version, 1);
    }

    #[tokio::test]
    async fn patch_before_init_is_pending() {
        let store = MemoryStore::new();
        let state = Consumer::<()>::consume(
            &store,
            Message::Patch(Update::Flag {
                key: "f".to_string(),
                data: Some(dummy_flag("f", 1)),
                version: Some(1),
            }),
        )
        .await
        .unwrap();
        assert!(matches!(state, InitState::Pending));
        assert!(store.get_flag("f").is_none());
    }

    #[tokio::test]
    async fn patch_after_init_updates_flag() {
        let store = MemoryStore::new();
        store.init(HashMap::new(), HashMap::new());
        Consumer::<()>::consume(
            &store,
            Message::Patch(Update::Flag {
                key: "f".to_string(),
                data: Some(dummy_flag("f", 2)),
                version: Some(2),
            }),
        )
        .await
        .unwrap();
        assert_eq!(store.get_flag("f").unwrap().version, 2);
    }

    #[tokio::test]
    async fn delete_after_init_tombstones_flag() {
        let store = MemoryStore::new();
        let mut flags = HashMap::new();
        flags.insert("f".to_string(), dummy_flag("f", 1));
        store.init(flags, HashMap::new());
        Consumer::<()>::consume(
            &store,
            Message::Delete(Update::Flag {
                key: "f".to_string(),
                data: None,
                version: Some(2),
            }),
        )
        .await
        .unwrap();
        assert!(store.get_flag("f").is_none());
    }

    #[tokio::test]
    async fn put_carries_segments() {
        let store = MemoryStore::new();
        let mut segments = HashMap::new();
        segments.insert(
            "s".to_string(),
            crate::models::Segment {
                key: "s".to_string(),
                version: 1,
                deleted: false,
                included: vec![],
                excluded: vec![],
                rules: vec![],
                salt: String::new(),
            },
        );
        Consumer::<()>::consume(
            &store,
            Message::Put(InitData {
                flags: HashMap::new(),
                segments,
            }),
        )
        .await
        .unwrap();
        assert!(store.get_segment("s").is_some());
    }
}
