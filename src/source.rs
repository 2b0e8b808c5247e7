use crate::message::{InitData, Message, MessageParseError};
use eventsource_client::{Client, Event, EventStream, HttpsConnector as SseHttpsConnector};
use futures::{ready, Stream, StreamExt};
use hyper::{body, Body, Request, StatusCode, Uri};
use pin_project::pin_project;
use std::sync::Arc;
use std::time::Duration;
use std::{
    convert::TryInto,
    fmt::{Debug, Display},
    pin::Pin,
    task::{Context, Poll},
};

/// default URL for subscribing to the update stream
const DEFAULT_BASE_URL: &str = "https://stream.launchdarkly.com/all";

/// Allows reading a stream of update [Messages](Message)
pub trait Source {
    type Error;
    type Stream: Stream<Item = Result<Message, Self::Error>>;

    /// Get the stream of updates
    ///
    /// Whenever a stream returned an error,
    /// this should be called again to get a
    /// fresh stream.
    fn stream(&self) -> Self::Stream;
}

impl<T: Source> Source for Arc<T> {
    type Error = T::Error;
    type Stream = T::Stream;
    fn stream(&self) -> Self::Stream {
        self.as_ref().stream()
    }
}

/// [Source] for reading from an SSE stream.
///
/// This is the most common protocol this SDK's counterpart services offer.
pub struct SseSource {
    client: Client<SseHttpsConnector>,
}

impl SseSource {
    /// Create a [Source] consuming from SSE with an SDK token
    pub fn new<T: AsRef<str>>(token: T) -> Self {
        let client = eventsource_client::Client::for_url(DEFAULT_BASE_URL)
            .unwrap()
            .header("Authorization", token.as_ref())
            .unwrap()
            .build();
        Self { client }
    }

    /// Create a [Source] pointed at a custom streaming base URI.
    pub fn with_uri<T: AsRef<str>>(base_uri: &str, token: T) -> Self {
        let client = eventsource_client::Client::for_url(base_uri)
            .unwrap()
            .header("Authorization", token.as_ref())
            .unwrap()
            .build();
        Self { client }
    }
}

impl Source for SseSource {
    type Error = StreamError<eventsource_client::Error>;
    type Stream = MessageStream<Pin<Box<EventStream<SseHttpsConnector>>>>;

    fn stream(&self) -> Self::Stream {
        MessageStream(Box::pin(self.client.stream()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError<E>
where
    E: Debug + Display,
{
    #[error("Failed to read SSE stream: {0}")]
    Inner(E),

    #[error("Failed to parse event: {0}")]
    Parse(#[from] MessageParseError),
}

/// [Stream] impl for [SseSource]
#[pin_project]
pub struct MessageStream<S>(#[pin] S);

impl<S, E> Stream for MessageStream<S>
where
    S: Stream<Item = Result<Event, E>>,
    E: Debug + Display,
{
    type Item = Result<Message, StreamError<E>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let event = match ready!(this.0.poll_next(cx))
            .transpose()
            .map_err(StreamError::Inner)?
        {
            Some(ev) => ev,
            None => return Poll::Ready(None),
        };
        let message = event.try_into()?;
        Poll::Ready(Some(Ok(message)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("polling request failed: {0}")]
    Request(#[from] hyper::Error),

    #[error("polling endpoint returned status {0}")]
    Status(StatusCode),

    #[error("failed to parse polled snapshot: {0}")]
    Parse(serde_json::Error),

    #[error("invalid polling URI: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),
}

/// [Source] that periodically fetches a full flag/segment snapshot over
/// HTTPS rather than subscribing to a push stream — for environments that
/// can't hold a long-lived SSE connection open (spec.md's ambient polling
/// fetcher collaborator).
///
/// Every tick yields a single [`Message::Put`] carrying the freshly fetched
/// snapshot; the [`crate::consumer::Consumer`] applies it exactly like an
/// SSE `put` event.
pub struct PollingSource {
    client: hyper::Client<hyper_rustls::HttpsConnector<hyper::client::HttpConnector>>,
    uri: Uri,
    token: String,
    poll_interval: Duration,
}

impl PollingSource {
    pub fn new(base_uri: &str, token: impl Into<String>, poll_interval: Duration) -> Result<Self, PollError> {
        let uri: Uri = base_uri.parse()?;
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let client = hyper::Client::builder().build(https);
        Ok(Self {
            client,
            uri,
            token: token.into(),
            poll_interval,
        })
    }

    async fn fetch_once(
        client: &hyper::Client<hyper_rustls::HttpsConnector<hyper::client::HttpConnector>>,
        uri: &Uri,
        token: &str,
    ) -> Result<Message, PollError> {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header("Authorization", token)
            .body(Body::empty())
            .expect("request is well-formed");
        let response = client.request(request).await?;
        if !response.status().is_success() {
            return Err(PollError::Status(response.status()));
        }
        let bytes = body::to_bytes(response.into_body()).await?;
        let init_data: InitData = serde_json::from_slice(&bytes).map_err(PollError::Parse)?;
        Ok(Message::Put(init_data))
    }
}

impl Source for PollingSource {
    type Error = PollError;
    type Stream = Pin<Box<dyn Stream<Item = Result<Message, PollError>> + Send>>;

    fn stream(&self) -> Self::Stream {
        let client = self.client.clone();
        let uri = self.uri.clone();
        let token = self.token.clone();
        let poll_interval = self.poll_interval;

        let ticks = futures::stream::unfold(tokio::time::interval(poll_interval), |mut interval| async move {
            interval.tick().await;
            Some(((), interval))
        });

        ticks
            .then(move |_| {
                let client = client.clone();
                let uri = uri.clone();
                let token = token.clone();
                async move { Self::fetch_once(&client, &uri, &token).await }
            })
            .boxed()
    }
}
