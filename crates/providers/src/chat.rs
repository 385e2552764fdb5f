use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use reqwest::Client;
use shared::chat::ChatRequest;
use shared::events::StreamEvent;
use shared::ChatError;
use std::collections::VecDeque;
use std::fmt::Display;
use url::Url;

use crate::classify;
use crate::sse::{SseParser, SseRecord};

// ── Client ───────────────────────────────────────────────────────────

pub struct ChatClient {
    http: Client,
    base_url: Url,
}

impl ChatClient {
    pub fn new(http: Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// Dispatch the request and return the event stream once the response
    /// head has arrived with a success status.
    ///
    /// Transport failures and non-2xx statuses come back as `Err`; nothing
    /// has been rendered at that point.
    pub async fn open_stream(&self, request: &ChatRequest) -> Result<ChatStream, ChatError> {
        let url = crate::endpoint(&self.base_url, &["api", "chat"])?;
        let body = request.to_wire();

        tracing::info!(
            model = request.model_id().unwrap_or("default"),
            conversation = request.conversation_id().unwrap_or("new"),
            attachments = request.attachments().len(),
            "dispatching chat request"
        );

        let resp = self
            .http
            .post(url)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(crate::transport_error)?;
        let resp = crate::check_status(resp).await?;

        Ok(ChatStream::from_byte_stream(resp.bytes_stream()))
    }
}

// ── Stream ───────────────────────────────────────────────────────────

/// Classified events read incrementally from a response body.
///
/// A malformed record is logged and skipped; it never ends the stream.
pub struct ChatStream {
    body: BoxStream<'static, Result<Bytes, ChatError>>,
    parser: SseParser,
    pending: VecDeque<StreamEvent>,
    finished: bool,
    parse_errors: usize,
}

impl ChatStream {
    pub fn from_byte_stream<S, E>(body: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Display,
    {
        let body = body
            .map(|chunk| chunk.map_err(|e| ChatError::Stream(format!("stream read error: {}", e))))
            .boxed();
        Self {
            body,
            parser: SseParser::new(),
            pending: VecDeque::new(),
            finished: false,
            parse_errors: 0,
        }
    }

    /// Next event, or `None` once the body is exhausted. A read error is
    /// returned once and ends the stream.
    pub async fn next_event(&mut self) -> Option<Result<StreamEvent, ChatError>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.finished {
                return None;
            }
            match self.body.next().await {
                Some(Ok(bytes)) => {
                    let records = self.parser.feed(&bytes);
                    self.enqueue(records);
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    let records = self.parser.finish();
                    self.enqueue(records);
                }
            }
        }
    }

    /// Number of records skipped because their payload didn't parse.
    pub fn parse_errors(&self) -> usize {
        self.parse_errors
    }

    fn enqueue(&mut self, records: Vec<SseRecord>) {
        for record in records {
            match record {
                SseRecord::Done => self.pending.push_back(StreamEvent::Done),
                SseRecord::Data(data) => match classify::parse_record(&data) {
                    Ok(Some(event)) => self.pending.push_back(event),
                    Ok(None) => tracing::debug!(record = %data, "ignoring unrecognised record"),
                    Err(e) => {
                        self.parse_errors += 1;
                        tracing::warn!(error = %e, record = %data, "skipping malformed stream record");
                    }
                },
            }
        }
    }
}
