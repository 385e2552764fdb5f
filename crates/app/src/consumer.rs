//! Applies a response stream to one assistant message.
//!
//! Per-response state machine:
//!
//! ```text
//! AwaitingFirstEvent --reasoning--> StreamingReasoning --content--> StreamingContent
//!         |                                                              ^
//!         +------------------------------content-------------------------+
//! any --done / end of stream / error--> Done
//! ```
//!
//! The reasoning region is created expanded and is collapsed exactly once,
//! by the first content event. Metadata attaches in any state. After `Done`
//! the message is never touched again.

use parking_lot::Mutex;
use providers::chat::ChatStream;
use shared::events::{Metadata, StreamEvent};
use shared::settings::ScrollPolicy;
use shared::ChatError;

use crate::format;
use crate::view::{ChatLog, MessageElement, MessageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingFirstEvent,
    StreamingReasoning,
    StreamingContent,
    Done,
}

/// Accumulated text for one in-flight response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderState {
    pub reasoning: String,
    pub content: String,
    pub reasoning_started: bool,
    /// One-way: once set, reasoning text is no longer appended.
    pub reasoning_closed: bool,
    pub metadata: Option<Metadata>,
}

impl RenderState {
    /// Rebuild the state from what a message shows, for responses that were
    /// interrupted before the consumer could hand its state back.
    pub fn from_message(message: &MessageElement) -> Self {
        let reasoning = message
            .reasoning
            .as_ref()
            .map(|r| r.text.clone())
            .unwrap_or_default();
        Self {
            reasoning_started: message.reasoning.is_some(),
            reasoning_closed: message.reasoning.is_some() && message.content.is_some(),
            reasoning,
            content: message.content_text().to_string(),
            metadata: message.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Finished,
}

pub struct ResponseConsumer {
    target: MessageId,
    phase: Phase,
    state: RenderState,
    scroll: ScrollPolicy,
    near_bottom_px: f32,
}

impl ResponseConsumer {
    pub fn new(target: MessageId, scroll: ScrollPolicy, near_bottom_px: f32) -> Self {
        Self {
            target,
            phase: Phase::AwaitingFirstEvent,
            state: RenderState::default(),
            scroll,
            near_bottom_px,
        }
    }

    pub fn target(&self) -> MessageId {
        self.target
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    /// Apply one event. A server error record renders the error, ends the
    /// response and is returned as `Err`.
    pub fn apply(&mut self, log: &mut ChatLog, event: StreamEvent) -> Result<Flow, ChatError> {
        if self.phase == Phase::Done {
            tracing::debug!(kind = event.kind(), "event after completion ignored");
            return Ok(Flow::Finished);
        }

        match event {
            StreamEvent::Reasoning(text) => self.on_reasoning(log, &text),
            StreamEvent::Content(text) => self.on_content(log, &text),
            StreamEvent::Metadata(meta) => self.on_metadata(log, meta),
            StreamEvent::Error(message) => {
                let err = ChatError::Stream(message);
                self.fail(log, &err);
                return Err(err);
            }
            StreamEvent::Done => {
                self.finish(log);
                return Ok(Flow::Finished);
            }
        }
        Ok(Flow::Continue)
    }

    fn on_reasoning(&mut self, log: &mut ChatLog, text: &str) {
        match self.phase {
            Phase::AwaitingFirstEvent => {
                tracing::debug!(message = self.target, "reasoning started");
                self.phase = Phase::StreamingReasoning;
                self.state.reasoning_started = true;
            }
            Phase::StreamingReasoning => {}
            Phase::StreamingContent | Phase::Done => {
                tracing::debug!(message = self.target, "reasoning after content ignored");
                return;
            }
        }

        self.state.reasoning.push_str(text);
        let source = self.state.reasoning.clone();
        let html = format::render(&source);
        self.update(log, move |m| {
            m.typing = false;
            let region = m.reasoning_region();
            region.text = source;
            region.html = html;
        });
    }

    fn on_content(&mut self, log: &mut ChatLog, text: &str) {
        let closing_reasoning = self.phase == Phase::StreamingReasoning;
        if closing_reasoning {
            tracing::debug!(message = self.target, "reasoning closed by first content");
            self.state.reasoning_closed = true;
        }
        self.phase = Phase::StreamingContent;

        // Whole-buffer re-render so constructs spanning chunks format correctly
        self.state.content.push_str(text);
        let source = self.state.content.clone();
        let html = format::render(&source);
        self.update(log, move |m| {
            m.typing = false;
            if closing_reasoning {
                if let Some(region) = m.reasoning.as_mut() {
                    region.expanded = false;
                    region.auto_collapsed += 1;
                }
            }
            let region = m.content_region();
            region.text = source;
            region.html = html;
        });
    }

    fn on_metadata(&mut self, log: &mut ChatLog, meta: Metadata) {
        if self.state.metadata.is_some() {
            tracing::debug!(message = self.target, "duplicate metadata ignored");
            return;
        }
        let footer = meta.footer();
        let attached = meta.clone();
        self.state.metadata = Some(meta);
        self.update(log, move |m| {
            m.server_id = attached.id.clone();
            m.footer = (!footer.is_empty()).then_some(footer);
            m.metadata = Some(attached);
        });
    }

    /// Terminal transition on `[DONE]` or end of stream.
    pub fn finish(&mut self, log: &mut ChatLog) {
        if self.phase == Phase::Done {
            return;
        }
        self.phase = Phase::Done;
        self.update(log, |m| m.typing = false);
    }

    /// Terminal transition on failure: drop the typing indicator and show a
    /// single error message. Text already streamed stays visible.
    pub fn fail(&mut self, log: &mut ChatLog, err: &ChatError) {
        if self.phase == Phase::Done {
            return;
        }
        tracing::warn!(message = self.target, error = %err, "response failed");
        self.phase = Phase::Done;
        let text = err.user_message();
        self.update(log, move |m| {
            m.typing = false;
            m.error = Some(text);
        });
    }

    fn update<F>(&self, log: &mut ChatLog, f: F)
    where
        F: FnOnce(&mut MessageElement),
    {
        log.update(self.target, self.scroll, self.near_bottom_px, f);
    }

    /// Read the stream to completion, applying each event under a short lock
    /// on the log. `after_update` runs after every applied event with the lock
    /// still held; `notify` then gets a copy of the message once the lock is
    /// released.
    pub async fn drive<F, G>(
        mut self,
        stream: &mut ChatStream,
        log: &Mutex<ChatLog>,
        mut after_update: F,
        mut notify: G,
    ) -> Result<RenderState, ChatError>
    where
        F: FnMut(&mut ChatLog, MessageId),
        G: FnMut(&MessageElement),
    {
        while let Some(next) = stream.next_event().await {
            let (flow, snapshot) = {
                let mut log = log.lock();
                let flow = match next {
                    Ok(event) => self.apply(&mut *log, event),
                    Err(e) => {
                        self.fail(&mut *log, &e);
                        Err(e)
                    }
                };
                after_update(&mut *log, self.target);
                (flow, log.get(self.target).cloned())
            };
            if let Some(message) = &snapshot {
                notify(message);
            }
            if flow? == Flow::Finished {
                break;
            }
        }

        let snapshot = {
            let mut guard = log.lock();
            self.finish(&mut *guard);
            after_update(&mut *guard, self.target);
            guard.get(self.target).cloned()
        };
        if let Some(message) = &snapshot {
            notify(message);
        }

        if stream.parse_errors() > 0 {
            tracing::warn!(
                message = self.target,
                skipped = stream.parse_errors(),
                "response finished with skipped records"
            );
        }
        Ok(self.state)
    }
}
