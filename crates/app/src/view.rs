//! Retained view model for the chat transcript.
//!
//! A front-end draws [`ChatLog`]; everything that changes what is on screen
//! goes through it so mutations can be observed (see
//! [`crate::collapse::CollapseController`]) and scrolling can follow output.

use shared::events::{Metadata, RecordId};
use shared::settings::ScrollPolicy;

pub type MessageId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// Collapsible "thinking" region shown above the answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningRegion {
    pub text: String,
    pub html: String,
    pub expanded: bool,
    /// How many times the region has been closed automatically.
    pub auto_collapsed: u32,
}

impl ReasoningRegion {
    fn new() -> Self {
        Self {
            text: String::new(),
            html: String::new(),
            expanded: true,
            auto_collapsed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContentRegion {
    pub text: String,
    pub html: String,
}

/// Expand/collapse control for long messages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollapseToggle {
    pub collapsed: bool,
    /// Height the message is clamped to while collapsed.
    pub clamp_px: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageElement {
    pub id: MessageId,
    pub role: Role,
    pub server_id: Option<RecordId>,
    pub reasoning: Option<ReasoningRegion>,
    pub content: Option<ContentRegion>,
    pub metadata: Option<Metadata>,
    pub footer: Option<String>,
    pub typing: bool,
    pub error: Option<String>,
    pub cancelled: bool,
    pub toggle: Option<CollapseToggle>,
    /// Natural height before any collapse clamp. Excludes the toggle row so
    /// the threshold check sees content only.
    pub height_px: f32,
}

impl MessageElement {
    fn new(id: MessageId, role: Role) -> Self {
        Self {
            id,
            role,
            server_id: None,
            reasoning: None,
            content: None,
            metadata: None,
            footer: None,
            typing: false,
            error: None,
            cancelled: false,
            toggle: None,
            height_px: 0.0,
        }
    }

    pub fn content_text(&self) -> &str {
        self.content.as_ref().map(|c| c.text.as_str()).unwrap_or("")
    }

    pub fn reasoning_region(&mut self) -> &mut ReasoningRegion {
        self.reasoning.get_or_insert_with(ReasoningRegion::new)
    }

    pub fn content_region(&mut self) -> &mut ContentRegion {
        self.content.get_or_insert_with(ContentRegion::default)
    }

    pub fn is_collapsed(&self) -> bool {
        self.toggle.map_or(false, |t| t.collapsed)
    }

    /// Height as drawn, honouring the collapse clamp.
    pub fn display_height(&self) -> f32 {
        match self.toggle {
            Some(t) if t.collapsed => self.height_px.min(t.clamp_px),
            _ => self.height_px,
        }
    }
}

/// Measures the natural height of a message.
pub trait Layout: Send {
    fn measure(&self, message: &MessageElement) -> f32;
}

/// Estimates height from wrapped line counts.
#[derive(Debug, Clone)]
pub struct TextMetrics {
    pub line_height: f32,
    pub chars_per_line: usize,
    pub padding: f32,
}

impl Default for TextMetrics {
    fn default() -> Self {
        Self {
            line_height: 20.0,
            chars_per_line: 80,
            padding: 16.0,
        }
    }
}

impl TextMetrics {
    fn lines(&self, text: &str) -> usize {
        let cpl = self.chars_per_line.max(1);
        text.lines()
            .map(|line| line.chars().count().div_ceil(cpl).max(1))
            .sum()
    }
}

impl Layout for TextMetrics {
    fn measure(&self, message: &MessageElement) -> f32 {
        let mut lines = 0;
        if let Some(reasoning) = &message.reasoning {
            // header row, plus the body while expanded
            lines += 1;
            if reasoning.expanded {
                lines += self.lines(&reasoning.text);
            }
        }
        if let Some(content) = &message.content {
            lines += self.lines(&content.text);
        }
        if let Some(error) = &message.error {
            lines += self.lines(error);
        }
        if message.footer.is_some() {
            lines += 1;
        }
        if message.typing {
            lines += 1;
        }
        lines as f32 * self.line_height + self.padding
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollState {
    pub offset: f32,
    pub viewport: f32,
    pub content: f32,
}

impl ScrollState {
    pub fn max_offset(&self) -> f32 {
        (self.content - self.viewport).max(0.0)
    }

    pub fn is_near_bottom(&self, slack: f32) -> bool {
        self.max_offset() - self.offset <= slack
    }

    pub fn scroll_to_bottom(&mut self) {
        self.offset = self.max_offset();
    }

    /// User-initiated scroll.
    pub fn scroll_by(&mut self, delta: f32) {
        self.offset = (self.offset + delta).clamp(0.0, self.max_offset());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Added(MessageId),
    Updated(MessageId),
    Removed(MessageId),
}

pub struct ChatLog {
    messages: Vec<MessageElement>,
    next_id: MessageId,
    mutations: Vec<Mutation>,
    scroll: ScrollState,
    layout: Box<dyn Layout>,
}

impl Default for ChatLog {
    fn default() -> Self {
        Self::new(Box::new(TextMetrics::default()), 600.0)
    }
}

impl ChatLog {
    pub fn new(layout: Box<dyn Layout>, viewport_px: f32) -> Self {
        Self {
            messages: Vec::new(),
            next_id: 1,
            mutations: Vec::new(),
            scroll: ScrollState {
                viewport: viewport_px,
                ..Default::default()
            },
            layout,
        }
    }

    pub fn messages(&self) -> &[MessageElement] {
        &self.messages
    }

    pub fn get(&self, id: MessageId) -> Option<&MessageElement> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn scroll(&self) -> &ScrollState {
        &self.scroll
    }

    pub fn scroll_mut(&mut self) -> &mut ScrollState {
        &mut self.scroll
    }

    pub fn push_user(&mut self, text: &str, html: String) -> MessageId {
        self.push_with(Role::User, |m| {
            m.content = Some(ContentRegion {
                text: text.to_string(),
                html,
            });
        })
    }

    /// Empty assistant message showing the typing indicator.
    pub fn push_placeholder(&mut self) -> MessageId {
        self.push_with(Role::Assistant, |m| m.typing = true)
    }

    pub fn push_with<F>(&mut self, role: Role, init: F) -> MessageId
    where
        F: FnOnce(&mut MessageElement),
    {
        let id = self.next_id;
        self.next_id += 1;
        let was_near = self.scroll.is_near_bottom(0.5);

        let mut message = MessageElement::new(id, role);
        init(&mut message);
        message.height_px = self.layout.measure(&message);
        self.messages.push(message);
        self.mutations.push(Mutation::Added(id));

        self.recompute_content_height();
        if was_near {
            self.scroll.scroll_to_bottom();
        }
        id
    }

    /// Mutate one message, remeasure it and apply the scroll policy.
    ///
    /// Returns `false` (and logs) when the message no longer exists.
    pub fn update<F>(&mut self, id: MessageId, policy: ScrollPolicy, slack: f32, f: F) -> bool
    where
        F: FnOnce(&mut MessageElement),
    {
        let was_near = self.scroll.is_near_bottom(slack);
        let layout = &self.layout;
        let Some(message) = self.messages.iter_mut().find(|m| m.id == id) else {
            tracing::warn!(message = id, "message element not found, skipping update");
            return false;
        };
        f(message);
        message.height_px = layout.measure(message);
        self.mutations.push(Mutation::Updated(id));
        self.recompute_content_height();

        match policy {
            ScrollPolicy::Always => self.scroll.scroll_to_bottom(),
            ScrollPolicy::WhenNearBottom if was_near => self.scroll.scroll_to_bottom(),
            _ => self.scroll.offset = self.scroll.offset.min(self.scroll.max_offset()),
        }
        true
    }

    pub fn clear(&mut self) {
        for m in self.messages.drain(..) {
            self.mutations.push(Mutation::Removed(m.id));
        }
        self.scroll.content = 0.0;
        self.scroll.offset = 0.0;
    }

    /// Drain pending mutation records.
    pub fn take_mutations(&mut self) -> Vec<Mutation> {
        std::mem::take(&mut self.mutations)
    }

    fn recompute_content_height(&mut self) {
        self.scroll.content = self.messages.iter().map(|m| m.display_height()).sum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every message is as tall as its content text in characters.
    struct CharHeight;

    impl Layout for CharHeight {
        fn measure(&self, message: &MessageElement) -> f32 {
            message.content_text().chars().count() as f32
        }
    }

    fn log() -> ChatLog {
        ChatLog::new(Box::new(CharHeight), 10.0)
    }

    #[test]
    fn test_push_records_mutations() {
        let mut log = log();
        let a = log.push_user("hi", "hi".into());
        let b = log.push_placeholder();
        assert_eq!(
            log.take_mutations(),
            vec![Mutation::Added(a), Mutation::Added(b)]
        );
        assert!(log.take_mutations().is_empty());
        assert!(log.get(b).unwrap().typing);
    }

    #[test]
    fn test_update_missing_message_is_noop() {
        let mut log = log();
        assert!(!log.update(99, ScrollPolicy::Always, 0.0, |m| m.typing = true));
        assert!(log.take_mutations().is_empty());
    }

    #[test]
    fn test_follow_only_when_near_bottom() {
        let mut log = log();
        let id = log.push_placeholder();
        log.update(id, ScrollPolicy::WhenNearBottom, 1.0, |m| {
            m.content_region().text = "x".repeat(30);
        });
        assert_eq!(log.scroll().offset, 20.0);

        // user scrolls up; further output must not pull the view down
        log.scroll_mut().scroll_by(-15.0);
        log.update(id, ScrollPolicy::WhenNearBottom, 1.0, |m| {
            m.content_region().text = "x".repeat(50);
        });
        assert_eq!(log.scroll().offset, 5.0);

        log.update(id, ScrollPolicy::Always, 1.0, |m| {
            m.content_region().text = "x".repeat(60);
        });
        assert_eq!(log.scroll().offset, 50.0);
    }

    #[test]
    fn test_collapsed_display_height() {
        let mut log = log();
        let id = log.push_user(&"y".repeat(300), String::new());
        log.update(id, ScrollPolicy::Never, 0.0, |m| {
            m.toggle = Some(CollapseToggle {
                collapsed: true,
                clamp_px: 200.0,
            })
        });
        let m = log.get(id).unwrap();
        assert_eq!(m.height_px, 300.0);
        assert_eq!(m.display_height(), 200.0);
        assert_eq!(log.scroll().content, 200.0);
    }

    #[test]
    fn test_text_metrics_wraps_lines() {
        let metrics = TextMetrics {
            line_height: 10.0,
            chars_per_line: 4,
            padding: 0.0,
        };
        let mut m = MessageElement::new(1, Role::User);
        m.content = Some(ContentRegion {
            text: "abcdefgh\n\nxy".into(),
            html: String::new(),
        });
        // 2 wrapped lines + blank line + 1 line
        assert_eq!(metrics.measure(&m), 40.0);
    }
}
