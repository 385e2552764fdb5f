//! Collapse controls for long messages.
//!
//! Messages at or above the height threshold get one toggle and start
//! collapsed; shorter ones get none, and a toggle left over from before an
//! edit is removed. The controller observes [`ChatLog`] mutation records,
//! but its own edits also produce records, so it raises a suppress flag
//! while mutating. The flag drops at the next frame boundary
//! ([`CollapseController::frame_tick`]); records queued until then are
//! discarded.

use shared::settings::ScrollPolicy;

use crate::view::{ChatLog, CollapseToggle, MessageId, Mutation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollapseChange {
    Unchanged,
    Added,
    Removed,
}

#[derive(Debug)]
pub struct CollapseController {
    threshold_px: f32,
    suppressed: bool,
}

impl CollapseController {
    pub fn new(threshold_px: f32) -> Self {
        Self {
            threshold_px,
            suppressed: false,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    /// Observer callback: re-check every message named in pending records.
    pub fn observe(&mut self, log: &mut ChatLog) {
        let records = log.take_mutations();
        if self.suppressed {
            tracing::trace!(dropped = records.len(), "observer suppressed");
            return;
        }

        let mut targets: Vec<MessageId> = Vec::new();
        for record in records {
            if let Mutation::Added(id) | Mutation::Updated(id) = record {
                if !targets.contains(&id) {
                    targets.push(id);
                }
            }
        }
        for id in targets {
            self.check(log, id);
        }
    }

    /// Animation-frame boundary: resume observation.
    pub fn frame_tick(&mut self, log: &mut ChatLog) {
        if self.suppressed {
            log.take_mutations();
            self.suppressed = false;
        }
    }

    /// Add or remove the toggle on one message. Idempotent.
    pub fn check(&mut self, log: &mut ChatLog, id: MessageId) -> CollapseChange {
        let Some(message) = log.get(id) else {
            tracing::warn!(message = id, "collapse check on missing message");
            return CollapseChange::Unchanged;
        };
        let tall = message.height_px >= self.threshold_px;
        let change = match (tall, message.toggle.is_some()) {
            (true, false) => CollapseChange::Added,
            (false, true) => CollapseChange::Removed,
            _ => return CollapseChange::Unchanged,
        };

        self.suppressed = true;
        let clamp_px = self.threshold_px;
        log.update(id, ScrollPolicy::Never, 0.0, |m| match change {
            CollapseChange::Added => {
                m.toggle = Some(CollapseToggle {
                    collapsed: true,
                    clamp_px,
                })
            }
            _ => m.toggle = None,
        });
        tracing::debug!(message = id, ?change, "collapse control updated");
        change
    }

    pub fn check_all(&mut self, log: &mut ChatLog) {
        let ids: Vec<MessageId> = log.messages().iter().map(|m| m.id).collect();
        for id in ids {
            self.check(log, id);
        }
    }

    /// User clicked the toggle. Returns the new collapsed state, or `None` if
    /// the message has no toggle.
    pub fn toggle(&mut self, log: &mut ChatLog, id: MessageId) -> Option<bool> {
        let collapsed = !log.get(id)?.toggle?.collapsed;
        self.suppressed = true;
        log.update(id, ScrollPolicy::Never, 0.0, |m| {
            if let Some(t) = m.toggle.as_mut() {
                t.collapsed = collapsed;
            }
        });
        Some(collapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{Layout, MessageElement};

    /// Height equals content length in characters.
    struct CharHeight;

    impl Layout for CharHeight {
        fn measure(&self, message: &MessageElement) -> f32 {
            message.content_text().chars().count() as f32
        }
    }

    fn log_with(len: usize) -> (ChatLog, MessageId) {
        let mut log = ChatLog::new(Box::new(CharHeight), 100.0);
        let id = log.push_user(&"x".repeat(len), String::new());
        (log, id)
    }

    #[test]
    fn test_short_message_gets_no_toggle() {
        let (mut log, id) = log_with(199);
        let mut c = CollapseController::new(200.0);
        c.observe(&mut log);
        assert!(log.get(id).unwrap().toggle.is_none());
        assert!(!c.is_suppressed());
    }

    #[test]
    fn test_threshold_is_inclusive_and_idempotent() {
        let (mut log, id) = log_with(200);
        let mut c = CollapseController::new(200.0);
        assert_eq!(c.check(&mut log, id), CollapseChange::Added);
        for _ in 0..3 {
            assert_eq!(c.check(&mut log, id), CollapseChange::Unchanged);
            c.check_all(&mut log);
        }
        let m = log.get(id).unwrap();
        assert!(m.is_collapsed());
        assert_eq!(m.display_height(), 200.0);
    }

    #[test]
    fn test_own_mutations_do_not_retrigger() {
        let (mut log, id) = log_with(300);
        let mut c = CollapseController::new(200.0);

        c.observe(&mut log);
        assert!(c.is_suppressed());
        assert!(log.get(id).unwrap().toggle.is_some());

        // the toggle insertion queued a record; it is dropped while suppressed
        c.observe(&mut log);
        assert!(log.take_mutations().is_empty());

        c.frame_tick(&mut log);
        assert!(!c.is_suppressed());
    }

    #[test]
    fn test_stale_toggle_removed_after_shrink() {
        let (mut log, id) = log_with(300);
        let mut c = CollapseController::new(200.0);
        c.check(&mut log, id);
        c.frame_tick(&mut log);

        log.update(id, ScrollPolicy::Never, 0.0, |m| {
            m.content_region().text = "short".into()
        });
        c.observe(&mut log);
        assert!(log.get(id).unwrap().toggle.is_none());
    }

    #[test]
    fn test_text_metrics_shrink_just_below_threshold() {
        let mut log = ChatLog::default();
        let lines = |n: usize| (1..=n).map(|i| format!("row {}", i)).collect::<Vec<_>>().join("\n");
        let id = log.push_user(&lines(20), String::new());
        let mut c = CollapseController::new(200.0);
        assert_eq!(c.check(&mut log, id), CollapseChange::Added);
        c.frame_tick(&mut log);

        // 9 rows * 20px + 16px padding = 196px, the toggle row doesn't count
        log.update(id, ScrollPolicy::Never, 0.0, |m| {
            m.content_region().text = lines(9)
        });
        assert_eq!(log.get(id).unwrap().height_px, 196.0);
        c.observe(&mut log);
        assert!(log.get(id).unwrap().toggle.is_none());

        log.update(id, ScrollPolicy::Never, 0.0, |m| {
            m.content_region().text = lines(10)
        });
        c.frame_tick(&mut log);
        assert_eq!(c.check(&mut log, id), CollapseChange::Added);
    }

    #[test]
    fn test_toggle_flips_presentation() {
        let (mut log, id) = log_with(300);
        let mut c = CollapseController::new(200.0);
        c.check(&mut log, id);
        assert_eq!(c.toggle(&mut log, id), Some(false));
        assert_eq!(log.get(id).unwrap().display_height(), 300.0);
        assert_eq!(c.toggle(&mut log, id), Some(true));
        assert_eq!(log.get(id).unwrap().display_height(), 200.0);

        let (mut short, sid) = log_with(10);
        assert_eq!(c.toggle(&mut short, sid), None);
    }
}
