//! Session state for the chat client.
//!
//! The store is the single source of truth for the current conversation
//! and model selection. Front-ends subscribe to it instead of reading state
//! back out of widgets.

use tokio::sync::watch;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub conversation_id: Option<String>,
    /// Preset slot the user picked, if the model came from one.
    pub preset: Option<String>,
    pub model_id: Option<String>,
    pub logged_in: bool,
}

pub struct AppStore {
    tx: watch::Sender<SessionState>,
}

impl AppStore {
    pub fn new(initial: SessionState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn snapshot(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.tx.borrow().conversation_id.clone()
    }

    /// Returns whether the value changed.
    pub fn set_conversation(&self, conversation_id: Option<String>) -> bool {
        self.tx.send_if_modified(|s| {
            if s.conversation_id == conversation_id {
                return false;
            }
            s.conversation_id = conversation_id;
            true
        })
    }

    pub fn select_model(&self, preset: Option<String>, model_id: String) -> bool {
        self.tx.send_if_modified(|s| {
            if s.preset == preset && s.model_id.as_deref() == Some(model_id.as_str()) {
                return false;
            }
            s.preset = preset;
            s.model_id = Some(model_id);
            true
        })
    }

    pub fn clear_model(&self) -> bool {
        self.tx.send_if_modified(|s| {
            if s.preset.is_none() && s.model_id.is_none() {
                return false;
            }
            s.preset = None;
            s.model_id = None;
            true
        })
    }

    pub fn set_logged_in(&self, logged_in: bool) -> bool {
        self.tx.send_if_modified(|s| {
            let changed = s.logged_in != logged_in;
            s.logged_in = logged_in;
            changed
        })
    }
}

impl Default for AppStore {
    fn default() -> Self {
        Self::new(SessionState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribers_see_changes() {
        let store = AppStore::default();
        let mut rx = store.subscribe();
        assert!(!rx.has_changed().unwrap());

        assert!(store.set_conversation(Some("c1".into())));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().conversation_id.as_deref(), Some("c1"));

        // same value: no notification
        assert!(!store.set_conversation(Some("c1".into())));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_model_selection() {
        let store = AppStore::default();
        assert!(store.select_model(Some("smart".into()), "gpt-4o".into()));
        assert!(!store.select_model(Some("smart".into()), "gpt-4o".into()));

        let snap = store.snapshot();
        assert_eq!(snap.preset.as_deref(), Some("smart"));
        assert_eq!(snap.model_id.as_deref(), Some("gpt-4o"));

        assert!(store.clear_model());
        assert_eq!(store.snapshot().model_id, None);
        assert!(!store.clear_model());
    }

    #[test]
    fn test_logged_in_flag() {
        let store = AppStore::default();
        assert!(store.set_logged_in(true));
        assert!(!store.set_logged_in(true));
        assert!(store.snapshot().logged_in);
    }
}
