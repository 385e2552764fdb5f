//! Ties the store, attachments, presets and the chat log to the HTTP
//! clients. One send is in flight at a time.

use futures::future::{AbortHandle, Abortable};
use parking_lot::{Mutex, RwLock};
use providers::chat::ChatClient;
use providers::endpoints::ApiClient;
use shared::api::{ConversationSummary, ModelInfo, Rating, ShareLink};
use shared::chat::ChatRequest;
use shared::events::RecordId;
use shared::settings::{ClientSettings, PresetBinding, ScrollPolicy};
use shared::ChatError;
use std::sync::Arc;
use std::time::Duration;

use crate::attachments::AttachmentPreparer;
use crate::collapse::CollapseController;
use crate::consumer::{RenderState, ResponseConsumer};
use crate::format;
use crate::presets::PresetRegistry;
use crate::state::AppStore;
use crate::view::{ChatLog, ContentRegion, MessageElement, MessageId, Role};

/// Front-end hook called after every change to a message.
///
/// Runs with no controller lock held and gets a copy of the message, so it
/// may read the log back.
pub trait ViewListener: Send + Sync {
    fn message_updated(&self, message: &MessageElement);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub user: MessageId,
    pub reply: MessageId,
    pub status: ReplyStatus,
    pub state: RenderState,
}

pub struct ChatController {
    settings: ClientSettings,
    chat: ChatClient,
    api: ApiClient,
    store: AppStore,
    presets: RwLock<PresetRegistry>,
    attachments: Mutex<AttachmentPreparer>,
    log: Arc<Mutex<ChatLog>>,
    collapse: Mutex<CollapseController>,
    send_lock: tokio::sync::Mutex<()>,
    in_flight: Mutex<Option<AbortHandle>>,
    listener: Option<Arc<dyn ViewListener>>,
}

impl ChatController {
    pub fn new(settings: ClientSettings) -> Result<Self, ChatError> {
        Self::with_log(settings, ChatLog::default())
    }

    pub fn with_log(settings: ClientSettings, log: ChatLog) -> Result<Self, ChatError> {
        let http = providers::build_http_client()?;
        let base_url = providers::parse_base_url(&settings.base_url)?;
        let timeout = Duration::from_secs(settings.request_timeout_secs);

        let presets = PresetRegistry::from_settings(&settings);
        let store = AppStore::default();
        if let Some(slot) = settings.default_preset.as_deref() {
            match presets.resolve(slot) {
                Ok(binding) => {
                    store.select_model(Some(binding.slot.clone()), binding.model_id.clone());
                }
                Err(e) => tracing::warn!(error = %e, "default preset ignored"),
            }
        }

        Ok(Self {
            chat: ChatClient::new(http.clone(), base_url.clone()),
            api: ApiClient::new(http, base_url, timeout),
            store,
            presets: RwLock::new(presets),
            attachments: Mutex::new(AttachmentPreparer::new()),
            log: Arc::new(Mutex::new(log)),
            collapse: Mutex::new(CollapseController::new(settings.collapse_threshold_px)),
            send_lock: tokio::sync::Mutex::new(()),
            in_flight: Mutex::new(None),
            listener: None,
            settings,
        })
    }

    pub fn with_listener(mut self, listener: Arc<dyn ViewListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn store(&self) -> &AppStore {
        &self.store
    }

    pub fn log(&self) -> Arc<Mutex<ChatLog>> {
        Arc::clone(&self.log)
    }

    pub fn attachments(&self) -> parking_lot::MutexGuard<'_, AttachmentPreparer> {
        self.attachments.lock()
    }

    /// Send one user message and stream the reply into the log.
    ///
    /// Capability and attachment problems are returned before anything is
    /// shown or sent. Failures after that are rendered in the reply and
    /// also returned.
    pub async fn send(&self, text: &str) -> Result<SendOutcome, ChatError> {
        let _turn = self.send_lock.lock().await;

        let session = self.store.snapshot();
        let attachments = self.attachments.lock().attachments();
        if let Some(model_id) = session.model_id.as_deref() {
            self.presets.read().check_attachments(model_id, &attachments)?;
        }
        let request = ChatRequest::new(
            text.to_string(),
            session.model_id.clone(),
            session.conversation_id.clone(),
            attachments,
        );

        let (user, reply, snapshots) = {
            let mut log = self.log.lock();
            // a new turn is a frame boundary; records held back while the
            // collapse controller was suppressed are re-checked in `settle`
            self.collapse.lock().frame_tick(&mut log);
            let user = log.push_user(text, format::render(text));
            let reply = log.push_placeholder();
            self.observe(&mut log);
            let snapshots = [self.snapshot(&log, user), self.snapshot(&log, reply)];
            (user, reply, snapshots)
        };
        snapshots.into_iter().for_each(|s| self.notify(s));

        let (handle, registration) = AbortHandle::new_pair();
        *self.in_flight.lock() = Some(handle);
        let consumer = ResponseConsumer::new(
            reply,
            self.settings.scroll_policy,
            self.settings.near_bottom_px,
        );
        let result = Abortable::new(self.stream_reply(&request, consumer), registration).await;
        self.in_flight.lock().take();

        let outcome = match result {
            Ok(Ok(state)) => {
                if let Some(id) = state
                    .metadata
                    .as_ref()
                    .and_then(|m| m.conversation_id.as_ref())
                    .map(ToString::to_string)
                {
                    if self.store.set_conversation(Some(id.clone())) {
                        tracing::info!(conversation = %id, "conversation started");
                    }
                }
                SendOutcome {
                    user,
                    reply,
                    status: ReplyStatus::Completed,
                    state,
                }
            }
            Ok(Err(e)) => {
                self.settle(reply);
                return Err(e);
            }
            Err(_aborted) => {
                tracing::info!(message = reply, "response cancelled");
                let (state, snapshot) = {
                    let mut log = self.log.lock();
                    log.update(reply, ScrollPolicy::Never, 0.0, |m| {
                        m.typing = false;
                        m.cancelled = true;
                    });
                    self.observe(&mut log);
                    let state = log
                        .get(reply)
                        .map(RenderState::from_message)
                        .unwrap_or_default();
                    (state, self.snapshot(&log, reply))
                };
                self.notify(snapshot);
                SendOutcome {
                    user,
                    reply,
                    status: ReplyStatus::Cancelled,
                    state,
                }
            }
        };
        self.settle(reply);
        Ok(outcome)
    }

    async fn stream_reply(
        &self,
        request: &ChatRequest,
        mut consumer: ResponseConsumer,
    ) -> Result<RenderState, ChatError> {
        let opened = self.chat.open_stream(request).await;
        let mut stream = match self.track_auth(opened) {
            Ok(stream) => stream,
            Err(e) => {
                let snapshot = {
                    let mut log = self.log.lock();
                    consumer.fail(&mut log, &e);
                    self.observe(&mut log);
                    self.snapshot(&log, consumer.target())
                };
                self.notify(snapshot);
                return Err(e);
            }
        };
        // dispatched: attachments belong to this request now
        self.attachments.lock().clear_all();

        consumer
            .drive(
                &mut stream,
                &self.log,
                |log, _| self.observe(log),
                |message| {
                    if let Some(listener) = &self.listener {
                        listener.message_updated(message);
                    }
                },
            )
            .await
    }

    fn observe(&self, log: &mut ChatLog) {
        self.collapse.lock().observe(log);
    }

    /// Copy of a message for the listener, taken while the log is locked.
    fn snapshot(&self, log: &ChatLog, id: MessageId) -> Option<MessageElement> {
        self.listener.as_ref()?;
        log.get(id).cloned()
    }

    fn notify(&self, snapshot: Option<MessageElement>) {
        if let (Some(listener), Some(message)) = (&self.listener, snapshot) {
            listener.message_updated(&message);
        }
    }

    /// Keep the logged-in flag in step with what the server says.
    fn track_auth<T>(&self, result: Result<T, ChatError>) -> Result<T, ChatError> {
        match &result {
            Ok(_) => {
                self.store.set_logged_in(true);
            }
            Err(ChatError::Status {
                status: 401 | 403, ..
            }) => {
                if self.store.set_logged_in(false) {
                    tracing::info!("session no longer signed in");
                }
            }
            Err(_) => {}
        }
        result
    }

    /// Final collapse pass once a reply stops changing. Checks every
    /// message, so ones whose records were dropped while suppressed are
    /// not missed.
    fn settle(&self, reply: MessageId) {
        let snapshot = {
            let mut log = self.log.lock();
            let mut collapse = self.collapse.lock();
            collapse.frame_tick(&mut log);
            collapse.check_all(&mut log);
            self.snapshot(&log, reply)
        };
        self.notify(snapshot);
    }

    /// Abort the in-flight response, if any. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        match self.in_flight.lock().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Animation-frame boundary for front-ends that have one.
    pub fn frame(&self) {
        let mut log = self.log.lock();
        let mut collapse = self.collapse.lock();
        collapse.observe(&mut log);
        collapse.frame_tick(&mut log);
    }

    pub fn toggle_collapse(&self, id: MessageId) -> Option<bool> {
        let mut log = self.log.lock();
        self.collapse.lock().toggle(&mut log, id)
    }

    pub fn presets(&self) -> Vec<PresetBinding> {
        self.presets.read().presets().to_vec()
    }

    pub fn select_preset(&self, slot: &str) -> Result<PresetBinding, ChatError> {
        let binding = self.presets.read().resolve(slot)?.clone();
        self.store
            .select_model(Some(binding.slot.clone()), binding.model_id.clone());
        tracing::debug!(slot, model = %binding.model_id, "preset selected");
        Ok(binding)
    }

    /// Presets whose model accepts the attachments gathered so far.
    pub fn compatible_presets(&self) -> Vec<PresetBinding> {
        let attachments = self.attachments.lock().attachments();
        self.presets
            .read()
            .compatible(&attachments)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn select_model(&self, model_id: &str) {
        self.store.select_model(None, model_id.to_string());
    }

    /// Persist the current model as the account default.
    pub async fn remember_model(&self) -> Result<(), ChatError> {
        match self.store.snapshot().model_id {
            Some(model_id) => self.api.save_model_preference(&model_id).await,
            None => Ok(()),
        }
    }

    pub async fn forget_model(&self) -> Result<(), ChatError> {
        self.api.reset_model_preference().await?;
        self.store.clear_model();
        Ok(())
    }

    /// Replace the capability catalogue with the server's model list.
    pub async fn refresh_models(&self) -> Result<Vec<ModelInfo>, ChatError> {
        let models = self.track_auth(self.api.list_models().await)?;
        self.presets.write().set_models(models.clone());
        tracing::debug!(count = models.len(), "model catalogue refreshed");
        Ok(models)
    }

    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ChatError> {
        self.track_auth(self.api.list_conversations().await)
    }

    /// Switch to a stored conversation, cancelling any in-flight reply and
    /// replacing the log with its history.
    pub async fn open_conversation(&self, conversation_id: &str) -> Result<usize, ChatError> {
        self.cancel();
        let history = self.track_auth(self.api.load_messages(conversation_id).await)?;
        self.store.set_conversation(Some(conversation_id.to_string()));

        let mut log = self.log.lock();
        log.clear();
        let mut loaded = Vec::with_capacity(history.len());
        for stored in &history {
            let role = if stored.role == "user" {
                Role::User
            } else {
                Role::Assistant
            };
            let id = log.push_with(role, |m| {
                m.server_id = Some(stored.id.clone());
                if let Some(reasoning) = stored.reasoning.as_deref() {
                    let region = m.reasoning_region();
                    region.text = reasoning.to_string();
                    region.html = format::render(reasoning);
                    region.expanded = false;
                }
                m.content = Some(ContentRegion {
                    text: stored.content.clone(),
                    html: format::render(&stored.content),
                });
                m.footer = stored.model_used.as_ref().map(|model| format!("Model: {}", model));
            });
            loaded.push(id);
        }
        {
            let mut collapse = self.collapse.lock();
            collapse.frame_tick(&mut log);
            collapse.check_all(&mut log);
        }
        let snapshots: Vec<_> = loaded.iter().map(|id| self.snapshot(&log, *id)).collect();
        drop(log);
        snapshots.into_iter().for_each(|s| self.notify(s));

        tracing::info!(conversation = conversation_id, messages = history.len(), "conversation loaded");
        Ok(history.len())
    }

    /// Start a fresh conversation on the next send.
    pub fn new_conversation(&self) {
        self.cancel();
        self.store.set_conversation(None);
        self.log.lock().clear();
    }

    pub async fn rate(&self, message: &RecordId, rating: Rating) -> Result<(), ChatError> {
        self.api.rate_message(&message.to_string(), rating).await
    }

    pub async fn share(&self) -> Result<Option<ShareLink>, ChatError> {
        match self.store.conversation_id() {
            Some(id) => self.api.create_share_link(&id).await.map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ClientSettings {
        ClientSettings {
            base_url: "http://127.0.0.1:9".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_preset_selects_model() {
        let mut s = settings();
        s.default_preset = Some("reasoning".into());
        let c = ChatController::new(s).unwrap();
        let snap = c.store().snapshot();
        assert_eq!(snap.preset.as_deref(), Some("reasoning"));
        assert_eq!(snap.model_id.as_deref(), Some("o3-mini"));
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let mut s = settings();
        s.base_url = "not a url".into();
        assert!(matches!(
            ChatController::new(s),
            Err(ChatError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_select_preset_unknown_slot() {
        let c = ChatController::new(settings()).unwrap();
        assert!(c.select_preset("turbo").is_err());
        assert_eq!(c.select_preset("fast").unwrap().model_id, "gpt-4o-mini");
        assert_eq!(c.store().snapshot().model_id.as_deref(), Some("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn test_capability_rejection_shows_nothing() {
        let c = ChatController::new(settings()).unwrap();
        c.select_preset("fast").unwrap();
        c.attachments()
            .add_pdf("data:application/pdf;base64,JVBE", "a.pdf")
            .unwrap();

        let err = c.send("summarize").await.unwrap_err();
        assert!(err.is_pre_dispatch());
        assert!(c.log().lock().messages().is_empty());
        assert!(!c.attachments().is_empty());

        let slots: Vec<String> = c.compatible_presets().into_iter().map(|p| p.slot).collect();
        assert_eq!(slots, vec!["smart", "vision"]);
    }

    #[test]
    fn test_cancel_without_send() {
        let c = ChatController::new(settings()).unwrap();
        assert!(!c.cancel());
    }
}
