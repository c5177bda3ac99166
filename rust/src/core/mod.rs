mod composing;
mod config;
mod loading;

use std::future::Future;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use flume::Sender;

use crate::actions::AppAction;
use crate::api::{ApiError, ChatApi, HttpChatApi};
use crate::conversation::message::MessageId;
use crate::conversation::Conversation;
use crate::realtime::{SharedRealtimeConnector, Subscription};
use crate::state::{AppState, LoadState};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent, PageKind};

pub(crate) use config::default_app_config_json;

/// Everything that lives exactly as long as one open conversation screen.
#[derive(Debug)]
struct OpenConversation {
    // Results and timers stamped with another session belong to a screen that is gone.
    session: u64,
    conversation: Conversation,
    subscription: Subscription,
    refresh_in_flight: bool,
}

pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: config::AppConfig,
    runtime: tokio::runtime::Runtime,
    api: Option<Arc<dyn ChatApi>>,
    realtime: SharedRealtimeConnector,

    open: Option<OpenConversation>,
    last_session: u64,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        current_user_id: String,
        shared_state: Arc<RwLock<AppState>>,
        api: Option<Arc<dyn ChatApi>>,
        realtime: SharedRealtimeConnector,
    ) -> Self {
        let config = config::load_app_config(&data_dir);
        let state = AppState::empty(current_user_id);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let api = api.or_else(|| {
            match HttpChatApi::new(
                config.api_base_url(),
                config.access_token.clone(),
                config.network_enabled(),
            ) {
                Ok(http) => Some(Arc::new(http) as Arc<dyn ChatApi>),
                Err(e) => {
                    tracing::error!(err = %e, "chat api client unavailable");
                    None
                }
            }
        });

        let this = Self {
            state,
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            api,
            realtime,
            open: None,
            last_session: 0,
        };

        // Ensure FfiApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.state.conversation = self.open.as_ref().map(|o| o.conversation.view());
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn emit_jump(&mut self, message_id: String, index: Option<u32>) {
        let rev = self.next_rev();
        // Keep snapshot rev in sync with the update stream even though this is a side-effect update.
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::JumpRequested {
            rev,
            message_id,
            index,
        });
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Keep toast in state until the UI explicitly clears it.
        self.state.toast = Some(msg.into());
        self.emit_state();
    }

    fn open_for(&mut self, session: u64) -> Option<&mut OpenConversation> {
        match self.open.as_mut() {
            Some(open) if open.session == session => Some(open),
            _ => {
                tracing::debug!(session, "dropping result for a closed conversation");
                None
            }
        }
    }

    /// Run one API call on the runtime and post its result back to the actor.
    fn spawn_api<T, F, Fut>(
        &self,
        call: F,
        complete: impl FnOnce(Result<T, ApiError>) -> InternalEvent + Send + 'static,
    ) where
        T: Send + 'static,
        F: FnOnce(Arc<dyn ChatApi>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let api = self.api.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = match api {
                Some(api) => call(api).await,
                None => Err(ApiError::Network("chat api unavailable".to_string())),
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(complete(result))));
        });
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(ref action) => {
                // Never log `?action` directly: it carries draft text.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action.clone());
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::PageLoaded {
                session,
                kind,
                result,
            } => self.handle_page_loaded(session, kind, result),
            InternalEvent::SendResult {
                session,
                local_id,
                result,
            } => self.handle_send_result(session, local_id, result),
            InternalEvent::ReactionResult {
                session,
                delta,
                result,
            } => self.handle_reaction_result(session, delta, result),
            InternalEvent::MarkReadResult { session, result } => {
                self.handle_mark_read_result(session, result)
            }
            InternalEvent::UploadResult {
                session,
                local_uri,
                result,
            } => self.handle_upload_result(session, local_uri, result),
            InternalEvent::HighlightExpired { session, token } => {
                let Some(open) = self.open_for(session) else {
                    return;
                };
                if open.conversation.expire_highlight(token) {
                    self.emit_state();
                }
            }
            InternalEvent::RealtimeChangeReceived { change } => self.handle_realtime_change(change),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::OpenConversation {
                conversation_id,
                peer_id,
            } => self.open_conversation(conversation_id, peer_id),
            AppAction::CloseConversation => self.close_conversation(),
            AppAction::RetryLoad => self.retry_load(),
            AppAction::RefreshConversation | AppAction::Foregrounded => {
                // Native should send lifecycle signals as actions. Rust owns all state changes.
                self.refresh_conversation()
            }
            AppAction::LoadOlderMessages => self.load_older(),
            AppAction::MarkRead => self.mark_read(),
            AppAction::UpdateDraft { text } => self.update_draft(&text),
            AppAction::SetReplyTarget { message_id } => {
                self.set_reply_target(&MessageId::from_key(&message_id))
            }
            AppAction::ClearReplyTarget => self.clear_reply_target(),
            AppAction::AddAttachment { local_uri } => self.add_attachment(local_uri),
            AppAction::RetryAttachment { local_uri } => self.retry_attachment(local_uri),
            AppAction::RemoveAttachment { local_uri } => self.remove_attachment(&local_uri),
            AppAction::SendMessage => self.send_message(),
            AppAction::RetryMessage { message_id } => {
                self.retry_message(&MessageId::from_key(&message_id))
            }
            AppAction::DiscardMessage { message_id } => {
                self.discard_message(&MessageId::from_key(&message_id))
            }
            AppAction::ToggleReaction { message_id, emoji } => {
                self.toggle_reaction(&MessageId::from_key(&message_id), &emoji)
            }
            AppAction::JumpToMessage { message_id } => {
                self.jump_to_message(&MessageId::from_key(&message_id))
            }
            AppAction::ClearToast => {
                if self.state.toast.is_some() {
                    self.state.toast = None;
                    self.emit_state();
                }
            }
        }
    }
}
