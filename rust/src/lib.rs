mod actions;
pub mod api;
pub mod conversation;
mod core;
mod logging;
pub mod realtime;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use api::{ApiError, ChatApi, HttpChatApi};
pub use realtime::{RealtimeChange, RealtimeConnector};
pub use state::*;
pub use updates::*;

use crate::realtime::SharedRealtimeConnector;

/// Return the default `clario_config.json` payload used when no config file exists.
#[uniffi::export]
pub fn default_config_json() -> String {
    core::default_app_config_json()
}

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

#[derive(uniffi::Object)]
pub struct FfiApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
    realtime_connector: SharedRealtimeConnector,
}

#[uniffi::export]
impl FfiApp {
    #[uniffi::constructor]
    pub fn new(data_dir: String, current_user_id: String) -> Arc<Self> {
        logging::init_logging(&data_dir);
        tracing::info!(data_dir = %data_dir, "FfiApp::new() starting");
        Self::start(data_dir, current_user_id, None)
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    /// Install the host's realtime transport. Takes effect for the next opened conversation.
    pub fn set_realtime_connector(&self, connector: Box<dyn RealtimeConnector>) {
        let connector: Arc<dyn RealtimeConnector> = Arc::from(connector);
        match self.realtime_connector.write() {
            Ok(mut slot) => {
                *slot = Some(connector);
            }
            Err(poison) => {
                *poison.into_inner() = Some(connector);
            }
        }
    }

    /// Feed one row change received on a conversation's realtime channel.
    pub fn ingest_realtime_change(&self, change: RealtimeChange) {
        let _ = self.core_tx.send(CoreMsg::Internal(Box::new(
            InternalEvent::RealtimeChangeReceived { change },
        )));
    }
}

impl FfiApp {
    /// Build an app backed by a caller-supplied `ChatApi` instead of the HTTP client.
    pub fn with_api(data_dir: String, current_user_id: String, api: Arc<dyn ChatApi>) -> Arc<Self> {
        logging::init_logging(&data_dir);
        Self::start(data_dir, current_user_id, Some(api))
    }

    fn start(
        data_dir: String,
        current_user_id: String,
        api: Option<Arc<dyn ChatApi>>,
    ) -> Arc<Self> {
        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty(current_user_id.clone())));
        let realtime_connector: SharedRealtimeConnector = Arc::new(RwLock::new(None));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        let connector_for_core = realtime_connector.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                current_user_id,
                shared_for_core,
                api,
                connector_for_core,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
            realtime_connector,
        })
    }
}
