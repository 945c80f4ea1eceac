use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::session::AssessmentSession;

/// Shared application state for HTTP handlers.
///
/// At most one session is live at a time; `connect_cancel` lets a stop
/// request cancel a connect that is still in flight, and `start_lock`
/// serializes establishment so overlapping starts cannot race past the
/// teardown of the previous session.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub session: Arc<RwLock<Option<Arc<AssessmentSession>>>>,
    pub connect_cancel: Arc<Mutex<Option<Arc<AtomicBool>>>>,
    start_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            session: Arc::new(RwLock::new(None)),
            connect_cancel: Arc::new(Mutex::new(None)),
            start_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Establish a session through the supplied connect function.
    ///
    /// The start lock is held across the whole take -> connect -> store
    /// sequence, so a second start waits and then displaces the stored
    /// session through the same teardown path instead of overwriting a
    /// live one. Returns `Ok(None)` when a stop request cancelled the
    /// connect after it completed.
    pub async fn establish_session<F, Fut>(
        &self,
        connect: F,
    ) -> Result<Option<Arc<AssessmentSession>>>
    where
        F: FnOnce(Arc<AtomicBool>) -> Fut,
        Fut: Future<Output = Result<Arc<AssessmentSession>>>,
    {
        let _establishing = self.start_lock.lock().await;

        if let Some(old) = self.session.write().await.take() {
            info!(session_id = %old.session_id(), "tearing down previous session");
            old.stop().await;
        }

        let cancel = Arc::new(AtomicBool::new(false));
        *self.connect_cancel.lock().await = Some(Arc::clone(&cancel));

        let result = connect(Arc::clone(&cancel)).await;

        *self.connect_cancel.lock().await = None;

        let new_session = result?;
        *self.session.write().await = Some(Arc::clone(&new_session));

        // A stop that raced the store wins.
        if cancel.load(Ordering::SeqCst) {
            if let Some(cancelled) = self.session.write().await.take() {
                cancelled.stop().await;
            }
            return Ok(None);
        }

        Ok(Some(new_session))
    }
}
