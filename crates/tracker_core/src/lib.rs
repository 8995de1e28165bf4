use std::sync::Arc;

use chrono::Utc;
use shared::{
    domain::{Night, NightId, SessionState},
    error::StoreError,
    store::{NightStore, StoreResult},
};
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

mod task_scope;
pub use task_scope::TaskScope;

/// Derived button-enablement signals, recomputed after every state change.
/// Level-triggered: a late subscriber sees the current truth, not an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackerControls {
    pub start_enabled: bool,
    pub stop_enabled: bool,
    pub clear_enabled: bool,
}

/// Mediates the open/closed lifecycle of at most one night at a time.
///
/// All operations run under the controller's [`TaskScope`]; once the scope is
/// cancelled (explicitly via [`close`](Self::close) or by dropping the
/// controller) any operation still awaiting the store is abandoned without
/// mutating state or emitting events, and later invocations are no-ops.
///
/// Callers are expected to await each operation before issuing the next; the
/// internal mutex only guards against an out-of-band caller corrupting state.
pub struct SessionController {
    store: Arc<dyn NightStore>,
    scope: TaskScope,
    tonight: Mutex<Option<Night>>,
    controls_tx: watch::Sender<TrackerControls>,
    history_tx: watch::Sender<Vec<Night>>,
    rate_night_tx: watch::Sender<Option<NightId>>,
    cleared_notice_tx: watch::Sender<bool>,
}

impl SessionController {
    /// Builds the controller and reconciles in-memory state with the store:
    /// if the most recently created night is still open it becomes the
    /// current night, so an open session survives a process restart.
    pub async fn new(store: Arc<dyn NightStore>) -> StoreResult<Self> {
        let tonight = store.most_recent().await?.filter(Night::is_open);
        let history = store.all_nights().await?;

        let controls = TrackerControls {
            start_enabled: tonight.is_none(),
            stop_enabled: tonight.is_some(),
            clear_enabled: !history.is_empty(),
        };
        let (controls_tx, _) = watch::channel(controls);
        let (history_tx, _) = watch::channel(history);
        let (rate_night_tx, _) = watch::channel(None);
        let (cleared_notice_tx, _) = watch::channel(false);

        Ok(Self {
            store,
            scope: TaskScope::new(),
            tonight: Mutex::new(tonight),
            controls_tx,
            history_tx,
            rate_night_tx,
            cleared_notice_tx,
        })
    }

    /// Opens a new night. A second start while a night is already open is
    /// rejected as an explicit no-op.
    pub async fn start_tracking(&self) -> StoreResult<()> {
        self.scope.run(self.start_inner()).await.unwrap_or(Ok(()))
    }

    async fn start_inner(&self) -> StoreResult<()> {
        let mut tonight = self.tonight.lock().await;
        if let Some(open) = tonight.as_ref() {
            warn!(night_id = open.id.0, "start rejected: a night is already open");
            return Ok(());
        }

        let night = match self.store.insert(Utc::now()).await {
            Ok(night) => night,
            Err(err) => {
                error!(%err, "failed to persist new night");
                return Err(err);
            }
        };
        info!(night_id = night.id.0, "night started");
        *tonight = Some(night);
        drop(tonight);

        self.refresh_signals().await
    }

    /// Closes the current night and requests rating navigation for it.
    /// A no-op when no night is open.
    pub async fn stop_tracking(&self) -> StoreResult<()> {
        self.scope.run(self.stop_inner()).await.unwrap_or(Ok(()))
    }

    async fn stop_inner(&self) -> StoreResult<()> {
        let mut tonight = self.tonight.lock().await;
        let Some(open) = tonight.as_ref() else {
            return Ok(());
        };

        let mut closed = open.clone();
        closed.end_time = Utc::now();
        match self.store.update(&closed).await {
            Ok(()) => {}
            Err(StoreError::NotFound(id)) => {
                // The record vanished underneath us; drop the stale
                // reference and emit nothing.
                warn!(night_id = id.0, "open night missing from store at stop");
                *tonight = None;
                drop(tonight);
                return self.refresh_signals().await;
            }
            Err(err) => {
                error!(%err, night_id = closed.id.0, "failed to persist stopped night");
                return Err(err);
            }
        }

        info!(night_id = closed.id.0, "night stopped");
        *tonight = None;
        drop(tonight);

        self.rate_night_tx.send_replace(Some(closed.id));
        self.refresh_signals().await
    }

    /// Deletes every persisted night and raises the one-shot cleared notice.
    pub async fn clear_history(&self) -> StoreResult<()> {
        self.scope.run(self.clear_inner()).await.unwrap_or(Ok(()))
    }

    async fn clear_inner(&self) -> StoreResult<()> {
        if let Err(err) = self.store.clear_all().await {
            error!(%err, "failed to clear night history");
            return Err(err);
        }
        info!("night history cleared");

        *self.tonight.lock().await = None;
        self.cleared_notice_tx.send_replace(true);
        self.refresh_signals().await
    }

    async fn refresh_signals(&self) -> StoreResult<()> {
        let history = self.store.all_nights().await?;
        let open = self.tonight.lock().await.is_some();

        self.controls_tx.send_replace(TrackerControls {
            start_enabled: !open,
            stop_enabled: open,
            clear_enabled: !history.is_empty(),
        });
        self.history_tx.send_replace(history);
        Ok(())
    }

    pub async fn session_state(&self) -> SessionState {
        if self.tonight.lock().await.is_some() {
            SessionState::NightOpen
        } else {
            SessionState::NoOpenNight
        }
    }

    pub fn controls(&self) -> watch::Receiver<TrackerControls> {
        self.controls_tx.subscribe()
    }

    /// Read-only history projection, most recent night first.
    pub fn history(&self) -> watch::Receiver<Vec<Night>> {
        self.history_tx.subscribe()
    }

    /// One-shot "rate this night" event; `Some(id)` until the consumer calls
    /// [`done_navigating`](Self::done_navigating).
    pub fn rate_night(&self) -> watch::Receiver<Option<NightId>> {
        self.rate_night_tx.subscribe()
    }

    /// One-shot "history cleared" notice; `true` until the consumer calls
    /// [`done_showing_notice`](Self::done_showing_notice).
    pub fn cleared_notice(&self) -> watch::Receiver<bool> {
        self.cleared_notice_tx.subscribe()
    }

    pub fn done_navigating(&self) {
        self.rate_night_tx.send_replace(None);
    }

    pub fn done_showing_notice(&self) {
        self.cleared_notice_tx.send_replace(false);
    }

    /// Tears the controller down: in-flight work is abandoned and every later
    /// operation becomes a no-op. Dropping the controller has the same effect.
    pub fn close(&self) {
        self.scope.cancel();
    }
}

/// Applies a rating to one specific, already-closed night.
///
/// Constructed with `None` when there is no night to rate; every operation is
/// then a safe no-op.
pub struct QualityController {
    store: Arc<dyn NightStore>,
    scope: TaskScope,
    night_id: Option<NightId>,
    navigate_back_tx: watch::Sender<bool>,
}

impl QualityController {
    pub fn new(store: Arc<dyn NightStore>, night_id: Option<NightId>) -> Self {
        let (navigate_back_tx, _) = watch::channel(false);
        Self {
            store,
            scope: TaskScope::new(),
            night_id,
            navigate_back_tx,
        }
    }

    /// Fetches the night, stores the rating, and raises the one-shot
    /// "navigate back" event. Unknown or absent night: completes with no
    /// effect and no event.
    pub async fn set_quality(&self, rating: i32) -> StoreResult<()> {
        self.scope
            .run(self.set_quality_inner(rating))
            .await
            .unwrap_or(Ok(()))
    }

    async fn set_quality_inner(&self, rating: i32) -> StoreResult<()> {
        let Some(id) = self.night_id else {
            return Ok(());
        };

        let Some(mut night) = self.store.get(id).await? else {
            warn!(night_id = id.0, "no such night to rate");
            return Ok(());
        };

        night.quality = Some(rating);
        match self.store.update(&night).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => return Ok(()),
            Err(err) => {
                error!(%err, night_id = id.0, "failed to persist rating");
                return Err(err);
            }
        }

        info!(night_id = id.0, rating, "night rated");
        self.navigate_back_tx.send_replace(true);
        Ok(())
    }

    /// One-shot "done, navigate back" event; `true` until the consumer calls
    /// [`done_navigating`](Self::done_navigating).
    pub fn navigate_back(&self) -> watch::Receiver<bool> {
        self.navigate_back_tx.subscribe()
    }

    pub fn done_navigating(&self) {
        self.navigate_back_tx.send_replace(false);
    }

    pub fn close(&self) {
        self.scope.cancel();
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
