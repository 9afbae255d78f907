//! Detection service: the engine behind a mailbox.
//!
//! The [`DetectionService`] owns a [`DetectionEngine`] and is the only place
//! that touches it. Position samples, operator actions and dwell timer
//! expiries all arrive as commands on one channel, so they are processed
//! strictly one after another.
//!
//! ```text
//!  DetectionHandle ──► Command ──┐
//!                                ▼
//!  timer task ──► TimerExpired ──► DetectionService ──► LoadStore
//!       ▲                             │
//!       └──── ArmTimer / CancelTimer ─┤
//!                                     ▼
//!                             watch::Sender<DetectionSnapshot>
//! ```
//!
//! # Example
//!
//! ```ignore
//! let engine = DetectionEngine::new(sites, loads, config.detection);
//! let (service, handle) = DetectionService::new(engine, SystemClock);
//! let shutdown = CancellationToken::new();
//! tokio::spawn(service.run(shutdown.clone()));
//!
//! handle.submit_position(position).await?;
//! let open = handle.snapshot().active_load_id;
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kipper_domain::service::{DetectionEffect, DetectionEngine, DetectionState};
use kipper_domain::{Load, LoadStore, Position, TruckType, ZoneRegistry};
use kipper_store::SiteStore;
use kipper_types::Error;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default capacity of the command channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Errors specific to the detection service
#[derive(Debug, Error)]
pub enum DetectionServiceError {
    #[error("Detection service is not running")]
    Stopped,

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Detection failed: {0}")]
    DetectionFailed(String),
}

impl From<Error> for DetectionServiceError {
    fn from(err: Error) -> Self {
        match err {
            Error::Store(e) => DetectionServiceError::StoreError(e.to_string()),
            Error::Io(e) => DetectionServiceError::StoreError(e.to_string()),
            Error::Json(e) => DetectionServiceError::StoreError(e.to_string()),
            _ => DetectionServiceError::DetectionFailed(err.to_string()),
        }
    }
}

/// Wall clock used to timestamp operator actions and timer expiries
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that follows tokio's timer, so a paused runtime also pauses it
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
    base: DateTime<Utc>,
}

impl TokioClock {
    pub fn starting_at(base: DateTime<Utc>) -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            base,
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now().duration_since(self.origin);
        self.base + chrono::TimeDelta::from_std(elapsed).unwrap_or(chrono::TimeDelta::zero())
    }
}

/// What observers see after every processed command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionSnapshot {
    pub state: DetectionState,
    pub tracked_zone_id: Option<String>,
    pub active_load_id: Option<String>,
    pub pending_since: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub truck_type: TruckType,
    pub auto_detect_enabled: bool,
    /// Failed detection steps since start
    pub errors: u64,
    /// Message of the most recent failed step
    pub last_error: Option<String>,
}

impl DetectionSnapshot {
    /// Dwell progress in percent, 0 when no timer is running
    pub fn progress(&self, now: DateTime<Utc>) -> f64 {
        match (self.pending_since, self.deadline) {
            (Some(start), Some(deadline)) if deadline > start => {
                let total = (deadline - start).num_milliseconds() as f64;
                let done = (now - start).num_milliseconds() as f64;
                (done / total * 100.0).clamp(0.0, 100.0)
            }
            _ => 0.0,
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, DetectionServiceError>>;

enum Command {
    Position(Position),
    SetAutoDetect(bool),
    SetTruckType(TruckType),
    CancelActive(Reply<Option<String>>),
    FinalizeActive(Reply<Option<String>>),
    SwitchTruckType {
        load_id: String,
        truck_type: TruckType,
        reply: Reply<Load>,
    },
    AdjustVolume {
        load_id: String,
        delta: f64,
        reply: Reply<Load>,
    },
    SetMaterial {
        load_id: String,
        material: String,
        reply: Reply<Load>,
    },
    TimerExpired { ticket: u64 },
}

/// Cloneable front end of a running [`DetectionService`]
#[derive(Clone)]
pub struct DetectionHandle {
    tx: mpsc::Sender<Command>,
    snapshot_rx: watch::Receiver<DetectionSnapshot>,
}

impl DetectionHandle {
    async fn send(&self, command: Command) -> Result<(), DetectionServiceError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| DetectionServiceError::Stopped)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, DetectionServiceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(make(reply_tx)).await?;
        reply_rx.await.map_err(|_| DetectionServiceError::Stopped)?
    }

    /// Queue a position sample
    pub async fn submit_position(&self, position: Position) -> Result<(), DetectionServiceError> {
        self.send(Command::Position(position)).await
    }

    pub async fn set_auto_detect(&self, enabled: bool) -> Result<(), DetectionServiceError> {
        self.send(Command::SetAutoDetect(enabled)).await
    }

    pub async fn set_truck_type(&self, truck_type: TruckType) -> Result<(), DetectionServiceError> {
        self.send(Command::SetTruckType(truck_type)).await
    }

    /// Discard the open load. Returns the id of the deleted load.
    pub async fn cancel_active(&self) -> Result<Option<String>, DetectionServiceError> {
        self.request(Command::CancelActive).await
    }

    /// Confirm the open load. Returns the id of the confirmed load.
    pub async fn finalize_active(&self) -> Result<Option<String>, DetectionServiceError> {
        self.request(Command::FinalizeActive).await
    }

    /// Change a load's truck type. Editing the open load also changes the
    /// truck type of later auto loads.
    pub async fn switch_truck_type(
        &self,
        load_id: &str,
        truck_type: TruckType,
    ) -> Result<Load, DetectionServiceError> {
        let load_id = load_id.to_string();
        self.request(|reply| Command::SwitchTruckType {
            load_id,
            truck_type,
            reply,
        })
        .await
    }

    pub async fn adjust_volume(&self, load_id: &str, delta: f64) -> Result<Load, DetectionServiceError> {
        let load_id = load_id.to_string();
        self.request(|reply| Command::AdjustVolume {
            load_id,
            delta,
            reply,
        })
        .await
    }

    pub async fn set_material(&self, load_id: &str, material: &str) -> Result<Load, DetectionServiceError> {
        let load_id = load_id.to_string();
        let material = material.to_string();
        self.request(|reply| Command::SetMaterial {
            load_id,
            material,
            reply,
        })
        .await
    }

    pub fn snapshot(&self) -> DetectionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DetectionSnapshot> {
        self.snapshot_rx.clone()
    }
}

struct RunningTimer {
    ticket: u64,
    task: JoinHandle<()>,
}

/// Actor owning the detection engine
pub struct DetectionService<R, S, C> {
    engine: DetectionEngine<R, S>,
    clock: C,
    rx: mpsc::Receiver<Command>,
    timer_tx: mpsc::WeakSender<Command>,
    timer: Option<RunningTimer>,
    snapshot_tx: watch::Sender<DetectionSnapshot>,
    site_store: Option<Arc<SiteStore>>,
    errors: u64,
    last_error: Option<String>,
}

impl<R, S, C> DetectionService<R, S, C>
where
    R: ZoneRegistry + Send + 'static,
    S: LoadStore + Send + 'static,
    C: Clock,
{
    /// Creates the service and the handle used to talk to it
    pub fn new(engine: DetectionEngine<R, S>, clock: C) -> (Self, DetectionHandle) {
        Self::with_capacity(engine, clock, DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(
        engine: DetectionEngine<R, S>,
        clock: C,
        capacity: usize,
    ) -> (Self, DetectionHandle) {
        let (tx, rx) = mpsc::channel(capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(snapshot_of(&engine));
        let service = Self {
            engine,
            clock,
            rx,
            timer_tx: tx.downgrade(),
            timer: None,
            snapshot_tx,
            site_store: None,
            errors: 0,
            last_error: None,
        };
        (service, DetectionHandle { tx, snapshot_rx })
    }

    /// Make the site of every recorded auto load the active site
    pub fn with_site_store(mut self, site_store: Arc<SiteStore>) -> Self {
        self.site_store = Some(site_store);
        self
    }

    /// Runs until shutdown is signalled or every handle is dropped.
    /// Returns the engine so callers can inspect the final state.
    pub async fn run(mut self, shutdown: CancellationToken) -> DetectionEngine<R, S> {
        info!("Detection service starting");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Detection service shutting down");
                    break;
                }

                command = self.rx.recv() => {
                    match command {
                        Some(command) => self.handle(command),
                        None => break,
                    }
                }
            }
        }

        if let Some(timer) = self.timer.take() {
            timer.task.abort();
        }
        info!("Detection service stopped");
        self.engine
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Position(position) => {
                let result = self.engine.on_position(&position);
                // Failures land in the snapshot
                let _ = self.apply(result);
            }
            Command::TimerExpired { ticket } => {
                if self.timer.as_ref().is_some_and(|t| t.ticket == ticket) {
                    self.timer = None;
                }
                let result = self.engine.on_timer_expired(ticket, self.clock.now());
                let _ = self.apply(result);
            }
            Command::SetAutoDetect(enabled) => {
                info!(enabled, "Auto detection toggled");
                self.engine.set_auto_detect_enabled(enabled);
            }
            Command::SetTruckType(truck_type) => {
                info!(truck_type = %truck_type, "Truck type changed");
                self.engine.set_truck_type(truck_type);
            }
            Command::CancelActive(reply) => {
                let load_id = self.engine.active_load_id().map(str::to_string);
                let result = self.engine.on_cancel_active();
                let outcome = self.apply(result).map(|_| load_id);
                let _ = reply.send(outcome);
            }
            Command::FinalizeActive(reply) => {
                let load_id = self.engine.active_load_id().map(str::to_string);
                let result = self.engine.on_finalize_active(self.clock.now());
                let outcome = self.apply(result).map(|_| load_id);
                let _ = reply.send(outcome);
            }
            Command::SwitchTruckType {
                load_id,
                truck_type,
                reply,
            } => {
                let outcome = self.engine.switch_truck_type(&load_id, truck_type);
                let _ = reply.send(outcome.map_err(Into::into));
            }
            Command::AdjustVolume {
                load_id,
                delta,
                reply,
            } => {
                let outcome = self.engine.adjust_volume(&load_id, delta);
                let _ = reply.send(outcome.map_err(Into::into));
            }
            Command::SetMaterial {
                load_id,
                material,
                reply,
            } => {
                let outcome = self.engine.set_material(&load_id, &material);
                let _ = reply.send(outcome.map_err(Into::into));
            }
        }
        self.publish();
    }

    fn publish(&self) {
        let mut snapshot = snapshot_of(&self.engine);
        snapshot.errors = self.errors;
        snapshot.last_error = self.last_error.clone();
        self.snapshot_tx.send_replace(snapshot);
    }

    /// Failures are published in the snapshot; replies carry them as well
    fn record_error(&mut self, err: &Error) {
        warn!(error = %err, "Detection step failed");
        self.errors += 1;
        self.last_error = Some(err.to_string());
    }

    fn apply(
        &mut self,
        result: kipper_types::Result<Vec<DetectionEffect>>,
    ) -> Result<(), DetectionServiceError> {
        let effects = match result {
            Ok(effects) => effects,
            Err(e) => {
                self.record_error(&e);
                return Err(e.into());
            }
        };
        for effect in effects {
            match effect {
                DetectionEffect::ArmTimer {
                    ticket, deadline, ..
                } => self.arm_timer(ticket, deadline),
                DetectionEffect::CancelTimer { ticket } => self.cancel_timer(ticket),
                DetectionEffect::AppendLoad(load) => self.activate_site(&load.site_id),
                _ => {}
            }
        }
        Ok(())
    }

    fn activate_site(&mut self, site_id: &str) {
        let Some(site_store) = &self.site_store else {
            return;
        };
        match site_store.set_active_site(Some(site_id)) {
            Ok(()) => debug!(site_id = %site_id, "Active site follows recorded load"),
            Err(e) => self.record_error(&e),
        }
    }

    fn arm_timer(&mut self, ticket: u64, deadline: DateTime<Utc>) {
        if let Some(previous) = self.timer.take() {
            previous.task.abort();
        }
        let delay = (deadline - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let timer_tx = self.timer_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = timer_tx.upgrade() {
                let _ = tx.send(Command::TimerExpired { ticket }).await;
            }
        });
        debug!(ticket, delay_ms = delay.as_millis() as u64, "Dwell timer scheduled");
        self.timer = Some(RunningTimer { ticket, task });
    }

    fn cancel_timer(&mut self, ticket: u64) {
        if self.timer.as_ref().is_some_and(|t| t.ticket == ticket) {
            if let Some(timer) = self.timer.take() {
                timer.task.abort();
                debug!(ticket, "Dwell timer aborted");
            }
        }
    }
}

fn snapshot_of<R: ZoneRegistry, S: LoadStore>(engine: &DetectionEngine<R, S>) -> DetectionSnapshot {
    let memory = engine.memory();
    DetectionSnapshot {
        state: engine.state(),
        tracked_zone_id: memory.tracked_zone_id().map(str::to_string),
        active_load_id: memory.active_load_id().map(str::to_string),
        pending_since: memory.pending_timer_start(),
        deadline: engine.next_deadline().map(|(_, deadline)| deadline),
        truck_type: engine.truck_type(),
        auto_detect_enabled: engine.auto_detect_enabled(),
        errors: 0,
        last_error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kipper_domain::repository::MemoryLoadStore;
    use kipper_domain::service::DetectionConfig;
    use kipper_domain::{Coordinate, LoadFilter, Site, Zone};

    const INSIDE: (f64, f64) = (48.0, 11.0);
    const OUTSIDE: (f64, f64) = (48.01, 11.0);

    type Engine = DetectionEngine<Vec<Site>, Arc<MemoryLoadStore>>;

    fn engine(store: Arc<MemoryLoadStore>) -> Engine {
        let sites = vec![Site::new("Nord", Coordinate::new(INSIDE.0, INSIDE.1))
            .with_zone(Zone::new("Aushub", Coordinate::new(INSIDE.0, INSIDE.1)))];
        DetectionEngine::new(sites, store, DetectionConfig::default())
    }

    fn clock() -> TokioClock {
        TokioClock::starting_at(Utc.with_ymd_and_hms(2024, 5, 15, 8, 0, 0).unwrap())
    }

    async fn at(handle: &DetectionHandle, clock: &TokioClock, point: (f64, f64)) {
        handle
            .submit_position(Position::new(point.0, point.1, 5.0, clock.now()))
            .await
            .unwrap();
    }

    async fn tick() {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dwell_creates_load() {
        let store = Arc::new(MemoryLoadStore::new());
        let clock = clock();
        let (service, handle) = DetectionService::new(engine(store.clone()), clock);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(service.run(shutdown.clone()));

        for _ in 0..7 {
            at(&handle, &clock, INSIDE).await;
            tick().await;
        }

        let loads = store.query(&LoadFilter::all()).unwrap();
        assert_eq!(loads.len(), 1);
        assert_eq!(loads[0].volume, 12.0);
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, DetectionState::Active);
        assert_eq!(snapshot.active_load_id.as_deref(), Some(loads[0].id.as_str()));

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_aborts_timer() {
        let store = Arc::new(MemoryLoadStore::new());
        let clock = clock();
        let (service, handle) = DetectionService::new(engine(store.clone()), clock);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(service.run(shutdown.clone()));

        at(&handle, &clock, INSIDE).await;
        tick().await;
        assert_eq!(handle.snapshot().state, DetectionState::Pending);
        assert!(handle.snapshot().progress(clock.now()) > 0.0);

        at(&handle, &clock, OUTSIDE).await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(store.is_empty());
        assert_eq!(handle.snapshot().state, DetectionState::Outside);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_finalize_replies() {
        let store = Arc::new(MemoryLoadStore::new());
        let clock = clock();
        let (service, handle) = DetectionService::new(engine(store.clone()), clock);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(service.run(shutdown.clone()));

        assert_eq!(handle.finalize_active().await.unwrap(), None);

        at(&handle, &clock, INSIDE).await;
        tokio::time::sleep(Duration::from_secs(6)).await;
        let open = handle.snapshot().active_load_id.unwrap();

        assert_eq!(handle.cancel_active().await.unwrap(), Some(open));
        assert!(store.is_empty());
        assert_eq!(handle.snapshot().state, DetectionState::Suppressed);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_detection_and_truck_type() {
        let store = Arc::new(MemoryLoadStore::new());
        let clock = clock();
        let (service, handle) = DetectionService::new(engine(store.clone()), clock);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(service.run(shutdown.clone()));

        handle.set_auto_detect(false).await.unwrap();
        at(&handle, &clock, INSIDE).await;
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(store.is_empty());

        handle.set_auto_detect(true).await.unwrap();
        handle.set_truck_type(TruckType::ThreeAxle).await.unwrap();
        at(&handle, &clock, INSIDE).await;
        tokio::time::sleep(Duration::from_secs(6)).await;

        let loads = store.query(&LoadFilter::all()).unwrap();
        assert_eq!(loads.len(), 1);
        assert_eq!(loads[0].truck_type, TruckType::ThreeAxle);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_fails_after_shutdown() {
        let store = Arc::new(MemoryLoadStore::new());
        let (service, handle) = DetectionService::new(engine(store), clock());
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(service.run(shutdown.clone()));

        shutdown.cancel();
        let engine = task.await.unwrap();
        assert_eq!(engine.state(), DetectionState::Outside);

        assert!(matches!(
            handle.cancel_active().await,
            Err(DetectionServiceError::Stopped)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_load_edits_and_truck_type_follow() {
        let store = Arc::new(MemoryLoadStore::new());
        let clock = clock();
        let (service, handle) = DetectionService::new(engine(store.clone()), clock);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(service.run(shutdown.clone()));

        at(&handle, &clock, INSIDE).await;
        tokio::time::sleep(Duration::from_secs(6)).await;
        let open = handle.snapshot().active_load_id.unwrap();

        let load = handle.switch_truck_type(&open, TruckType::ThreeAxle).await.unwrap();
        assert_eq!(load.volume, 10.0);
        assert_eq!(handle.snapshot().truck_type, TruckType::ThreeAxle);
        let load = handle.adjust_volume(&open, 0.5).await.unwrap();
        assert_eq!(load.volume, 10.5);
        let load = handle.set_material(&open, "Humus").await.unwrap();
        assert_eq!(load.material, "Humus");
        assert!(matches!(
            handle.adjust_volume("missing", 0.5).await,
            Err(DetectionServiceError::DetectionFailed(_))
        ));

        handle.finalize_active().await.unwrap();
        at(&handle, &clock, OUTSIDE).await;
        tokio::time::sleep(Duration::from_secs(16)).await;
        at(&handle, &clock, INSIDE).await;
        tokio::time::sleep(Duration::from_secs(6)).await;

        let loads = store.query(&LoadFilter::all()).unwrap();
        assert_eq!(loads.len(), 2);
        assert_eq!(loads[0].truck_type, TruckType::ThreeAxle);
        assert_eq!(loads[0].volume, 10.0);

        shutdown.cancel();
        task.await.unwrap();
    }

    struct FailingStore;

    impl LoadStore for FailingStore {
        fn append(&self, _load: Load) -> kipper_types::Result<()> {
            Err(kipper_types::StoreError::Corrupted("disk full".to_string()).into())
        }

        fn remove(&self, _id: &str) -> kipper_types::Result<bool> {
            Ok(false)
        }

        fn query(&self, _filter: &LoadFilter) -> kipper_types::Result<Vec<Load>> {
            Ok(Vec::new())
        }

        fn get(&self, _id: &str) -> kipper_types::Result<Option<Load>> {
            Ok(None)
        }

        fn update(&self, _load: &Load) -> kipper_types::Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_is_published() {
        let sites = vec![Site::new("Nord", Coordinate::new(INSIDE.0, INSIDE.1))
            .with_zone(Zone::new("Aushub", Coordinate::new(INSIDE.0, INSIDE.1)))];
        let engine = DetectionEngine::new(sites, FailingStore, DetectionConfig::default());
        let clock = clock();
        let (service, handle) = DetectionService::new(engine, clock);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(service.run(shutdown.clone()));

        at(&handle, &clock, INSIDE).await;
        assert_eq!(handle.snapshot().errors, 0);
        tokio::time::sleep(Duration::from_secs(6)).await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.errors, 1);
        assert!(snapshot.last_error.unwrap().contains("disk full"));
        assert!(snapshot.active_load_id.is_none());

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_recorded_load_activates_its_site() {
        let dir = tempfile::tempdir().unwrap();
        let sites = Arc::new(SiteStore::open(dir.path().to_path_buf()).unwrap());
        let (north, _) = sites
            .add_zone_at(Coordinate::new(INSIDE.0, INSIDE.1), "Aushub", Some("Nord"))
            .unwrap();
        sites.set_active_site(None).unwrap();
        let (south, _) = sites
            .add_zone_at(Coordinate::new(48.5, 11.0), "Humus", Some("Süd"))
            .unwrap();
        assert_eq!(sites.active_site_id().unwrap(), Some(south.id.clone()));

        let store = Arc::new(MemoryLoadStore::new());
        let engine = DetectionEngine::new(sites.clone(), store.clone(), DetectionConfig::default());
        let clock = clock();
        let (service, handle) = DetectionService::new(engine, clock);
        let service = service.with_site_store(sites.clone());
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(service.run(shutdown.clone()));

        at(&handle, &clock, INSIDE).await;
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(store.len(), 1);
        assert_eq!(sites.active_site_id().unwrap(), Some(north.id));

        shutdown.cancel();
        task.await.unwrap();
    }
}
