//! Geofence detection state machine
//!
//! [`DetectionMemory`] is the complete state of one position stream. Every
//! input is an explicit [`DetectionEvent`]; [`DetectionMemory::apply`] mutates
//! the memory and returns the [`DetectionEffect`]s the caller has to carry out
//! (scheduling the dwell timer, writing to the load store). It never performs
//! I/O itself.
//!
//! ```text
//!            enter Z (no cooldown)           timer expiry, guard ok
//!  Outside ──────────────────────► Pending ──────────────────────► Active
//!     ▲      enter canceled Z         │ guard rejects                 │ cancelActive
//!     │   ┌──────────────────────► Suppressed ◄──────────────────────┘
//!     │   │                           │
//!     └───┴───── no zone ─────────────┘     finalizeActive: Active ──► Outside
//! ```

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use kipper_types::{Error, Result};

use crate::constants::{
    ACCURACY_THRESHOLD_M, DUPLICATE_WINDOW_MS, DWELL_TIME_MS, FINALIZE_COOLDOWN_MS, MAX_TIMING_MS,
};
use crate::model::{Load, Position, TruckType};
use crate::service::dwell_timer::DwellTimer;
use crate::service::load_factory::{create_auto_load, DuplicateGuard};
use crate::service::zone_index::ZoneHit;

/// Timing and accuracy parameters of the detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Dwell time before a load is recorded
    #[serde(default = "default_dwell_ms")]
    pub dwell_ms: u64,

    /// Zone entries ignored this long after "done"
    #[serde(default = "default_finalize_cooldown_ms")]
    pub finalize_cooldown_ms: u64,

    /// Minimum spacing of auto loads per zone
    #[serde(default = "default_duplicate_window_ms")]
    pub duplicate_window_ms: u64,

    /// Samples with a worse accuracy are dropped
    #[serde(default = "default_accuracy_threshold_m")]
    pub accuracy_threshold_m: f64,
}

fn default_dwell_ms() -> u64 {
    DWELL_TIME_MS
}

fn default_finalize_cooldown_ms() -> u64 {
    FINALIZE_COOLDOWN_MS
}

fn default_duplicate_window_ms() -> u64 {
    DUPLICATE_WINDOW_MS
}

fn default_accuracy_threshold_m() -> f64 {
    ACCURACY_THRESHOLD_M
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            dwell_ms: DWELL_TIME_MS,
            finalize_cooldown_ms: FINALIZE_COOLDOWN_MS,
            duplicate_window_ms: DUPLICATE_WINDOW_MS,
            accuracy_threshold_m: ACCURACY_THRESHOLD_M,
        }
    }
}

impl DetectionConfig {
    pub fn dwell(&self) -> TimeDelta {
        millis(self.dwell_ms)
    }

    pub fn finalize_cooldown(&self) -> TimeDelta {
        millis(self.finalize_cooldown_ms)
    }

    pub fn duplicate_guard(&self) -> DuplicateGuard {
        DuplicateGuard::new(millis(self.duplicate_window_ms))
    }

    /// Reject timings beyond one day and a non-positive accuracy limit
    pub fn validate(&self) -> Result<()> {
        let timings = [
            ("dwell_ms", self.dwell_ms),
            ("finalize_cooldown_ms", self.finalize_cooldown_ms),
            ("duplicate_window_ms", self.duplicate_window_ms),
        ];
        for (name, value) in timings {
            if value > MAX_TIMING_MS {
                return Err(Error::InvalidInput(format!(
                    "{} must not exceed {} ms: {}",
                    name, MAX_TIMING_MS, value
                )));
            }
        }
        if self.dwell_ms == 0 {
            return Err(Error::InvalidInput("dwell_ms must be positive".to_string()));
        }
        if !(self.accuracy_threshold_m.is_finite() && self.accuracy_threshold_m > 0.0) {
            return Err(Error::InvalidInput(format!(
                "accuracy_threshold_m must be positive: {}",
                self.accuracy_threshold_m
            )));
        }
        Ok(())
    }
}

fn millis(ms: u64) -> TimeDelta {
    TimeDelta::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX / 1_000))
}

/// Coarse state derived from the memory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionState {
    /// Not inside any zone
    #[default]
    Outside,
    /// Inside a zone, dwell timer running
    Pending,
    /// Inside a zone, no timer and no open load (canceled or rejected as duplicate)
    Suppressed,
    /// A load is open for editing
    Active,
}

impl std::fmt::Display for DetectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionState::Outside => write!(f, "outside"),
            DetectionState::Pending => write!(f, "pending"),
            DetectionState::Suppressed => write!(f, "suppressed"),
            DetectionState::Active => write!(f, "active"),
        }
    }
}

/// Inputs of the state machine
#[derive(Debug, Clone, Copy)]
pub enum DetectionEvent<'a> {
    /// Position sample and its zone classification
    Sample {
        position: &'a Position,
        hit: Option<ZoneHit<'a>>,
        /// Current device default, captured if a timer is armed
        truck_type: TruckType,
    },
    /// Dwell timer fired
    TimerExpired {
        ticket: u64,
        now: DateTime<Utc>,
        /// Newest auto load of the armed zone, as seen by the store
        last_auto_load_at: Option<DateTime<Utc>>,
    },
    /// Operator discards the open load
    CancelActive,
    /// Operator confirms the open load ("done")
    FinalizeActive { now: DateTime<Utc> },
}

/// Side effects requested by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionEffect {
    ArmTimer {
        ticket: u64,
        zone_id: String,
        deadline: DateTime<Utc>,
    },
    CancelTimer {
        ticket: u64,
    },
    AppendLoad(Load),
    RemoveLoad(String),
    DuplicateSuppressed {
        zone_id: String,
    },
}

/// Decision state of one position stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionMemory {
    tracked_zone_id: Option<String>,
    canceled_zone_id: Option<String>,
    cooldown_until: Option<DateTime<Utc>>,
    dwell: DwellTimer,
    active_load_id: Option<String>,
}

impl DetectionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracked_zone_id(&self) -> Option<&str> {
        self.tracked_zone_id.as_deref()
    }

    pub fn canceled_zone_id(&self) -> Option<&str> {
        self.canceled_zone_id.as_deref()
    }

    pub fn cooldown_until(&self) -> Option<DateTime<Utc>> {
        self.cooldown_until
    }

    pub fn pending_timer_start(&self) -> Option<DateTime<Utc>> {
        self.dwell.armed().map(|armed| armed.armed_at)
    }

    pub fn active_load_id(&self) -> Option<&str> {
        self.active_load_id.as_deref()
    }

    pub fn dwell(&self) -> &DwellTimer {
        &self.dwell
    }

    pub fn state(&self) -> DetectionState {
        if self.tracked_zone_id.is_none() {
            DetectionState::Outside
        } else if self.active_load_id.is_some() {
            DetectionState::Active
        } else if self.dwell.is_armed() {
            DetectionState::Pending
        } else {
            DetectionState::Suppressed
        }
    }

    /// Undo an open load whose store write failed
    pub fn release_active(&mut self, load_id: &str) {
        if self.active_load_id.as_deref() == Some(load_id) {
            self.active_load_id = None;
        }
    }

    pub fn apply(&mut self, event: DetectionEvent<'_>, config: &DetectionConfig) -> Vec<DetectionEffect> {
        match event {
            DetectionEvent::Sample {
                position,
                hit,
                truck_type,
            } => self.on_sample(position, hit, truck_type, config),
            DetectionEvent::TimerExpired {
                ticket,
                now,
                last_auto_load_at,
            } => self.on_timer_expired(ticket, now, last_auto_load_at, config),
            DetectionEvent::CancelActive => self.on_cancel_active(),
            DetectionEvent::FinalizeActive { now } => self.on_finalize_active(now, config),
        }
    }

    fn on_sample(
        &mut self,
        position: &Position,
        hit: Option<ZoneHit<'_>>,
        truck_type: TruckType,
        config: &DetectionConfig,
    ) -> Vec<DetectionEffect> {
        // Degraded signal freezes the machine, it does not reset it
        if !position.is_accurate(config.accuracy_threshold_m) {
            return Vec::new();
        }

        let now = position.timestamp;
        let Some(hit) = hit else {
            return self.leave_all_zones();
        };

        if self.tracked_zone_id.as_deref() == Some(hit.zone.id.as_str()) {
            return Vec::new();
        }

        if self.cooldown_until.is_some_and(|until| now <= until) {
            debug!(zone_id = %hit.zone.id, "Zone entry ignored during finalize cooldown");
            return Vec::new();
        }

        let mut effects = Vec::new();
        if let Some(ticket) = self.dwell.cancel() {
            effects.push(DetectionEffect::CancelTimer { ticket });
        }
        self.tracked_zone_id = Some(hit.zone.id.clone());

        if self.canceled_zone_id.as_deref() == Some(hit.zone.id.as_str()) {
            debug!(zone_id = %hit.zone.id, "Entered suppressed zone");
            return effects;
        }

        self.dwell
            .arm(&hit.site.id, hit.zone, truck_type, now, config.dwell());
        if let Some(armed) = self.dwell.armed() {
            debug!(
                zone_id = %hit.zone.id,
                ticket = armed.ticket,
                deadline = %armed.deadline,
                "Dwell timer armed"
            );
            effects.push(DetectionEffect::ArmTimer {
                ticket: armed.ticket,
                zone_id: hit.zone.id.clone(),
                deadline: armed.deadline,
            });
        }
        effects
    }

    fn leave_all_zones(&mut self) -> Vec<DetectionEffect> {
        let mut effects = Vec::new();
        if let Some(ticket) = self.dwell.cancel() {
            effects.push(DetectionEffect::CancelTimer { ticket });
        }
        if let Some(zone_id) = self.tracked_zone_id.take() {
            debug!(zone_id = %zone_id, "Left all zones");
        }
        self.canceled_zone_id = None;
        self.cooldown_until = None;
        // The load stays in the store, only the open pointer is dropped
        self.active_load_id = None;
        effects
    }

    fn on_timer_expired(
        &mut self,
        ticket: u64,
        now: DateTime<Utc>,
        last_auto_load_at: Option<DateTime<Utc>>,
        config: &DetectionConfig,
    ) -> Vec<DetectionEffect> {
        let Some(armed) = self.dwell.take_expired(ticket) else {
            debug!(ticket, "Stale dwell timer expiry ignored");
            return Vec::new();
        };
        if self.tracked_zone_id.as_deref() != Some(armed.zone.id.as_str()) {
            return Vec::new();
        }

        if !config.duplicate_guard().allows_after(last_auto_load_at, now) {
            debug!(zone_id = %armed.zone.id, "Auto load suppressed as duplicate");
            return vec![DetectionEffect::DuplicateSuppressed {
                zone_id: armed.zone.id,
            }];
        }

        let load = create_auto_load(&armed.site_id, &armed.zone, armed.truck_type, now);
        self.active_load_id = Some(load.id.clone());
        vec![DetectionEffect::AppendLoad(load)]
    }

    fn on_cancel_active(&mut self) -> Vec<DetectionEffect> {
        let Some(load_id) = self.active_load_id.take() else {
            return Vec::new();
        };
        let mut effects = Vec::new();
        if let Some(ticket) = self.dwell.cancel() {
            effects.push(DetectionEffect::CancelTimer { ticket });
        }
        // Tracked zone stays set: staying inside cannot arm a new timer until exit
        if let Some(zone_id) = &self.tracked_zone_id {
            self.canceled_zone_id = Some(zone_id.clone());
        }
        effects.push(DetectionEffect::RemoveLoad(load_id));
        effects
    }

    fn on_finalize_active(&mut self, now: DateTime<Utc>, config: &DetectionConfig) -> Vec<DetectionEffect> {
        if self.active_load_id.take().is_none() {
            return Vec::new();
        }
        let mut effects = Vec::new();
        if let Some(ticket) = self.dwell.cancel() {
            effects.push(DetectionEffect::CancelTimer { ticket });
        }
        self.tracked_zone_id = None;
        self.cooldown_until = Some(
            now.checked_add_signed(config.finalize_cooldown())
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        );
        effects
    }
}
