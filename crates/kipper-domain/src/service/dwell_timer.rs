//! Single-slot dwell timer
//!
//! The slot only records what was armed and when it is due; the runtime
//! (actor or replay loop) does the actual waiting and reports the expiry back
//! with the slot's ticket. Arming again replaces the slot, so an expiry that
//! carries an old ticket is recognized as stale and ignored.

use chrono::{DateTime, TimeDelta, Utc};

use crate::model::{TruckType, Zone};

/// Context captured when the timer was armed
#[derive(Debug, Clone, PartialEq)]
pub struct ArmedDwell {
    pub ticket: u64,
    pub site_id: String,
    pub zone: Zone,
    /// Device default at arm time; the created load uses this value
    pub truck_type: TruckType,
    pub armed_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DwellTimer {
    slot: Option<ArmedDwell>,
    next_ticket: u64,
}

impl DwellTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the slot; returns the ticket of the slot it replaced, if any
    pub fn arm(
        &mut self,
        site_id: &str,
        zone: &Zone,
        truck_type: TruckType,
        now: DateTime<Utc>,
        dwell: TimeDelta,
    ) -> Option<u64> {
        let replaced = self.cancel();
        self.next_ticket += 1;
        self.slot = Some(ArmedDwell {
            ticket: self.next_ticket,
            site_id: site_id.to_string(),
            zone: zone.clone(),
            truck_type,
            armed_at: now,
            deadline: now.checked_add_signed(dwell).unwrap_or(DateTime::<Utc>::MAX_UTC),
        });
        replaced
    }

    /// Clear the slot; returns the canceled ticket
    pub fn cancel(&mut self) -> Option<u64> {
        self.slot.take().map(|armed| armed.ticket)
    }

    /// Take the slot if `ticket` is the one currently armed
    pub fn take_expired(&mut self, ticket: u64) -> Option<ArmedDwell> {
        if self.slot.as_ref().is_some_and(|armed| armed.ticket == ticket) {
            self.slot.take()
        } else {
            None
        }
    }

    pub fn armed(&self) -> Option<&ArmedDwell> {
        self.slot.as_ref()
    }

    pub fn is_armed(&self) -> bool {
        self.slot.is_some()
    }

    /// Ticket of the armed slot if its deadline has passed
    pub fn due(&self, now: DateTime<Utc>) -> Option<u64> {
        self.slot
            .as_ref()
            .filter(|armed| armed.deadline <= now)
            .map(|armed| armed.ticket)
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Option<TimeDelta> {
        self.slot
            .as_ref()
            .map(|armed| (now - armed.armed_at).max(TimeDelta::zero()))
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Option<TimeDelta> {
        self.slot
            .as_ref()
            .map(|armed| (armed.deadline - now).max(TimeDelta::zero()))
    }

    /// Progress in percent (0-100); 0 when nothing is armed
    pub fn progress(&self, now: DateTime<Utc>) -> f64 {
        let Some(armed) = self.slot.as_ref() else {
            return 0.0;
        };
        let total = (armed.deadline - armed.armed_at).num_milliseconds();
        if total <= 0 {
            return 100.0;
        }
        let elapsed = (now - armed.armed_at).num_milliseconds() as f64;
        (elapsed / total as f64 * 100.0).clamp(0.0, 100.0)
    }
}
