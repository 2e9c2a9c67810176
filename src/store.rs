use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

use crate::protocol::{ModeReading, RawZoneReading};
use crate::types::*;
use crate::{Error, Result};

/// Result of folding one reading into a zone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// Any observable field differs from what was stored.
    pub changed: bool,
    /// Fields present in the reading but with values outside the known set.
    pub rejected_fields: Vec<&'static str>,
}

/// Per-zone slot guarded by the zone's exclusive section.
#[derive(Debug)]
pub struct ZoneEntry {
    index: ZoneIndex,
    is_master: bool,
    state: Option<ZoneState>,
    /// Store sequence number of the last accepted write, 0 if none.
    last_write: u64,
}

impl ZoneEntry {
    fn new(index: ZoneIndex, is_master: bool) -> Self {
        Self {
            index,
            is_master,
            state: None,
            last_write: 0,
        }
    }

    /// True when a write was accepted after `sequence` was taken, meaning a
    /// reading fetched from that point on may predate it.
    pub fn written_since(&self, sequence: u64) -> bool {
        self.last_write > sequence
    }

    pub fn state(&self) -> Option<&ZoneState> {
        self.state.as_ref()
    }

    fn state_mut(&mut self) -> &mut ZoneState {
        let (index, is_master) = (self.index, self.is_master);
        self.state
            .get_or_insert_with(|| ZoneState::new(index, is_master))
    }

    /// Merge field by field. Absent fields keep their previous value and
    /// temperatures within device precision count as unchanged.
    pub fn merge(&mut self, reading: &RawZoneReading) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let state = self.state_mut();
        let mut changed = false;

        if let Some(unit) = reading.unit {
            changed |= replace_if_different(&mut state.unit, unit);
        }
        let unit = state.unit;
        let temp = |v: Option<f64>| v.map(|v| Temperature::from_unit(v, unit));

        changed |= merge_value(&mut state.name, reading.name.clone());
        changed |= merge_value(&mut state.power, reading.power);

        match &reading.mode {
            Some(ModeReading::Known(mode)) => {
                changed |= merge_value(&mut state.mode, Some(*mode));
            }
            Some(ModeReading::Unknown(raw)) => {
                warn!(zone = state.index, mode = %raw, "unknown mode in reading, keeping previous");
                outcome.rejected_fields.push("mode");
            }
            None => {}
        }

        if let Some(modes) = &reading.supported_modes {
            changed |= replace_if_different(&mut state.supported_modes, modes.clone());
        }

        changed |= merge_temperature(&mut state.current_temperature, temp(reading.current_temperature));
        changed |= merge_temperature(&mut state.target_temperature, temp(reading.target_temperature));
        changed |= merge_temperature(&mut state.min_temp, temp(reading.min_temp));
        changed |= merge_temperature(&mut state.max_temp, temp(reading.max_temp));
        changed |= merge_value(&mut state.humidity, reading.humidity);

        if changed {
            state.updated_at = Some(Utc::now());
        }
        outcome.changed = changed;
        outcome
    }

    /// Optimistically record a write the device accepted.
    pub fn apply_command_result(&mut self, command: &ZoneCommand) -> bool {
        let state = self.state_mut();
        let changed = match *command {
            ZoneCommand::Power(on) => replace_if_different(&mut state.power, Some(on)),
            ZoneCommand::Mode(mode) => replace_if_different(&mut state.mode, Some(mode)),
            ZoneCommand::TargetTemperature(t) => {
                replace_if_different(&mut state.target_temperature, Some(t))
            }
        };
        if changed {
            state.updated_at = Some(Utc::now());
        }
        changed
    }
}

fn replace_if_different<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

fn merge_value<T: PartialEq>(slot: &mut Option<T>, incoming: Option<T>) -> bool {
    match incoming {
        Some(value) => replace_if_different(slot, Some(value)),
        None => false,
    }
}

fn merge_temperature(slot: &mut Option<Temperature>, incoming: Option<Temperature>) -> bool {
    match (slot.as_ref(), incoming) {
        (_, None) => false,
        (Some(old), Some(new)) if old.approx_eq(&new) => false,
        (_, Some(new)) => {
            *slot = Some(new);
            true
        }
    }
}

/// Last known state of every configured zone. The key set is fixed at
/// construction; each zone has its own lock so different zones never
/// contend.
#[derive(Debug)]
pub struct ZoneStateStore {
    zones: BTreeMap<ZoneIndex, Arc<Mutex<ZoneEntry>>>,
    master: ZoneIndex,
    sequence: AtomicU64,
}

impl ZoneStateStore {
    /// Zones `1..=zone_count`, with `master` flagged as the master zone.
    pub fn new(zone_count: u8, master: ZoneIndex) -> Self {
        let zones = (1..=zone_count)
            .map(|i| (i, Arc::new(Mutex::new(ZoneEntry::new(i, i == master)))))
            .collect();
        Self {
            zones,
            master,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn master(&self) -> ZoneIndex {
        self.master
    }

    /// Current position of the write sequence. A poll takes this before
    /// fetching and compares it with [`ZoneEntry::written_since`].
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Record a write the device accepted, optimistically.
    pub fn record_write(&self, entry: &mut ZoneEntry, command: &ZoneCommand) -> bool {
        entry.last_write = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        entry.apply_command_result(command)
    }

    pub fn indices(&self) -> BTreeSet<ZoneIndex> {
        self.zones.keys().copied().collect()
    }

    pub fn contains(&self, index: ZoneIndex) -> bool {
        self.zones.contains_key(&index)
    }

    /// Enter the zone's exclusive section.
    pub async fn lock(&self, index: ZoneIndex) -> Result<OwnedMutexGuard<ZoneEntry>> {
        let entry = self.zones.get(&index).ok_or(Error::InvalidZone(index))?;
        Ok(entry.clone().lock_owned().await)
    }

    pub async fn get(&self, index: ZoneIndex) -> Option<ZoneState> {
        let entry = self.zones.get(&index)?;
        entry.lock().await.state.clone()
    }

    pub async fn merge(&self, index: ZoneIndex, reading: &RawZoneReading) -> Result<MergeOutcome> {
        Ok(self.lock(index).await?.merge(reading))
    }

    pub async fn apply_command_result(&self, index: ZoneIndex, command: &ZoneCommand) -> Result<bool> {
        let mut entry = self.lock(index).await?;
        Ok(self.record_write(&mut entry, command))
    }

    /// Every zone that has been populated, in index order.
    pub async fn snapshot(&self) -> Vec<ZoneState> {
        let mut states = Vec::with_capacity(self.zones.len());
        for entry in self.zones.values() {
            if let Some(state) = entry.lock().await.state.clone() {
                states.push(state);
            }
        }
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_reading(zone: ZoneIndex) -> RawZoneReading {
        RawZoneReading {
            zone,
            name: Some("Salon".into()),
            power: Some(true),
            mode: Some(ModeReading::Known(HvacMode::Heat)),
            supported_modes: None,
            current_temperature: Some(21.0),
            target_temperature: Some(22.0),
            min_temp: Some(16.0),
            max_temp: Some(30.0),
            humidity: Some(40.0),
            unit: Some(TemperatureUnit::Celsius),
        }
    }

    #[tokio::test]
    async fn store_keys_fixed_at_startup() {
        let store = ZoneStateStore::new(3, 1);
        assert_eq!(store.indices(), BTreeSet::from([1, 2, 3]));
        assert!(!store.contains(0));
        assert!(!store.contains(4));
        assert!(store.get(1).await.is_none());
        assert!(matches!(store.lock(4).await, Err(Error::InvalidZone(4))));
    }

    #[tokio::test]
    async fn first_merge_populates_and_flags_master() {
        let store = ZoneStateStore::new(2, 1);
        let outcome = store.merge(1, &full_reading(1)).await.unwrap();
        assert!(outcome.changed);

        let state = store.get(1).await.unwrap();
        assert!(state.is_master);
        assert_eq!(state.power, Some(true));
        assert_eq!(state.mode, Some(HvacMode::Heat));
        assert_eq!(state.bounds().map(|(a, b)| (a.celsius(), b.celsius())), Some((16.0, 30.0)));
        assert!(state.updated_at.is_some());

        store.merge(2, &full_reading(2)).await.unwrap();
        assert!(!store.get(2).await.unwrap().is_master);
    }

    #[tokio::test]
    async fn identical_reading_is_unchanged() {
        let store = ZoneStateStore::new(1, 1);
        store.merge(1, &full_reading(1)).await.unwrap();
        let before = store.get(1).await.unwrap();
        let outcome = store.merge(1, &full_reading(1)).await.unwrap();
        assert!(!outcome.changed);
        assert_eq!(store.get(1).await.unwrap(), before);
    }

    #[tokio::test]
    async fn temperatures_within_precision_are_unchanged() {
        let store = ZoneStateStore::new(1, 1);
        store.merge(1, &full_reading(1)).await.unwrap();

        let mut reading = full_reading(1);
        reading.current_temperature = Some(21.0000001);
        reading.target_temperature = Some(21.9);
        assert!(!store.merge(1, &reading).await.unwrap().changed);

        reading.current_temperature = Some(21.5);
        assert!(store.merge(1, &reading).await.unwrap().changed);
    }

    #[tokio::test]
    async fn partial_reading_keeps_missing_fields() {
        let store = ZoneStateStore::new(1, 1);
        store.merge(1, &full_reading(1)).await.unwrap();

        let mut partial = RawZoneReading::new(1);
        partial.current_temperature = Some(23.0);
        let outcome = store.merge(1, &partial).await.unwrap();
        assert!(outcome.changed);

        let state = store.get(1).await.unwrap();
        assert_eq!(state.current_temperature.unwrap().celsius(), 23.0);
        assert_eq!(state.target_temperature.unwrap().celsius(), 22.0);
        assert_eq!(state.power, Some(true));
        assert_eq!(state.mode, Some(HvacMode::Heat));
        assert_eq!(state.name.as_deref(), Some("Salon"));
    }

    #[tokio::test]
    async fn unknown_mode_rejects_only_that_field() {
        let store = ZoneStateStore::new(1, 1);
        store.merge(1, &full_reading(1)).await.unwrap();

        let mut reading = full_reading(1);
        reading.mode = Some(ModeReading::Unknown("6".into()));
        reading.target_temperature = Some(24.0);
        let outcome = store.merge(1, &reading).await.unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.rejected_fields, vec!["mode"]);

        let state = store.get(1).await.unwrap();
        assert_eq!(state.mode, Some(HvacMode::Heat));
        assert_eq!(state.target_temperature.unwrap().celsius(), 24.0);
    }

    #[tokio::test]
    async fn fahrenheit_zone_normalized_to_celsius() {
        let store = ZoneStateStore::new(1, 1);
        let mut reading = full_reading(1);
        reading.unit = Some(TemperatureUnit::Fahrenheit);
        reading.min_temp = Some(59.0);
        reading.max_temp = Some(86.0);
        store.merge(1, &reading).await.unwrap();

        let (min, max) = store.get(1).await.unwrap().bounds().unwrap();
        assert!((min.celsius() - 15.0).abs() < 0.01);
        assert!((max.celsius() - 30.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn command_result_applied_exactly() {
        let store = ZoneStateStore::new(1, 1);
        store.merge(1, &full_reading(1)).await.unwrap();

        let cmd = ZoneCommand::TargetTemperature(Temperature::from_celsius(22.1));
        assert!(store.apply_command_result(1, &cmd).await.unwrap());
        assert_eq!(store.get(1).await.unwrap().target_temperature.unwrap().celsius(), 22.1);

        assert!(store.apply_command_result(1, &ZoneCommand::Power(false)).await.unwrap());
        assert!(!store.apply_command_result(1, &ZoneCommand::Power(false)).await.unwrap());
    }

    #[tokio::test]
    async fn writes_are_stamped_against_the_sequence() {
        let store = ZoneStateStore::new(2, 1);
        store.merge(1, &full_reading(1)).await.unwrap();
        let before = store.sequence();

        store.apply_command_result(1, &ZoneCommand::Power(false)).await.unwrap();
        assert!(store.lock(1).await.unwrap().written_since(before));
        assert!(!store.lock(2).await.unwrap().written_since(before));
        assert!(!store.lock(1).await.unwrap().written_since(store.sequence()));
        assert_eq!(store.master(), 1);
    }

    #[tokio::test]
    async fn snapshot_skips_unpopulated_zones() {
        let store = ZoneStateStore::new(3, 1);
        store.merge(2, &full_reading(2)).await.unwrap();
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].index, 2);
    }
}
