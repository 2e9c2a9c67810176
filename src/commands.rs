use std::sync::Arc;

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::callbacks::Callbacks;
use crate::client::DeviceClient;
use crate::store::{ZoneEntry, ZoneStateStore};
use crate::types::*;
use crate::{Error, Result};

/// Validates user commands against the stored zone state and turns them
/// into device writes. Each command runs inside the zone's exclusive
/// section, so two commands for the same zone (or a command and a poll
/// merge) never interleave.
pub struct CommandTranslator {
    client: Arc<dyn DeviceClient>,
    store: Arc<ZoneStateStore>,
    callbacks: Arc<Callbacks>,
}

impl CommandTranslator {
    pub(crate) fn new(
        client: Arc<dyn DeviceClient>,
        store: Arc<ZoneStateStore>,
        callbacks: Arc<Callbacks>,
    ) -> Self {
        Self {
            client,
            store,
            callbacks,
        }
    }

    /// Set the operating mode. When the device has advertised the modes a
    /// zone supports, anything else is refused locally.
    pub async fn set_mode(&self, index: ZoneIndex, mode: HvacMode) -> Result<()> {
        let mut entry = self.store.lock(index).await?;
        check_supported(&entry, index, mode)?;
        let changed = self.write(index, &mut entry, ZoneCommand::Mode(mode)).await?;
        self.notify([(index, snapshot_if(changed, entry))]);
        Ok(())
    }

    /// Set the target temperature in Celsius, rounded to one decimal.
    pub async fn set_target_temperature(&self, index: ZoneIndex, celsius: f64) -> Result<()> {
        let mut entry = self.store.lock(index).await?;
        let (min, max) = entry
            .state()
            .and_then(ZoneState::bounds)
            .ok_or(Error::NotReady(index))?;

        if !(min.celsius()..=max.celsius()).contains(&celsius) {
            return Err(Error::OutOfRange {
                zone: index,
                value: celsius,
                min: min.celsius(),
                max: max.celsius(),
            });
        }

        // Bounds converted from Fahrenheit are off the one-decimal grid, so
        // rounding can step just past them.
        let rounded = ((celsius * 10.0).round() / 10.0).clamp(min.celsius(), max.celsius());
        let target = Temperature::from_celsius(rounded);
        let changed = self
            .write(index, &mut entry, ZoneCommand::TargetTemperature(target))
            .await?;
        self.notify([(index, snapshot_if(changed, entry))]);
        Ok(())
    }

    /// Switch a zone on or off. Switching off the master zone makes the
    /// device stop the whole system; that cascade is left to the firmware.
    pub async fn set_power(&self, index: ZoneIndex, on: bool) -> Result<()> {
        let mut entry = self.store.lock(index).await?;
        if !on && entry.state().is_some_and(|s| s.is_master) {
            info!(zone = index, "switching off master zone, system will stop");
        }
        let changed = self.write(index, &mut entry, ZoneCommand::Power(on)).await?;
        self.notify([(index, snapshot_if(changed, entry))]);
        Ok(())
    }

    /// System-wide operating mode, carried by the master zone. `Off` writes
    /// the stop mode rather than cutting power.
    pub async fn set_system_mode(&self, mode: HvacMode) -> Result<()> {
        self.set_mode(self.store.master(), mode).await
    }

    /// Thermostat-style mode change: `Off` switches the zone off, anything
    /// else switches the zone on when needed and sets the system mode
    /// through the master zone. Nothing is written unless the master
    /// accepts the mode.
    pub async fn set_hvac_mode(&self, index: ZoneIndex, mode: HvacMode) -> Result<()> {
        if mode == HvacMode::Off {
            return self.set_power(index, false).await;
        }

        // Lock order is always zone, then master.
        let master = self.store.master();
        let mut zone = self.store.lock(index).await?;
        let mut system = if index == master {
            None
        } else {
            Some(self.store.lock(master).await?)
        };
        check_supported(system.as_deref().unwrap_or(&*zone), index, mode)?;

        let mut zone_changed = false;
        if !zone.state().is_some_and(ZoneState::is_on) {
            zone_changed = self.write(index, &mut zone, ZoneCommand::Power(true)).await?;
        }

        let command = ZoneCommand::Mode(mode);
        let (result, system_changed) = match system.as_mut() {
            Some(system) => match self.write(master, system, command).await {
                Ok(changed) => (Ok(()), changed),
                Err(e) => (Err(e), false),
            },
            None => match self.write(index, &mut zone, command).await {
                Ok(changed) => {
                    zone_changed |= changed;
                    (Ok(()), false)
                }
                Err(e) => (Err(e), false),
            },
        };

        let zone_snapshot = snapshot_if(zone_changed, zone);
        let system_snapshot = system.and_then(|s| snapshot_if(system_changed, s));
        self.notify([(index, zone_snapshot), (master, system_snapshot)]);
        result
    }

    /// Send one command and fold the outcome into the locked entry.
    /// Returns whether the zone changed.
    async fn write(
        &self,
        index: ZoneIndex,
        entry: &mut ZoneEntry,
        command: ZoneCommand,
    ) -> Result<bool> {
        let unit = entry.state().map(|s| s.unit).unwrap_or_default();

        let echo = match self.client.write_zone(index, &command, unit).await {
            Ok(echo) => echo,
            Err(e) => {
                warn!(zone = index, action = command.action(), error = %e, "command failed");
                return Err(e);
            }
        };

        let mut changed = self.store.record_write(entry, &command);
        changed |= entry.merge(&echo).changed;
        debug!(zone = index, action = command.action(), changed, "command applied");
        Ok(changed)
    }

    /// Fire update callbacks once every lock has been released.
    fn notify<const N: usize>(&self, updates: [(ZoneIndex, Option<ZoneState>); N]) {
        for (index, state) in updates {
            if let Some(state) = state {
                self.callbacks.zone_updated(index, &state);
            }
        }
    }
}

fn check_supported(entry: &ZoneEntry, index: ZoneIndex, mode: HvacMode) -> Result<()> {
    if let Some(state) = entry.state()
        && !state.supported_modes.is_empty()
        && !state.supported_modes.contains(&mode)
    {
        return Err(Error::UnsupportedMode {
            zone: index,
            mode: mode.to_string(),
        });
    }
    Ok(())
}

/// Release the lock, keeping a copy of the state when it changed.
fn snapshot_if(changed: bool, entry: OwnedMutexGuard<ZoneEntry>) -> Option<ZoneState> {
    if changed { entry.state().cloned() } else { None }
}
