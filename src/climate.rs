use crate::types::*;

pub const TARGET_TEMPERATURE_STEP: f64 = 0.5;
pub const TEMPERATURE_UNIT: &str = "\u{00b0}C";

/// Modes every zone entity offers, regardless of what the device advertises.
const BASE_HVAC_MODES: [HvacMode; 5] = [
    HvacMode::Off,
    HvacMode::Heat,
    HvacMode::Cool,
    HvacMode::Dry,
    HvacMode::Fan,
];

/// Thermostat view of one zone, as the host platform displays it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClimateEntity {
    system_id: u8,
    state: ZoneState,
}

impl ClimateEntity {
    pub fn new(system_id: u8, state: ZoneState) -> Self {
        Self { system_id, state }
    }

    pub fn unique_id(&self) -> String {
        format!("zone_{}_{}", self.system_id, self.state.index)
    }

    pub fn name(&self) -> String {
        match &self.state.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("Zone_{}_{}", self.system_id, self.state.index),
        }
    }

    pub fn is_master(&self) -> bool {
        self.state.is_master
    }

    /// A zone that is switched off reports `Off` whatever its mode.
    pub fn hvac_mode(&self) -> HvacMode {
        if !self.state.is_on() {
            return HvacMode::Off;
        }
        self.state.mode.unwrap_or(HvacMode::Off)
    }

    pub fn hvac_modes(&self) -> Vec<HvacMode> {
        let mut modes = BASE_HVAC_MODES.to_vec();
        if self.state.supported_modes.contains(&HvacMode::Auto) {
            modes.push(HvacMode::Auto);
        }
        modes
    }

    pub fn current_temperature(&self) -> Option<f64> {
        self.state.current_temperature.map(|t| t.celsius())
    }

    pub fn target_temperature(&self) -> Option<f64> {
        self.state.target_temperature.map(|t| t.celsius())
    }

    pub fn current_humidity(&self) -> Option<f64> {
        self.state.humidity
    }

    pub fn min_temp(&self) -> Option<f64> {
        self.state.min_temp.map(|t| t.celsius())
    }

    pub fn max_temp(&self) -> Option<f64> {
        self.state.max_temp.map(|t| t.celsius())
    }

    pub fn target_temperature_step(&self) -> f64 {
        TARGET_TEMPERATURE_STEP
    }

    pub fn temperature_unit(&self) -> &'static str {
        TEMPERATURE_UNIT
    }

    pub fn state(&self) -> &ZoneState {
        &self.state
    }
}

/// System-wide view, driven by the master zone. Hosts normally keep it
/// hidden and use it to change the mode of every zone at once.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemEntity {
    system_id: u8,
    master: Option<ZoneState>,
}

impl SystemEntity {
    pub fn new(system_id: u8, master: Option<ZoneState>) -> Self {
        Self { system_id, master }
    }

    pub fn unique_id(&self) -> String {
        format!("system_{}", self.system_id)
    }

    pub fn name(&self) -> String {
        format!("System_{}", self.system_id)
    }

    pub fn hidden(&self) -> bool {
        true
    }

    /// The stop mode reads as `Off`; zone power does not matter here.
    pub fn hvac_mode(&self) -> HvacMode {
        self.master
            .as_ref()
            .and_then(|m| m.mode)
            .unwrap_or(HvacMode::Off)
    }

    pub fn hvac_modes(&self) -> Vec<HvacMode> {
        BASE_HVAC_MODES.to_vec()
    }

    pub fn temperature_unit(&self) -> &'static str {
        TEMPERATURE_UNIT
    }

    pub fn master(&self) -> Option<&ZoneState> {
        self.master.as_ref()
    }
}
