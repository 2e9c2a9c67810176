use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Zone number as configured on the controller, 1-based.
pub type ZoneIndex = u8;

/// The device reports temperatures in 0.5 degree steps; readings closer than
/// this are the same value.
pub const TEMPERATURE_TOLERANCE_C: f64 = 0.25;

/// Temperature stored as Celsius internally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Temperature(f64);

impl Temperature {
    pub fn from_celsius(c: f64) -> Self {
        Self(c)
    }

    pub fn from_fahrenheit(f: f64) -> Self {
        Self((f - 32.0) * (5.0 / 9.0))
    }

    /// Interpret a raw device number according to the zone's unit.
    pub fn from_unit(value: f64, unit: TemperatureUnit) -> Self {
        match unit {
            TemperatureUnit::Celsius => Self::from_celsius(value),
            TemperatureUnit::Fahrenheit => Self::from_fahrenheit(value),
        }
    }

    pub fn celsius(&self) -> f64 {
        self.0
    }

    pub fn fahrenheit(&self) -> f64 {
        self.0 * (9.0 / 5.0) + 32.0
    }

    /// Value to put on the wire for a zone using `unit`, one decimal.
    pub fn to_unit(&self, unit: TemperatureUnit) -> f64 {
        let raw = match unit {
            TemperatureUnit::Celsius => self.0,
            TemperatureUnit::Fahrenheit => self.fahrenheit(),
        };
        (raw * 10.0).round() / 10.0
    }

    pub fn approx_eq(&self, other: &Temperature) -> bool {
        (self.0 - other.0).abs() < TEMPERATURE_TOLERANCE_C
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}\u{00b0}C", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn from_airzone(code: u64) -> Option<Self> {
        match code {
            0 => Some(TemperatureUnit::Celsius),
            1 => Some(TemperatureUnit::Fahrenheit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HvacMode {
    Off,
    Heat,
    Cool,
    Fan,
    Dry,
    Auto,
}

impl HvacMode {
    /// Mode code used by the local API.
    pub fn as_airzone(&self) -> u64 {
        match self {
            HvacMode::Off => 1,
            HvacMode::Cool => 2,
            HvacMode::Heat => 3,
            HvacMode::Fan => 4,
            HvacMode::Dry => 5,
            HvacMode::Auto => 7,
        }
    }

    /// Unknown codes yield `None`; firmware revisions add new ones.
    pub fn from_airzone(code: u64) -> Option<Self> {
        match code {
            1 => Some(HvacMode::Off),
            2 => Some(HvacMode::Cool),
            3 => Some(HvacMode::Heat),
            4 => Some(HvacMode::Fan),
            5 => Some(HvacMode::Dry),
            7 => Some(HvacMode::Auto),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HvacMode::Off => "off",
            HvacMode::Heat => "heat",
            HvacMode::Cool => "cool",
            HvacMode::Fan => "fan",
            HvacMode::Dry => "dry",
            HvacMode::Auto => "auto",
        }
    }
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last known state of one zone. Fields stay `None` until the device has
/// reported them at least once.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ZoneState {
    pub index: ZoneIndex,
    pub name: Option<String>,
    pub power: Option<bool>,
    pub mode: Option<HvacMode>,
    pub current_temperature: Option<Temperature>,
    pub target_temperature: Option<Temperature>,
    pub min_temp: Option<Temperature>,
    pub max_temp: Option<Temperature>,
    pub humidity: Option<f64>,
    pub supported_modes: Vec<HvacMode>,
    pub unit: TemperatureUnit,
    pub is_master: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ZoneState {
    pub fn new(index: ZoneIndex, is_master: bool) -> Self {
        Self {
            index,
            is_master,
            ..Default::default()
        }
    }

    pub fn bounds(&self) -> Option<(Temperature, Temperature)> {
        Some((self.min_temp?, self.max_temp?))
    }

    pub fn is_on(&self) -> bool {
        self.power.unwrap_or(false)
    }
}

/// A validated write for a single zone field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoneCommand {
    Power(bool),
    Mode(HvacMode),
    TargetTemperature(Temperature),
}

impl ZoneCommand {
    pub fn action(&self) -> &'static str {
        match self {
            ZoneCommand::Power(_) => "set_power",
            ZoneCommand::Mode(_) => "set_mode",
            ZoneCommand::TargetTemperature(_) => "set_target_temperature",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    /// Polls are failing; entities keep their last known values.
    Unavailable { consecutive_failures: u32 },
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}
