use serde_json::{json, Value};
use tracing::debug;

use crate::types::*;
use crate::{Error, Result};

pub const DEFAULT_PORT: u16 = 3000;
pub const HVAC_PATH: &str = "/api/v1/hvac";

/// Zone id that addresses every zone of a system in a read request.
pub const ALL_ZONES: u8 = 0;

/// A mode field as reported by the device. Codes outside the known set are
/// kept so the caller can report them.
#[derive(Debug, Clone, PartialEq)]
pub enum ModeReading {
    Known(HvacMode),
    Unknown(String),
}

/// One zone entry of an `/api/v1/hvac` response. Every field is optional:
/// write echoes and short reads only carry a subset. Temperatures are raw
/// numbers in the unit the zone reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawZoneReading {
    pub zone: ZoneIndex,
    pub name: Option<String>,
    pub power: Option<bool>,
    pub mode: Option<ModeReading>,
    pub supported_modes: Option<Vec<HvacMode>>,
    pub current_temperature: Option<f64>,
    pub target_temperature: Option<f64>,
    pub min_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub humidity: Option<f64>,
    pub unit: Option<TemperatureUnit>,
}

impl RawZoneReading {
    pub fn new(zone: ZoneIndex) -> Self {
        Self {
            zone,
            ..Default::default()
        }
    }

    fn from_json(zone: ZoneIndex, data: &Value) -> Self {
        let mut reading = Self::new(zone);

        reading.name = data
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        reading.power = data.get("on").and_then(|v| match v {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_f64().map(|n| n != 0.0),
            _ => None,
        });

        reading.mode = data.get("mode").map(|v| {
            match v.as_u64().and_then(HvacMode::from_airzone) {
                Some(mode) => ModeReading::Known(mode),
                None => ModeReading::Unknown(v.to_string()),
            }
        });

        if let Some(Value::Array(codes)) = data.get("modes") {
            let modes = codes
                .iter()
                .filter_map(|c| {
                    let mode = c.as_u64().and_then(HvacMode::from_airzone);
                    if mode.is_none() {
                        debug!(zone, code = %c, "ignoring unknown capability mode");
                    }
                    mode
                })
                .collect();
            reading.supported_modes = Some(modes);
        }

        reading.current_temperature = data.get("roomTemp").and_then(|v| v.as_f64());
        reading.target_temperature = data.get("setpoint").and_then(|v| v.as_f64());
        reading.min_temp = data.get("minTemp").and_then(|v| v.as_f64());
        reading.max_temp = data.get("maxTemp").and_then(|v| v.as_f64());
        reading.humidity = data.get("humidity").and_then(|v| v.as_f64());
        reading.unit = data
            .get("units")
            .and_then(|v| v.as_u64())
            .and_then(TemperatureUnit::from_airzone);

        reading
    }
}

pub fn read_request(system_id: u8) -> Value {
    json!({
        "systemID": system_id,
        "zoneID": ALL_ZONES,
    })
}

/// Body for a single-field write. Setpoints are sent in the zone's unit.
pub fn write_request(
    system_id: u8,
    zone: ZoneIndex,
    command: &ZoneCommand,
    unit: TemperatureUnit,
) -> Value {
    let mut body = json!({
        "systemID": system_id,
        "zoneID": zone,
    });
    let (field, value) = match command {
        ZoneCommand::Power(on) => ("on", json!(u8::from(*on))),
        ZoneCommand::Mode(mode) => ("mode", json!(mode.as_airzone())),
        ZoneCommand::TargetTemperature(t) => ("setpoint", json!(t.to_unit(unit))),
    };
    body[field] = value;
    body
}

/// Parse an `/api/v1/hvac` body into per-zone readings for `system_id`.
///
/// An `errors` array anywhere in the body means the device refused the
/// request. Entries without a usable `zoneID` or for another system are
/// dropped.
pub fn parse_hvac_response(body: &str, system_id: u8) -> Result<Vec<RawZoneReading>> {
    let parsed: Value = serde_json::from_str(body)?;

    if let Some(errors) = parsed.get("errors") {
        let detail = match errors {
            Value::Array(list) if list.is_empty() => None,
            Value::Array(list) => Some(
                list.iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            Value::Null => None,
            other => Some(other.to_string()),
        };
        if let Some(detail) = detail {
            return Err(Error::Rejected(detail));
        }
    }

    let entries = match parsed.get("data") {
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(Error::MalformedResponse("`data` is not an array".into())),
        None => return Err(Error::MalformedResponse("missing `data`".into())),
    };

    let readings = entries
        .iter()
        .filter_map(|entry| {
            let zone = entry
                .get("zoneID")
                .and_then(|v| v.as_u64())
                .and_then(|id| ZoneIndex::try_from(id).ok());
            let Some(zone) = zone else {
                debug!(entry = %entry, "dropping entry without zoneID");
                return None;
            };
            if let Some(sys) = entry.get("systemID").and_then(|v| v.as_u64())
                && sys != u64::from(system_id)
            {
                return None;
            }
            Some(RawZoneReading::from_json(zone, entry))
        })
        .collect();

    Ok(readings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_request_targets_all_zones() {
        let body = read_request(1);
        assert_eq!(body["systemID"], 1);
        assert_eq!(body["zoneID"], 0);
    }

    #[test]
    fn write_request_fields() {
        let body = write_request(1, 2, &ZoneCommand::Power(false), TemperatureUnit::Celsius);
        assert_eq!(body["zoneID"], 2);
        assert_eq!(body["on"], 0);

        let body = write_request(1, 2, &ZoneCommand::Mode(HvacMode::Heat), TemperatureUnit::Celsius);
        assert_eq!(body["mode"], 3);

        let cmd = ZoneCommand::TargetTemperature(Temperature::from_celsius(22.5));
        let body = write_request(1, 2, &cmd, TemperatureUnit::Celsius);
        assert_eq!(body["setpoint"], 22.5);
    }

    #[test]
    fn write_setpoint_in_fahrenheit_zone() {
        let cmd = ZoneCommand::TargetTemperature(Temperature::from_celsius(20.0));
        let body = write_request(1, 1, &cmd, TemperatureUnit::Fahrenheit);
        assert_eq!(body["setpoint"], 68.0);
    }

    #[test]
    fn parse_full_zone() {
        let body = r#"{"data": [{
            "systemID": 1, "zoneID": 1, "name": "Salon",
            "on": 1, "mode": 3, "modes": [1, 2, 3, 4, 5],
            "roomTemp": 21.3, "setpoint": 22, "minTemp": 15, "maxTemp": 30,
            "humidity": 41, "units": 0
        }]}"#;
        let readings = parse_hvac_response(body, 1).unwrap();
        assert_eq!(readings.len(), 1);
        let r = &readings[0];
        assert_eq!(r.zone, 1);
        assert_eq!(r.name.as_deref(), Some("Salon"));
        assert_eq!(r.power, Some(true));
        assert_eq!(r.mode, Some(ModeReading::Known(HvacMode::Heat)));
        assert_eq!(r.supported_modes.as_ref().map(Vec::len), Some(5));
        assert_eq!(r.current_temperature, Some(21.3));
        assert_eq!(r.target_temperature, Some(22.0));
        assert_eq!(r.min_temp, Some(15.0));
        assert_eq!(r.max_temp, Some(30.0));
        assert_eq!(r.unit, Some(TemperatureUnit::Celsius));
    }

    #[test]
    fn parse_unknown_mode_kept_per_field() {
        let body = r#"{"data": [{"systemID": 1, "zoneID": 2, "mode": 6, "setpoint": 21}]}"#;
        let readings = parse_hvac_response(body, 1).unwrap();
        assert_eq!(readings[0].mode, Some(ModeReading::Unknown("6".into())));
        assert_eq!(readings[0].target_temperature, Some(21.0));
    }

    #[test]
    fn parse_errors_is_rejected() {
        let body = r#"{"errors": [{"zone": "zone not exist"}]}"#;
        let err = parse_hvac_response(body, 1).unwrap_err();
        assert!(matches!(err, Error::Rejected(_)), "got {err:?}");
    }

    #[test]
    fn parse_garbage_is_malformed() {
        assert!(matches!(
            parse_hvac_response("not json", 1),
            Err(Error::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_hvac_response(r#"{"data": {}}"#, 1),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn parse_filters_other_systems_and_bad_ids() {
        let body = r#"{"data": [
            {"systemID": 1, "zoneID": 1, "on": 0},
            {"systemID": 2, "zoneID": 1, "on": 1},
            {"systemID": 1, "zoneID": "x"},
            {"systemID": 1, "zoneID": 999}
        ]}"#;
        let readings = parse_hvac_response(body, 1).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].power, Some(false));
    }
}
