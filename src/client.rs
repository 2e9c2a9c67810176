use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, trace};

use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::{
    parse_hvac_response, read_request, write_request, RawZoneReading, DEFAULT_PORT, HVAC_PATH,
};
use crate::types::*;
use crate::{Error, Result};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Request/response access to the controller. Implementations hold no zone
/// state and never retry; retry policy belongs to the caller.
#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Read the current state of `indices`. Zones the device did not report
    /// are absent from the returned map.
    async fn fetch_zones(
        &self,
        indices: &BTreeSet<ZoneIndex>,
    ) -> Result<BTreeMap<ZoneIndex, RawZoneReading>>;

    /// Write one field of one zone and return whatever the device echoed.
    async fn write_zone(
        &self,
        index: ZoneIndex,
        command: &ZoneCommand,
        unit: TemperatureUnit,
    ) -> Result<RawZoneReading>;
}

pub struct AirzoneClientBuilder {
    host: String,
    protocol: String,
    port: u16,
    system_id: u8,
    timeout: Duration,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl AirzoneClientBuilder {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            protocol: "http".to_string(),
            port: DEFAULT_PORT,
            system_id: 1,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            log_mode: None,
            log_path: None,
        }
    }

    pub fn protocol(mut self, proto: &str) -> Self {
        self.protocol = proto.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn system_id(mut self, id: u8) -> Self {
        self.system_id = id;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<AirzoneClient> {
        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig("request timeout must be non-zero".into()));
        }

        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => {
                let logger = MessageLogger::open(mode, &path).map_err(|e| {
                    Error::InvalidConfig(format!("cannot open message log {path}: {e}"))
                })?;
                Some(Mutex::new(logger))
            }
            _ => None,
        };

        Ok(AirzoneClient {
            http,
            url: format!("{}://{}:{}{}", self.protocol, self.host, self.port, HVAC_PATH),
            system_id: self.system_id,
            logger,
        })
    }
}

/// HTTP client for the Airzone local API.
pub struct AirzoneClient {
    http: reqwest::Client,
    url: String,
    system_id: u8,
    logger: Option<Mutex<MessageLogger>>,
}

impl AirzoneClient {
    pub fn builder(host: impl Into<String>) -> AirzoneClientBuilder {
        AirzoneClientBuilder::new(host)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn with_logger(&self, f: impl FnOnce(&mut MessageLogger)) {
        if let Some(logger) = &self.logger
            && let Ok(mut logger) = logger.lock()
        {
            f(&mut *logger);
        }
    }

    async fn exchange(&self, method: reqwest::Method, body: &Value) -> Result<(u16, String)> {
        trace!(url = %self.url, %method, "sending request");
        let resp = self
            .http
            .request(method, &self.url)
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            let detail = match parse_hvac_response(&text, self.system_id) {
                Err(Error::Rejected(detail)) => detail,
                _ => text.trim().to_string(),
            };
            debug!(status = status.as_u16(), %detail, "device refused request");
            return Err(Error::Rejected(format!("HTTP {}: {detail}", status.as_u16())));
        }

        Ok((status.as_u16(), text))
    }
}

#[async_trait]
impl DeviceClient for AirzoneClient {
    async fn fetch_zones(
        &self,
        indices: &BTreeSet<ZoneIndex>,
    ) -> Result<BTreeMap<ZoneIndex, RawZoneReading>> {
        let request = read_request(self.system_id);
        self.with_logger(|l| l.log_request("POST", HVAC_PATH, &request));

        let (status, body) = self.exchange(reqwest::Method::POST, &request).await?;

        self.with_logger(|l| {
            let json = serde_json::from_str(&body).unwrap_or(Value::Null);
            l.log_poll(status, &json);
        });

        let readings = parse_hvac_response(&body, self.system_id)?;
        let mut zones = BTreeMap::new();
        for reading in readings {
            if indices.contains(&reading.zone) {
                zones.insert(reading.zone, reading);
            } else {
                trace!(zone = reading.zone, "ignoring unconfigured zone");
            }
        }
        debug!(requested = indices.len(), received = zones.len(), "fetched zones");
        Ok(zones)
    }

    async fn write_zone(
        &self,
        index: ZoneIndex,
        command: &ZoneCommand,
        unit: TemperatureUnit,
    ) -> Result<RawZoneReading> {
        let request = write_request(self.system_id, index, command, unit);
        self.with_logger(|l| l.log_command(command.action(), index, &request));
        debug!(zone = index, body = %request, "writing zone");

        let (_, body) = self.exchange(reqwest::Method::PUT, &request).await?;

        // Firmware that answers a write with an empty body still applied it.
        if body.trim().is_empty() {
            return Ok(RawZoneReading::new(index));
        }
        let readings = match parse_hvac_response(&body, self.system_id) {
            Ok(readings) => readings,
            // A 2xx means the write landed; an unreadable echo only costs
            // us the confirmation, the next poll fills it in.
            Err(Error::MalformedResponse(reason)) => {
                debug!(zone = index, %reason, "unreadable write echo, treating as empty");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        let echo = readings
            .into_iter()
            .find(|r| r.zone == index)
            .unwrap_or_else(|| RawZoneReading::new(index));
        Ok(echo)
    }
}
