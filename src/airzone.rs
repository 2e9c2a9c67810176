use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::callbacks::Callbacks;
use crate::climate::{ClimateEntity, SystemEntity};
use crate::client::{AirzoneClient, DeviceClient};
use crate::commands::CommandTranslator;
use crate::config::AirzoneConfig;
use crate::logger::MessageLogMode;
use crate::reconciler::{PollOutcome, Reconciler};
use crate::store::ZoneStateStore;
use crate::types::*;
use crate::Result;

pub struct AirzoneBuilder {
    config: AirzoneConfig,
    client: Option<Arc<dyn DeviceClient>>,
    callbacks: Callbacks,
    log: Option<(MessageLogMode, String)>,
}

impl AirzoneBuilder {
    pub fn new(config: AirzoneConfig) -> Self {
        Self {
            config,
            client: None,
            callbacks: Callbacks::default(),
            log: None,
        }
    }

    /// Called with the latest snapshot whenever a zone changes.
    pub fn on_zone_update(
        mut self,
        f: impl Fn(ZoneIndex, &ZoneState) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.update.push(Box::new(f));
        self
    }

    /// Called after every failed poll and once on recovery.
    pub fn on_availability(mut self, f: impl Fn(Availability) + Send + Sync + 'static) -> Self {
        self.callbacks.availability.push(Box::new(f));
        self
    }

    /// Use a custom transport instead of the HTTP client.
    pub fn device_client(mut self, client: Arc<dyn DeviceClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log = Some((mode, path.into()));
        self
    }

    pub fn build(self) -> Result<Airzone> {
        self.config.validate()?;

        let client: Arc<dyn DeviceClient> = match self.client {
            Some(client) => client,
            None => {
                let mut builder = AirzoneClient::builder(&self.config.host)
                    .port(self.config.port)
                    .system_id(self.config.system_id)
                    .timeout(self.config.timeout());
                if let Some((mode, path)) = self.log {
                    builder = builder.message_log(mode, path);
                }
                Arc::new(builder.build()?)
            }
        };

        let store = Arc::new(ZoneStateStore::new(self.config.zones, self.config.master_zone));
        let callbacks = Arc::new(self.callbacks);
        let reconciler = Arc::new(Reconciler::new(
            client.clone(),
            store.clone(),
            callbacks.clone(),
            self.config.failure_threshold,
        ));
        let commands = CommandTranslator::new(client, store.clone(), callbacks);
        let (shutdown, _) = broadcast::channel(1);

        debug!(
            host = %self.config.host,
            zones = self.config.zones,
            master = self.config.master_zone,
            "airzone zones registered"
        );

        Ok(Airzone {
            config: self.config,
            store,
            reconciler,
            commands,
            shutdown,
        })
    }
}

/// Zone synchronization engine for one Airzone system.
pub struct Airzone {
    config: AirzoneConfig,
    store: Arc<ZoneStateStore>,
    reconciler: Arc<Reconciler>,
    commands: CommandTranslator,
    shutdown: broadcast::Sender<()>,
}

impl Airzone {
    pub fn builder(config: AirzoneConfig) -> AirzoneBuilder {
        AirzoneBuilder::new(config)
    }

    pub fn config(&self) -> &AirzoneConfig {
        &self.config
    }

    /// Run one poll tick. Skipped when the previous tick is still running.
    pub async fn poll(&self) -> PollOutcome {
        self.reconciler.poll().await
    }

    pub fn availability(&self) -> Availability {
        self.reconciler.availability()
    }

    pub async fn zone(&self, index: ZoneIndex) -> Option<ZoneState> {
        self.store.get(index).await
    }

    pub async fn zones(&self) -> Vec<ZoneState> {
        self.store.snapshot().await
    }

    pub async fn climate(&self, index: ZoneIndex) -> Option<ClimateEntity> {
        let state = self.store.get(index).await?;
        Some(ClimateEntity::new(self.config.system_id, state))
    }

    pub async fn system(&self) -> SystemEntity {
        let master = self.store.get(self.store.master()).await;
        SystemEntity::new(self.config.system_id, master)
    }

    pub async fn set_system_mode(&self, mode: HvacMode) -> Result<()> {
        self.commands.set_system_mode(mode).await
    }

    pub async fn set_mode(&self, index: ZoneIndex, mode: HvacMode) -> Result<()> {
        self.commands.set_mode(index, mode).await
    }

    pub async fn set_target_temperature(&self, index: ZoneIndex, celsius: f64) -> Result<()> {
        self.commands.set_target_temperature(index, celsius).await
    }

    pub async fn set_power(&self, index: ZoneIndex, on: bool) -> Result<()> {
        self.commands.set_power(index, on).await
    }

    pub async fn set_hvac_mode(&self, index: ZoneIndex, mode: HvacMode) -> Result<()> {
        self.commands.set_hvac_mode(index, mode).await
    }

    /// Poll on the configured interval from a background task until
    /// [`Airzone::stop_polling`] is called. Late ticks are dropped, not
    /// queued.
    pub fn spawn_polling(&self) -> JoinHandle<()> {
        let reconciler = self.reconciler.clone();
        let period = self.config.poll_interval();
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_secs = period.as_secs(), "zone polling started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        reconciler.poll().await;
                    }
                    _ = shutdown.recv() => {
                        info!("zone polling stopped");
                        break;
                    }
                }
            }
        })
    }

    pub fn stop_polling(&self) {
        let _ = self.shutdown.send(());
    }
}
