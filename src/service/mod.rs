pub mod error;

use std::net::IpAddr;
use std::sync::Arc;

use tokio::task;
use tracing::{debug, info};

use crate::db::{DeviceStore, StoreError};
use crate::device::Device;
use crate::device::validate::{DevicePayload, validate_create, validate_update};
use crate::probe::{PingResult, ProbeOutcome, Prober};

pub use error::ServiceError;

/// The device inventory use cases, independent of HTTP
pub struct DeviceService {
    store: Arc<dyn DeviceStore>,
    prober: Arc<dyn Prober>,
}

impl DeviceService {
    pub fn new(store: Arc<dyn DeviceStore>, prober: Arc<dyn Prober>) -> Self {
        Self { store, prober }
    }

    /// Run a store call on the blocking pool
    async fn with_store<T, F>(&self, f: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&dyn DeviceStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| ServiceError::Internal(format!("Task error: {}", e)))?
            .map_err(ServiceError::from)
    }

    pub async fn list_devices(&self) -> Result<Vec<Device>, ServiceError> {
        self.with_store(|store| store.list()).await
    }

    pub async fn create_device(&self, body: &[u8]) -> Result<Device, ServiceError> {
        let payload = DevicePayload::from_json(body)?;
        let device = validate_create(&payload)?;

        let created = self.with_store(move |store| store.insert(&device)).await?;
        info!(name = %created.name, ip = %created.ip, "Device created");
        Ok(created)
    }

    pub async fn get_device(&self, name: &str) -> Result<Device, ServiceError> {
        let name = name.to_string();
        self.with_store(move |store| store.get(&name)).await
    }

    pub async fn update_device(&self, name: &str, body: &[u8]) -> Result<Device, ServiceError> {
        let payload = DevicePayload::from_json(body)?;
        let update = validate_update(&payload)?;

        let name = name.to_string();
        let updated = self
            .with_store(move |store| store.update_fields(&name, &update))
            .await?;
        info!(name = %updated.name, "Device updated");
        Ok(updated)
    }

    pub async fn delete_device(&self, name: &str) -> Result<(), ServiceError> {
        let owned = name.to_string();
        self.with_store(move |store| store.delete(&owned)).await?;
        info!(name, "Device deleted");
        Ok(())
    }

    /// Probe a stored device. Probe problems end up in the result body,
    /// only a missing device or a store failure is an error.
    pub async fn ping_device(&self, name: &str) -> Result<PingResult, ServiceError> {
        let device = self.get_device(name).await?;

        let outcome = match device.ip.parse::<IpAddr>() {
            Ok(ip) => self.probe(ip).await,
            Err(e) => ProbeOutcome::failure(format!("Ping error: {}", e)),
        };
        debug!(
            name = %device.name,
            ip = %device.ip,
            status = %outcome.status,
            rtt_ms = ?outcome.rtt_ms,
            "Probe finished"
        );

        Ok(PingResult::new(device.name, outcome))
    }

    /// The prober runs on the blocking pool with a hard wall-clock cap, so a
    /// platform that ignores socket timeouts cannot stall the request.
    async fn probe(&self, ip: IpAddr) -> ProbeOutcome {
        let prober = Arc::clone(&self.prober);
        let limit = prober.timeout();

        match tokio::time::timeout(limit, task::spawn_blocking(move || prober.probe(ip))).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => ProbeOutcome::failure(format!("Ping error: {}", e)),
            Err(_) => ProbeOutcome::timeout(),
        }
    }
}
