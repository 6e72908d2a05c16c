//! Per-device connection pool.
//!
//! Constrained device CPUs fall over under concurrent management sessions,
//! so in-flight calls per device are capped by a semaphore. Permits are held
//! for the duration of one transport call only.

use dashmap::DashMap;
use fleetplan_core::error::FleetError;
use fleetplan_core::types::DeviceId;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug)]
pub struct ConnectionPool {
    per_device_limit: usize,
    semaphores: DashMap<DeviceId, Arc<Semaphore>>,
}

impl ConnectionPool {
    pub fn new(per_device_limit: usize) -> Self {
        Self {
            per_device_limit: per_device_limit.max(1),
            semaphores: DashMap::new(),
        }
    }

    pub async fn acquire(&self, device_id: DeviceId) -> Result<OwnedSemaphorePermit, FleetError> {
        let semaphore = self
            .semaphores
            .entry(device_id)
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_device_limit)))
            .clone();
        semaphore
            .acquire_owned()
            .await
            .map_err(|_| FleetError::internal("connection pool closed").with_device(device_id))
    }

    pub fn available(&self, device_id: DeviceId) -> usize {
        self.semaphores
            .get(&device_id)
            .map_or(self.per_device_limit, |s| s.available_permits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn caps_in_flight_calls_per_device() {
        let pool = ConnectionPool::new(2);
        let device = DeviceId::new();

        let p1 = pool.acquire(device).await.unwrap();
        let _p2 = pool.acquire(device).await.unwrap();
        assert_eq!(pool.available(device), 0);

        drop(p1);
        assert_eq!(pool.available(device), 1);
        let _p3 = pool.acquire(device).await.unwrap();
    }

    #[tokio::test]
    async fn devices_do_not_share_permits() {
        let pool = ConnectionPool::new(1);
        let a = DeviceId::new();
        let b = DeviceId::new();

        let _pa = pool.acquire(a).await.unwrap();
        assert_eq!(pool.available(a), 0);
        assert_eq!(pool.available(b), 1);
        let _pb = pool.acquire(b).await.unwrap();
    }
}
