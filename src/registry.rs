//! Device/scene registry with atomic snapshot replacement
//!
//! The registry caches the backend's device and scene inventory so the
//! pipeline can resolve target names without a network round trip per
//! command. Every sync builds a fresh [`RegistrySnapshot`] off to the side
//! and installs it wholesale under a write lock; readers hold a read lock
//! just long enough to clone the current `Arc` and never observe a
//! half-built index.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::backend::DeviceBackend;
use crate::domain::{Device, Scene};

/// Immutable registry state at a point in time
///
/// Lists retain backend fetch order so the substring-fallback lookup is
/// deterministic for a given backend response.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    devices: Vec<Device>,
    scenes: Vec<Scene>,
    device_index: HashMap<String, usize>,
    scene_index: HashMap<String, usize>,
}

impl RegistrySnapshot {
    fn build(devices: Vec<Device>, scenes: Vec<Scene>) -> Self {
        let device_index = devices
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.to_lowercase(), i))
            .collect();
        let scene_index = scenes
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.to_lowercase(), i))
            .collect();

        Self {
            devices,
            scenes,
            device_index,
            scene_index,
        }
    }

    /// Devices in backend fetch order
    #[must_use]
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Scenes in backend fetch order
    #[must_use]
    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    fn find_device(&self, name: &str) -> Option<&Device> {
        let key = name.trim().to_lowercase();

        if let Some(&i) = self.device_index.get(&key) {
            return self.devices.get(i);
        }

        self.devices
            .iter()
            .find(|d| d.name.to_lowercase().contains(&key))
    }

    fn find_scene(&self, name: &str) -> Option<&Scene> {
        let key = name.trim().to_lowercase();

        if let Some(&i) = self.scene_index.get(&key) {
            return self.scenes.get(i);
        }

        self.scenes
            .iter()
            .find(|s| s.name.to_lowercase().contains(&key))
    }

    /// Render the inventory as prompt context for the intent parser
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::from("## Dispositivos disponibles:\n");
        for d in &self.devices {
            let status = if d.online { "online" } else { "offline" };
            out.push_str(&format!(
                "- {} (tipo: {}, estado: {status})\n",
                d.name, d.device_type
            ));
        }

        out.push_str("\n## Escenas disponibles:\n");
        for s in &self.scenes {
            out.push_str(&format!("- {}\n", s.name));
        }

        out
    }
}

/// Concurrently-read device/scene cache backed by periodic full syncs
pub struct Registry {
    backend: Arc<dyn DeviceBackend>,
    snapshot: RwLock<Arc<RegistrySnapshot>>,
}

impl Registry {
    /// Create a registry with an empty snapshot; call [`Registry::sync`]
    /// before serving lookups.
    #[must_use]
    pub fn new(backend: Arc<dyn DeviceBackend>) -> Self {
        Self {
            backend,
            snapshot: RwLock::new(Arc::new(RegistrySnapshot::default())),
        }
    }

    /// Fetch the full device and scene lists and install a fresh snapshot.
    ///
    /// Fetches complete before the write lock is taken, so the lock is held
    /// only for the swap. A failed fetch leaves the previous snapshot in
    /// place and is reported to the caller.
    ///
    /// # Errors
    ///
    /// Returns the backend error if either inventory fetch fails.
    pub async fn sync(&self) -> Result<()> {
        tracing::info!("syncing devices and scenes");

        let devices = self.backend.list_devices().await?;
        let scenes = self.backend.list_scenes().await?;

        let next = Arc::new(RegistrySnapshot::build(devices, scenes));
        tracing::info!(
            devices = next.devices.len(),
            scenes = next.scenes.len(),
            "sync complete"
        );

        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = next;

        Ok(())
    }

    /// Current snapshot; cheap `Arc` clone under a read lock
    #[must_use]
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Resolve a device by name: exact lowercase match first, then the first
    /// case-insensitive substring match in fetch order.
    #[must_use]
    pub fn find_device_by_name(&self, name: &str) -> Option<Device> {
        self.snapshot().find_device(name).cloned()
    }

    /// Resolve a scene by name; same matching rules as devices
    #[must_use]
    pub fn find_scene_by_name(&self, name: &str) -> Option<Scene> {
        self.snapshot().find_scene(name).cloned()
    }

    /// Render the current inventory for the intent parser's prompt
    #[must_use]
    pub fn summary(&self) -> String {
        self.snapshot().summary()
    }

    /// Run [`Registry::sync`] on a fixed cadence until cancelled.
    ///
    /// Sync failures are logged and do not stop the schedule. Nothing
    /// prevents a scheduled sync overlapping a manual one; each builds its
    /// snapshot fully before swapping, so the last writer wins and the
    /// installed snapshot is always internally consistent.
    pub fn start_periodic_sync(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // interval fires immediately; the initial sync already happened
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = registry.sync().await {
                            tracing::error!(error = %err, "periodic sync failed");
                        }
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snap = self.snapshot();
        f.debug_struct("Registry")
            .field("devices", &snap.devices.len())
            .field("scenes", &snap.scenes.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::Error;
    use crate::domain::{Command, DeviceType};

    struct StubBackend {
        devices: Mutex<Vec<Device>>,
        scenes: Mutex<Vec<Scene>>,
        fail: std::sync::atomic::AtomicBool,
        syncs: AtomicU32,
    }

    impl StubBackend {
        fn new(devices: Vec<Device>, scenes: Vec<Scene>) -> Arc<Self> {
            Arc::new(Self {
                devices: Mutex::new(devices),
                scenes: Mutex::new(scenes),
                fail: std::sync::atomic::AtomicBool::new(false),
                syncs: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl DeviceBackend for StubBackend {
        async fn list_devices(&self) -> Result<Vec<Device>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Backend("fetch failed".to_string()));
            }
            self.syncs.fetch_add(1, Ordering::SeqCst);
            Ok(self.devices.lock().unwrap().clone())
        }

        async fn list_scenes(&self) -> Result<Vec<Scene>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Backend("fetch failed".to_string()));
            }
            Ok(self.scenes.lock().unwrap().clone())
        }

        async fn execute_command(&self, _cmd: &Command) -> Result<()> {
            Ok(())
        }

        async fn trigger_scene(&self, _scene_id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn device(id: &str, name: &str) -> Device {
        Device {
            id: id.to_string(),
            name: name.to_string(),
            device_type: DeviceType::Light,
            category: "light".to_string(),
            online: true,
            functions: Vec::new(),
        }
    }

    fn scene(id: &str, name: &str) -> Scene {
        Scene {
            id: id.to_string(),
            name: name.to_string(),
            status: String::new(),
            home_id: None,
        }
    }

    // -- sync -----------------------------------------------------------------

    #[tokio::test]
    async fn sync_populates_devices_and_scenes_together() {
        let backend = StubBackend::new(
            vec![device("dev123", "Luz Living")],
            vec![scene("scene456", "Buenas Noches")],
        );
        let registry = Registry::new(backend);

        registry.sync().await.unwrap();

        // A single snapshot must expose both inventories
        let snap = registry.snapshot();
        assert_eq!(snap.devices().len(), 1);
        assert_eq!(snap.scenes().len(), 1);
    }

    #[tokio::test]
    async fn identical_syncs_produce_equal_snapshots() {
        let backend = StubBackend::new(
            vec![device("d1", "Lamp"), device("d2", "Heater")],
            vec![scene("s1", "Movie Night")],
        );
        let registry = Registry::new(backend);

        registry.sync().await.unwrap();
        let first = registry.snapshot();
        registry.sync().await.unwrap();
        let second = registry.snapshot();

        assert!(!Arc::ptr_eq(&first, &second), "sync must install a new snapshot");
        assert_eq!(first.devices(), second.devices());
        assert_eq!(first.scenes(), second.scenes());
        assert_eq!(
            second.find_device("lamp").map(|d| d.id.as_str()),
            Some("d1")
        );
    }

    #[tokio::test]
    async fn failed_sync_keeps_previous_snapshot() {
        let backend = StubBackend::new(vec![device("d1", "Lamp")], vec![]);
        let registry = Registry::new(backend.clone());

        registry.sync().await.unwrap();
        backend.fail.store(true, Ordering::SeqCst);

        assert!(registry.sync().await.is_err());
        assert_eq!(
            registry.find_device_by_name("Lamp").map(|d| d.id),
            Some("d1".to_string())
        );
    }

    // -- lookup ---------------------------------------------------------------

    #[tokio::test]
    async fn exact_match_wins_over_substring() {
        let backend = StubBackend::new(
            vec![
                device("strip", "Light Strip Living"),
                device("plain", "Light"),
            ],
            vec![],
        );
        let registry = Registry::new(backend);
        registry.sync().await.unwrap();

        let found = registry.find_device_by_name("light").unwrap();
        assert_eq!(found.id, "plain");
    }

    #[tokio::test]
    async fn substring_fallback_returns_first_in_fetch_order() {
        let backend = StubBackend::new(
            vec![
                device("d1", "Luz Living"),
                device("d2", "Luz Cocina"),
            ],
            vec![],
        );
        let registry = Registry::new(backend);
        registry.sync().await.unwrap();

        let found = registry.find_device_by_name("luz").unwrap();
        assert_eq!(found.id, "d1");
    }

    #[tokio::test]
    async fn lookup_normalizes_case_and_whitespace() {
        let backend = StubBackend::new(
            vec![device("d1", "Luz Living")],
            vec![scene("s1", "Buenas Noches")],
        );
        let registry = Registry::new(backend);
        registry.sync().await.unwrap();

        assert!(registry.find_device_by_name("  LUZ LIVING ").is_some());
        assert!(registry.find_scene_by_name("buenas noches").is_some());
        assert!(registry.find_device_by_name("garage door").is_none());
    }

    // -- summary --------------------------------------------------------------

    #[tokio::test]
    async fn summary_lists_devices_with_status_and_scenes() {
        let mut offline = device("d2", "Heater");
        offline.online = false;
        offline.device_type = DeviceType::Thermostat;

        let backend = StubBackend::new(
            vec![device("d1", "Luz Living"), offline],
            vec![scene("s1", "Buenas Noches")],
        );
        let registry = Registry::new(backend);
        registry.sync().await.unwrap();

        let summary = registry.summary();
        assert!(summary.contains("- Luz Living (tipo: light, estado: online)"));
        assert!(summary.contains("- Heater (tipo: thermostat, estado: offline)"));
        assert!(summary.contains("- Buenas Noches"));
    }

    // -- periodic sync --------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn periodic_sync_runs_on_cadence_and_stops_on_cancel() {
        let backend = StubBackend::new(vec![device("d1", "Lamp")], vec![]);
        let registry = Arc::new(Registry::new(backend.clone()));
        let cancel = CancellationToken::new();

        let handle = registry.start_periodic_sync(Duration::from_secs(60), cancel.clone());

        tokio::time::sleep(Duration::from_secs(150)).await;
        let after_two_windows = backend.syncs.load(Ordering::SeqCst);
        assert_eq!(after_two_windows, 2);

        cancel.cancel();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(backend.syncs.load(Ordering::SeqCst), after_two_windows);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_sync_survives_backend_failures() {
        let backend = StubBackend::new(vec![device("d1", "Lamp")], vec![]);
        let registry = Arc::new(Registry::new(backend.clone()));
        let cancel = CancellationToken::new();

        backend.fail.store(true, Ordering::SeqCst);
        let handle = registry.start_periodic_sync(Duration::from_secs(60), cancel.clone());

        tokio::time::sleep(Duration::from_secs(90)).await;
        backend.fail.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(backend.syncs.load(Ordering::SeqCst) >= 1);
        cancel.cancel();
        handle.await.unwrap();
    }
}
