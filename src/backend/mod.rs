//! Device-control backend abstraction

pub mod home_assistant;

pub use home_assistant::HomeAssistantClient;

use async_trait::async_trait;

use crate::Result;
use crate::domain::{Command, Device, Scene};

/// Home-automation backend: inventory fetches for the registry plus command
/// dispatch for the pipeline.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    /// Fetch the full device list
    async fn list_devices(&self) -> Result<Vec<Device>>;

    /// Fetch the full scene list
    async fn list_scenes(&self) -> Result<Vec<Scene>>;

    /// Execute a resolved command (`target_id` must be populated)
    async fn execute_command(&self, cmd: &Command) -> Result<()>;

    /// Trigger a scene by its backend identifier
    async fn trigger_scene(&self, scene_id: &str) -> Result<()>;
}
