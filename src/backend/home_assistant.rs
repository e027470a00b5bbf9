//! Home Assistant REST backend
//!
//! Inventory comes from `GET /api/states`: entities in controllable domains
//! become devices, `scene.*` entities become scenes. Commands become service
//! calls under `POST /api/services/{domain}/{service}`.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

use crate::domain::{Action, Command, Device, DeviceType, Scene};
use crate::retry::{RetryPolicy, is_retryable_status, with_retry};
use crate::{Error, Result};

use super::DeviceBackend;

/// REST client for a Home Assistant instance
pub struct HomeAssistantClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

#[derive(Debug, Deserialize)]
struct Entity {
    entity_id: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    attributes: HashMap<String, Value>,
}

impl Entity {
    fn domain(&self) -> &str {
        self.entity_id.split('.').next().unwrap_or_default()
    }

    fn friendly_name(&self) -> String {
        self.attributes
            .get("friendly_name")
            .and_then(Value::as_str)
            .map_or_else(|| self.entity_id.clone(), ToString::to_string)
    }
}

/// Which device type an entity domain maps to; `None` means the entity is
/// not something this gateway controls.
fn device_type_for(domain: &str) -> Option<DeviceType> {
    match domain {
        "light" => Some(DeviceType::Light),
        "switch" => Some(DeviceType::Switch),
        "climate" => Some(DeviceType::Thermostat),
        "binary_sensor" | "sensor" => Some(DeviceType::Sensor),
        "fan" => Some(DeviceType::Other),
        _ => None,
    }
}

/// Map a command onto a service call: `(domain, service, data)`.
///
/// `set_level` and `set_color` are light services; Home Assistant expects
/// brightness on a 0-255 scale while commands carry a 0-100 level.
fn build_service_call(cmd: &Command) -> Option<(String, &'static str, Map<String, Value>)> {
    let entity_domain = cmd
        .target_id
        .split_once('.')
        .map_or("light", |(domain, _)| domain);
    let mut data = Map::new();

    match cmd.action {
        Action::TurnOn => Some((entity_domain.to_string(), "turn_on", data)),
        Action::TurnOff => Some((entity_domain.to_string(), "turn_off", data)),
        Action::SetLevel => {
            let level = cmd
                .parameters
                .get("level")
                .and_then(Value::as_f64)
                .unwrap_or(100.0);
            #[allow(clippy::cast_possible_truncation)]
            data.insert("brightness".to_string(), json!((level * 2.55) as i64));
            Some(("light".to_string(), "turn_on", data))
        }
        Action::SetColor => {
            if let Some(color) = cmd.parameters.get("color").and_then(Value::as_str) {
                data.insert("color_name".to_string(), json!(color));
            }
            Some(("light".to_string(), "turn_on", data))
        }
        _ => None,
    }
}

impl HomeAssistantClient {
    #[must_use]
    pub fn new(base_url: &str, token: &str, cancel: CancellationToken) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            retry: RetryPolicy::default(),
            cancel,
        }
    }

    async fn fetch_states(&self) -> Result<Vec<Entity>> {
        with_retry(&self.cancel, &self.retry, || async {
            let response = self
                .client
                .get(format!("{}/api/states", self.base_url))
                .bearer_auth(&self.token)
                .send()
                .await?;
            let entities = Self::check(response).await?.json().await?;
            Ok(entities)
        })
        .await
    }

    async fn call_service(&self, domain: &str, service: &str, data: &Map<String, Value>) -> Result<()> {
        let url = format!("{}/api/services/{domain}/{service}", self.base_url);
        with_retry(&self.cancel, &self.retry, || async {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.token)
                .json(data)
                .send()
                .await?;
            Self::check(response).await?;
            Ok(())
        })
        .await
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Backend(
                "unauthorized: check the Home Assistant token".to_string(),
            ));
        }
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            let retryable = if is_retryable_status(status) {
                " (retryable)"
            } else {
                ""
            };
            return Err(Error::Backend(format!(
                "Home Assistant API returned {status}{retryable}: {body}"
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl DeviceBackend for HomeAssistantClient {
    async fn list_devices(&self) -> Result<Vec<Device>> {
        let entities = self.fetch_states().await?;

        Ok(entities
            .into_iter()
            .filter_map(|entity| {
                let device_type = device_type_for(entity.domain())?;
                Some(Device {
                    name: entity.friendly_name(),
                    category: entity.domain().to_string(),
                    device_type,
                    online: entity.state != "unavailable",
                    functions: Vec::new(),
                    id: entity.entity_id,
                })
            })
            .collect())
    }

    async fn list_scenes(&self) -> Result<Vec<Scene>> {
        let entities = self.fetch_states().await?;

        Ok(entities
            .into_iter()
            .filter(|entity| entity.domain() == "scene")
            .map(|entity| Scene {
                name: entity.friendly_name(),
                status: entity.state.clone(),
                home_id: None,
                id: entity.entity_id,
            })
            .collect())
    }

    async fn execute_command(&self, cmd: &Command) -> Result<()> {
        let Some((domain, service, mut data)) = build_service_call(cmd) else {
            return Err(Error::Backend(format!("unknown action: {}", cmd.action)));
        };
        data.insert("entity_id".to_string(), json!(cmd.target_id));

        self.call_service(&domain, service, &data).await
    }

    async fn trigger_scene(&self, scene_id: &str) -> Result<()> {
        let mut data = Map::new();
        data.insert("entity_id".to_string(), json!(scene_id));

        self.call_service("scene", "turn_on", &data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn command(action: Action, target_id: &str, parameters: Value) -> Command {
        Command {
            action,
            target_name: String::new(),
            target_id: target_id.to_string(),
            target_type: crate::domain::TargetType::Device,
            parameters: serde_json::from_value(parameters).unwrap(),
            raw_text: String::new(),
            confidence: 1.0,
        }
    }

    // -- service-call mapping -----------------------------------------------

    #[test]
    fn turn_on_uses_the_entity_domain() {
        let cmd = command(Action::TurnOn, "switch.kettle", json!({}));
        let (domain, service, data) = build_service_call(&cmd).unwrap();

        assert_eq!(domain, "switch");
        assert_eq!(service, "turn_on");
        assert!(data.is_empty());
    }

    #[test]
    fn set_level_scales_to_brightness() {
        let cmd = command(Action::SetLevel, "light.living", json!({"level": 50}));
        let (domain, service, data) = build_service_call(&cmd).unwrap();

        assert_eq!(domain, "light");
        assert_eq!(service, "turn_on");
        assert_eq!(data.get("brightness"), Some(&json!(127)));
    }

    #[test]
    fn set_level_defaults_to_full_brightness() {
        let cmd = command(Action::SetLevel, "light.living", json!({}));
        let (_, _, data) = build_service_call(&cmd).unwrap();
        assert_eq!(data.get("brightness"), Some(&json!(255)));
    }

    #[test]
    fn set_color_passes_the_color_name() {
        let cmd = command(Action::SetColor, "light.living", json!({"color": "red"}));
        let (domain, service, data) = build_service_call(&cmd).unwrap();

        assert_eq!(domain, "light");
        assert_eq!(service, "turn_on");
        assert_eq!(data.get("color_name"), Some(&json!("red")));
    }

    #[test]
    fn status_queries_have_no_service_call() {
        let cmd = command(Action::GetStatus, "light.living", json!({}));
        assert!(build_service_call(&cmd).is_none());
    }

    // -- inventory ----------------------------------------------------------

    fn states_body() -> Value {
        json!([
            {
                "entity_id": "light.living_room",
                "state": "on",
                "attributes": {"friendly_name": "Luz Living"}
            },
            {
                "entity_id": "switch.kettle",
                "state": "unavailable",
                "attributes": {}
            },
            {
                "entity_id": "scene.movie_night",
                "state": "scening",
                "attributes": {"friendly_name": "Película"}
            },
            {
                "entity_id": "media_player.tv",
                "state": "off",
                "attributes": {}
            }
        ])
    }

    #[tokio::test]
    async fn lists_devices_from_states() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/states"))
            .and(header("authorization", "Bearer ha-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(states_body()))
            .mount(&server)
            .await;

        let client = HomeAssistantClient::new(&server.uri(), "ha-token", CancellationToken::new());
        let devices = client.list_devices().await.unwrap();

        assert_eq!(devices.len(), 2, "scene and media_player must be skipped");
        assert_eq!(devices[0].id, "light.living_room");
        assert_eq!(devices[0].name, "Luz Living");
        assert_eq!(devices[0].device_type, DeviceType::Light);
        assert!(devices[0].online);
        assert_eq!(devices[1].name, "switch.kettle", "falls back to entity id");
        assert!(!devices[1].online);
    }

    #[tokio::test]
    async fn lists_scenes_from_states() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/states"))
            .respond_with(ResponseTemplate::new(200).set_body_json(states_body()))
            .mount(&server)
            .await;

        let client = HomeAssistantClient::new(&server.uri(), "ha-token", CancellationToken::new());
        let scenes = client.list_scenes().await.unwrap();

        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].id, "scene.movie_night");
        assert_eq!(scenes[0].name, "Película");
    }

    // -- dispatch -----------------------------------------------------------

    #[tokio::test]
    async fn executes_a_command_as_a_service_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/services/light/turn_on"))
            .and(body_json(json!({"brightness": 191, "entity_id": "light.living_room"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = HomeAssistantClient::new(&server.uri(), "ha-token", CancellationToken::new());
        let cmd = command(Action::SetLevel, "light.living_room", json!({"level": 75}));

        client.execute_command(&cmd).await.unwrap();
    }

    #[tokio::test]
    async fn triggers_a_scene() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/services/scene/turn_on"))
            .and(body_json(json!({"entity_id": "scene.movie_night"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = HomeAssistantClient::new(&server.uri(), "ha-token", CancellationToken::new());
        client.trigger_scene("scene.movie_night").await.unwrap();
    }

    #[tokio::test]
    async fn unauthorized_names_the_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/states"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = HomeAssistantClient::new(&server.uri(), "bad-token", CancellationToken::new());
        let err = client.list_devices().await.unwrap_err();

        assert!(err.to_string().contains("Home Assistant token"), "{err}");
    }
}
