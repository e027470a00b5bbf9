//! Alexa skill webhook
//!
//! The skill expects a spoken reply on every request, so this handler always
//! answers `200` with a speakable body; failures become spoken messages, not
//! HTTP errors. Authentication is a shared secret carried in the
//! `X-Auth-Token` header or a `token` query parameter.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use super::{ApiState, MAX_WEBHOOK_BYTES};

#[derive(Debug, Deserialize)]
pub struct AlexaRequest {
    pub request: AlexaRequestBody,
}

#[derive(Debug, Deserialize)]
pub struct AlexaRequestBody {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub intent: AlexaIntent,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlexaIntent {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slots: HashMap<String, AlexaSlot>,
}

#[derive(Debug, Deserialize)]
pub struct AlexaSlot {
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct AlexaResponse {
    pub version: &'static str,
    pub response: AlexaResponseBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlexaResponseBody {
    pub output_speech: OutputSpeech,
    pub should_end_session: bool,
}

#[derive(Debug, Serialize)]
pub struct OutputSpeech {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

fn speak(text: impl Into<String>, end_session: bool) -> Json<AlexaResponse> {
    Json(AlexaResponse {
        version: "1.0",
        response: AlexaResponseBody {
            output_speech: OutputSpeech {
                kind: "PlainText",
                text: text.into(),
            },
            should_end_session: end_session,
        },
    })
}

fn provided_token<'a>(headers: &'a HeaderMap, params: &'a HashMap<String, String>) -> Option<&'a str> {
    headers
        .get("x-auth-token")
        .and_then(|v| v.to_str().ok())
        .or_else(|| params.get("token").map(String::as_str))
}

/// `POST /alexa` — authenticate, route by request type, and enqueue the
/// spoken command as text.
pub async fn handle_request(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Body,
) -> Json<AlexaResponse> {
    if let Some(secret) = &state.webhook_secret {
        if provided_token(&headers, &params) != Some(secret.as_str()) {
            tracing::warn!("webhook request with missing or invalid token");
            return speak("No autorizado", true);
        }
    }

    // The body is capped here rather than by an extractor so an oversized
    // request still gets a spoken reply instead of a protocol error.
    let Ok(body) = axum::body::to_bytes(body, MAX_WEBHOOK_BYTES).await else {
        tracing::warn!("webhook request body unreadable or over the size cap");
        return speak("No pude entender la solicitud", true);
    };

    let Ok(request) = serde_json::from_slice::<AlexaRequest>(&body) else {
        tracing::warn!("unparseable webhook request body");
        return speak("No pude entender la solicitud", true);
    };

    match request.request.kind.as_str() {
        "LaunchRequest" => speak("Hola, decime qué querés hacer", false),
        "SessionEndedRequest" => speak("Chau", true),
        "IntentRequest" => handle_intent(&state, &request.request.intent),
        other => {
            tracing::warn!(kind = %other, "unhandled webhook request type");
            speak("No entendí el pedido", true)
        }
    }
}

fn handle_intent(state: &ApiState, intent: &AlexaIntent) -> Json<AlexaResponse> {
    match intent.name.as_str() {
        "AMAZON.HelpIntent" => speak(
            "Podés decirme cosas como: encendé la luz de la cocina, o activá la escena película",
            false,
        ),
        "AMAZON.StopIntent" | "AMAZON.CancelIntent" => speak("Chau", true),
        _ => {
            let text = intent
                .slots
                .get("command")
                .map(|slot| slot.value.trim())
                .unwrap_or_default();
            if text.is_empty() {
                return speak("No entendí el comando, probá de nuevo", false);
            }

            if state.queue.try_submit_text(text) {
                tracing::info!(text = %text, "queued webhook command");
                speak(format!("Ejecutando: {text}"), true)
            } else {
                tracing::warn!("ingestion queue full, rejecting webhook command");
                speak("Estoy ocupado, probá en un momento", true)
            }
        }
    }
}
