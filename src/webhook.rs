//! Webhook HTTP surface.
//!
//! One POST route accepts the provider's form-encoded delivery and answers
//! with TwiML. Errors surface as a 400 with a JSON `{"error": ...}` body,
//! matching what the provider dashboard expects to display.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Form, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use crate::config::Config;
use crate::resolver::{self, InboundSms};
use crate::store::Store;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/webhook/sms", post(receive_sms).options(preflight))
        .with_state(state)
}

/// Twilio-style form fields. Everything is optional at parse time; `From`
/// and `Body` are enforced in the handler so their absence yields the JSON
/// error body rather than a framework rejection.
#[derive(Debug, Deserialize)]
pub struct InboundForm {
    #[serde(rename = "From")]
    from: Option<String>,
    #[serde(rename = "To")]
    to: Option<String>,
    #[serde(rename = "Body")]
    body: Option<String>,
    #[serde(rename = "MessageSid")]
    message_sid: Option<String>,
}

fn cors_headers() -> [(HeaderName, &'static str); 2] {
    [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        (
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            "authorization, x-client-info, apikey, content-type",
        ),
    ]
}

async fn healthz() -> &'static str {
    "ok"
}

async fn preflight() -> impl IntoResponse {
    (cors_headers(), "ok")
}

pub async fn receive_sms(State(state): State<AppState>, Form(form): Form<InboundForm>) -> Response {
    match process(&state, form).await {
        Ok(twiml) => (
            StatusCode::OK,
            cors_headers(),
            [(header::CONTENT_TYPE, "text/xml")],
            twiml,
        )
            .into_response(),
        Err(e) => {
            error!("Inbound webhook failed: {:#}", e);
            (
                StatusCode::BAD_REQUEST,
                cors_headers(),
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn process(state: &AppState, form: InboundForm) -> Result<String> {
    let from = form
        .from
        .filter(|s| !s.is_empty())
        .context("Missing required field: From")?;
    let body = form.body.context("Missing required field: Body")?;

    let sms = InboundSms {
        from,
        to: form.to.unwrap_or_default(),
        body,
        provider_sid: form.message_sid.unwrap_or_default(),
    };

    let resolution = resolver::handle_inbound(&state.store, &state.config.sms, &sms).await?;
    debug!(
        id = %resolution.message_id,
        member = resolution.member_id.as_deref().unwrap_or("-"),
        conversation = resolution.conversation_id.as_deref().unwrap_or("-"),
        "Webhook processed"
    );

    Ok(twiml_response(state.config.sms.auto_reply.as_deref()))
}

/// Empty TwiML acknowledgement, or one carrying the configured auto-reply.
fn twiml_response(auto_reply: Option<&str>) -> String {
    match auto_reply {
        Some(text) => format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n  <Message>{}</Message>\n</Response>",
            xml_escape(text)
        ),
        None => "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response></Response>".to_string(),
    }
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
