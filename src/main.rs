use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use slackgate::{
    Credentials, Delivery, Dispatcher, EventEnvelope, ServerConfig, SlackError, SlackWebClient,
    WebhookError, WebhookReceiver,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Slack retries unacknowledged deliveries; remember event ids this long.
const DEDUPE_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
struct AppState {
    receiver: Arc<WebhookReceiver>,
    slack: Arc<dyn Dispatcher>,
    dedupe: Arc<DashMap<String, Instant>>,
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slackgate=info".into()),
        )
        .init();

    let credentials = match Credentials::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let config = match ServerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    if config.dry_run {
        warn!("DRY_RUN mode enabled - replies will NOT be posted to Slack");
    }

    let slack = SlackWebClient::new(&credentials).with_api_base(config.api_base.clone());

    let state = AppState {
        receiver: Arc::new(WebhookReceiver::new(&credentials)),
        slack: Arc::new(slack),
        dedupe: Arc::new(DashMap::new()),
        dry_run: config.dry_run,
    };

    // Cleanup old dedupe entries periodically
    let dedupe_cleanup = state.dedupe.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let now = Instant::now();
            dedupe_cleanup.retain(|_, seen| now.duration_since(*seen) < DEDUPE_TTL);
        }
    });

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    info!("Starting server on {}", addr);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/slack/events", post(slack_events_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn slack_events_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    debug!(
        "Received request to /slack/events, body length: {} bytes",
        body.len()
    );

    // The body is handed over untouched; any re-encoding would break the signature
    let outcome = state.receiver.receive(&headers, &body);
    match outcome {
        Ok(Delivery::Challenge(challenge)) => (
            challenge.status,
            [(header::CONTENT_TYPE, challenge.content_type)],
            challenge.body,
        )
            .into_response(),
        Ok(Delivery::Event(envelope)) => {
            if is_duplicate(&state.dedupe, &envelope.event_id, Instant::now()) {
                info!("Ignoring redelivered event {}", envelope.event_id);
                return StatusCode::OK.into_response();
            }

            // Ack right away; Slack gives up on responses slower than 3s
            tokio::spawn(async move {
                if let Err(e) = handle_event(&*state.slack, &envelope, state.dry_run).await {
                    error!("Error handling event {}: {}", envelope.event_id, e);
                }
            });
            StatusCode::OK.into_response()
        }
        Err(e) => {
            if let WebhookError::Decode(_) = e {
                warn!("{}", e);
            }
            e.status_code().into_response()
        }
    }
}

/// Records `event_id` and reports whether it was already seen within the TTL.
fn is_duplicate(dedupe: &DashMap<String, Instant>, event_id: &str, now: Instant) -> bool {
    if event_id.is_empty() {
        return false;
    }

    match dedupe.entry(event_id.to_string()) {
        Entry::Occupied(mut seen) => {
            if now.duration_since(*seen.get()) < DEDUPE_TTL {
                true
            } else {
                seen.insert(now);
                false
            }
        }
        Entry::Vacant(slot) => {
            slot.insert(now);
            false
        }
    }
}

/// Greets whoever mentions the bot, in the thread of their message.
async fn handle_event<D>(
    slack: &D,
    envelope: &EventEnvelope,
    dry_run: bool,
) -> Result<(), SlackError>
where
    D: Dispatcher + ?Sized,
{
    if !envelope.is_event_callback() {
        debug!("Ignoring {} delivery", envelope.envelope_type);
        return Ok(());
    }

    let event = &envelope.event;
    if event.event_type != "app_mention" {
        debug!("Ignoring {} event", event.event_type);
        return Ok(());
    }

    if event.user.is_empty() || envelope.bot_user_id() == Some(event.user.as_str()) {
        return Ok(());
    }

    let Some(thread_ts) = event.reply_thread_ts() else {
        warn!("app_mention {} has no timestamp to reply to", envelope.event_id);
        return Ok(());
    };

    let profile = slack.get_user_info(&event.user).await?;
    let text = format!("Hi {}, I got your message.", profile.preferred_name());

    if dry_run {
        info!("[DRY RUN] Would reply in {}: {}", event.channel, text);
        return Ok(());
    }

    slack
        .post_threaded_reply(&event.channel, &text, thread_ts)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use slackgate::{
        compute_signature, decode_event, UserProfile, SIGNATURE_HEADER, TIMESTAMP_HEADER,
    };
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::{SystemTime, UNIX_EPOCH};
    use tower::ServiceExt;

    #[derive(Default)]
    struct FakeSlack {
        calls: Mutex<Vec<String>>,
        fail_lookup: bool,
    }

    impl FakeSlack {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Dispatcher for FakeSlack {
        async fn post_message(&self, channel: &str, text: &str) -> Result<(), SlackError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("post {} {}", channel, text));
            Ok(())
        }

        async fn post_threaded_reply(
            &self,
            channel: &str,
            text: &str,
            thread_ts: &str,
        ) -> Result<(), SlackError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("reply {} {} {}", channel, thread_ts, text));
            Ok(())
        }

        async fn upload_file(
            &self,
            channel: &str,
            _path: &Path,
            filename: &str,
            _thread_ts: Option<&str>,
        ) -> Result<(), SlackError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("upload {} {}", channel, filename));
            Ok(())
        }

        async fn get_user_info(&self, user_id: &str) -> Result<UserProfile, SlackError> {
            self.calls.lock().unwrap().push(format!("lookup {}", user_id));
            if self.fail_lookup {
                return Err(SlackError::Api("user_not_found".to_string()));
            }
            Ok(UserProfile {
                id: user_id.to_string(),
                display_name: "egon".to_string(),
                ..Default::default()
            })
        }
    }

    fn mention(user: &str, thread_ts: Option<&str>) -> EventEnvelope {
        let thread = thread_ts
            .map(|ts| format!(r#","thread_ts":"{}""#, ts))
            .unwrap_or_default();
        let body = format!(
            r#"{{
                "type": "event_callback",
                "event_id": "Ev1",
                "authorizations": [{{"user_id": "UBOT", "is_bot": true}}],
                "event": {{
                    "type": "app_mention",
                    "user": "{}",
                    "channel": "C1",
                    "ts": "1700000000.000200"{}
                }}
            }}"#,
            user, thread
        );
        decode_event(body.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn mention_gets_threaded_greeting() {
        let slack = FakeSlack::default();
        handle_event(&slack, &mention("U1", None), false).await.unwrap();
        assert_eq!(
            slack.calls(),
            vec![
                "lookup U1".to_string(),
                "reply C1 1700000000.000200 Hi egon, I got your message.".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn reply_goes_into_existing_thread() {
        let slack = FakeSlack::default();
        handle_event(&slack, &mention("U1", Some("1700000000.000100")), false)
            .await
            .unwrap();
        assert_eq!(
            slack.calls()[1],
            "reply C1 1700000000.000100 Hi egon, I got your message."
        );
    }

    #[tokio::test]
    async fn dry_run_does_not_post() {
        let slack = FakeSlack::default();
        handle_event(&slack, &mention("U1", None), true).await.unwrap();
        assert_eq!(slack.calls(), vec!["lookup U1".to_string()]);
    }

    #[tokio::test]
    async fn own_mentions_and_other_events_are_ignored() {
        let slack = FakeSlack::default();
        handle_event(&slack, &mention("UBOT", None), false)
            .await
            .unwrap();

        let message = decode_event(
            br#"{"type":"event_callback","event":{"type":"message","user":"U1","ts":"1"}}"#,
        )
        .unwrap();
        handle_event(&slack, &message, false).await.unwrap();

        assert!(slack.calls().is_empty());
    }

    #[tokio::test]
    async fn dispatcher_errors_propagate() {
        let slack = FakeSlack {
            fail_lookup: true,
            ..Default::default()
        };
        let err = handle_event(&slack, &mention("U1", None), false)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Slack API error: user_not_found");
    }

    #[test]
    fn redelivered_event_ids_are_detected() {
        let dedupe = DashMap::new();
        let start = Instant::now();
        assert!(!is_duplicate(&dedupe, "Ev1", start));
        assert!(is_duplicate(&dedupe, "Ev1", start + Duration::from_secs(60)));
        assert!(!is_duplicate(&dedupe, "Ev2", start));
        assert!(!is_duplicate(&dedupe, "Ev1", start + DEDUPE_TTL));

        assert!(!is_duplicate(&dedupe, "", start));
        assert!(!is_duplicate(&dedupe, "", start));
    }

    const SECRET: &str = "s3cr3t";

    const MENTION_BODY: &[u8] = br#"{
        "type": "event_callback",
        "event_id": "EvRouter",
        "authorizations": [{"user_id": "UBOT", "is_bot": true}],
        "event": {"type": "app_mention", "user": "U1", "channel": "C1", "ts": "1700000000.000200"}
    }"#;

    fn test_app(slack: Arc<FakeSlack>) -> (Router, Arc<DashMap<String, Instant>>) {
        let dedupe = Arc::new(DashMap::new());
        let state = AppState {
            receiver: Arc::new(WebhookReceiver::new(&Credentials::new(SECRET, "xoxb-test"))),
            slack,
            dedupe: dedupe.clone(),
            dry_run: false,
        };
        (build_router(state), dedupe)
    }

    fn events_request(body: &[u8], signature: Option<&str>) -> Request<Body> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            .to_string();
        let signature = signature
            .map(str::to_string)
            .unwrap_or_else(|| compute_signature(SECRET.as_bytes(), &timestamp, body));

        Request::builder()
            .method("POST")
            .uri("/slack/events")
            .header("Content-Type", "application/json")
            .header(TIMESTAMP_HEADER, timestamp)
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(body.to_vec()))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn challenge_is_echoed_as_plain_text() {
        let (app, _) = test_app(Arc::new(FakeSlack::default()));
        let body = br#"{"type":"url_verification","challenge":"xyz"}"#;

        let response = app.oneshot(events_request(body, None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
            "text/plain"
        );
        assert_eq!(body_text(response).await, "xyz");
    }

    #[tokio::test]
    async fn bad_signature_is_unauthorized() {
        let slack = Arc::new(FakeSlack::default());
        let (app, dedupe) = test_app(slack.clone());
        let forged = "v0=0000000000000000000000000000000000000000000000000000000000000000";

        let response = app
            .oneshot(events_request(MENTION_BODY, Some(forged)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(slack.calls().is_empty());
        assert!(dedupe.is_empty());
    }

    #[tokio::test]
    async fn signed_malformed_body_is_bad_request() {
        let (app, _) = test_app(Arc::new(FakeSlack::default()));

        let response = app
            .oneshot(events_request(b"{not json", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn redelivered_event_is_acked_but_handled_once() {
        let slack = Arc::new(FakeSlack::default());
        let (app, dedupe) = test_app(slack.clone());

        let first = app
            .clone()
            .oneshot(events_request(MENTION_BODY, None))
            .await
            .unwrap();
        let second = app
            .oneshot(events_request(MENTION_BODY, None))
            .await
            .unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            slack.calls(),
            vec![
                "lookup U1".to_string(),
                "reply C1 1700000000.000200 Hi egon, I got your message.".to_string(),
            ]
        );
        assert!(dedupe.contains_key("EvRouter"));
    }

    #[tokio::test]
    async fn health_check_responds_ok() {
        let (app, _) = test_app(Arc::new(FakeSlack::default()));
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok");
    }
}
