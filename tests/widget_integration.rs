use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use appointment_chat::AppState;
use appointment_chat::channel::{Connector, WsConnector};
use appointment_chat::config::{AppConfig, ReconnectConfig};
use appointment_chat::identity::ClientIdentity;
use appointment_chat::server::router;
use appointment_chat::session::{Subscription, ViewStore};
use axum::Router;
use axum::body::Body;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use axum::routing::get;
use axum_test::TestServer;
use futures::StreamExt;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tower::ServiceExt;
use url::Url;

const WAIT: Duration = Duration::from_secs(10);

/// What the fake backend observed.
#[derive(Debug)]
enum Observed {
    Frame { client_id: String, payload: Value },
    Closed { client_id: String },
}

// ─────────────────────────────────────────────────────────────────────────────
// Fake scheduling backend
// ─────────────────────────────────────────────────────────────────────────────

async fn backend_ws(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(observed): State<mpsc::UnboundedSender<Observed>>,
) -> Response {
    ws.on_upgrade(move |socket| backend_session(socket, client_id, observed))
}

async fn backend_session(
    mut socket: WebSocket,
    client_id: String,
    observed: mpsc::UnboundedSender<Observed>,
) {
    let welcome = json!({
        "type": "system",
        "message": "Welcome! What type of vaccine are you looking for?",
        "timestamp": "2024-11-20T09:00:00"
    });
    if socket
        .send(Message::Text(welcome.to_string().into()))
        .await
        .is_err()
    {
        return;
    }
    // Garbage the widget must survive.
    let _ = socket.send(Message::Text("{broken".into())).await;

    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else {
            continue;
        };
        let payload: Value = serde_json::from_str(text.as_str()).unwrap_or(Value::Null);
        let _ = observed.send(Observed::Frame {
            client_id: client_id.clone(),
            payload,
        });

        let typing = json!({"type": "ai_typing"});
        let reply = json!({
            "type": "ai_response",
            "message": {"response": "<b>Sure</b>, here are clinics near Austin"},
            "extracted_info": {
                "vaccine_type": "flu",
                "location": "Austin",
                "datetime": null,
                "special_requirements": null
            },
            "requires_followup": false,
            "available_clinics": [{
                "clinic": {
                    "id": 1, "name": "Eastside Health", "address": "12 Elm St",
                    "city": "Austin", "state": "TX", "zip_code": "78702",
                    "latitude": 30.26, "longitude": -97.72,
                    "vaccines": ["Flu", "Tdap"]
                },
                "distance": 3.14159,
                "appointments": [
                    {"id": 7, "clinic_id": 1, "patient_id": 2,
                     "appointment_time": "2024-11-21T09:30:00", "status": "scheduled"},
                    {"id": 8, "clinic_id": 1, "patient_id": 3,
                     "appointment_time": "2024-11-21T15:45:00", "status": "scheduled"}
                ]
            }],
            "timestamp": "2024-11-20T09:01:00"
        });
        for frame in [typing, reply] {
            if socket
                .send(Message::Text(frame.to_string().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    }

    let _ = observed.send(Observed::Closed { client_id });
}

async fn spawn_backend() -> (SocketAddr, mpsc::UnboundedReceiver<Observed>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .route("/api/chat/ws/{client_id}", get(backend_ws))
        .with_state(tx);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, rx)
}

fn store_for(addr: SocketAddr) -> ViewStore {
    ViewStore::new(
        Arc::new(WsConnector) as Arc<dyn Connector>,
        Url::parse(&format!("ws://{addr}")).unwrap(),
        ReconnectConfig::disabled(),
    )
}

async fn wait_for(sub: &mut Subscription, needle: &str) -> String {
    timeout(WAIT, async {
        loop {
            let html = sub.current();
            if html.contains(needle) {
                return html;
            }
            assert!(sub.changed().await, "view unmounted while waiting");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {needle:?}"))
}

async fn next_observed(rx: &mut mpsc::UnboundedReceiver<Observed>) -> Observed {
    timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_conversation_over_websocket() {
    let (addr, mut observed) = spawn_backend().await;
    let store = store_for(addr);
    let id = ClientIdentity::generate();

    let mut sub = store.mount(&id).unwrap();
    wait_for(&mut sub, "Welcome!").await;

    sub.handle().send("I need a flu shot").unwrap();
    let Observed::Frame { client_id, payload } = next_observed(&mut observed).await else {
        panic!("expected a frame");
    };
    assert_eq!(client_id, id.as_str());
    assert_eq!(
        payload,
        json!({
            "message": "I need a flu shot",
            "context": {
                "vaccineType": "",
                "location": "",
                "date": "",
                "time": "",
                "specialRequirements": ""
            }
        })
    );

    let html = wait_for(&mut sub, "Available Clinics").await;
    let welcome = html.find("Welcome!").unwrap();
    let echo = html.find("<strong>You:</strong> I need a flu shot").unwrap();
    let reply = html.find("<b>Sure</b>, here are clinics near Austin").unwrap();
    assert!(welcome < echo && echo < reply);

    assert!(html.contains("<p>Austin, TX 78702</p>"));
    assert!(html.contains("Distance: 3.14 meters"));
    assert!(html.contains("Vaccines Offered: Flu, Tdap"));
    let first = html
        .find("11/21/2024, 9:30:00 AM (Status: scheduled)")
        .unwrap();
    let second = html
        .find("11/21/2024, 3:45:00 PM (Status: scheduled)")
        .unwrap();
    assert!(first < second);
    assert!(!html.contains("AI is typing"));
    assert!(!html.contains("{broken"));

    // The next send carries the merged context.
    sub.handle().send("tomorrow morning").unwrap();
    let Observed::Frame { payload, .. } = next_observed(&mut observed).await else {
        panic!("expected a frame");
    };
    assert_eq!(payload["context"]["vaccineType"], "flu");
    assert_eq!(payload["context"]["location"], "Austin");
    assert_eq!(payload["context"]["date"], "");
}

#[tokio::test]
async fn test_unmount_closes_backend_socket() {
    let (addr, mut observed) = spawn_backend().await;
    let store = store_for(addr);
    let id = ClientIdentity::generate();

    let mut sub = store.mount(&id).unwrap();
    wait_for(&mut sub, "Welcome!").await;
    drop(sub);

    match next_observed(&mut observed).await {
        Observed::Closed { client_id } => assert_eq!(client_id, id.as_str()),
        other @ Observed::Frame { .. } => panic!("unexpected {other:?}"),
    }
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_unreachable_backend_shows_disconnected() {
    // Bind and drop a listener to get a port nobody is serving.
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let store = store_for(addr);

    let mut sub = store.mount(&ClientIdentity::generate()).unwrap();
    let html = wait_for(&mut sub, "Disconnected").await;
    assert!(!html.contains("chat-row"));
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP surface
// ─────────────────────────────────────────────────────────────────────────────

fn app_state(addr: SocketAddr) -> AppState {
    let config = AppConfig::load_from_args(["appointment-chat"]).unwrap();
    AppState {
        views: store_for(addr),
        config: Arc::new(config),
    }
}

#[tokio::test]
async fn test_index_sets_client_cookie() {
    let (addr, _observed) = spawn_backend().await;
    let server = TestServer::new(router(app_state(addr))).unwrap();

    let response = server.get("/").await;
    response.assert_status_ok();
    let cookie = response.cookie("clientId");
    assert!(ClientIdentity::parse(cookie.value()).is_some());
    let page = response.text();
    assert!(page.contains(r#"sse-connect="/chat/stream""#));
    assert!(page.contains("<title>AI-Powered Appointment Scheduling</title>"));

    // A returning browser keeps its identity.
    let again = server.get("/").add_cookie(cookie).await;
    again.assert_status_ok();
    assert!(again.maybe_cookie("clientId").is_none());
}

#[tokio::test]
async fn test_send_requires_identity_and_mounted_view() {
    let (addr, _observed) = spawn_backend().await;
    let state = app_state(addr);
    let server = TestServer::new(router(state.clone())).unwrap();

    let response = server
        .post("/chat/send")
        .form(&[("message", "hello")])
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let cookie = server.get("/").await.cookie("clientId");
    let id = ClientIdentity::parse(cookie.value()).unwrap();

    let response = server
        .post("/chat/send")
        .add_cookie(cookie.clone())
        .form(&[("message", "hello")])
        .await;
    response.assert_status(StatusCode::CONFLICT);

    // Mount the view as the transcript stream would.
    let mut sub = state.views.mount(&id).unwrap();
    wait_for(&mut sub, "Welcome!").await;

    let response = server
        .post("/chat/send")
        .add_cookie(cookie)
        .form(&[("message", "I need a flu shot")])
        .await;
    response.assert_status_ok();
    assert!(response.text().contains(r#"id="chat-input""#));

    wait_for(&mut sub, "<b>Sure</b>").await;
}

#[tokio::test]
async fn test_health() {
    let (addr, _observed) = spawn_backend().await;
    let response = router(app_state(addr))
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_transcript_stream_mounts_and_unmounts_view() {
    let (addr, mut observed) = spawn_backend().await;
    let state = app_state(addr);
    let id = ClientIdentity::generate();

    let response = router(state.clone())
        .oneshot(
            Request::builder()
                .uri("/chat/stream")
                .header(header::COOKIE, format!("clientId={id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );

    let mut body = response.into_body().into_data_stream();
    let mut received = String::new();
    timeout(WAIT, async {
        while !received.contains("Welcome!") {
            let chunk = body.next().await.unwrap().unwrap();
            received.push_str(&String::from_utf8_lossy(&chunk));
        }
    })
    .await
    .expect("no transcript frame with the welcome message");

    assert!(received.starts_with("event: transcript\ndata: "));
    assert!(state.views.get(&id).is_some());

    // Closing the stream is the browser leaving the page.
    drop(body);
    assert!(state.views.is_empty());
    match next_observed(&mut observed).await {
        Observed::Closed { client_id } => assert_eq!(client_id, id.as_str()),
        other @ Observed::Frame { .. } => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_transcript_stream_requires_identity() {
    let (addr, _observed) = spawn_backend().await;
    let state = app_state(addr);

    let response = router(state.clone())
        .oneshot(
            Request::builder()
                .uri("/chat/stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(state.views.is_empty());
}
