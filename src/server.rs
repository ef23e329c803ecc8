use axum::{
    Form, Router,
    body::Body,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;

use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use tracing::info;

use crate::AppState;
use crate::channel::{Connector, WsConnector};
use crate::config::AppConfig;
use crate::identity::{CLIENT_ID_KEY, ClientIdentity};
use crate::markup::escape;
use crate::render;
use crate::session::ViewStore;

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let backend = config.backend.base_url()?;
    info!(
        name: "backend.config.loaded",
        backend_url = %backend,
        reconnect_attempts = config.reconnect.max_attempts,
        "Backend configuration loaded"
    );

    let connector: Arc<dyn Connector> = Arc::new(WsConnector);
    let state = AppState {
        views: ViewStore::new(connector, backend, config.reconnect),
        config: Arc::clone(&config),
    };

    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

/// Build the widget router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/chat/stream", get(chat_stream))
        .route("/chat/send", post(chat_send))
        .route("/health", get(|| async { "ok" }))
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// HTML Page Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Generate the HTML shell for the application.
fn html_shell(title: &str, content: &str) -> String {
    format!(r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <meta name="description" content="AI-Powered Appointment Scheduling">
    <title>{title}</title>

    <!-- HTMX and SSE extension -->
    <script src="https://unpkg.com/htmx.org@2.0.8/dist/htmx.min.js"></script>
    <script src="https://unpkg.com/htmx-ext-sse@2.2.2/sse.js"></script>
    <link rel="stylesheet" href="/static/app.css">
</head>
<body class="min-h-screen bg-background text-textPrimary antialiased">
    <div id="app-shell" class="flex flex-col h-screen overflow-hidden">
        <header class="relative w-full p-5 bg-surfaceContainer shadow-md shrink-0">
            <h2 class="text-center text-lg font-semibold">{title}</h2>
        </header>

        <main id="app" class="flex-1 flex flex-col gap-4 overflow-hidden container mx-auto px-4 py-4 max-w-5xl">
            {content}
        </main>
    </div>
</body>
</html>"#)
}

/// Chat widget: SSE-driven transcript plus the input form.
fn chat_content() -> String {
    format!(
        r#"
    <div class="chat-shell flex-1 overflow-y-auto rounded-md bg-surface p-3 shadow-sm max-h-[80vh]"
         hx-ext="sse" sse-connect="/chat/stream" sse-swap="transcript" hx-swap="innerHTML"
         aria-live="polite" aria-label="Chat messages">
        <div id="chat-transcript" class="text-xs text-center text-textMuted">Connecting…</div>
    </div>
    {form}
    "#,
        form = render::input_form()
    )
}

/// GET / - page shell. Creates the client identity cookie on first visit.
async fn index_handler(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let (client_id, created) =
        ClientIdentity::load_or_create(jar.get(CLIENT_ID_KEY).map(Cookie::value));

    let jar = if created {
        info!(
            name: "client.identity.created",
            client_id = %client_id,
            "New client identity"
        );
        jar.add(
            Cookie::build((CLIENT_ID_KEY, client_id.to_string()))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .permanent(),
        )
    } else {
        jar
    };

    (
        jar,
        Html(html_shell(&escape(&state.config.server.title), &chat_content())),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat Handlers
// ─────────────────────────────────────────────────────────────────────────────

fn client_identity(jar: &CookieJar) -> Option<ClientIdentity> {
    jar.get(CLIENT_ID_KEY)
        .and_then(|cookie| ClientIdentity::parse(cookie.value()))
}

/// GET /chat/stream - mounts the view and streams its transcript.
///
/// The view unmounts (closing its backend channel) once every stream
/// subscribed to it has disconnected.
async fn chat_stream(State(state): State<AppState>, jar: CookieJar) -> Response {
    let Some(client_id) = client_identity(&jar) else {
        return (StatusCode::BAD_REQUEST, "Missing client identity").into_response();
    };

    let mut subscription = match state.views.mount(&client_id) {
        Ok(sub) => sub,
        Err(e) => {
            tracing::error!(client_id = %client_id, error = %e, "Failed to mount chat view");
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    tracing::debug!(client_id = %client_id, "Starting transcript stream");

    let sse_stream = async_stream::stream! {
        loop {
            let html = subscription.current();
            yield Ok::<String, Infallible>(sse_event("transcript", &html));
            if !subscription.changed().await {
                break;
            }
        }
    };

    build_sse_response(Body::from_stream(sse_stream))
}

/// Form body for sending a message.
#[derive(Debug, Deserialize)]
struct SendForm {
    #[serde(default)]
    message: String,
}

/// POST /chat/send - forward user input to the mounted view.
///
/// Responds with a fresh, empty input form.
async fn chat_send(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<SendForm>,
) -> Response {
    let Some(client_id) = client_identity(&jar) else {
        return (StatusCode::BAD_REQUEST, "Missing client identity").into_response();
    };
    let Some(view) = state.views.get(&client_id) else {
        return (StatusCode::CONFLICT, "Chat is not connected").into_response();
    };

    tracing::debug!(
        client_id = %client_id,
        message_length = form.message.len(),
        "Received chat input"
    );

    match view.send(form.message) {
        Ok(()) => Html(render::input_form()).into_response(),
        Err(e) => (StatusCode::CONFLICT, e.to_string()).into_response(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Format one SSE event; multi-line payloads become several `data:` lines.
pub fn sse_event(event: &str, data: &str) -> String {
    let mut out = format!("event: {event}\n");
    for line in data.split('\n') {
        out.push_str("data: ");
        out.push_str(line.trim_end_matches('\r'));
        out.push('\n');
    }
    out.push('\n');
    out
}

fn build_sse_response(body: Body) -> Response {
    let mut resp = Response::new(body);
    let h = resp.headers_mut();
    h.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    h.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    h.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    h.insert("X-Accel-Buffering", HeaderValue::from_static("no"));
    resp
}
