//! Appointment scheduling chat widget
//!
//! A real-time chat widget for a vaccination appointment assistant. The widget
//! keeps one persistent WebSocket to the scheduling backend per mounted page,
//! tracks the conversation's slot context and renders assistant replies,
//! including clinic search results, as HTML.
//!
//! # Architecture
//!
//! - **View**: a plain state container mutated by named event handlers
//! - **Render**: pure HTML projection of a view, with sanitized rich text
//! - **Session**: one tokio task per mounted view owning the view and its channel
//! - **Server**: Axum host serving the page shell, SSE transcript and send endpoint
//!
//! # Modules
//!
//! - [`view`]: the chat view state machine
//! - [`protocol`]: wire types exchanged with the backend
//! - [`context`]: conversational slot context
//! - [`channel`]: duplex channel abstraction and WebSocket connector
//! - [`session`]: mounted view tasks and the view store

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod channel;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod markup;
pub mod protocol;
pub mod render;
pub mod server;
pub mod session;
pub mod telemetry;
pub mod view;

use crate::config::AppConfig;

use session::ViewStore;
use std::sync::Arc;

pub use error::{Error, Result};

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Mounted chat views, one per client.
    pub views: ViewStore,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}
