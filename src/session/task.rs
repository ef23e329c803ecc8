//! The per-view event loop.
//!
//! One tokio task owns one [`ChatView`] and its backend [`Connection`]. It is
//! the only writer of both: user commands and channel events are applied in
//! arrival order, and after every event the view is re-rendered and the HTML
//! published on a `watch` channel.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};
use url::Url;

use crate::channel::{ChannelEvent, Connection, Connector, endpoint_url};
use crate::config::ReconnectConfig;
use crate::error::{Error, Result};
use crate::identity::ClientIdentity;
use crate::view::ChatView;

/// Commands a mounted view accepts from the outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewCommand {
    /// The user pressed Enter or clicked Send with this input.
    Send(String),
    /// Tear the view down and close its channel.
    Unmount,
}

/// Handle to a mounted view.
#[derive(Debug, Clone)]
pub struct ViewHandle {
    inner: Arc<ViewHandleInner>,
}

#[derive(Debug)]
struct ViewHandleInner {
    client_id: ClientIdentity,
    commands: mpsc::UnboundedSender<ViewCommand>,
    rendered: watch::Receiver<String>,
    opens: Arc<AtomicUsize>,
}

impl ViewHandle {
    /// The client this view belongs to.
    #[must_use]
    pub fn client_id(&self) -> &ClientIdentity {
        &self.inner.client_id
    }

    /// Submit user input. Returns once queued; never waits for a reply.
    pub fn send(&self, text: impl Into<String>) -> Result<()> {
        self.command(ViewCommand::Send(text.into()))
    }

    /// Request teardown. Idempotent.
    pub fn unmount(&self) {
        let _ = self.command(ViewCommand::Unmount);
    }

    /// Whether the view task has finished.
    #[must_use]
    pub fn is_unmounted(&self) -> bool {
        self.inner.commands.is_closed()
    }

    /// Subscribe to rendered transcript HTML.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.inner.rendered.clone()
    }

    /// Latest rendered transcript HTML.
    #[must_use]
    pub fn rendered(&self) -> String {
        self.inner.rendered.borrow().clone()
    }

    /// How many times this view has opened its channel.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.inner.opens.load(Ordering::Relaxed)
    }

    /// Whether both handles refer to the same mounted view.
    #[must_use]
    pub fn same_view(&self, other: &ViewHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn command(&self, command: ViewCommand) -> Result<()> {
        self.inner
            .commands
            .send(command)
            .map_err(|e| Error::ViewNotMounted(format!("{} ({:?})", self.inner.client_id, e.0)))
    }
}

/// Mount a view: spawn its event loop, which opens the backend channel once.
pub fn mount(
    client_id: ClientIdentity,
    connector: Arc<dyn Connector>,
    backend: &Url,
    reconnect: ReconnectConfig,
) -> Result<(ViewHandle, JoinHandle<()>)> {
    let url = endpoint_url(backend, &client_id)?;
    let view = ChatView::new(client_id.clone());

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (rendered_tx, rendered_rx) = watch::channel(view.render());
    let opens = Arc::new(AtomicUsize::new(0));

    let task = ViewTask {
        view,
        connector,
        url,
        reconnect,
        commands: command_rx,
        rendered: rendered_tx,
        opens: Arc::clone(&opens),
        attempt: 0,
    };
    let join = tokio::spawn(task.run());

    let handle = ViewHandle {
        inner: Arc::new(ViewHandleInner {
            client_id,
            commands: command_tx,
            rendered: rendered_rx,
            opens,
        }),
    };
    Ok((handle, join))
}

/// An in-flight channel open.
type PendingConnect = Pin<Box<dyn Future<Output = Result<Connection>> + Send>>;

struct ViewTask {
    view: ChatView,
    connector: Arc<dyn Connector>,
    url: Url,
    reconnect: ReconnectConfig,
    commands: mpsc::UnboundedReceiver<ViewCommand>,
    rendered: watch::Sender<String>,
    opens: Arc<AtomicUsize>,
    /// Consecutive failed connection attempts.
    attempt: u32,
}

impl ViewTask {
    async fn run(mut self) {
        info!(
            name: "chat.view.mounted",
            client_id = %self.view.client_id(),
            url = %self.url,
            "Chat view mounted"
        );

        let mut connection: Option<Connection> = None;
        let mut connecting = Some(self.start_connect());
        let mut retry_at = None;
        self.publish();

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(ViewCommand::Send(text)) => self.send(connection.as_ref(), text),
                    Some(ViewCommand::Unmount) | None => break,
                },
                result = next_connect(&mut connecting) => {
                    connecting = None;
                    connection = self.connected(result);
                    if connection.is_none() {
                        retry_at = self.schedule_retry();
                    }
                },
                event = next_event(&mut connection) => match event {
                    ChannelEvent::Message(frame) => {
                        self.view.on_frame(&frame);
                    }
                    ChannelEvent::Error(error) => {
                        warn!(
                            name: "chat.channel.error",
                            client_id = %self.view.client_id(),
                            error = %error,
                            "Backend channel error"
                        );
                    }
                    ChannelEvent::Closed => {
                        warn!(
                            name: "chat.channel.closed",
                            client_id = %self.view.client_id(),
                            "Backend channel closed"
                        );
                        connection = None;
                        retry_at = self.schedule_retry();
                    }
                },
                () = wait_until(retry_at) => {
                    retry_at = None;
                    connecting = Some(self.start_connect());
                }
            }
            self.publish();
        }

        // Dropping the connection closes the socket; dropping a pending
        // connect abandons the handshake.
        drop(connecting);
        drop(connection);
        info!(
            name: "chat.view.unmounted",
            client_id = %self.view.client_id(),
            messages = self.view.messages().len(),
            "Chat view unmounted"
        );
    }

    fn start_connect(&self) -> PendingConnect {
        self.opens.fetch_add(1, Ordering::Relaxed);
        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        Box::pin(async move { connector.connect(&url).await })
    }

    fn connected(&mut self, result: Result<Connection>) -> Option<Connection> {
        match result {
            Ok(connection) => {
                info!(
                    name: "chat.channel.opened",
                    client_id = %self.view.client_id(),
                    "Backend channel opened"
                );
                self.attempt = 0;
                self.view.on_open();
                Some(connection)
            }
            Err(e) => {
                warn!(
                    name: "chat.channel.connect_failed",
                    client_id = %self.view.client_id(),
                    error = %e,
                    "Could not open backend channel"
                );
                None
            }
        }
    }

    /// Schedule the next reconnect, or give up.
    fn schedule_retry(&mut self) -> Option<Instant> {
        self.attempt += 1;
        if self.attempt > self.reconnect.max_attempts {
            self.view.on_disconnected(None);
            warn!(
                name: "chat.channel.gave_up",
                client_id = %self.view.client_id(),
                attempts = self.attempt - 1,
                "Giving up on backend channel"
            );
            return None;
        }

        let delay = self.reconnect.delay_for(self.attempt);
        self.view.on_disconnected(Some(self.attempt));
        debug!(
            client_id = %self.view.client_id(),
            attempt = self.attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Reconnect scheduled"
        );
        Some(Instant::now() + delay)
    }

    fn send(&mut self, connection: Option<&Connection>, text: String) {
        self.view.set_input(text);
        let Some(outbound) = self.view.submit() else {
            debug!(client_id = %self.view.client_id(), "Ignoring empty input");
            return;
        };

        let sent = match (connection, outbound.to_json()) {
            (Some(connection), Ok(frame)) => connection.send(frame),
            (None, Ok(_)) => Err(Error::ChannelClosed),
            (_, Err(e)) => Err(e),
        };
        if let Err(e) = sent {
            warn!(
                name: "chat.message.send_failed",
                client_id = %self.view.client_id(),
                error = %e,
                "Message could not be delivered"
            );
            self.view.on_send_failed();
        }
    }

    fn publish(&self) {
        let html = self.view.render();
        self.rendered.send_if_modified(|current| {
            if *current == html {
                false
            } else {
                *current = html;
                true
            }
        });
    }
}

async fn next_connect(pending: &mut Option<PendingConnect>) -> Result<Connection> {
    match pending {
        Some(connect) => connect.await,
        None => std::future::pending().await,
    }
}

async fn next_event(connection: &mut Option<Connection>) -> ChannelEvent {
    match connection {
        Some(connection) => connection.recv().await.unwrap_or(ChannelEvent::Closed),
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
