use std::{sync::Arc, time::Duration};

use tracing::info;

use crate::{
    config::SessionConfig,
    connection::PeerConnection,
    error::SessionError,
    identity::{KeyValueStore, PeerIdentity, load_theme},
    protocol_objects::{ActivityKind, ChatMessage, Payload, Theme},
    push::Push,
    session::{Session, SessionSnapshot},
    session_event::SessionEvent,
    task::Task,
    transport::{LocalHub, RedundantTransport, Transport},
    types::{Announcement, Result, SessionPhase},
};

/// One live peer of a collaborative session.
///
/// Owns the background connection and every pending timer; `stop` tears all of them down.
pub struct PeerClient {
    session: Arc<Session>,
    connection: Option<PeerConnection>,
    page_url: String,
}

impl PeerClient {
    /// Bootstraps the local identity from `storage` and the handle in `page_url`.
    pub fn new(
        transport: Arc<dyn Transport>,
        storage: Arc<dyn KeyValueStore>,
        page_url: &str,
        config: Option<SessionConfig>,
    ) -> Self {
        let identity = PeerIdentity::bootstrap(storage.as_ref(), page_url);
        let theme = load_theme(storage.as_ref());

        let session = Session::new(
            config.unwrap_or_default(),
            transport,
            storage,
            identity.user,
            theme,
        );

        Self {
            session: Arc::new(session),
            connection: None,
            page_url: identity.page_url,
        }
    }

    /// Peer attached to both hubs at once, so every envelope travels two paths.
    pub fn with_local_hubs(
        primary: &LocalHub,
        fallback: &LocalHub,
        storage: Arc<dyn KeyValueStore>,
        page_url: &str,
        config: Option<SessionConfig>,
    ) -> Self {
        let transport = Arc::new(RedundantTransport::local_pair(primary, fallback));
        Self::new(transport, storage, page_url, config)
    }

    pub fn peer_id(&self) -> &str {
        self.session.local_id()
    }

    /// Page URL whose fragment carries this peer's handle.
    pub fn page_url(&self) -> &str {
        &self.page_url
    }

    pub fn is_started(&self) -> bool {
        self.connection.is_some()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.session.phase().await
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot().await
    }

    pub async fn pending_timers(&self) -> usize {
        self.session.pending_pushes().await
    }

    pub async fn on_change<F>(&self, f: F)
    where
        F: Fn(&SessionSnapshot) + Send + Sync + 'static,
    {
        self.session
            .register_event(SessionEvent::Changed(Box::new(f)))
            .await
    }

    pub async fn on_notice<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.session
            .register_event(SessionEvent::Notice(Box::new(f)))
            .await
    }

    /// Subscribes, announces this peer and schedules the sync-request retries.
    pub async fn start(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Err(SessionError::AlreadyStarted);
        }

        let subscription = self.session.transport().subscribe()?;
        self.connection = Some(PeerConnection::new(
            subscription,
            Arc::clone(&self.session),
        ));
        self.session.set_phase(SessionPhase::Announcing).await;

        info!(target = "session.connection", peer = %self.peer_id(), "peer session started");

        self.session.announce(Announcement::Join).await;

        let schedule = self.session.config().sync_request_schedule.clone();
        for offset in &schedule {
            if offset.is_zero() {
                self.session.announce(Announcement::SyncRequest).await;
            } else {
                self.session
                    .schedule(Push::new(Announcement::SyncRequest, *offset))
                    .await;
            }
        }

        let settle = schedule.iter().max().copied().unwrap_or(Duration::ZERO);
        let session = Arc::clone(&self.session);
        self.session
            .track(Task::delayed(settle, async move {
                session.mark_converged().await;
            }))
            .await;

        Ok(())
    }

    /// Re-announces after the page becomes visible again or the transport reconnects.
    pub async fn resume(&self) -> Result<()> {
        if self.connection.is_none() {
            return Err(SessionError::NotStarted {
                intent: String::from("resume"),
            });
        }

        let delay = self.session.config().resume_delay;
        self.session
            .schedule(Push::new(Announcement::Join, delay))
            .await;
        self.session
            .schedule(Push::new(Announcement::SyncRequest, delay))
            .await;
        Ok(())
    }

    /// Stops listening and cancels all timers, then sends a best-effort `leave` and closes the transport.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(connection) = self.connection.take() else {
            return Ok(());
        };

        let result = connection.close().await;
        self.session.cancel_timers().await;
        self.session.publish(Payload::Leave);
        self.session.set_phase(SessionPhase::Disconnected).await;
        self.session.transport().close();

        info!(target = "session.connection", peer = %self.peer_id(), "peer session stopped");
        result
    }

    pub async fn send_message(
        &self,
        text: &str,
        expires_after: Option<Duration>,
    ) -> Result<Option<ChatMessage>> {
        self.session.send_message(text, expires_after).await
    }

    pub async fn mark_typing(&self, is_typing: bool) -> Result<()> {
        self.session.mark_typing(is_typing).await
    }

    /// Returns `false` when the id is unknown or the message belongs to another peer.
    pub async fn delete_message(&self, message_id: &str) -> Result<bool> {
        self.session.delete_message(message_id).await
    }

    pub async fn set_counter(&self, value: i64) -> Result<()> {
        self.session.set_counter(value).await
    }

    pub async fn set_theme(&self, theme: Theme) -> Result<()> {
        self.session.set_theme(theme).await
    }

    pub async fn toggle_theme(&self) -> Result<Theme> {
        let theme = self.snapshot().await.theme.toggled();
        self.set_theme(theme).await?;
        Ok(theme)
    }

    pub async fn record_activity(
        &self,
        kind: ActivityKind,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        self.session.record_activity(kind, metadata).await
    }
}
