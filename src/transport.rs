use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{config::SessionConfig, error::SessionError, types::Result};

/// Frames received from other peers, in arrival order.
pub type Subscription = UnboundedReceiver<String>;

/// Best-effort fan-out channel between peers.
///
/// A published frame reaches every *other* current subscriber at most once.
/// Subscribers that attach later never see earlier frames.
pub trait Transport: Send + Sync {
    fn publish(&self, frame: &str) -> Result<()>;

    /// Attaches a new subscription. Must be called from within a tokio runtime.
    fn subscribe(&self) -> Result<Subscription>;

    fn close(&self);
}

#[derive(Debug, Clone)]
struct Frame {
    from: u64,
    text: Arc<str>,
}

/// Named in-process broadcast medium. Endpoints created from the same hub see each other.
#[derive(Debug, Clone)]
pub struct LocalHub {
    name: Arc<str>,
    sender: broadcast::Sender<Frame>,
    next_endpoint: Arc<AtomicU64>,
}

impl LocalHub {
    pub fn new(name: &str, capacity: usize) -> Self {
        Self {
            name: Arc::from(name),
            sender: broadcast::channel(capacity.max(1)).0,
            next_endpoint: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Primary and fallback hubs named and sized from `config`.
    pub fn pair_from_config(config: &SessionConfig) -> (LocalHub, LocalHub) {
        (
            LocalHub::new(&config.channel_name, config.transport_capacity),
            LocalHub::new(&config.fallback_channel_name, config.transport_capacity),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> LocalEndpoint {
        LocalEndpoint {
            id: self.next_endpoint.fetch_add(1, Ordering::Relaxed),
            hub: self.clone(),
            closed: CancellationToken::new(),
        }
    }
}

/// One peer's attachment to a [`LocalHub`].
#[derive(Debug)]
pub struct LocalEndpoint {
    id: u64,
    hub: LocalHub,
    closed: CancellationToken,
}

impl Transport for LocalEndpoint {
    fn publish(&self, frame: &str) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(SessionError::TransportClosed);
        }

        // Having no receivers just means no other peer is listening.
        let delivered = self
            .hub
            .sender
            .send(Frame {
                from: self.id,
                text: Arc::from(frame),
            })
            .unwrap_or(0);
        debug!(target = "session.transport", link = %self.hub.name, delivered, "published frame");
        Ok(())
    }

    fn subscribe(&self) -> Result<Subscription> {
        if self.closed.is_cancelled() {
            return Err(SessionError::TransportClosed);
        }

        let receiver = self.hub.sender.subscribe();
        let (sender, subscription) = unbounded_channel();
        tokio::spawn(Self::forward(
            self.id,
            self.hub.name.clone(),
            receiver,
            sender,
            self.closed.clone(),
        ));

        Ok(subscription)
    }

    fn close(&self) {
        self.closed.cancel();
    }
}

impl LocalEndpoint {
    async fn forward(
        own_id: u64,
        link: Arc<str>,
        mut receiver: broadcast::Receiver<Frame>,
        sender: UnboundedSender<String>,
        closed: CancellationToken,
    ) {
        loop {
            tokio::select! {
                received = receiver.recv() => match received {
                    Ok(frame) => {
                        if frame.from == own_id {
                            continue;
                        }
                        if sender.send(frame.text.to_string()).is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target = "session.transport", link = %link, skipped, "subscriber lagged, frames dropped");
                    }
                    Err(RecvError::Closed) => break,
                },

                _ = closed.cancelled() => break,

                _ = sender.closed() => break,
            }
        }
    }
}

/// Publishes on every link and merges all links into one subscription.
///
/// The same logical frame is delivered once per link, so receivers see duplicates.
pub struct RedundantTransport {
    links: Vec<Arc<dyn Transport>>,
}

impl RedundantTransport {
    pub fn new(links: Vec<Arc<dyn Transport>>) -> Self {
        Self { links }
    }

    /// Attaches to two hubs, mirroring a primary channel plus a fallback one.
    pub fn local_pair(primary: &LocalHub, fallback: &LocalHub) -> Self {
        Self::new(vec![
            Arc::new(primary.endpoint()),
            Arc::new(fallback.endpoint()),
        ])
    }

    async fn merge(mut link: Subscription, merged: UnboundedSender<String>) {
        loop {
            tokio::select! {
                frame = link.recv() => match frame {
                    Some(frame) => {
                        if merged.send(frame).is_err() {
                            break;
                        }
                    }
                    None => break,
                },

                _ = merged.closed() => break,
            }
        }
    }
}

impl Transport for RedundantTransport {
    fn publish(&self, frame: &str) -> Result<()> {
        let mut last_error = None;
        let mut sent = 0;

        for link in &self.links {
            match link.publish(frame) {
                Ok(()) => sent += 1,
                Err(error) => {
                    warn!(target = "session.transport", error = %error, "failed to publish on redundant link");
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(error) if sent == 0 => Err(error),
            _ => Ok(()),
        }
    }

    fn subscribe(&self) -> Result<Subscription> {
        let (merged, subscription) = unbounded_channel();
        let mut attached = 0;
        let mut last_error = None;

        for link in &self.links {
            match link.subscribe() {
                Ok(link_subscription) => {
                    tokio::spawn(Self::merge(link_subscription, merged.clone()));
                    attached += 1;
                }
                Err(error) => {
                    warn!(target = "session.transport", error = %error, "failed to subscribe to redundant link");
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(error) if attached == 0 => Err(error),
            _ => Ok(subscription),
        }
    }

    fn close(&self) {
        for link in &self.links {
            link.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    async fn next(subscription: &mut Subscription) -> Option<String> {
        timeout(Duration::from_millis(200), subscription.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn fan_out_skips_publisher() {
        let hub = LocalHub::new("test", 16);
        let a = hub.endpoint();
        let b = hub.endpoint();
        let mut a_sub = a.subscribe().unwrap();
        let mut b_sub = b.subscribe().unwrap();

        a.publish("ping").unwrap();

        assert_eq!(next(&mut b_sub).await.as_deref(), Some("ping"));
        assert_eq!(next(&mut a_sub).await, None);
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_frames() {
        let hub = LocalHub::new("test", 16);
        let a = hub.endpoint();
        let b = hub.endpoint();

        a.publish("early").unwrap();
        let mut b_sub = b.subscribe().unwrap();
        a.publish("late").unwrap();

        assert_eq!(next(&mut b_sub).await.as_deref(), Some("late"));
        assert_eq!(next(&mut b_sub).await, None);
    }

    #[tokio::test]
    async fn closed_endpoint_rejects_publish() {
        let hub = LocalHub::new("test", 16);
        let a = hub.endpoint();
        a.close();
        assert!(matches!(a.publish("x"), Err(SessionError::TransportClosed)));
        assert!(a.subscribe().is_err());
    }

    #[tokio::test]
    async fn redundant_links_deliver_duplicates() {
        let primary = LocalHub::new("primary", 16);
        let fallback = LocalHub::new("fallback", 16);
        let a = RedundantTransport::local_pair(&primary, &fallback);
        let b = RedundantTransport::local_pair(&primary, &fallback);
        let mut b_sub = b.subscribe().unwrap();

        a.publish("hello").unwrap();

        assert_eq!(next(&mut b_sub).await.as_deref(), Some("hello"));
        assert_eq!(next(&mut b_sub).await.as_deref(), Some("hello"));
        assert_eq!(next(&mut b_sub).await, None);
    }

    #[tokio::test]
    async fn redundant_publish_survives_one_closed_link() {
        let primary = LocalHub::new("primary", 16);
        let fallback = LocalHub::new("fallback", 16);
        let broken: Arc<dyn Transport> = Arc::new(primary.endpoint());
        broken.close();
        let a = RedundantTransport::new(vec![broken, Arc::new(fallback.endpoint())]);
        let b = fallback.endpoint();
        let mut b_sub = b.subscribe().unwrap();

        a.publish("still here").unwrap();
        assert_eq!(next(&mut b_sub).await.as_deref(), Some("still here"));

        a.close();
        assert!(a.publish("gone").is_err());
    }
}
