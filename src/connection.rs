use std::{sync::Arc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{error::SessionError, session::Session, transport::Subscription, types::Result};

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Background tasks of a started peer: the envelope listener and the periodic expiry sweep.
pub(crate) struct PeerConnection {
    listen_join_handle: JoinHandle<Result<()>>,
    sweep_join_handle: JoinHandle<Result<()>>,
    cancellation_token: CancellationToken,
}

impl PeerConnection {
    pub(crate) fn new(subscription: Subscription, session: Arc<Session>) -> Self {
        let cancellation_token = CancellationToken::new();
        let sweep_interval = session.config().expiry_sweep_interval;

        let listen_join_handle = tokio::spawn(Self::listen(
            subscription,
            Arc::clone(&session),
            cancellation_token.clone(),
        ));
        let sweep_join_handle = tokio::spawn(Self::sweep(
            session,
            cancellation_token.clone(),
            sweep_interval,
        ));

        Self {
            listen_join_handle,
            sweep_join_handle,
            cancellation_token,
        }
    }

    pub(crate) async fn close(self) -> Result<()> {
        self.cancellation_token.cancel();

        let results = tokio::try_join!(self.listen_join_handle, self.sweep_join_handle)?;

        let mut task_errors = vec![];

        if let Err(error) = results.0 {
            task_errors.push(error);
        }
        if let Err(error) = results.1 {
            task_errors.push(error);
        }

        match task_errors.len() {
            0 => Ok(()),
            1 => Err(task_errors.remove(0)),
            _ => Err(SessionError::MultipleTaskErrors {
                errors: task_errors,
            }),
        }
    }

    async fn listen(
        mut subscription: Subscription,
        session: Arc<Session>,
        cancellation_token: CancellationToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                received = subscription.recv() => match received {
                    Some(frame) => session.receive(&frame).await,
                    None => {
                        if cancellation_token.is_cancelled() {
                            break;
                        }
                        warn!(target = "session.connection", peer = %session.local_id(), "subscription ended while connected");
                        return Err(SessionError::TransportClosed);
                    }
                },

                _ = cancellation_token.cancelled() => {
                    break;
                }
            }
        }

        debug!(target = "session.connection", peer = %session.local_id(), "listener stopped");
        Ok(())
    }

    async fn sweep(
        session: Arc<Session>,
        cancellation_token: CancellationToken,
        sweep_interval: Duration,
    ) -> Result<()> {
        let mut ticker = interval(sweep_interval.max(MIN_SWEEP_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => session.sweep().await,

                _ = cancellation_token.cancelled() => {
                    return Ok(())
                }
            }
        }
    }
}
