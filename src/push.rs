use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use tracing::debug;

use crate::{session::Session, task::Task, types::Announcement};

/// A self-report published after a delay, built from the local user when it fires.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Push {
    announcement: Announcement,
    delay: Duration,
}

impl Push {
    pub(crate) fn new(announcement: Announcement, delay: Duration) -> Self {
        Self {
            announcement,
            delay,
        }
    }

    pub(crate) fn start(self, session: Arc<Session>) -> Task<()> {
        Task::delayed(self.delay, async move {
            session.announce(self.announcement).await;
        })
    }
}

/// Pending timers owned by a session; all of them are cancelled on stop.
#[derive(Default)]
pub(crate) struct PushScheduler {
    pending: Vec<Task<()>>,
}

impl PushScheduler {
    pub(crate) fn schedule(&mut self, push: Push, session: Arc<Session>) {
        debug!(target = "session.protocol", announcement = ?push.announcement, delay_ms = push.delay.as_millis() as u64, "scheduled push");
        self.track(push.start(session));
    }

    pub(crate) fn track(&mut self, task: Task<()>) {
        self.pending.retain(|task| !task.is_finished());
        self.pending.push(task);
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.iter().filter(|task| !task.is_finished()).count()
    }

    pub(crate) async fn cancel_all(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        join_all(pending.into_iter().map(Task::cancel)).await;
    }
}
