use std::{collections::HashSet, sync::Arc, time::Duration};

use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::SessionConfig,
    error::SessionError,
    identity::{KeyValueStore, save_theme, save_user},
    protocol_objects::{
        Activity, ActivityKind, ChatMessage, CounterState, Envelope, MessageKind, Payload, PeerId,
        Theme, User,
    },
    push::{Push, PushScheduler},
    registry::{PresenceRegistry, Upsert},
    session_event::SessionEvent,
    store::ReplicatedStore,
    task::Task,
    transport::Transport,
    types::{AnnounceDelay, Announcement, Binding, Effect, Reaction, Result, SessionPhase},
    utils::{generate_id, now_millis},
};

/// Read-only view handed to the rendering layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub users: Vec<User>,
    pub current_user: User,
    pub counter: CounterState,
    pub chat_messages: Vec<ChatMessage>,
    pub typing_users: Vec<PeerId>,
    pub theme: Theme,
}

/// Everything one peer knows. All handlers are synchronous reducers over this
/// value and return the side effects they want performed.
pub(crate) struct SessionState {
    registry: PresenceRegistry,
    store: ReplicatedStore,
    announced: HashSet<PeerId>,
    phase: SessionPhase,
    typing: bool,
}

impl SessionState {
    pub(crate) fn new(local: User, theme: Theme, now: i64) -> Self {
        Self {
            registry: PresenceRegistry::new(local),
            store: ReplicatedStore::new(theme, now),
            announced: HashSet::new(),
            phase: SessionPhase::Disconnected,
            typing: false,
        }
    }

    pub(crate) fn local(&self) -> &User {
        self.registry.local()
    }

    pub(crate) fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: SessionPhase) {
        self.phase = phase;
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            users: self.registry.snapshot(),
            current_user: self.local().clone(),
            counter: self.store.counter().clone(),
            chat_messages: self.store.messages().to_vec(),
            typing_users: self.store.typing().ids(),
            theme: self.store.theme(),
        }
    }

    pub(crate) fn handle(&mut self, envelope: Envelope, now: i64) -> Reaction {
        let sender = envelope.sender().map(String::from);

        if sender.as_deref() == Some(self.local().id.as_str()) {
            debug!(target = "session.protocol", kind = %envelope.payload, "discarding own echo");
            return Reaction::unchanged();
        }

        match (envelope.payload, sender) {
            (Payload::Join { user }, Some(sender)) => self.on_join(&sender, user, now),
            (Payload::Leave, Some(sender)) => self.on_leave(&sender, now),
            (Payload::SyncRequest, Some(_)) => self.on_sync_request(),
            (Payload::SyncResponse { user } | Payload::Activity { user }, Some(sender)) => {
                self.on_user_report(&sender, user)
            }
            (Payload::CounterUpdate { counter }, _) => self.on_counter_update(counter),
            (Payload::NewMessage { chat_message }, _) => self.on_new_message(chat_message),
            (Payload::DeleteMessage { message_id }, sender) => {
                self.on_delete_message(&message_id, sender.as_deref())
            }
            (Payload::UserTyping { is_typing }, Some(sender)) => {
                self.on_user_typing(&sender, is_typing, now)
            }
            (Payload::ThemeChange { theme }, _) => self.on_theme_change(theme),
            (payload, None) => {
                debug!(target = "session.protocol", kind = %payload, "ignoring envelope without origin");
                Reaction::unchanged()
            }
        }
    }

    fn on_join(&mut self, sender: &str, user: User, now: i64) -> Reaction {
        if user.id != sender {
            debug!(target = "session.protocol", sender, user = %user.id, "ignoring join for another peer");
            return Reaction::unchanged();
        }

        let was_known = self.registry.contains(sender);
        let name = user.name.clone();
        self.registry.upsert(user);

        let mut effects = vec![Effect::Announce {
            announcement: Announcement::SyncResponse,
            delay: AnnounceDelay::Reply,
        }];

        if !was_known {
            info!(target = "session.protocol", peer = sender, name = %name, "peer joined");
            effects.push(self.notice(&format!("{name} joined the chat"), now));
        }

        // Our own join is repeated once per sighting, which keeps the cascade bounded.
        if self.announced.insert(String::from(sender)) {
            effects.push(Effect::Announce {
                announcement: Announcement::Join,
                delay: AnnounceDelay::Reannounce,
            });
        }

        Reaction::changed(effects)
    }

    fn on_leave(&mut self, sender: &str, now: i64) -> Reaction {
        self.announced.remove(sender);
        let typing_changed = self.store.typing_mut().remove(sender);

        match self.registry.remove(sender) {
            Some(user) => {
                info!(target = "session.protocol", peer = sender, name = %user.name, "peer left");
                let notice = self.notice(&format!("{} left the chat", user.name), now);
                Reaction::changed(vec![notice])
            }
            None => Reaction {
                changed: typing_changed,
                effects: vec![],
            },
        }
    }

    fn on_sync_request(&mut self) -> Reaction {
        Reaction {
            changed: false,
            effects: vec![
                Effect::Announce {
                    announcement: Announcement::SyncResponse,
                    delay: AnnounceDelay::Reply,
                },
                Effect::Announce {
                    announcement: Announcement::Join,
                    delay: AnnounceDelay::Reannounce,
                },
            ],
        }
    }

    fn on_user_report(&mut self, sender: &str, user: User) -> Reaction {
        if user.id != sender {
            debug!(target = "session.protocol", sender, user = %user.id, "ignoring report for another peer");
            return Reaction::unchanged();
        }

        match self.registry.upsert(user) {
            Upsert::Ignored => Reaction::unchanged(),
            Upsert::Inserted | Upsert::Replaced => Reaction::changed(vec![]),
        }
    }

    fn on_counter_update(&mut self, counter: CounterState) -> Reaction {
        Reaction {
            changed: self.store.apply_counter(counter),
            effects: vec![],
        }
    }

    fn on_new_message(&mut self, chat_message: ChatMessage) -> Reaction {
        if chat_message.user_id == self.local().id || chat_message.kind == MessageKind::System {
            return Reaction::unchanged();
        }

        Reaction {
            changed: self.store.append_message(chat_message),
            effects: vec![],
        }
    }

    fn on_delete_message(&mut self, message_id: &str, sender: Option<&str>) -> Reaction {
        match self.store.delete_message(message_id, sender) {
            Some(_) => Reaction::changed(vec![]),
            None => {
                debug!(target = "session.protocol", message_id, "ignoring delete for unknown message");
                Reaction::unchanged()
            }
        }
    }

    fn on_user_typing(&mut self, sender: &str, is_typing: bool, now: i64) -> Reaction {
        Reaction {
            changed: self.store.typing_mut().set(sender, is_typing, now),
            effects: vec![],
        }
    }

    fn on_theme_change(&mut self, theme: Theme) -> Reaction {
        let changed = self.store.apply_theme(theme);
        Reaction {
            changed,
            effects: vec![Effect::PersistTheme(theme)],
        }
    }

    fn notice(&mut self, text: &str, now: i64) -> Effect {
        let id = Uuid::new_v4().to_string();
        self.store.append_message(ChatMessage::system(&id, text, now));
        Effect::Notice(String::from(text))
    }

    pub(crate) fn record_activity(
        &mut self,
        kind: ActivityKind,
        metadata: Option<serde_json::Value>,
        now: i64,
    ) -> Vec<Effect> {
        let user = self
            .local()
            .with_activity(Activity::new(kind, now, metadata));
        self.registry.register(user.clone());

        vec![
            Effect::PersistUser(user.clone()),
            Effect::Publish(Payload::Activity { user }),
        ]
    }

    pub(crate) fn send_message(
        &mut self,
        text: &str,
        expires_after: Option<Duration>,
        now: i64,
    ) -> Option<(ChatMessage, Vec<Effect>)> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let local = self.local();
        let chat_message = ChatMessage {
            id: generate_id(),
            user_id: local.id.clone(),
            user_name: local.name.clone(),
            text: String::from(text),
            timestamp: now,
            expires_at: expires_after.map(|after| {
                i64::try_from(after.as_millis())
                    .ok()
                    .and_then(|ms| now.checked_add(ms))
                    .unwrap_or(i64::MAX)
            }),
            kind: MessageKind::User,
        };
        self.store.append_message(chat_message.clone());

        let mut effects = self.record_activity(
            ActivityKind::MessageSent,
            Some(json!({ "message": text })),
            now,
        );
        effects.push(Effect::Publish(Payload::NewMessage {
            chat_message: chat_message.clone(),
        }));

        Some((chat_message, effects))
    }

    /// Only messages authored by the local peer can be deleted.
    pub(crate) fn delete_message(&mut self, message_id: &str) -> Option<Vec<Effect>> {
        let local_id = self.local().id.clone();
        self.store.delete_message(message_id, Some(&local_id))?;

        Some(vec![Effect::Publish(Payload::DeleteMessage {
            message_id: String::from(message_id),
        })])
    }

    pub(crate) fn set_counter(&mut self, value: i64, now: i64) -> Vec<Effect> {
        let old_value = self.store.counter().value;
        let mut effects = self.record_activity(
            ActivityKind::CounterUpdated,
            Some(json!({ "oldValue": old_value, "newValue": value })),
            now,
        );

        let counter = CounterState::new(value, &self.local().name, now);
        self.store.apply_counter(counter.clone());
        effects.push(Effect::Publish(Payload::CounterUpdate { counter }));
        effects
    }

    pub(crate) fn set_theme(&mut self, theme: Theme) -> Vec<Effect> {
        self.store.apply_theme(theme);
        vec![
            Effect::PersistTheme(theme),
            Effect::Publish(Payload::ThemeChange { theme }),
        ]
    }

    /// Publishes only on a start/stop edge.
    pub(crate) fn set_typing(&mut self, is_typing: bool) -> Option<Effect> {
        if self.typing == is_typing {
            return None;
        }
        self.typing = is_typing;
        Some(Effect::Publish(Payload::UserTyping { is_typing }))
    }

    pub(crate) fn sweep(&mut self, now: i64, typing_timeout: Option<Duration>) -> bool {
        let expired = self.store.sweep_expired(now);
        if expired > 0 {
            debug!(target = "session.protocol", expired, "swept expired messages");
        }

        let typing_swept = typing_timeout
            .is_some_and(|timeout| self.store.typing_mut().sweep(now, timeout.as_millis() as i64));

        expired > 0 || typing_swept
    }
}

/// Shared runtime around a [`SessionState`]: executes effects, owns timers
/// and notifies observers.
pub(crate) struct Session {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    storage: Arc<dyn KeyValueStore>,
    local_id: PeerId,
    state: Mutex<SessionState>,
    pushes: Mutex<PushScheduler>,
    typing_idle: Mutex<Option<Task<()>>>,
    bindings: Mutex<Vec<Binding>>,
}

impl Session {
    pub(crate) fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn KeyValueStore>,
        local: User,
        theme: Theme,
    ) -> Self {
        Self {
            config,
            transport,
            storage,
            local_id: local.id.clone(),
            state: Mutex::new(SessionState::new(local, theme, now_millis())),
            pushes: Mutex::new(PushScheduler::default()),
            typing_idle: Mutex::new(None),
            bindings: Mutex::new(vec![]),
        }
    }

    pub(crate) fn local_id(&self) -> &str {
        &self.local_id
    }

    pub(crate) fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub(crate) async fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().await.snapshot()
    }

    pub(crate) async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase()
    }

    pub(crate) async fn set_phase(&self, phase: SessionPhase) {
        let mut state = self.state.lock().await;
        if state.phase() != phase {
            info!(target = "session.protocol", peer = %self.local_id, from = %state.phase(), to = %phase, "session phase changed");
            state.set_phase(phase);
        }
    }

    /// Moves `Announcing` to `Converged`; no-op in any other phase.
    pub(crate) async fn mark_converged(&self) {
        let mut state = self.state.lock().await;
        if state.phase() == SessionPhase::Announcing {
            info!(target = "session.protocol", peer = %self.local_id, "announcement cascade finished");
            state.set_phase(SessionPhase::Converged);
        }
    }

    pub(crate) async fn register_event(&self, event: SessionEvent) {
        self.bindings.lock().await.push(Binding::new(event));
    }

    /// Serializes and publishes `payload` tagged with the local id. Failures are logged only.
    pub(crate) fn publish(&self, payload: Payload) {
        let kind = payload.to_string();
        let envelope = Envelope::new(&self.local_id, payload, now_millis());

        let result = envelope
            .to_frame()
            .and_then(|frame| self.transport.publish(&frame));

        match result {
            Ok(()) => debug!(target = "session.protocol", peer = %self.local_id, kind, "published envelope"),
            Err(error) => {
                warn!(target = "session.protocol", peer = %self.local_id, kind, error = %error, "failed to publish envelope")
            }
        }
    }

    pub(crate) async fn announce(&self, announcement: Announcement) {
        let payload = announcement.payload(self.state.lock().await.local());
        self.publish(payload);
    }

    pub(crate) async fn schedule(self: &Arc<Self>, push: Push) {
        self.pushes.lock().await.schedule(push, Arc::clone(self));
    }

    pub(crate) async fn track(&self, task: Task<()>) {
        self.pushes.lock().await.track(task);
    }

    pub(crate) async fn pending_pushes(&self) -> usize {
        self.pushes.lock().await.len()
    }

    /// Cancels and awaits every pending timer, including the typing debounce.
    pub(crate) async fn cancel_timers(&self) {
        self.pushes.lock().await.cancel_all().await;
        if let Some(task) = self.typing_idle.lock().await.take() {
            task.cancel().await;
        }
    }

    pub(crate) async fn receive(self: &Arc<Self>, frame: &str) {
        let envelope = match Envelope::from_frame(frame) {
            Ok(envelope) => envelope,
            Err(error) => {
                debug!(target = "session.protocol", error = %error, "ignoring malformed envelope");
                return;
            }
        };

        let reaction = self.state.lock().await.handle(envelope, now_millis());
        self.run_effects(reaction.effects).await;
        if reaction.changed {
            self.notify_changed().await;
        }
    }

    async fn run_effects(self: &Arc<Self>, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Publish(payload) => self.publish(payload),
                Effect::Announce {
                    announcement,
                    delay,
                } => {
                    let push = Push::new(announcement, self.config.delay_for(delay));
                    self.schedule(push).await;
                }
                Effect::PersistUser(user) => save_user(self.storage.as_ref(), &user),
                Effect::PersistTheme(theme) => save_theme(self.storage.as_ref(), theme),
                Effect::Notice(text) => {
                    for binding in self.bindings.lock().await.iter() {
                        binding.invoke_notice(&text);
                    }
                }
            }
        }
    }

    async fn notify_changed(&self) {
        let snapshot = self.snapshot().await;
        for binding in self.bindings.lock().await.iter() {
            binding.invoke_changed(&snapshot);
        }
    }

    async fn ensure_started(&self, intent: &str) -> Result<()> {
        if self.phase().await == SessionPhase::Disconnected {
            return Err(SessionError::NotStarted {
                intent: String::from(intent),
            });
        }
        Ok(())
    }

    pub(crate) async fn send_message(
        self: &Arc<Self>,
        text: &str,
        expires_after: Option<Duration>,
    ) -> Result<Option<ChatMessage>> {
        self.ensure_started("new-message").await?;

        let sent = self
            .state
            .lock()
            .await
            .send_message(text, expires_after, now_millis());

        match sent {
            Some((chat_message, effects)) => {
                self.run_effects(effects).await;
                self.notify_changed().await;
                Ok(Some(chat_message))
            }
            None => Ok(None),
        }
    }

    pub(crate) async fn delete_message(self: &Arc<Self>, message_id: &str) -> Result<bool> {
        self.ensure_started("delete-message").await?;

        let effects = self.state.lock().await.delete_message(message_id);
        match effects {
            Some(effects) => {
                self.run_effects(effects).await;
                self.notify_changed().await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub(crate) async fn set_counter(self: &Arc<Self>, value: i64) -> Result<()> {
        self.ensure_started("counter-update").await?;

        let effects = self.state.lock().await.set_counter(value, now_millis());
        self.run_effects(effects).await;
        self.notify_changed().await;
        Ok(())
    }

    pub(crate) async fn set_theme(self: &Arc<Self>, theme: Theme) -> Result<()> {
        self.ensure_started("theme-change").await?;

        let effects = self.state.lock().await.set_theme(theme);
        self.run_effects(effects).await;
        self.notify_changed().await;
        Ok(())
    }

    pub(crate) async fn record_activity(
        self: &Arc<Self>,
        kind: ActivityKind,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        self.ensure_started("activity").await?;

        let effects = self
            .state
            .lock()
            .await
            .record_activity(kind, metadata, now_millis());
        self.run_effects(effects).await;
        self.notify_changed().await;
        Ok(())
    }

    /// Publishes typing edges and re-arms the idle timer that ends typing.
    pub(crate) async fn mark_typing(self: &Arc<Self>, is_typing: bool) -> Result<()> {
        self.ensure_started("user-typing").await?;

        let effect = self.state.lock().await.set_typing(is_typing);

        {
            let mut typing_idle = self.typing_idle.lock().await;
            if let Some(task) = typing_idle.take() {
                task.cancel().await;
            }
            if is_typing {
                let session = Arc::clone(self);
                *typing_idle = Some(Task::delayed(self.config.typing_idle_timeout, async move {
                    session.expire_typing().await;
                }));
            }
        }

        if let Some(effect) = effect {
            self.run_effects(vec![effect]).await;
        }
        Ok(())
    }

    async fn expire_typing(&self) {
        let effect = self.state.lock().await.set_typing(false);
        if let Some(Effect::Publish(payload)) = effect {
            debug!(target = "session.protocol", peer = %self.local_id, "typing went idle");
            self.publish(payload);
        }
    }

    pub(crate) async fn sweep(&self) {
        let changed = self
            .state
            .lock()
            .await
            .sweep(now_millis(), self.config.typing_receiver_timeout);
        if changed {
            self.notify_changed().await;
        }
    }
}
