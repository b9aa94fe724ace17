use crate::protocol_objects::{ChatMessage, CounterState, PeerId, Theme};

/// Peers currently shown as typing, with the time their last signal arrived.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypingSet {
    entries: Vec<(PeerId, i64)>,
}

impl TypingSet {
    /// Applies a typing edge. Returns whether membership changed.
    pub fn set(&mut self, id: &str, is_typing: bool, now: i64) -> bool {
        let position = self.entries.iter().position(|(peer, _)| peer == id);
        match (is_typing, position) {
            (true, Some(index)) => {
                self.entries[index].1 = now;
                false
            }
            (true, None) => {
                self.entries.push((String::from(id), now));
                true
            }
            (false, Some(index)) => {
                self.entries.remove(index);
                true
            }
            (false, None) => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.set(id, false, 0)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|(peer, _)| peer == id)
    }

    pub fn ids(&self) -> Vec<PeerId> {
        self.entries.iter().map(|(peer, _)| peer.clone()).collect()
    }

    /// Drops peers whose last signal is older than `timeout_ms`.
    pub fn sweep(&mut self, now: i64, timeout_ms: i64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(_, since)| now - since < timeout_ms);
        before != self.entries.len()
    }
}

/// Counter, chat log, theme and typing set as seen by one peer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplicatedStore {
    counter: CounterState,
    chat: Vec<ChatMessage>,
    theme: Theme,
    typing: TypingSet,
}

impl ReplicatedStore {
    pub fn new(theme: Theme, now: i64) -> Self {
        Self {
            counter: CounterState::new(0, "", now),
            chat: vec![],
            theme,
            typing: TypingSet::default(),
        }
    }

    pub fn counter(&self) -> &CounterState {
        &self.counter
    }

    /// Last arrival wins; no timestamp comparison.
    pub fn apply_counter(&mut self, counter: CounterState) -> bool {
        let changed = self.counter != counter;
        self.counter = counter;
        changed
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn apply_theme(&mut self, theme: Theme) -> bool {
        let changed = self.theme != theme;
        self.theme = theme;
        changed
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.chat
    }

    pub fn message(&self, id: &str) -> Option<&ChatMessage> {
        self.chat.iter().find(|message| message.id == id)
    }

    /// Appends unless a message with the same id is already present.
    pub fn append_message(&mut self, message: ChatMessage) -> bool {
        if self.message(&message.id).is_some() {
            return false;
        }
        self.chat.push(message);
        true
    }

    /// Removes `id` if present and, when `author` is given, written by that author.
    pub fn delete_message(&mut self, id: &str, author: Option<&str>) -> Option<ChatMessage> {
        let index = self.chat.iter().position(|message| {
            message.id == id && author.is_none_or(|author| message.user_id == author)
        })?;
        Some(self.chat.remove(index))
    }

    /// Removes every message whose `expires_at` is at or before `now`.
    pub fn sweep_expired(&mut self, now: i64) -> usize {
        let before = self.chat.len();
        self.chat.retain(|message| !message.is_expired(now));
        before - self.chat.len()
    }

    pub fn typing(&self) -> &TypingSet {
        &self.typing
    }

    pub fn typing_mut(&mut self) -> &mut TypingSet {
        &mut self.typing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol_objects::MessageKind;

    fn message(id: &str, author: &str, expires_at: Option<i64>) -> ChatMessage {
        ChatMessage {
            id: String::from(id),
            user_id: String::from(author),
            user_name: String::from("Bob"),
            text: String::from("hi"),
            timestamp: 0,
            expires_at,
            kind: MessageKind::User,
        }
    }

    #[test]
    fn counter_is_last_arrival_wins_and_idempotent() {
        let mut store = ReplicatedStore::new(Theme::Light, 0);
        let fresh = CounterState::new(5, "Alice", 200);
        let stale = CounterState::new(3, "Bob", 100);

        assert!(store.apply_counter(fresh));
        assert!(store.apply_counter(stale.clone()));
        assert_eq!(store.counter().value, 3);

        let before = store.clone();
        assert!(!store.apply_counter(stale));
        assert_eq!(store, before);
    }

    #[test]
    fn theme_apply_is_idempotent() {
        let mut store = ReplicatedStore::new(Theme::Light, 0);
        assert!(store.apply_theme(Theme::Dark));
        let before = store.clone();
        assert!(!store.apply_theme(Theme::Dark));
        assert_eq!(store, before);
    }

    #[test]
    fn duplicate_append_is_dropped() {
        let mut store = ReplicatedStore::new(Theme::Light, 0);
        assert!(store.append_message(message("m1", "a", None)));
        assert!(!store.append_message(message("m1", "a", None)));
        assert_eq!(store.messages().len(), 1);
    }

    #[test]
    fn log_holds_appended_minus_deleted() {
        let mut store = ReplicatedStore::new(Theme::Light, 0);
        for id in ["m1", "m2", "m3", "m4"] {
            store.append_message(message(id, "a", None));
        }
        assert!(store.delete_message("m2", Some("a")).is_some());
        assert!(store.delete_message("m4", None).is_some());
        assert!(store.delete_message("unknown", None).is_none());

        let ids: Vec<_> = store.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m3"]);
    }

    #[test]
    fn delete_by_non_author_is_ignored() {
        let mut store = ReplicatedStore::new(Theme::Light, 0);
        store.append_message(message("m1", "a", None));
        assert!(store.delete_message("m1", Some("b")).is_none());
        assert_eq!(store.messages().len(), 1);
    }

    #[test]
    fn expired_messages_are_swept() {
        let now = 10_000;
        let mut store = ReplicatedStore::new(Theme::Light, 0);
        store.append_message(message("short", "a", Some(now + 1000)));
        store.append_message(message("forever", "a", None));

        assert_eq!(store.sweep_expired(now), 0);
        assert!(store.message("short").is_some());

        assert_eq!(store.sweep_expired(now + 1000), 1);
        assert!(store.message("short").is_none());
        assert!(store.message("forever").is_some());
    }

    #[test]
    fn typing_edges_toggle_membership_once() {
        let mut typing = TypingSet::default();
        assert!(typing.set("a", true, 1));
        assert!(!typing.set("a", true, 2));
        assert!(typing.contains("a"));
        assert!(typing.set("a", false, 3));
        assert!(!typing.set("a", false, 4));
        assert!(typing.ids().is_empty());
    }

    #[test]
    fn typing_sweep_uses_last_signal() {
        let mut typing = TypingSet::default();
        typing.set("a", true, 0);
        typing.set("b", true, 0);
        typing.set("b", true, 900);

        assert!(typing.sweep(1000, 500));
        assert_eq!(typing.ids(), vec![String::from("b")]);
        assert!(!typing.sweep(1000, 500));
    }
}
