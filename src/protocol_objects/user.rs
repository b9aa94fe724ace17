use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type PeerId = String;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: PeerId,
    pub name: String,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

impl User {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: String::from(id),
            name: String::from(name),
            activities: vec![],
        }
    }

    /// Returns a copy of this user with `activity` appended to its log.
    pub fn with_activity(&self, activity: Activity) -> Self {
        let mut user = self.clone();
        user.activities.push(activity);
        user
    }

    pub fn last_activity(&self) -> Option<&Activity> {
        self.activities.last()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    SessionCreated,
    CounterUpdated,
    MessageSent,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub timestamp: i64,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Activity {
    pub fn new(kind: ActivityKind, timestamp: i64, metadata: Option<Value>) -> Self {
        Self {
            kind,
            timestamp,
            metadata,
        }
    }
}
