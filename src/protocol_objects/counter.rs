use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    pub value: i64,
    #[serde(rename = "lastChangedBy")]
    pub last_changed_by: String,
    #[serde(rename = "lastChangeAt")]
    pub last_change_at: i64,
}

impl CounterState {
    pub fn new(value: i64, last_changed_by: &str, last_change_at: i64) -> Self {
        Self {
            value,
            last_changed_by: String::from(last_changed_by),
            last_change_at,
        }
    }
}
