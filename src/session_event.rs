use crate::{
    session::SessionSnapshot,
    types::{ChangeCallback, NoticeCallback},
};

pub(crate) enum SessionEvent {
    Changed(ChangeCallback),
    Notice(NoticeCallback),
}

impl SessionEvent {
    pub(crate) fn invoke_changed(&self, snapshot: &SessionSnapshot) {
        if let SessionEvent::Changed(event) = self {
            event(snapshot)
        }
    }

    pub(crate) fn invoke_notice(&self, notice: &str) {
        if let SessionEvent::Notice(event) = self {
            event(notice)
        }
    }
}
