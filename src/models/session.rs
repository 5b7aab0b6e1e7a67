//! Session identity and lifecycle state.

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

const SESSION_SUFFIX_LEN: usize = 9;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Idle,
    Capturing,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub state: SessionState,
    /// Set on the first transition to `Capturing`; kept across resumes.
    pub started_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: SessionState::Idle,
            started_at: None,
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.state == SessionState::Capturing
    }

    /// Idle/Stopped -> Capturing. Returns `false` when already capturing.
    pub fn begin_capture(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_capturing() {
            return false;
        }
        self.state = SessionState::Capturing;
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        true
    }

    /// Capturing -> Stopped. Returns `false` when nothing was capturing.
    pub fn stop(&mut self) -> bool {
        if !self.is_capturing() {
            return false;
        }
        self.state = SessionState::Stopped;
        true
    }
}

/// Builds `session_<epoch-ms>_<random suffix>`; the suffix keeps ids from
/// colliding across pages opened in the same millisecond.
pub fn generate_session_id(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_SUFFIX_LEN)
        .map(|byte| char::from(byte).to_ascii_lowercase())
        .collect();
    format!("session_{}_{}", now.timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_embed_time_and_differ() {
        let now = Utc::now();
        let first = generate_session_id(now);
        let second = generate_session_id(now);

        assert!(first.starts_with(&format!("session_{}_", now.timestamp_millis())));
        assert_eq!(first.len(), second.len());
        assert_ne!(first, second);
    }

    #[test]
    fn capture_is_resumable_and_keeps_start_time() {
        let mut session = Session::new("session_1_abc");
        let first_start = Utc::now();

        assert!(session.begin_capture(first_start));
        assert!(!session.begin_capture(Utc::now()));
        assert!(session.stop());
        assert!(!session.stop());
        assert_eq!(session.state, SessionState::Stopped);

        assert!(session.begin_capture(first_start + chrono::Duration::seconds(30)));
        assert_eq!(session.started_at, Some(first_start));
    }
}
