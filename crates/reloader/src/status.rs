//! Status snapshot types for a loader.

use serde::Serialize;

/// Lifecycle state of a loader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoaderState {
    /// `start` has not completed yet
    #[default]
    NotStarted,
    /// Publisher thread is refreshing on its timer
    Running,
    /// Stopped, or the publisher thread could not be spawned. The last
    /// published version is still served.
    Stopped,
}

/// Point-in-time view of a loader, suitable for health or metrics endpoints.
///
/// Counters include the initial load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoaderStatus {
    pub state: LoaderState,
    /// Generation readers currently resolve to (0 before start).
    pub generation: u64,
    pub active_slot: usize,
    /// Readers pinning the active slot at the time of the snapshot.
    pub active_readers: usize,
    pub reloads_succeeded: u64,
    pub reloads_failed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl LoaderStatus {
    pub fn is_running(&self) -> bool {
        self.state == LoaderState::Running
    }

    pub fn reloads_attempted(&self) -> u64 {
        self.reloads_succeeded + self.reloads_failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_default_is_not_started() {
        assert_eq!(LoaderState::default(), LoaderState::NotStarted);
        assert!(!LoaderStatus::default().is_running());
    }

    #[test]
    fn state_serializes_screaming_snake_case() {
        insta::assert_json_snapshot!(
            [LoaderState::NotStarted, LoaderState::Running, LoaderState::Stopped],
            @r#"
        [
          "NOT_STARTED",
          "RUNNING",
          "STOPPED"
        ]
        "#
        );
    }

    #[test]
    fn status_omits_missing_error() {
        let json = serde_json::to_value(LoaderStatus::default()).unwrap();
        assert_eq!(json["state"], "NOT_STARTED");
        assert!(json.get("last_error").is_none());
    }

    #[test]
    fn status_serializes_minimal() {
        let status = LoaderStatus {
            state: LoaderState::Running,
            generation: 4,
            active_slot: 1,
            active_readers: 2,
            reloads_succeeded: 4,
            reloads_failed: 0,
            last_error: None,
        };
        insta::assert_json_snapshot!(status, @r#"
        {
          "state": "RUNNING",
          "generation": 4,
          "active_slot": 1,
          "active_readers": 2,
          "reloads_succeeded": 4,
          "reloads_failed": 0
        }
        "#);
    }

    #[test]
    fn status_serializes_last_error() {
        let status = LoaderStatus {
            state: LoaderState::Stopped,
            generation: 1,
            active_slot: 0,
            active_readers: 0,
            reloads_succeeded: 1,
            reloads_failed: 2,
            last_error: Some("source unavailable: timeout".to_string()),
        };
        assert_eq!(status.reloads_attempted(), 3);
        insta::assert_json_snapshot!(status, @r#"
        {
          "state": "STOPPED",
          "generation": 1,
          "active_slot": 0,
          "active_readers": 0,
          "reloads_succeeded": 1,
          "reloads_failed": 2,
          "last_error": "source unavailable: timeout"
        }
        "#);
    }
}
