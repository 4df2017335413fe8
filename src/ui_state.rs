//! Persisted desktop-shell UI state: pane sizing, collapse flags, and the
//! recent-files list. The panes themselves are out of scope (no renderer
//! here); this is only the serializable record a host loads/saves through
//! the `HostBridge`.

use serde::{Deserialize, Serialize};

const MAX_RECENT_FILES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiState {
    #[serde(default)]
    pub sidebar_collapsed: bool,
    #[serde(default)]
    pub runner_collapsed: bool,
    #[serde(default)]
    pub steps_panel_width: Option<f64>,
    #[serde(default)]
    pub steps_panel_height: Option<f64>,
    #[serde(default)]
    pub recent_files: Vec<String>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            sidebar_collapsed: false,
            runner_collapsed: false,
            steps_panel_width: None,
            steps_panel_height: None,
            recent_files: Vec::new(),
        }
    }
}

impl UiState {
    pub fn from_json(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_default()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Moves `path` to the front of the recent-files list, deduplicating
    /// and capping the list at ten entries, most-recent-first.
    pub fn push_recent_file(&mut self, path: impl Into<String>) {
        let path = path.into();
        self.recent_files.retain(|p| p != &path);
        self.recent_files.insert(0, path);
        self.recent_files.truncate(MAX_RECENT_FILES);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_recent_file_deduplicates_and_moves_to_front() {
        let mut state = UiState::default();
        state.push_recent_file("a.flow.json");
        state.push_recent_file("b.flow.json");
        state.push_recent_file("a.flow.json");
        assert_eq!(state.recent_files, vec!["a.flow.json", "b.flow.json"]);
    }

    #[test]
    fn push_recent_file_caps_at_ten() {
        let mut state = UiState::default();
        for i in 0..15 {
            state.push_recent_file(format!("{i}.flow.json"));
        }
        assert_eq!(state.recent_files.len(), MAX_RECENT_FILES);
        assert_eq!(state.recent_files[0], "14.flow.json");
    }

    #[test]
    fn round_trips_through_json() {
        let mut state = UiState::default();
        state.sidebar_collapsed = true;
        state.push_recent_file("x.flow.json");
        let json = state.to_json();
        let parsed = UiState::from_json(&json);
        assert_eq!(parsed, state);
    }

    #[test]
    fn malformed_json_falls_back_to_default() {
        let parsed = UiState::from_json("not json");
        assert_eq!(parsed, UiState::default());
    }
}
