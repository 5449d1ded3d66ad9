//! Per-container status values.

use std::fmt;

/// Run-state of a single watched container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ContainerState {
    /// The runtime reported the container as `running`.
    Running,
    /// The runtime knows the container but it is in any other state
    /// (`exited`, `created`, `paused`, `restarting`, ...).
    Stopped,
    /// The runtime did not list the container at all.
    NotFound,
    /// Never produced by a poll. Reserved for consumers that render a watch
    /// list before the first snapshot arrives.
    Unknown,
}

impl ContainerState {
    /// Returns a short symbol for display.
    pub fn symbol(&self) -> &'static str {
        match self {
            ContainerState::Running => "OK",
            ContainerState::Stopped => "DOWN",
            ContainerState::NotFound => "MISSING",
            ContainerState::Unknown => "?",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ContainerState::Running)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ContainerState::Running => "running",
            ContainerState::Stopped => "stopped",
            ContainerState::NotFound => "not found",
            ContainerState::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Status of one watch-list entry as derived from a single poll.
///
/// `raw_state` keeps the runtime's own wording so a presentation layer can
/// show e.g. `exited` rather than the coarser [`ContainerState::Stopped`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContainerStatus {
    pub name: String,
    pub state: ContainerState,
    /// Empty when the container was not listed.
    pub raw_state: String,
}

impl ContainerStatus {
    pub fn new(name: impl Into<String>, state: ContainerState, raw_state: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state,
            raw_state: raw_state.into(),
        }
    }

    /// Text to show next to the name: the runtime's wording when there is
    /// one, otherwise the coarse state.
    pub fn status_text(&self) -> String {
        if self.raw_state.is_empty() {
            self.state.to_string()
        } else {
            self.raw_state.clone()
        }
    }
}
