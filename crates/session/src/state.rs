use serde::{Deserialize, Serialize};

/// Session lifecycle.
///
/// ```text
/// Uninitialized ──initialize──▶ Initializing ──ok──▶ Ready
///                                   │  ▲
///                                 fail │ retry
///                                   ▼  │
///                                FailedInit
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    FailedInit,
}

impl SessionState {
    /// States from which `initialize` may start a connection attempt.
    pub fn accepts_initialize(self) -> bool {
        matches!(self, SessionState::Uninitialized | SessionState::FailedInit)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
            SessionState::FailedInit => "failed_init",
        }
    }
}

impl core::fmt::Display for SessionState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
