use crate::core::ItemId;
use crate::error::LoadError;

// =============================================================================
// PLAYBACK STATE
// =============================================================================

/// Lifecycle of a single feed item's playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Paused,
    Unloaded,
}

impl PlaybackState {
    pub fn can_play(&self) -> bool {
        matches!(self, PlaybackState::Loading | PlaybackState::Paused)
    }

    pub fn can_pause(&self) -> bool {
        matches!(self, PlaybackState::Loading | PlaybackState::Playing)
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, PlaybackState::Loading)
    }

    pub fn display_text(&self) -> &str {
        match self {
            PlaybackState::Idle => "Idle",
            PlaybackState::Loading => "Loading...",
            PlaybackState::Playing => "Playing",
            PlaybackState::Paused => "Paused",
            PlaybackState::Unloaded => "Unloaded",
        }
    }
}

// =============================================================================
// COMMANDS AND EVENTS
// =============================================================================

/// Identifies the request an async play/pause completion belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaybackToken {
    pub item_id: ItemId,
    pub version: u64,
}

/// Instructions for the host's decoder layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceCommand {
    /// Acquire a decoder for `item_id` from `locator`
    Mount { item_id: ItemId, locator: String, muted: bool },
    /// Start playback; report back with [`ResourceEvent::PlayCompleted`]
    Play { token: PlaybackToken, muted: bool },
    /// Pause playback; errors are ignored by the controller
    Pause { token: PlaybackToken },
    /// Release decoder resources; errors are logged only
    Release { item_id: ItemId },
}

impl ResourceCommand {
    pub fn item_id(&self) -> &str {
        match self {
            ResourceCommand::Mount { item_id, .. } | ResourceCommand::Release { item_id } => item_id,
            ResourceCommand::Play { token, .. } | ResourceCommand::Pause { token } => &token.item_id,
        }
    }
}

/// Completions and failures reported by the host's decoder layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    Mounted { item_id: ItemId },
    LoadFailed { item_id: ItemId, error: LoadError },
    PlayCompleted { token: PlaybackToken, result: Result<(), String> },
    PauseCompleted { token: PlaybackToken, result: Result<(), String> },
    TeardownFailed { item_id: ItemId, error: String },
}

/// Platform lifecycle signals, translated by the host adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    AppBackground,
    AppInactive,
    AppForeground,
    ScreenBlur,
    ScreenFocus,
    HardwareBack,
}

/// What the host should do with the hardware back press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackAction {
    /// Let the default back navigation run
    Proceed,
}

/// A recorded state change, kept for observers and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub item_id: ItemId,
    pub from: PlaybackState,
    pub to: PlaybackState,
}
