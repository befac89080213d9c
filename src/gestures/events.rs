use std::time::{Duration, Instant};

/// Touch tracking between start and end; discarded once the gesture resolves.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GestureState {
    pub start_x: f32,
    pub start_y: f32,
    pub progress: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureOutcome {
    /// Leftward swipe passed every threshold; navigate away.
    Navigate,
    /// Released without triggering; progress animates back to zero.
    Canceled { from_progress: f32 },
    /// Would have triggered, but a navigation is still settling.
    Suppressed,
}

/// A running release animation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReleaseAnimation {
    pub from_progress: f32,
    pub started_at: Instant,
    pub duration: Duration,
}

impl ReleaseAnimation {
    pub fn sample(&self, now: Instant) -> f32 {
        release_progress(self.from_progress, now.saturating_duration_since(self.started_at), self.duration)
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started_at) >= self.duration
    }
}

/// Progress while animating back to rest: ease-out cubic from `from` to 0
/// over `duration`.
pub fn release_progress(from: f32, elapsed: Duration, duration: Duration) -> f32 {
    if duration.is_zero() || elapsed >= duration {
        return 0.0;
    }
    let t = elapsed.as_secs_f32() / duration.as_secs_f32();
    let eased = 1.0 - (1.0 - t).powi(3);
    from * (1.0 - eased)
}
