use std::time::{Duration, Instant};

use crate::core::GestureConfig;
use crate::gestures::{GestureOutcome, GestureState, ReleaseAnimation};

/// Interprets a touch sequence as a leftward "open profile" swipe.
pub struct GestureNavigator {
    trigger_distance: f32,
    direction_ratio: f32,
    progress_distance: f32,
    release_duration: Duration,
    settle_delay: Duration,
    state: Option<GestureState>,
    navigating_since: Option<Instant>,
    release: Option<ReleaseAnimation>,
}

impl GestureNavigator {
    pub fn new(config: &GestureConfig) -> Self {
        Self {
            trigger_distance: config.trigger_distance,
            direction_ratio: config.direction_ratio,
            progress_distance: config.progress_distance.max(1.0),
            release_duration: config.release_animation(),
            settle_delay: config.settle_delay(),
            state: None,
            navigating_since: None,
            release: None,
        }
    }

    pub fn touch_start(&mut self, x: f32, y: f32) {
        self.release = None;
        self.state = Some(GestureState {
            start_x: x,
            start_y: y,
            progress: 0.0,
        });
    }

    /// Returns the feedback progress in `0.0..=1.0`.
    pub fn touch_move(&mut self, x: f32, y: f32) -> f32 {
        let progress_distance = self.progress_distance;
        let Some(state) = self.state.as_mut() else {
            return 0.0;
        };

        let dx = x - state.start_x;
        let dy = y - state.start_y;
        state.progress = if dx.abs() > dy.abs() && dx < 0.0 {
            (dx.abs() / progress_distance).min(1.0)
        } else {
            0.0
        };
        state.progress
    }

    pub fn touch_end(&mut self, x: f32, y: f32, now: Instant) -> GestureOutcome {
        let Some(state) = self.state.take() else {
            return GestureOutcome::Canceled { from_progress: 0.0 };
        };

        let dx = x - state.start_x;
        let dy = y - state.start_y;
        let triggers = dx < 0.0
            && dx.abs() > self.trigger_distance
            && dx.abs() / dy.abs().max(1.0) > self.direction_ratio;

        if !triggers {
            self.release = Some(ReleaseAnimation {
                from_progress: state.progress,
                started_at: now,
                duration: self.release_duration,
            });
            return GestureOutcome::Canceled {
                from_progress: state.progress,
            };
        }

        if self.navigating_since.is_some() {
            log::debug!("Swipe ignored, navigation still settling");
            self.release = Some(ReleaseAnimation {
                from_progress: state.progress,
                started_at: now,
                duration: self.release_duration,
            });
            return GestureOutcome::Suppressed;
        }

        self.navigating_since = Some(now);
        GestureOutcome::Navigate
    }

    /// Clears the navigation guard when the screen regains focus.
    pub fn on_focus(&mut self) {
        self.navigating_since = None;
    }

    /// Clears the navigation guard once the settle delay has elapsed and
    /// drops a finished release animation.
    pub fn tick(&mut self, now: Instant) {
        if let Some(since) = self.navigating_since {
            if now.saturating_duration_since(since) >= self.settle_delay {
                self.navigating_since = None;
            }
        }
        if self.release.map(|release| release.is_finished(now)).unwrap_or(false) {
            self.release = None;
        }
    }

    pub fn is_navigating(&self) -> bool {
        self.navigating_since.is_some()
    }

    pub fn state(&self) -> Option<&GestureState> {
        self.state.as_ref()
    }

    /// The progress value a renderer should show at `now`.
    pub fn progress(&self, now: Instant) -> f32 {
        if let Some(state) = &self.state {
            return state.progress;
        }
        self.release.map(|release| release.sample(now)).unwrap_or(0.0)
    }
}
