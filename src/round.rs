//! Round lifecycle state machine.
//!
//! Phases cycle `waiting → preparing → playing → ended → cleanup → waiting`
//! and change only when the server pushes `roundState`. The countdown shown
//! to the user is derived from the phase's `end_time` and recomputed on
//! demand; it never drives a transition.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::event::GameEvent;
use crate::protocol::{
    CountdownPayload, PlayerId, RoundPhase, RoundStatePayload, WaitingNotificationPayload,
};
use crate::session::GameSession;

impl RoundPhase {
    /// Phase that follows `self` in the cycle.
    pub fn next(self) -> Self {
        match self {
            Self::Waiting => Self::Preparing,
            Self::Preparing => Self::Playing,
            Self::Playing => Self::Ended,
            Self::Ended => Self::Cleanup,
            Self::Cleanup => Self::Waiting,
        }
    }

    /// Capitalized name, e.g. `"Preparing"`.
    pub fn label(self) -> &'static str {
        match self {
            Self::Waiting => "Waiting",
            Self::Preparing => "Preparing",
            Self::Playing => "Playing",
            Self::Ended => "Ended",
            Self::Cleanup => "Cleanup",
        }
    }

    /// Countdown line for this phase with `remaining` whole seconds left.
    pub fn countdown_text(self, remaining: i64) -> String {
        match self {
            Self::Waiting => "Waiting for next round".to_owned(),
            Self::Preparing => format!("Preparing time: {remaining}"),
            Self::Playing => format!("Game remaining time: {remaining}"),
            Self::Ended => "Game Ended".to_owned(),
            Self::Cleanup => format!("Cleanup time: {remaining}"),
        }
    }
}

/// Whole seconds from `now` until `end`, rounded down.
pub fn remaining_seconds(end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (end - now).num_milliseconds().div_euclid(1000)
}

// ── Server clock ────────────────────────────────────────────────────

/// Offset between the server's clock and the local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerClock {
    offset: Duration,
}

impl ServerClock {
    /// Record that the server reported `server_now` when the local clock read
    /// `local_now`.
    pub fn sync(&mut self, server_now: DateTime<Utc>, local_now: DateTime<Utc>) {
        self.offset = server_now - local_now;
    }

    /// Server time corresponding to `local_now`.
    /// Saturates at the ends of the representable range.
    pub fn server_time(&self, local_now: DateTime<Utc>) -> DateTime<Utc> {
        local_now
            .checked_add_signed(self.offset)
            .unwrap_or(if self.offset < Duration::zero() {
                DateTime::<Utc>::MIN_UTC
            } else {
                DateTime::<Utc>::MAX_UTC
            })
    }

    pub fn offset(&self) -> Duration {
        self.offset
    }
}

impl Default for ServerClock {
    fn default() -> Self {
        Self {
            offset: Duration::zero(),
        }
    }
}

// ── Overlay ─────────────────────────────────────────────────────────

/// Pause overlay shown between rounds or on a waiting notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    pub message: String,
    /// Top-scoring player, shown on the `waiting` overlay only.
    pub top_player: Option<(PlayerId, i64)>,
    /// Moment the overlay counts down to.
    pub countdown_until: Option<DateTime<Utc>>,
    show_top_player: bool,
}

impl Overlay {
    fn new(message: String, countdown_until: Option<DateTime<Utc>>) -> Self {
        Self {
            message,
            top_player: None,
            countdown_until,
            show_top_player: false,
        }
    }

    /// `"Top player: <id> (Score: <n>)"`, when a top player is shown.
    pub fn top_player_text(&self) -> Option<String> {
        self.top_player
            .as_ref()
            .map(|(id, score)| format!("Top player: {id} (Score: {score})"))
    }

    /// Countdown line at server time `now`.
    pub fn countdown_text(&self, now: DateTime<Utc>) -> Option<String> {
        let until = self.countdown_until?;
        let left = remaining_seconds(until, now).max(0);
        if left > 0 {
            Some(format!("Next round starts in {left} seconds"))
        } else {
            Some("Starting soon...".to_owned())
        }
    }
}

// ── Tracker ─────────────────────────────────────────────────────────

/// Current phase and its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseState {
    pub phase: RoundPhase,
    pub end_time: DateTime<Utc>,
}

/// Round phase, input gate, overlay and countdown inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundTracker {
    current: Option<PhaseState>,
    clock: ServerClock,
    overlay: Option<Overlay>,
    input_enabled: bool,
    pushed_remaining: Option<i64>,
}

impl Default for RoundTracker {
    fn default() -> Self {
        Self {
            current: None,
            clock: ServerClock::default(),
            overlay: None,
            input_enabled: true,
            pushed_remaining: None,
        }
    }
}

impl RoundTracker {
    pub fn phase(&self) -> Option<RoundPhase> {
        self.current.map(|s| s.phase)
    }

    pub fn current(&self) -> Option<PhaseState> {
        self.current
    }

    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    pub fn clock(&self) -> ServerClock {
        self.clock
    }

    /// Remaining seconds in the current phase at local time `local_now`.
    pub fn remaining(&self, local_now: DateTime<Utc>) -> Option<i64> {
        let state = self.current?;
        Some(remaining_seconds(
            state.end_time,
            self.clock.server_time(local_now),
        ))
    }

    /// Countdown line for the current phase at local time `local_now`.
    pub fn countdown_text(&self, local_now: DateTime<Utc>) -> Option<String> {
        let state = self.current?;
        let remaining = self.remaining(local_now)?;
        Some(state.phase.countdown_text(remaining))
    }

    /// Overlay countdown line at local time `local_now`.
    pub fn overlay_countdown_text(&self, local_now: DateTime<Utc>) -> Option<String> {
        self.overlay
            .as_ref()?
            .countdown_text(self.clock.server_time(local_now))
    }

    /// Last countdown value pushed by the server for the current phase.
    pub fn pushed_remaining(&self) -> Option<i64> {
        self.pushed_remaining
    }

    fn enter(&mut self, state: PhaseState) -> Option<RoundPhase> {
        let previous = self.phase();
        self.current = Some(state);
        self.pushed_remaining = None;
        previous
    }
}

// ── Session operations ──────────────────────────────────────────────

/// Apply a `roundState` push received at local time `local_now`.
pub fn apply_round_state(
    session: &mut GameSession,
    payload: RoundStatePayload,
    local_now: DateTime<Utc>,
) {
    let phase = payload.state;
    session.round.clock.sync(payload.current_time, local_now);
    let previous = session.round.enter(PhaseState {
        phase,
        end_time: payload.end_time,
    });

    match previous {
        Some(prev) if prev.next() != phase && prev != phase => {
            warn!(from = ?prev, to = ?phase, "round phase skipped ahead in the cycle");
        }
        _ => {}
    }
    info!(?phase, end_time = %payload.end_time, "round state changed");

    match phase {
        RoundPhase::Playing => {
            session.reset_scores();
            dismiss_overlay(session);
            set_input(session, true);
        }
        RoundPhase::Waiting | RoundPhase::Preparing | RoundPhase::Ended => {
            set_input(session, false);
            let mut overlay = Overlay::new(
                format!("{} for next round.", phase.label()),
                Some(payload.end_time),
            );
            if phase == RoundPhase::Waiting {
                overlay.show_top_player = true;
                overlay.top_player = top_player(session);
            }
            show_overlay(session, overlay);
        }
        RoundPhase::Cleanup => {
            session.reset_round();
        }
    }

    session.emit(GameEvent::PhaseChanged {
        phase,
        end_time: payload.end_time,
        remaining_seconds: remaining_seconds(payload.end_time, payload.current_time),
    });
}

/// Apply an out-of-band `waitingNotification`: pause input and show the
/// server's message counting down to the next round.
pub fn apply_waiting_notification(session: &mut GameSession, payload: WaitingNotificationPayload) {
    debug!(next_round_start = %payload.next_round_start, "waiting notification");
    set_input(session, false);
    show_overlay(
        session,
        Overlay::new(payload.message, Some(payload.next_round_start)),
    );
}

/// Apply a display-only `countdown` push.
pub fn apply_countdown(session: &mut GameSession, payload: CountdownPayload) {
    if session.round.phase() != Some(payload.current_state) {
        debug!(
            pushed = ?payload.current_state,
            tracked = ?session.round.phase(),
            "countdown for a phase other than the tracked one"
        );
    }
    session.round.pushed_remaining = Some(payload.remaining_time);
    session.emit(GameEvent::Countdown {
        phase: payload.current_state,
        remaining_seconds: payload.remaining_time,
    });
}

/// Refresh the top player on a `waiting` overlay after a score change.
pub(crate) fn refresh_overlay_top_player(session: &mut GameSession) {
    let top = top_player(session);
    if let Some(overlay) = session.round.overlay.as_mut() {
        if overlay.show_top_player && overlay.top_player != top {
            overlay.top_player = top;
            let shown = overlay.clone();
            session.emit(GameEvent::OverlayShown(shown));
        }
    }
}

fn top_player(session: &GameSession) -> Option<(PlayerId, i64)> {
    session
        .scores
        .top_player()
        .map(|(id, score)| (id.clone(), score))
}

fn set_input(session: &mut GameSession, enabled: bool) {
    if session.round.input_enabled != enabled {
        session.round.input_enabled = enabled;
        session.emit(GameEvent::InputEnabled(enabled));
    }
}

fn show_overlay(session: &mut GameSession, overlay: Overlay) {
    session.round.overlay = Some(overlay.clone());
    session.emit(GameEvent::OverlayShown(overlay));
}

fn dismiss_overlay(session: &mut GameSession) {
    if session.round.overlay.take().is_some() {
        session.emit(GameEvent::OverlayDismissed);
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64, millis: u32) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, millis * 1_000_000)
            .single()
            .unwrap()
    }

    #[test]
    fn cycle_order() {
        let mut phase = RoundPhase::Waiting;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(phase);
            phase = phase.next();
        }
        assert_eq!(
            seen,
            vec![
                RoundPhase::Waiting,
                RoundPhase::Preparing,
                RoundPhase::Playing,
                RoundPhase::Ended,
                RoundPhase::Cleanup
            ]
        );
        assert_eq!(phase, RoundPhase::Waiting);
    }

    #[test]
    fn remaining_rounds_down() {
        assert_eq!(remaining_seconds(at(10, 0), at(0, 0)), 10);
        assert_eq!(remaining_seconds(at(10, 0), at(0, 1)), 9);
        assert_eq!(remaining_seconds(at(10, 999), at(0, 0)), 10);
        assert_eq!(remaining_seconds(at(0, 0), at(0, 500)), -1);
    }

    #[test]
    fn countdown_texts() {
        assert_eq!(RoundPhase::Waiting.countdown_text(5), "Waiting for next round");
        assert_eq!(RoundPhase::Preparing.countdown_text(5), "Preparing time: 5");
        assert_eq!(RoundPhase::Playing.countdown_text(42), "Game remaining time: 42");
        assert_eq!(RoundPhase::Ended.countdown_text(1), "Game Ended");
        assert_eq!(RoundPhase::Cleanup.countdown_text(3), "Cleanup time: 3");
    }

    #[test]
    fn clock_skew_is_applied() {
        let mut clock = ServerClock::default();
        clock.sync(at(100, 0), at(95, 0));
        assert_eq!(clock.offset(), Duration::seconds(5));
        assert_eq!(clock.server_time(at(96, 0)), at(101, 0));
    }

    #[test]
    fn overlay_countdown_bottoms_out() {
        let overlay = Overlay::new("Waiting for next round.".into(), Some(at(30, 0)));
        assert_eq!(
            overlay.countdown_text(at(0, 0)).as_deref(),
            Some("Next round starts in 30 seconds")
        );
        assert_eq!(
            overlay.countdown_text(at(31, 0)).as_deref(),
            Some("Starting soon...")
        );
        assert!(overlay.top_player_text().is_none());
    }

    #[test]
    fn tracker_countdown_follows_local_time() {
        let mut tracker = RoundTracker::default();
        assert!(tracker.countdown_text(at(90, 0)).is_none());
        assert!(tracker.overlay_countdown_text(at(90, 0)).is_none());

        // Server runs five seconds ahead.
        tracker.clock.sync(at(100, 0), at(95, 0));
        tracker.enter(PhaseState {
            phase: RoundPhase::Playing,
            end_time: at(100, 0),
        });
        assert_eq!(
            tracker.countdown_text(at(90, 0)).as_deref(),
            Some("Game remaining time: 5")
        );
        assert_eq!(
            tracker.countdown_text(at(91, 0)).as_deref(),
            Some("Game remaining time: 4")
        );

        tracker.overlay = Some(Overlay::new("Waiting for next round.".into(), Some(at(110, 0))));
        assert_eq!(
            tracker.overlay_countdown_text(at(90, 0)).as_deref(),
            Some("Next round starts in 15 seconds")
        );
    }
}
