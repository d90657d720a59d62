//! Room lobby: whether a room can be joined right now.
//!
//! Rounds start on a fixed wall-clock cycle, so the lobby polls
//! `GET /v1/game/room-status` and derives a join window from the reported
//! next round start.

use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::RoundPhase;

/// How often a lobby should refresh a room's status.
pub const ROOM_STATUS_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Joining is allowed from this second of each minute onward.
pub const JOIN_WINDOW_OPENS_AT_SECOND: u32 = 5;

/// Response of `GET /v1/game/room-status?roomId=R`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatus {
    pub state: RoundPhase,
    /// Next round start, Unix milliseconds.
    pub next_round_start: i64,
    /// Server clock at response time, Unix milliseconds, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_time: Option<i64>,
}

impl RoomStatus {
    pub fn next_round_start_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.next_round_start)
    }
}

/// Outcome of [`JoinWindow::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinEligibility {
    /// The room accepts players now.
    Open,
    /// Preparing; the next round starts in `seconds`.
    Wait { seconds: i64 },
    /// The reported start has passed; fetch a fresh status.
    Refresh,
}

impl JoinEligibility {
    /// Lobby text for this outcome.
    pub fn text(self) -> String {
        match self {
            Self::Open => "Allow join now.".to_owned(),
            Self::Wait { seconds } => format!("Preparing: {seconds} seconds"),
            Self::Refresh => "Checking room status...".to_owned(),
        }
    }
}

/// Join-window evaluation for one room status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinWindow {
    status: RoomStatus,
    /// `server clock − local clock` at the moment the status was received.
    skew: chrono::Duration,
}

impl JoinWindow {
    /// Remember `status`, received at `local_now`.
    pub fn new(status: RoomStatus, local_now: DateTime<Utc>) -> Self {
        let skew = status
            .server_time
            .and_then(|server_ms| {
                chrono::Duration::try_milliseconds(
                    server_ms.saturating_sub(local_now.timestamp_millis()),
                )
            })
            .unwrap_or_else(chrono::Duration::zero);
        Self { status, skew }
    }

    pub fn status(&self) -> &RoomStatus {
        &self.status
    }

    /// Whether the room can be joined at local time `local_now`.
    pub fn evaluate(&self, local_now: DateTime<Utc>) -> JoinEligibility {
        let now = local_now.checked_add_signed(self.skew).unwrap_or(local_now);
        if now.second() >= JOIN_WINDOW_OPENS_AT_SECOND {
            return JoinEligibility::Open;
        }
        let distance_ms = self
            .status
            .next_round_start
            .saturating_sub(now.timestamp_millis());
        if distance_ms <= 0 {
            return JoinEligibility::Refresh;
        }
        JoinEligibility::Wait {
            seconds: distance_ms.div_euclid(1000) % 60,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32, ms: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap() + chrono::Duration::milliseconds(i64::from(ms))
    }

    fn status(next: DateTime<Utc>, server_time: Option<DateTime<Utc>>) -> RoomStatus {
        RoomStatus {
            state: RoundPhase::Preparing,
            next_round_start: next.timestamp_millis(),
            server_time: server_time.map(|t| t.timestamp_millis()),
        }
    }

    #[test]
    fn decodes_server_response() {
        let raw = r#"{"state":"playing","nextRoundStart":1714564830000}"#;
        let status: RoomStatus = serde_json::from_str(raw).unwrap();
        assert_eq!(status.state, RoundPhase::Playing);
        assert_eq!(status.next_round_start_at().unwrap().timestamp(), 1_714_564_830);
        assert!(status.server_time.is_none());
    }

    #[test]
    fn open_after_fifth_second() {
        let window = JoinWindow::new(status(at(12, 1, 30, 0), None), at(12, 0, 10, 0));
        assert_eq!(window.evaluate(at(12, 0, 10, 0)), JoinEligibility::Open);
        assert_eq!(JoinEligibility::Open.text(), "Allow join now.");
    }

    #[test]
    fn waits_during_first_seconds() {
        let next = at(12, 1, 2, 500);
        let window = JoinWindow::new(status(next, None), at(12, 1, 0, 0));
        let result = window.evaluate(at(12, 1, 0, 0));
        assert_eq!(result, JoinEligibility::Wait { seconds: 2 });
        assert_eq!(result.text(), "Preparing: 2 seconds");
    }

    #[test]
    fn passed_start_asks_for_refresh() {
        let window = JoinWindow::new(status(at(12, 0, 30, 0), None), at(12, 1, 1, 0));
        assert_eq!(window.evaluate(at(12, 1, 1, 0)), JoinEligibility::Refresh);
    }

    #[test]
    fn skew_is_corrected() {
        // Local clock runs 10 s behind the server: local :58 is server :08.
        let local = at(12, 0, 58, 0);
        let server = at(12, 1, 8, 0);
        let window = JoinWindow::new(status(at(12, 1, 30, 0), Some(server)), local);
        assert_eq!(window.evaluate(local), JoinEligibility::Open);

        // Local :53 is server :03, still before the window opens.
        let local = at(12, 0, 53, 0);
        let window = JoinWindow::new(status(at(12, 1, 4, 0), Some(at(12, 1, 3, 0))), local);
        assert_eq!(window.evaluate(local), JoinEligibility::Wait { seconds: 1 });
    }
}
