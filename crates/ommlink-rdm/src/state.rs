// ── Stream state, data state, and quality of service ──

use serde::{Deserialize, Serialize};

/// Lifetime of the stream carrying an item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, Default,
)]
pub enum StreamState {
    #[default]
    Open,
    NonStreaming,
    Closed,
    ClosedRecover,
    ClosedRedirected,
}

/// Health of the data flowing on the stream.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, Default,
)]
pub enum DataState {
    NoChange,
    #[default]
    Ok,
    Suspect,
}

/// Qualifying code attached to a state transition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, Default,
)]
pub enum StatusCode {
    #[default]
    None,
    NotFound,
    Timeout,
    NotAuthorized,
    InvalidArgument,
    UsageError,
    NoResources,
    TooManyItems,
    AlreadyOpen,
    SourceUnknown,
    NotOpen,
}

/// Stream state, data state, code, and free text, as carried on refresh
/// and status messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct State {
    pub stream_state: StreamState,
    pub data_state: DataState,
    pub code: StatusCode,
    #[serde(default)]
    pub text: String,
}

impl State {
    /// Open / Ok / None with the given text.
    pub fn open_ok(text: impl Into<String>) -> Self {
        Self {
            stream_state: StreamState::Open,
            data_state: DataState::Ok,
            code: StatusCode::None,
            text: text.into(),
        }
    }

    /// Open / Suspect with the given code and text.
    pub fn open_suspect(code: StatusCode, text: impl Into<String>) -> Self {
        Self {
            stream_state: StreamState::Open,
            data_state: DataState::Suspect,
            code,
            text: text.into(),
        }
    }

    /// Closed / Suspect with the given code and text.
    pub fn closed(code: StatusCode, text: impl Into<String>) -> Self {
        Self {
            stream_state: StreamState::Closed,
            data_state: DataState::Suspect,
            code,
            text: text.into(),
        }
    }

    pub fn is_open_ok(&self) -> bool {
        self.stream_state == StreamState::Open && self.data_state == DataState::Ok
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} / {} / {} / '{}'",
            self.stream_state, self.data_state, self.code, self.text
        )
    }
}

// ── Quality of service ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum QosTimeliness {
    #[default]
    RealTime,
    DelayedUnknown,
    Delayed(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum QosRate {
    #[default]
    TickByTick,
    JustInTimeConflated,
    TimeConflated(u16),
}

/// Timeliness and rate of a data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Qos {
    pub timeliness: QosTimeliness,
    pub rate: QosRate,
}

impl Qos {
    /// The best service level: real-time, tick-by-tick.
    pub fn realtime_tick_by_tick() -> Self {
        Self::default()
    }

    fn timeliness_rank(self) -> u32 {
        match self.timeliness {
            QosTimeliness::RealTime => 0,
            QosTimeliness::Delayed(d) => 1 + u32::from(d),
            QosTimeliness::DelayedUnknown => u32::MAX,
        }
    }

    fn rate_rank(self) -> u32 {
        match self.rate {
            QosRate::TickByTick => 0,
            QosRate::TimeConflated(ms) => 1 + u32::from(ms),
            QosRate::JustInTimeConflated => u32::MAX,
        }
    }

    /// Whether `self` falls between `best` and `worst` inclusive, on both
    /// the timeliness and rate axes.
    pub fn is_in_range(self, best: Qos, worst: Qos) -> bool {
        let t = self.timeliness_rank();
        let r = self.rate_rank();
        t >= best.timeliness_rank()
            && t <= worst.timeliness_rank()
            && r >= best.rate_rank()
            && r <= worst.rate_rank()
    }
}

impl std::fmt::Display for Qos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = match self.timeliness {
            QosTimeliness::RealTime => "RealTime".to_owned(),
            QosTimeliness::DelayedUnknown => "DelayedByUnknown".to_owned(),
            QosTimeliness::Delayed(d) => format!("DelayedBy{d}"),
        };
        let r = match self.rate {
            QosRate::TickByTick => "TickByTick".to_owned(),
            QosRate::JustInTimeConflated => "JustInTimeConflated".to_owned(),
            QosRate::TimeConflated(ms) => format!("ConflatedBy{ms}ms"),
        };
        write!(f, "{t}/{r}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_range_includes_bounds() {
        let best = Qos::realtime_tick_by_tick();
        let worst = Qos {
            timeliness: QosTimeliness::Delayed(100),
            rate: QosRate::TimeConflated(500),
        };

        assert!(best.is_in_range(best, worst));
        assert!(worst.is_in_range(best, worst));

        let mid = Qos {
            timeliness: QosTimeliness::Delayed(10),
            rate: QosRate::TickByTick,
        };
        assert!(mid.is_in_range(best, worst));
    }

    #[test]
    fn qos_outside_range_rejected() {
        let best = Qos {
            timeliness: QosTimeliness::Delayed(10),
            rate: QosRate::TickByTick,
        };
        let worst = Qos {
            timeliness: QosTimeliness::Delayed(100),
            rate: QosRate::TickByTick,
        };

        // Better than `best` on the timeliness axis.
        assert!(!Qos::realtime_tick_by_tick().is_in_range(best, worst));
    }

    #[test]
    fn state_display_is_readable() {
        let state = State::closed(StatusCode::NotFound, "item not found");
        assert_eq!(
            state.to_string(),
            "Closed / Suspect / NotFound / 'item not found'"
        );
    }
}
