//! Agent liveness model

use serde::{Deserialize, Serialize};

/// Online/offline state of the trading agent.
///
/// A new value only exists when the state actually flips; `previous_online`
/// always holds the `is_online` of the value it replaced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub is_online: bool,
    pub previous_online: bool,
    /// When the transition was observed (epoch seconds)
    pub observed_at: f64,
}

impl AgentStatus {
    /// The status assumed before anything has been observed
    pub fn initial(observed_at: f64) -> Self {
        Self {
            is_online: false,
            previous_online: false,
            observed_at,
        }
    }

    /// Produce the next status if `is_online` differs from the current one
    pub fn transition(&self, is_online: bool, observed_at: f64) -> Option<AgentStatus> {
        if is_online == self.is_online {
            return None;
        }

        Some(AgentStatus {
            is_online,
            previous_online: self.is_online,
            observed_at,
        })
    }
}

/// Outcome of a single `/health` probe against the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusProbe {
    /// The agent answered and reports itself healthy
    Online,
    /// The agent confirmed it is down (unhealthy answer or refused connection)
    Offline,
    /// Timeout or unreadable answer; no conclusion may be drawn
    Inconclusive,
}

impl StatusProbe {
    /// Online flag to commit, if the probe was conclusive
    pub fn as_online(&self) -> Option<bool> {
        match self {
            StatusProbe::Online => Some(true),
            StatusProbe::Offline => Some(false),
            StatusProbe::Inconclusive => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_is_offline() {
        let status = AgentStatus::initial(1.0);
        assert!(!status.is_online);
        assert!(!status.previous_online);
    }

    #[test]
    fn test_transition_only_on_change() {
        let status = AgentStatus::initial(1.0);
        assert!(status.transition(false, 2.0).is_none());

        let online = status.transition(true, 3.0).unwrap();
        assert!(online.is_online);
        assert!(!online.previous_online);
        assert_eq!(online.observed_at, 3.0);

        assert!(online.transition(true, 4.0).is_none());

        let offline = online.transition(false, 5.0).unwrap();
        assert!(!offline.is_online);
        assert!(offline.previous_online);
    }

    #[test]
    fn test_probe_conclusiveness() {
        assert_eq!(StatusProbe::Online.as_online(), Some(true));
        assert_eq!(StatusProbe::Offline.as_online(), Some(false));
        assert_eq!(StatusProbe::Inconclusive.as_online(), None);
    }
}
