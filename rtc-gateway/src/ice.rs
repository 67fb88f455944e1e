use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Per-Component ICE state (§4.6). The core does not implement ICE itself
/// — candidate gathering and connectivity checks are driven by an external
/// ICE agent behind [`IceAgent`] — but it does own this state machine so
/// that the rest of the engine (RTCP, hangup sequencing) can react to
/// transitions without depending on the agent's own types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IceState {
    #[default]
    Disconnected,
    Gathering,
    Connecting,
    Connected,
    Ready,
    Failed,
}

impl fmt::Display for IceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IceState::Disconnected => "disconnected",
            IceState::Gathering => "gathering",
            IceState::Connecting => "connecting",
            IceState::Connected => "connected",
            IceState::Ready => "ready",
            IceState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One ICE candidate as carried in SDP/trickle JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

/// Configuration an ICE agent is created with, per §4.6: controlling role,
/// ICE-lite, interface filters, STUN/TURN servers, trickle mode, port range.
#[derive(Debug, Clone, Default)]
pub struct IceConfig {
    pub controlling: bool,
    pub ice_lite: bool,
    pub enforce_interface: Vec<String>,
    pub ignore_interface: Vec<String>,
    pub stun_server: Option<String>,
    pub turn_server: Option<String>,
    pub full_trickle: bool,
    pub port_range: Option<(u16, u16)>,
}

/// The boundary the core drives into an external ICE agent implementation.
/// A real deployment wraps a library (e.g. an ICE/STUN/TURN stack); tests
/// and early integration can use a stub.
pub trait IceAgent: Send {
    fn start_gathering(&mut self, config: &IceConfig);
    fn add_remote_candidate(&mut self, candidate: &Candidate);
    fn end_of_remote_candidates(&mut self);
    fn state(&self) -> IceState;
    fn selected_pair(&self) -> Option<String>;
    fn restart(&mut self, config: &IceConfig);
    fn close(&mut self);
}

/// Queues trickle candidates that arrive before the offer has finished
/// processing (PROCESSING_OFFER flag), draining them in receipt order once
/// the agent exists (§3 "Trickle candidate", §4.6).
#[derive(Debug, Default)]
pub struct TrickleQueue {
    pending: VecDeque<Candidate>,
    end_of_candidates: bool,
}

impl TrickleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, candidate: Candidate) {
        self.pending.push_back(candidate);
    }

    pub fn mark_end_of_candidates(&mut self) {
        self.end_of_candidates = true;
    }

    pub fn end_of_candidates(&self) -> bool {
        self.end_of_candidates
    }

    /// Drains every queued candidate, in the order received, applying each
    /// to `agent`.
    pub fn drain(&mut self, agent: &mut dyn IceAgent) {
        while let Some(candidate) = self.pending.pop_front() {
            agent.add_remote_candidate(&candidate);
        }
        if self.end_of_candidates {
            agent.end_of_remote_candidates();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingAgent {
        applied: Vec<Candidate>,
        ended: bool,
        state: IceState,
    }

    impl IceAgent for RecordingAgent {
        fn start_gathering(&mut self, _config: &IceConfig) {
            self.state = IceState::Gathering;
        }
        fn add_remote_candidate(&mut self, candidate: &Candidate) {
            self.applied.push(candidate.clone());
        }
        fn end_of_remote_candidates(&mut self) {
            self.ended = true;
        }
        fn state(&self) -> IceState {
            self.state
        }
        fn selected_pair(&self) -> Option<String> {
            None
        }
        fn restart(&mut self, _config: &IceConfig) {
            self.state = IceState::Gathering;
        }
        fn close(&mut self) {
            self.state = IceState::Disconnected;
        }
    }

    fn candidate(n: u32) -> Candidate {
        Candidate {
            candidate: format!("candidate:{n} 1 udp 2130706431 10.0.0.{n} 9 typ host"),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        }
    }

    /// Scenario 5: three trickle candidates arrive before the offer, then
    /// the offer is processed; all three are applied, end-of-candidates
    /// has not been signaled so ALL_TRICKLES-equivalent state stays false.
    #[test]
    fn trickle_before_offer_applies_in_order() {
        let mut queue = TrickleQueue::new();
        for n in 1..=3 {
            queue.push(candidate(n));
        }
        let mut agent = RecordingAgent::default();
        queue.drain(&mut agent);

        assert_eq!(agent.applied.len(), 3);
        assert_eq!(agent.applied[0].candidate, candidate(1).candidate);
        assert_eq!(agent.applied[2].candidate, candidate(3).candidate);
        assert!(!agent.ended);
        assert!(queue.is_empty());
    }

    #[test]
    fn end_of_candidates_is_applied_once_drained() {
        let mut queue = TrickleQueue::new();
        queue.push(candidate(1));
        queue.mark_end_of_candidates();
        let mut agent = RecordingAgent::default();
        queue.drain(&mut agent);
        assert!(agent.ended);
        assert!(queue.end_of_candidates());
    }
}
