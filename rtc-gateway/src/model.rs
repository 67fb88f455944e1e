use crate::codec::KeyframeDetector;
use crate::dtls::{DtlsDriver, DtlsRole, DtlsState};
use crate::ice::{IceState, TrickleQueue};
use crate::retransmit::RtxWrapper;
use crate::rewrite::RewriteContext;
use crate::rtcp_context::{ReceiverContext, SenderContext, TwccRecorder};
use crate::skew::SkewCompensator;
use crate::state::StateFlags;
use crate::stats::LinkStats;
use bitflags::bitflags;
use rtc_rtp::extension::ExtensionMap;
use rtc_shared::error::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Instant;

bitflags! {
    /// Negotiated send/receive direction for one media lane (§3 "Stream").
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MediaDirection: u8 {
        const SEND = 1 << 0;
        const RECV = 1 << 1;
    }
}

impl Default for MediaDirection {
    fn default() -> Self {
        MediaDirection::SEND | MediaDirection::RECV
    }
}

/// Outbound unit of work for a Handle's send worker (§4.7): the only
/// three things that cross the send queue.
pub enum Outbound {
    Rtp { is_video: bool, packet: rtc_rtp::Packet },
    Rtcp { packets: Vec<rtc_rtcp::Packet> },
    Data { payload: Vec<u8> },
}

/// Transport layer under a Stream (§3 "Component"). Holds per-direction,
/// per-media retransmit state, the inbound NACK window, stats and the
/// ICE/DTLS state this lane has reached. Guarded by its own mutex; lock
/// order is handle -> stream -> component (§5).
pub struct Component {
    pub ice_state: IceState,
    pub dtls_state: DtlsState,
    pub dtls_role: Option<DtlsRole>,
    pub selected_pair: Option<String>,
    pub send_buffers: HashMap<u32, crate::retransmit::SendBuffer>,
    pub nack_windows: HashMap<u32, crate::retransmit::NackWindow>,
    pub stats: LinkStats,
    /// rtx payload type -> base payload type, shared across every lane
    /// negotiated for this component (§3, §4.4).
    pub rtx_payload_types: HashMap<u8, u8>,
    /// Transport-wide-cc arrival tracker and outbound feedback generator
    /// (§4.5). One per component since the feedback packet is sent on the
    /// component's own sender SSRC, not per-lane.
    pub twcc: TwccRecorder,
    pub remote_fingerprint: Option<String>,
    pub remote_fingerprint_algorithm: Option<String>,
    pub remote_ice_ufrag: Option<String>,
    pub remote_ice_pwd: Option<String>,
}

impl Component {
    pub fn new(now: Instant) -> Self {
        Self {
            ice_state: IceState::Disconnected,
            dtls_state: DtlsState::New,
            dtls_role: None,
            selected_pair: None,
            send_buffers: HashMap::new(),
            nack_windows: HashMap::new(),
            stats: LinkStats::new(now),
            rtx_payload_types: HashMap::new(),
            twcc: TwccRecorder::new(rand::random(), 0, now),
            remote_fingerprint: None,
            remote_fingerprint_algorithm: None,
            remote_ice_ufrag: None,
            remote_ice_pwd: None,
        }
    }

    /// Verifies the peer's DTLS certificate against the fingerprint learned
    /// from the remote SDP (§4.6 "the core verifies ... against the
    /// `a=fingerprint` learned from signaling"), reading both the algorithm
    /// and the fingerprint from stored Component state rather than trusting
    /// a caller-supplied value.
    pub fn verify_remote_fingerprint(&self, driver: &dyn DtlsDriver) -> bool {
        match (&self.remote_fingerprint_algorithm, &self.remote_fingerprint) {
            (Some(algorithm), Some(fingerprint)) => {
                driver.remote_fingerprint_matches(algorithm, fingerprint)
            }
            _ => false,
        }
    }
}

/// One media lane's bookkeeping: rewrite context, skew compensator and
/// RTCP accounting, duplicated per simulcast layer where relevant (§3
/// "Stream").
pub struct MediaLane {
    pub rewrite: RewriteContext,
    pub skew: SkewCompensator,
    pub receiver_rtcp: ReceiverContext,
    pub sender_rtcp: Option<SenderContext>,
    pub ssrc: Option<u32>,
    pub payload_type: Option<u8>,
    /// Our own rtx SSRC for this lane, negotiated alongside `ssrc` (§3).
    pub rtx_ssrc: Option<u32>,
    /// The rtx payload type this lane's base codec maps to, negotiated in
    /// SDP fmtp (§4.4).
    pub rtx_payload_type: Option<u8>,
    /// The peer's rtx SSRC for this lane (per-simulcast-layer when
    /// `video` holds more than one lane).
    pub peer_rtx_ssrc: Option<u32>,
    /// Wraps recovered packets as RFC 4588 rtx retransmissions. `None`
    /// until both `rtx_ssrc` and `rtx_payload_type` are negotiated.
    pub rtx_wrapper: Option<RtxWrapper>,
    pub direction: MediaDirection,
    /// Codec-specific keyframe detector, set once the negotiated codec is
    /// known (§3 "keyframe detection").
    pub keyframe_detector: Option<KeyframeDetector>,
    /// Negotiated RTP header extensions for this lane, used to pull the
    /// transport-wide-cc sequence number and other extensions out of
    /// inbound packets (§4.5).
    pub extensions: ExtensionMap,
}

impl MediaLane {
    pub fn new(clock_rate: Option<u32>, rtcp_ssrc: u32, rtcp_clock_rate: u32) -> Self {
        Self {
            rewrite: RewriteContext::new(clock_rate),
            skew: SkewCompensator::new(clock_rate),
            receiver_rtcp: ReceiverContext::new(rtcp_ssrc, rtcp_clock_rate),
            sender_rtcp: None,
            ssrc: None,
            payload_type: None,
            rtx_ssrc: None,
            rtx_payload_type: None,
            peer_rtx_ssrc: None,
            rtx_wrapper: None,
            direction: MediaDirection::default(),
            keyframe_detector: None,
            extensions: ExtensionMap::new(),
        }
    }
}

/// Bundled audio+video+data media lane under a Handle (§3 "Stream").
pub struct Stream {
    pub audio: MediaLane,
    pub video: [Option<MediaLane>; 3],
    pub trickle: TrickleQueue,
    pub component: Arc<Mutex<Component>>,
}

impl Stream {
    pub fn new(now: Instant) -> Self {
        Self {
            audio: MediaLane::new(Some(48_000), rand::random(), 48_000),
            video: [None, None, None],
            trickle: TrickleQueue::new(),
            component: Arc::new(Mutex::new(Component::new(now))),
        }
    }

    /// Returns the audio lane, or the first video (simulcast base) lane,
    /// lazily creating it at 90kHz if this is the first video packet seen.
    pub fn lane_mut(&mut self, is_video: bool) -> &mut MediaLane {
        if is_video {
            self.video[0].get_or_insert_with(|| MediaLane::new(Some(90_000), rand::random(), 90_000))
        } else {
            &mut self.audio
        }
    }

    /// Finds the lane (and whether it's video) owning a given SSRC, for
    /// NACK/retransmit dispatch off an inbound RTCP packet's `media_ssrc`
    /// (§4.4).
    pub fn lane_for_ssrc(&mut self, ssrc: u32) -> Option<(&mut MediaLane, bool)> {
        if self.audio.ssrc == Some(ssrc) {
            return Some((&mut self.audio, false));
        }
        for lane in self.video.iter_mut().flatten() {
            if lane.ssrc == Some(ssrc) {
                return Some((lane, true));
            }
        }
        None
    }
}

/// One PeerConnection attempt (§3 "Handle"). Exactly one Stream per
/// handle. The send queue here is the only ordering guarantee across
/// media within a handle (§4.7).
pub struct Handle {
    pub id: u64,
    pub session_id: u64,
    pub plugin_name: Option<String>,
    pub plugin_cookie: Option<u64>,
    pub correlator: Option<String>,
    pub created_at: Instant,
    pub flags: Mutex<StateFlags>,
    pub local_sdp: Mutex<Option<String>>,
    pub remote_sdp: Mutex<Option<String>>,
    pub hangup_reason: Mutex<Option<String>>,
    pub stream: Mutex<Stream>,
    pub send_tx: Sender<Outbound>,
    pub stop: Arc<AtomicBool>,
}

impl Handle {
    /// Invariant (a): a Handle is attached to at most one plugin for its
    /// lifetime, enforced here rather than by a type-level guarantee so
    /// the same error taxonomy (`AlreadyAttached`) applies at the
    /// signaling boundary that calls this.
    pub fn attach(&mut self, plugin_name: String) -> Result<()> {
        if self.plugin_name.is_some() {
            return Err(Error::AlreadyAttached);
        }
        self.plugin_name = Some(plugin_name);
        Ok(())
    }

    pub fn set_ready(&self) -> Result<bool> {
        let mut flags = self.flags.lock()?;
        Ok(flags.set_ready())
    }

    pub fn is_cleaning(&self) -> Result<bool> {
        Ok(self.flags.lock()?.is_cleaning())
    }

    pub fn enqueue(&self, item: Outbound) -> Result<()> {
        self.send_tx
            .send(item)
            .map_err(|_| Error::FatalInternal("send worker channel closed".into()))
    }

    /// ICE restart (§4.6): flips the flag bitset, re-triggers gathering on
    /// the agent, and flags the trickle queue so previously-sent candidates
    /// are re-emitted. Rewrite/RTCP/retransmit state is left untouched so
    /// media continuity survives the restart.
    pub fn restart_ice(&self, config: &crate::ice::IceConfig, agent: &mut dyn crate::ice::IceAgent) -> Result<()> {
        self.flags.lock()?.begin_ice_restart();
        agent.restart(config);
        Ok(())
    }
}

/// Top-level container owned by the signaling layer (§3 "Session").
/// Created on client "create", destroyed on client "destroy" or idle
/// timeout.
pub struct Session {
    pub id: u64,
    pub handles: Mutex<HashMap<u64, Arc<Handle>>>,
    pub created_at: Instant,
}

impl Session {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            handles: Mutex::new(HashMap::new()),
            created_at: Instant::now(),
        }
    }

    pub fn insert_handle(&self, handle: Arc<Handle>) -> Result<()> {
        self.handles.lock()?.insert(handle.id, handle);
        Ok(())
    }

    pub fn remove_handle(&self, handle_id: u64) -> Result<Option<Arc<Handle>>> {
        Ok(self.handles.lock()?.remove(&handle_id))
    }

    pub fn get_handle(&self, handle_id: u64) -> Result<Option<Arc<Handle>>> {
        Ok(self.handles.lock()?.get(&handle_id).cloned())
    }
}

/// Registry of Sessions by 64-bit ID; the root object a signaling
/// transport holds.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<u64, Arc<Session>>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn create_session(&self) -> Result<Arc<Session>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Session::new(id));
        self.sessions.lock()?.insert(id, session.clone());
        Ok(session)
    }

    pub fn get(&self, id: u64) -> Result<Option<Arc<Session>>> {
        Ok(self.sessions.lock()?.get(&id).cloned())
    }

    pub fn destroy(&self, id: u64) -> Result<Option<Arc<Session>>> {
        Ok(self.sessions.lock()?.remove(&id))
    }

    /// Reaps sessions with no handles whose age exceeds `idle_timeout`,
    /// for the watchdog (§4.10, §5).
    pub fn reap_idle(&self, idle_timeout: std::time::Duration, now: Instant) -> Result<Vec<u64>> {
        let mut sessions = self.sessions.lock()?;
        let mut reaped = Vec::new();
        sessions.retain(|id, session| {
            let empty = session
                .handles
                .lock()
                .map(|h| h.is_empty())
                .unwrap_or(false);
            let idle = empty && now.duration_since(session.created_at) >= idle_timeout;
            if idle {
                reaped.push(*id);
            }
            !idle
        });
        Ok(reaped)
    }
}

pub fn new_handle_channel() -> (Sender<Outbound>, Receiver<Outbound>) {
    std::sync::mpsc::channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_handle(session_id: u64) -> (Arc<Handle>, Receiver<Outbound>) {
        let (tx, rx) = new_handle_channel();
        let handle = Arc::new(Handle {
            id: 1,
            session_id,
            plugin_name: None,
            plugin_cookie: None,
            correlator: None,
            created_at: Instant::now(),
            flags: Mutex::new(StateFlags::empty()),
            local_sdp: Mutex::new(None),
            remote_sdp: Mutex::new(None),
            hangup_reason: Mutex::new(None),
            stream: Mutex::new(Stream::new(Instant::now())),
            send_tx: tx,
            stop: Arc::new(AtomicBool::new(false)),
        });
        (handle, rx)
    }

    #[test]
    fn session_registry_creates_and_destroys() {
        let registry = SessionRegistry::new();
        let session = registry.create_session().unwrap();
        assert!(registry.get(session.id).unwrap().is_some());
        registry.destroy(session.id).unwrap();
        assert!(registry.get(session.id).unwrap().is_none());
    }

    fn rtp_packet(seq: u16) -> rtc_rtp::Packet {
        rtc_rtp::Packet {
            header: rtc_rtp::Header {
                sequence_number: seq,
                ..rtc_rtp::Header::default()
            },
            payload: bytes::Bytes::new(),
        }
    }

    #[test]
    fn handle_enqueue_delivers_in_order() {
        let (handle, rx) = make_handle(1);
        handle
            .enqueue(Outbound::Rtp {
                is_video: false,
                packet: rtp_packet(1),
            })
            .unwrap();
        handle
            .enqueue(Outbound::Rtp {
                is_video: true,
                packet: rtp_packet(2),
            })
            .unwrap();

        match rx.recv().unwrap() {
            Outbound::Rtp { packet, .. } => assert_eq!(packet.header.sequence_number, 1),
            _ => panic!("expected rtp"),
        }
        match rx.recv().unwrap() {
            Outbound::Rtp { packet, .. } => assert_eq!(packet.header.sequence_number, 2),
            _ => panic!("expected rtp"),
        }
    }

    #[test]
    fn session_registry_reaps_only_idle_and_empty_sessions() {
        let registry = SessionRegistry::new();
        let idle = registry.create_session().unwrap();
        let busy = registry.create_session().unwrap();
        let (handle, _rx) = make_handle(busy.id);
        busy.insert_handle(handle).unwrap();

        let now = Instant::now() + std::time::Duration::from_secs(120);
        let reaped = registry.reap_idle(std::time::Duration::from_secs(60), now);
        let reaped = reaped.unwrap();
        assert!(reaped.contains(&idle.id));
        assert!(!reaped.contains(&busy.id));
    }

    #[test]
    fn attach_is_one_shot() {
        let (handle, _rx) = make_handle(1);
        let mut handle = Arc::try_unwrap(handle).unwrap_or_else(|_| unreachable!());
        assert!(handle.attach("echotest".to_string()).is_ok());
        assert!(matches!(
            handle.attach("videoroom".to_string()),
            Err(Error::AlreadyAttached)
        ));
    }
}
