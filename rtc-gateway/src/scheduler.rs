use crate::model::{Handle, SessionRegistry};
use crate::plugin::CoreCallbacks;
use crate::srtp::SrtpContext;
use log::{debug, warn};
use rtc_shared::util::{match_dtls, match_srtcp, match_srtp};
use std::sync::atomic::Ordering;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// RFC 7983 classification of one inbound datagram, used to demultiplex
/// a single UDP socket shared by STUN, DTLS and SRTP/SRTCP (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxClass {
    Stun,
    Zrtp,
    Dtls,
    TurnChannel,
    Srtp,
    Srtcp,
    Unknown,
}

fn in_range(buf: &[u8], lower: u8, upper: u8) -> bool {
    matches!(buf.first(), Some(&b) if b >= lower && b <= upper)
}

pub fn classify(buf: &[u8]) -> DemuxClass {
    if in_range(buf, 0, 3) {
        DemuxClass::Stun
    } else if in_range(buf, 16, 19) {
        DemuxClass::Zrtp
    } else if match_dtls(buf) {
        DemuxClass::Dtls
    } else if in_range(buf, 64, 79) {
        DemuxClass::TurnChannel
    } else if match_srtcp(buf) {
        DemuxClass::Srtcp
    } else if match_srtp(buf) {
        DemuxClass::Srtp
    } else {
        DemuxClass::Unknown
    }
}

/// Small bound on retrying a transient write failure before dropping the
/// packet and counting it (§4.7 "On ENOBUFS or similar transient errors
/// the worker retries up to a small bound").
const MAX_WRITE_RETRIES: u32 = 3;

/// What actually performs the socket write of already-encrypted bytes;
/// kept as a trait so the worker loop is testable without a real
/// ICE/DTLS stack. Rewrite, RTX buffering and SRTP encryption all happen
/// upstream of this boundary, in [`crate::pipeline::encode_outbound`].
pub trait PacketSink: Send {
    /// Returns `Ok(())` on success, `Err(true)` for a transient error
    /// worth retrying, `Err(false)` for a fatal one (component torn down).
    fn write(&mut self, wire: &[u8]) -> Result<(), bool>;
}

/// Drains `handle`'s send queue on a dedicated thread: the only writer of
/// the socket for that handle (§4.7, §5, invariant (c)). Each item is run
/// through [`crate::pipeline::encode_outbound`] (rewrite, SendBuffer,
/// SRTP encrypt) before the capture sink and the wire write see it.
pub fn run_send_worker(
    handle: Arc<Handle>,
    rx: Receiver<crate::model::Outbound>,
    mut srtp: Box<dyn SrtpContext>,
    mut sink: Box<dyn PacketSink>,
    capture: Option<Box<dyn Fn(&[u8]) + Send>>,
) {
    loop {
        if handle.stop.load(Ordering::Acquire) {
            return;
        }
        let item = match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(item) => item,
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => return,
        };

        let wire = match crate::pipeline::encode_outbound(&handle, srtp.as_mut(), item) {
            Ok(wire) => wire,
            Err(err) => {
                warn!("dropping packet on handle {}: encode failed: {err}", handle.id);
                continue;
            }
        };

        if let Some(capture) = &capture {
            capture(&wire);
        }

        let mut attempts = 0;
        loop {
            match sink.write(&wire) {
                Ok(()) => break,
                Err(true) if attempts < MAX_WRITE_RETRIES => {
                    attempts += 1;
                    debug!("transient write error on handle {}, retry {attempts}", handle.id);
                }
                Err(true) => {
                    warn!("dropping packet on handle {} after {MAX_WRITE_RETRIES} retries", handle.id);
                    break;
                }
                Err(false) => {
                    warn!("dropping packet on handle {}: component torn down", handle.id);
                    break;
                }
            }
        }
    }
}

/// Two-phase hangup (§4.10). Phase one marks STOP+ALERT, asks the plugin
/// to tear down media and notifies signaling with `reason`; phase two
/// (release of SRTP/agent/stream/component) is left to the watchdog so
/// in-flight callbacks have drained.
pub fn begin_hangup(handle: &Handle, core: &dyn CoreCallbacks, reason: &str) -> rtc_shared::error::Result<()> {
    {
        let mut flags = handle.flags.lock()?;
        flags.insert(crate::state::StateFlags::STOP);
        flags.set_alert();
    }
    *handle.hangup_reason.lock()? = Some(reason.to_string());
    core.close_pc(handle.id);
    Ok(())
}

/// Phase two: marks the handle CLEANING so further media-path mutation
/// short-circuits, then releases the queue so the send worker exits.
pub fn finish_hangup(handle: &Handle) -> rtc_shared::error::Result<()> {
    handle.flags.lock()?.insert(crate::state::StateFlags::CLEANING);
    handle.stop.store(true, Ordering::Release);
    Ok(())
}

/// Periodic reaper: frees hung-up handles after a grace period and reaps
/// idle sessions (§4.10, §5 "Watchdog").
pub fn run_watchdog(
    registry: Arc<SessionRegistry>,
    idle_timeout: Duration,
    tick: Duration,
    stop: Arc<std::sync::atomic::AtomicBool>,
) {
    while !stop.load(Ordering::Acquire) {
        thread::sleep(tick);
        let _ = registry.reap_idle(idle_timeout, std::time::Instant::now());
    }
}
