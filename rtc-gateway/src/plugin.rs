use serde_json::Value;

/// Outcome of a plugin's synchronous `handle_message` (§6). `OkWait` lets
/// the plugin ack immediately and deliver the real response later via
/// [`CoreCallbacks::push_event`].
#[derive(Debug, Clone)]
pub enum MessageOutcome {
    Ok(Value),
    OkWait(String),
    Error(String),
}

/// An inbound JSEP offer/answer/candidate carried alongside a signaling
/// message.
#[derive(Debug, Clone)]
pub struct Jsep {
    pub kind: JsepKind,
    pub sdp: String,
    pub restart: bool,
    pub update: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsepKind {
    Offer,
    Answer,
}

/// The plugin-facing capability set: what the core offers attached
/// plugins (§6). A concrete core implementation hands an `Arc<dyn
/// CoreCallbacks>` (or similar) to each plugin at `create_session`/attach
/// time.
pub trait CoreCallbacks: Send + Sync {
    /// Delivers a JSON event to the client. Returns 0 on success, mirroring
    /// the original integer-result convention so error codes can be
    /// round-tripped unchanged by callers still speaking that protocol.
    fn push_event(
        &self,
        handle_id: u64,
        transaction: &str,
        message: &Value,
        jsep: Option<&Jsep>,
    ) -> i32;

    fn relay_rtp(&self, handle_id: u64, is_video: bool, buf: &[u8]);
    fn relay_rtcp(&self, handle_id: u64, buf: &[u8]);
    fn relay_data(&self, handle_id: u64, buf: &[u8]);

    /// Requests a PeerConnection close; the core will invoke the plugin's
    /// `hangup_media` once phase one of hangup completes.
    fn close_pc(&self, handle_id: u64);
    /// Requests permanent destruction of the handle/session.
    fn end_session(&self, handle_id: u64);

    fn events_is_enabled(&self) -> bool {
        false
    }
    fn notify_event(&self, _plugin: &str, _handle_id: u64, _payload: &Value) {}

    fn is_signature_valid(&self, _token: &str) -> bool {
        true
    }
    fn signature_contains(&self, _token: &str, _plugin: &str) -> bool {
        true
    }
}

/// The core-facing capability set: what a plugin must (and may) provide
/// (§6). Optional methods default to no-ops per §9's design note so a
/// minimal plugin only implements the mandatory subset.
pub trait Plugin: Send + Sync {
    fn init(&mut self, config_dir: &str) -> Result<(), String>;
    fn destroy(&mut self);

    fn api_compat(&self) -> u32;
    fn version(&self) -> u32;
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn package(&self) -> &str;

    fn create_session(&self, handle_id: u64) -> Result<(), String>;
    fn handle_message(
        &self,
        handle_id: u64,
        transaction: &str,
        message: &Value,
        jsep: Option<&Jsep>,
    ) -> MessageOutcome;
    fn query_session(&self, handle_id: u64) -> Value;
    fn destroy_session(&self, handle_id: u64) -> Result<(), String>;

    fn setup_media(&self, _handle_id: u64) {}
    fn incoming_rtp(&self, _handle_id: u64, _is_video: bool, _buf: &[u8]) {}
    fn incoming_rtcp(&self, _handle_id: u64, _buf: &[u8]) {}
    fn incoming_data(&self, _handle_id: u64, _buf: &[u8]) {}
    fn slow_link(&self, _handle_id: u64, _uplink: bool, _is_video: bool) {}
    fn hangup_media(&self, _handle_id: u64) {}
}

/// The transport-facing capability set: mirrors [`Plugin`] but carries
/// signaling JSON rather than media (§6).
pub trait Transport: Send + Sync {
    fn send_message(
        &self,
        transport_cookie: u64,
        request_id: &str,
        admin: bool,
        message: &Value,
    );
    fn session_created(&self, transport_cookie: u64, session_id: u64);
    fn session_over(&self, transport_cookie: u64, session_id: u64, reason: &str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCore {
        pushed: AtomicUsize,
    }

    impl CoreCallbacks for CountingCore {
        fn push_event(
            &self,
            _handle_id: u64,
            _transaction: &str,
            _message: &Value,
            _jsep: Option<&Jsep>,
        ) -> i32 {
            self.pushed.fetch_add(1, Ordering::SeqCst);
            0
        }
        fn relay_rtp(&self, _handle_id: u64, _is_video: bool, _buf: &[u8]) {}
        fn relay_rtcp(&self, _handle_id: u64, _buf: &[u8]) {}
        fn relay_data(&self, _handle_id: u64, _buf: &[u8]) {}
        fn close_pc(&self, _handle_id: u64) {}
        fn end_session(&self, _handle_id: u64) {}
    }

    #[test]
    fn optional_core_methods_default_to_disabled() {
        let core = CountingCore {
            pushed: AtomicUsize::new(0),
        };
        assert!(!core.events_is_enabled());
        assert!(core.is_signature_valid("anything"));
        core.push_event(1, "txn", &Value::Null, None);
        assert_eq!(core.pushed.load(Ordering::SeqCst), 1);
    }
}
