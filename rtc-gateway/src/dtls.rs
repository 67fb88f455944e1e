use rtc_shared::crypto::KeyingMaterialExporter;
use rtc_shared::error::Result;

/// DTLS role negotiated from the remote SDP's `a=setup` attribute
/// (§4.6): `active` in the offer means we answer `passive`, `passive`
/// means we answer `active`, and `actpass` lets us pick (we pick active).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtlsRole {
    Client,
    Server,
}

impl DtlsRole {
    /// Derives our role from the peer's `a=setup` value.
    pub fn from_remote_setup(remote_setup: &str) -> Self {
        match remote_setup {
            "active" => DtlsRole::Server,
            "passive" => DtlsRole::Client,
            // actpass, or anything unrecognized: we pick active.
            _ => DtlsRole::Client,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DtlsState {
    #[default]
    New,
    Connecting,
    Connected,
    Failed,
    Closed,
}

/// SRTP keys extracted once the DTLS handshake completes, one pair per
/// direction (§4.6 "the core extracts SRTP keying material").
#[derive(Clone)]
pub struct SrtpKeys {
    pub local_key: Vec<u8>,
    pub local_salt: Vec<u8>,
    pub remote_key: Vec<u8>,
    pub remote_salt: Vec<u8>,
    pub profile: &'static str,
}

/// The boundary the core drives into an external DTLS implementation.
/// `role` is fixed at construction per [`DtlsRole::from_remote_setup`];
/// the driver runs atop the ICE agent's selected pair once one exists.
pub trait DtlsDriver: Send {
    fn role(&self) -> DtlsRole;
    fn state(&self) -> DtlsState;
    /// Feeds one inbound DTLS datagram (bytes in the RFC 7983 20..63
    /// range) into the handshake or key-update state machine.
    fn handle_datagram(&mut self, datagram: &[u8]) -> Result<()>;
    /// Non-`None` once the handshake has produced keying material.
    fn exported_keys(&self, exporter: &dyn KeyingMaterialExporter) -> Option<SrtpKeys>;
    fn remote_fingerprint_matches(&self, algorithm: &str, fingerprint: &str) -> bool;
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_picks_active_for_actpass_and_passive_remote() {
        assert_eq!(DtlsRole::from_remote_setup("actpass"), DtlsRole::Client);
        assert_eq!(DtlsRole::from_remote_setup("passive"), DtlsRole::Client);
    }

    #[test]
    fn role_is_server_when_remote_is_active() {
        assert_eq!(DtlsRole::from_remote_setup("active"), DtlsRole::Server);
    }
}
