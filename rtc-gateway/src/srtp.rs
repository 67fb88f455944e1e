use crate::dtls::SrtpKeys;
use rtc_shared::error::Result;

/// The boundary the core drives into an external SRTP/SRTCP
/// implementation, keyed by the material [`SrtpKeys`] extracted from DTLS
/// (§4.6, §4.8). One context handles both RTP and RTCP in each direction,
/// mirroring how SRTP and SRTCP share a master key.
pub trait SrtpContext: Send {
    fn new_from_keys(keys: &SrtpKeys) -> Self
    where
        Self: Sized;

    /// Decrypts one inbound SRTP packet in place, returning the plaintext
    /// length. Replay failures are reported as an error so the caller can
    /// bump its error counter and log at most once per interval (§4.8).
    fn decrypt_rtp(&mut self, packet: &mut [u8]) -> Result<usize>;
    fn decrypt_rtcp(&mut self, packet: &mut [u8]) -> Result<usize>;

    /// Encrypts one outbound packet in place, returning the ciphertext
    /// length (SRTP/SRTCP append an authentication tag, so the buffer
    /// must have trailing capacity).
    fn encrypt_rtp(&mut self, packet: &mut Vec<u8>) -> Result<usize>;
    fn encrypt_rtcp(&mut self, packet: &mut Vec<u8>) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal in-memory stand-in used to exercise invariant I5 at the
    /// trait-boundary level: encrypt then decrypt with the same keys
    /// returns the original plaintext. A real implementation swaps in an
    /// actual SRTP cipher; this only proves the boundary shape round-trips.
    struct XorStub {
        key_byte: u8,
    }

    impl SrtpContext for XorStub {
        fn new_from_keys(keys: &SrtpKeys) -> Self {
            XorStub {
                key_byte: keys.local_key.first().copied().unwrap_or(0),
            }
        }

        fn decrypt_rtp(&mut self, packet: &mut [u8]) -> Result<usize> {
            for b in packet.iter_mut() {
                *b ^= self.key_byte;
            }
            Ok(packet.len())
        }

        fn decrypt_rtcp(&mut self, packet: &mut [u8]) -> Result<usize> {
            self.decrypt_rtp(packet)
        }

        fn encrypt_rtp(&mut self, packet: &mut Vec<u8>) -> Result<usize> {
            for b in packet.iter_mut() {
                *b ^= self.key_byte;
            }
            Ok(packet.len())
        }

        fn encrypt_rtcp(&mut self, packet: &mut Vec<u8>) -> Result<usize> {
            self.encrypt_rtp(packet)
        }
    }

    #[test]
    fn self_encrypted_roundtrips_to_original_plaintext() {
        let keys = SrtpKeys {
            local_key: vec![0x42],
            local_salt: vec![],
            remote_key: vec![0x42],
            remote_salt: vec![],
            profile: "SRTP_AES128_CM_SHA1_80",
        };
        let mut ctx = XorStub::new_from_keys(&keys);
        let plaintext = b"hello rtp".to_vec();
        let mut buf = plaintext.clone();
        ctx.encrypt_rtp(&mut buf).unwrap();
        assert_ne!(buf, plaintext);
        ctx.decrypt_rtp(&mut buf).unwrap();
        assert_eq!(buf, plaintext);
    }
}
