use config::{Config, File, FileFormat};
use rtc_shared::error::{Error, Result};
use serde::Deserialize;
use std::sync::{Arc, RwLock};

/// `general.*` INI section (§6).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub stun_server: Option<String>,
    pub stun_port: Option<u16>,
    pub turn_server: Option<String>,
    pub turn_port: Option<u16>,
    pub turn_type: TurnType,
    pub turn_user: Option<String>,
    pub turn_pwd: Option<String>,
    pub turn_rest_api: Option<String>,
    pub api_secret: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            stun_server: None,
            stun_port: None,
            turn_server: None,
            turn_port: None,
            turn_type: TurnType::Udp,
            turn_user: None,
            turn_pwd: None,
            turn_rest_api: None,
            api_secret: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnType {
    #[default]
    Udp,
    Tcp,
    Tls,
}

/// `media.*` INI section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub rtp_port_range: Option<String>,
    pub ipv6: bool,
    pub ice_lite: bool,
    pub ice_tcp: bool,
    pub full_trickle: bool,
    pub nack_queue: usize,
    pub no_media_timer: u64,
    pub rfc4588: bool,
    pub event_stats_period: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            rtp_port_range: None,
            ipv6: false,
            ice_lite: false,
            ice_tcp: false,
            full_trickle: false,
            nack_queue: 300,
            no_media_timer: 60,
            rfc4588: false,
            event_stats_period: 1,
        }
    }
}

/// `nat.*` INI section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NatConfig {
    pub enforce_interface: Option<String>,
    pub ignore_interface: Option<String>,
    pub nat_1_1_mapping: Option<String>,
}

/// `auth.*` INI section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token_auth: bool,
    pub token_secret: Option<String>,
}

/// `plugins.*` / `transports.*` INI sections.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    pub disable: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransportsConfig {
    pub disable: Option<String>,
}

/// The full configuration snapshot, read once from an INI file and then
/// replaced wholesale on reload (§5, §9: "Global mutable state ... becomes
/// a snapshot structure replaced wholesale under a write lock; readers
/// hold a shared reference for the duration of a call").
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub general: GeneralConfig,
    pub media: MediaConfig,
    pub nat: NatConfig,
    pub auth: AuthConfig,
    pub plugins: PluginsConfig,
    pub transports: TransportsConfig,
}

impl Snapshot {
    pub fn from_ini_str(contents: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Ini))
            .build()
            .map_err(|e| Error::FatalInternal(format!("config parse error: {e}")))?;
        config
            .try_deserialize()
            .map_err(|e| Error::FatalInternal(format!("config deserialize error: {e}")))
    }

    pub fn from_ini_file(path: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::new(path, FileFormat::Ini))
            .build()
            .map_err(|e| Error::FatalInternal(format!("config read error: {e}")))?;
        config
            .try_deserialize()
            .map_err(|e| Error::FatalInternal(format!("config deserialize error: {e}")))
    }

    /// Parses `media.rtp_port_range` ("min-max") into bounds.
    pub fn rtp_port_range(&self) -> Option<(u16, u16)> {
        let raw = self.media.rtp_port_range.as_ref()?;
        let (min, max) = raw.split_once('-')?;
        Some((min.trim().parse().ok()?, max.trim().parse().ok()?))
    }
}

/// Atomically-replaceable handle to the live configuration: readers clone
/// an `Arc<Snapshot>` under a brief read lock, writers swap in a whole new
/// snapshot under a write lock (§5, §9).
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<Snapshot>>>,
}

impl ConfigHandle {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    pub fn get(&self) -> Arc<Snapshot> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn replace(&self, snapshot: Snapshot) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_INI: &str = r#"
[general]
stun_server = stun.example.com
stun_port = 3478

[media]
nack_queue = 300
rfc4588 = true
rtp_port_range = 20000-40000

[auth]
token_auth = true
token_secret = s3cr3t
"#;

    #[test]
    fn parses_sections_and_defaults() {
        let snapshot = Snapshot::from_ini_str(SAMPLE_INI).unwrap();
        assert_eq!(snapshot.general.stun_server.as_deref(), Some("stun.example.com"));
        assert_eq!(snapshot.general.stun_port, Some(3478));
        assert_eq!(snapshot.media.nack_queue, 300);
        assert!(snapshot.media.rfc4588);
        assert_eq!(snapshot.rtp_port_range(), Some((20000, 40000)));
        assert!(snapshot.auth.token_auth);
        assert_eq!(snapshot.auth.token_secret.as_deref(), Some("s3cr3t"));
        // unspecified section falls back to defaults
        assert!(snapshot.nat.enforce_interface.is_none());
    }

    #[test]
    fn empty_config_uses_defaults() {
        let snapshot = Snapshot::from_ini_str("").unwrap();
        assert_eq!(snapshot.media.nack_queue, 300);
        assert_eq!(snapshot.media.no_media_timer, 60);
        assert!(!snapshot.media.rfc4588);
    }

    #[test]
    fn handle_replace_is_visible_to_existing_clones() {
        let handle = ConfigHandle::new(Snapshot::default());
        let reader = handle.clone();
        assert_eq!(reader.get().media.nack_queue, 300);

        let mut updated = Snapshot::default();
        updated.media.nack_queue = 500;
        handle.replace(updated);

        assert_eq!(reader.get().media.nack_queue, 500);
    }
}
