//! Bridge configuration
//!
//! Every tunable of the pipeline lives here with its default. The standalone
//! binaries load it from TOML; a plugin host builds it in code.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, NetworkError, Result};

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Tap audio into the analyzer (pass-through is unaffected)
    pub enabled: bool,

    /// Analysis settings
    pub analysis: AnalysisConfig,

    /// Publisher settings
    pub network: NetworkConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            analysis: AnalysisConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

/// Spectrum and level analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// FFT length in samples; must be a power of two
    pub transform_size: usize,

    /// Number of logarithmic bands; fixes the wire frame size
    pub band_count: usize,

    /// Lower edge of the first band
    pub min_frequency_hz: f32,

    /// Upper edge of the last band
    pub max_frequency_hz: f32,

    /// Analyzer wake-ups per second
    pub update_rate_hz: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            transform_size: DEFAULT_TRANSFORM_SIZE,
            band_count: DEFAULT_BAND_COUNT,
            min_frequency_hz: DEFAULT_MIN_FREQUENCY_HZ,
            max_frequency_hz: DEFAULT_MAX_FREQUENCY_HZ,
            update_rate_hz: DEFAULT_UPDATE_RATE_HZ,
        }
    }
}

impl AnalysisConfig {
    /// Time between analyzer wake-ups
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.update_rate_hz as f64)
    }
}

/// Network publisher settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Consumer IP address (names are not resolved)
    pub host: String,

    /// Consumer port
    pub port: u16,

    /// Fixed delay between connection attempts
    pub retry_delay_ms: u64,

    /// Bound on the TCP connect and, separately, on the WebSocket handshake
    pub connect_timeout_ms: u64,

    /// Bound on a single send
    pub write_timeout_ms: u64,

    /// Ping interval while no frames are being sent
    pub heartbeat_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
        }
    }
}

impl NetworkConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Consumer address for `port` (which may differ from `self.port` after
    /// a runtime override)
    pub fn endpoint(&self, port: u16) -> std::result::Result<SocketAddr, NetworkError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| NetworkError::InvalidAddress(self.host.clone()))?;
        Ok(SocketAddr::new(ip, port))
    }
}

impl BridgeConfig {
    /// Default config file location (`<config dir>/spectrum-bridge/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("studio", "hardwave", "spectrum-bridge")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or the default location, falling back to defaults
    /// when no file exists
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => return Ok(Self::default()),
        };

        if path.exists() {
            tracing::info!("Loading config from {}", path.display());
            Self::load(&path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Write the config as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let a = &self.analysis;
        if !a.transform_size.is_power_of_two() || !(256..=65536).contains(&a.transform_size) {
            return Err(Error::Config(format!(
                "transform_size must be a power of two in 256..=65536, got {}",
                a.transform_size
            )));
        }
        if a.band_count == 0 || a.band_count > u16::MAX as usize {
            return Err(Error::Config(format!("band_count out of range: {}", a.band_count)));
        }
        if !(a.min_frequency_hz > 0.0 && a.min_frequency_hz < a.max_frequency_hz) {
            return Err(Error::Config(format!(
                "frequency range must satisfy 0 < min < max, got {}..{}",
                a.min_frequency_hz, a.max_frequency_hz
            )));
        }
        if !(a.update_rate_hz > 0.0 && a.update_rate_hz <= 1000.0) {
            return Err(Error::Config(format!(
                "update_rate_hz must be in (0, 1000], got {}",
                a.update_rate_hz
            )));
        }

        let n = &self.network;
        if n.host.parse::<IpAddr>().is_err() {
            return Err(Error::Config(format!("host must be an IP address, got {:?}", n.host)));
        }
        if n.port == 0 {
            return Err(Error::Config("port must not be 0".into()));
        }
        if n.retry_delay_ms == 0 || n.connect_timeout_ms == 0 || n.write_timeout_ms == 0 {
            return Err(Error::Config("network delays and timeouts must be non-zero".into()));
        }
        if n.heartbeat_interval_ms == 0 {
            return Err(Error::Config("heartbeat_interval_ms must be non-zero".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.analysis.transform_size, 4096);
        assert_eq!(config.analysis.band_count, 64);
        assert_eq!(config.network.port, 9847);
        assert_eq!(config.analysis.update_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: BridgeConfig = toml::from_str(
            r#"
            [network]
            port = 9000

            [analysis]
            band_count = 32
            "#,
        )
        .unwrap();

        assert_eq!(config.network.port, 9000);
        assert_eq!(config.network.host, "127.0.0.1");
        assert_eq!(config.analysis.band_count, 32);
        assert_eq!(config.analysis.transform_size, 4096);
        assert!(config.enabled);
    }

    #[test]
    fn test_validation() {
        let mut config = BridgeConfig::default();
        config.analysis.transform_size = 3000;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = BridgeConfig::default();
        config.analysis.min_frequency_hz = 30_000.0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.network.port = 0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.analysis.update_rate_hz = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("spectrum-bridge-test-{}", std::process::id()))
            .join("config.toml");

        let mut config = BridgeConfig::default();
        config.network.retry_delay_ms = 1500;
        config.save(&path).unwrap();

        let loaded = BridgeConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_endpoint() {
        let config = NetworkConfig::default();
        let addr = config.endpoint(9999).unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 9999);

        let v6 = NetworkConfig {
            host: "::1".into(),
            ..NetworkConfig::default()
        };
        assert_eq!(v6.endpoint(9847).unwrap().to_string(), "[::1]:9847");
    }

    #[test]
    fn test_host_names_rejected() {
        let mut config = BridgeConfig::default();
        config.network.host = "localhost".into();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        assert!(matches!(
            config.network.endpoint(9847),
            Err(NetworkError::InvalidAddress(_))
        ));

        config.network.host = String::new();
        assert!(config.validate().is_err());
    }
}
