//! Configuration structures for the developer-portal client.

use crate::error::{PortalError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default developer services endpoint
pub const DEFAULT_BASE_URL: &str = "https://developerservices2.apple.com/services/v1";

/// Xcode version advertised in `X-Xcode-Version`
pub const DEFAULT_XCODE_VERSION: &str = "7.0 (7A120f)";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Client configuration, usually loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Total request timeout
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_xcode_version")]
    pub xcode_version: String,

    /// Team used when a command does not name one
    #[serde(default)]
    pub team_id: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            xcode_version: default_xcode_version(),
            team_id: None,
        }
    }
}

impl ClientConfig {
    /// Load and validate a TOML config file.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            PortalError::InvalidConfig(format!("{}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load the default config file, or defaults when it does not exist.
    pub async fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => {
                Self::load(&path).await
            }
            _ => Ok(Self::default()),
        }
    }

    /// `<config_dir>/devportal/config.toml`
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("devportal").join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(PortalError::InvalidConfig(format!(
                "base_url must be an http(s) URL: '{}'",
                self.base_url
            )));
        }
        if self.timeout_secs == 0 || self.connect_timeout_secs == 0 {
            return Err(PortalError::InvalidConfig(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Collection URL for certificate resources
    #[must_use]
    pub fn certificates_url(&self) -> String {
        format!("{}/certificates", self.base_url.trim_end_matches('/'))
    }
}

/// Certificate kinds accepted by the portal's `certificateType` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateType {
    IosDevelopment,
    IosDistribution,
    MacAppDevelopment,
    MacAppDistribution,
    MacInstallerDistribution,
    DeveloperIdApplication,
    DeveloperIdKext,
    Development,
    Distribution,
}

impl CertificateType {
    const ALL: [Self; 9] = [
        Self::IosDevelopment,
        Self::IosDistribution,
        Self::MacAppDevelopment,
        Self::MacAppDistribution,
        Self::MacInstallerDistribution,
        Self::DeveloperIdApplication,
        Self::DeveloperIdKext,
        Self::Development,
        Self::Distribution,
    ];

    /// Wire string for the `certificateType` attribute
    #[must_use]
    pub fn to_apple_api_string(&self) -> &'static str {
        match self {
            Self::IosDevelopment => "IOS_DEVELOPMENT",
            Self::IosDistribution => "IOS_DISTRIBUTION",
            Self::MacAppDevelopment => "MAC_APP_DEVELOPMENT",
            Self::MacAppDistribution => "MAC_APP_DISTRIBUTION",
            Self::MacInstallerDistribution => "MAC_INSTALLER_DISTRIBUTION",
            Self::DeveloperIdApplication => "DEVELOPER_ID_APPLICATION",
            Self::DeveloperIdKext => "DEVELOPER_ID_KEXT",
            Self::Development => "DEVELOPMENT",
            Self::Distribution => "DISTRIBUTION",
        }
    }

    /// Get human-readable certificate type name
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::IosDevelopment => "iOS Development",
            Self::IosDistribution => "iOS Distribution",
            Self::MacAppDevelopment => "Mac App Development",
            Self::MacAppDistribution => "Mac App Distribution",
            Self::MacInstallerDistribution => "Mac Installer Distribution",
            Self::DeveloperIdApplication => "Developer ID Application",
            Self::DeveloperIdKext => "Developer ID Kext",
            Self::Development => "Apple Development",
            Self::Distribution => "Apple Distribution",
        }
    }
}

impl FromStr for CertificateType {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|t| t.to_apple_api_string().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| PortalError::InvalidConfig(format!("Unknown certificate type: '{s}'")))
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_xcode_version() -> String {
    DEFAULT_XCODE_VERSION.to_string()
}
