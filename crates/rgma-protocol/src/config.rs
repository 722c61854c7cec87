// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client configuration: service location, timeouts and TLS credentials.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::RgmaError;

/// Default trust-anchor directory for grid installations.
pub const DEFAULT_CA_DIR: &str = "/etc/grid-security/certificates";

/// Default connect and socket read/write timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default URL prefix under which the servlets are deployed.
pub const DEFAULT_PREFIX: &str = "R-GMA";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required setting is missing.
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    /// A setting has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),

    /// A configuration or credential file could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Neither `RGMA_SERVICE_URL` nor a usable `rgma.conf` was found.
    #[error("Can't get service URL from rgma.conf file")]
    NoServiceUrl,

    /// An HTTPS channel was requested without any client credentials.
    #[error("Neither TRUSTFILE nor X509_USER_PROXY environment variable set")]
    NoCredentials,

    /// Credential material could not be used.
    #[error("invalid credentials in {}: {reason}", .path.display())]
    Credentials { path: PathBuf, reason: String },
}

impl From<ConfigError> for RgmaError {
    fn from(err: ConfigError) -> Self {
        RgmaError::permanent(err.to_string())
    }
}

/// A `key=value` (or `key:value`) properties file.
///
/// Whitespace is removed everywhere on a line, `#` and `!` start a comment
/// and the first separator splits key from value. Lines without a separator
/// are ignored; when a key repeats the first occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: Vec<(String, String)>,
}

impl Properties {
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .filter_map(|line| {
                let line = line.split(['#', '!']).next().unwrap_or_default();
                let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
                let (key, value) = compact.split_once([':', '='])?;
                Some((key.to_string(), value.to_string()))
            })
            .collect();
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Client certificate material presented on HTTPS channels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Credentials {
    /// No client certificate.
    #[default]
    None,
    /// A grid proxy file holding the certificate chain and its private key.
    ProxyFile(PathBuf),
    /// Separate PEM certificate and unencrypted private key files.
    CertificateAndKey { cert: PathBuf, key: PathBuf },
}

/// TLS settings shared by every HTTPS channel of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    pub credentials: Credentials,
    /// Directory of PEM trust anchors
    pub ca_dir: PathBuf,
    /// Skip server certificate verification (for development only!)
    pub dangerous_skip_cert_verification: bool,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            credentials: Credentials::None,
            ca_dir: PathBuf::from(DEFAULT_CA_DIR),
            dangerous_skip_cert_verification: false,
        }
    }
}

impl TlsSettings {
    /// Load credentials from the environment.
    ///
    /// - `X509_USER_PROXY` - grid proxy file; `X509_CERT_DIR` overrides the CA directory
    /// - `TRUSTFILE` - properties file with `sslCAFiles`, `sslCertFile`, `sslKey`
    ///   or `gridProxyFile`
    /// - `RGMA_SKIP_CERT_VERIFICATION` - skip server verification (default: false)
    ///
    /// With neither `X509_USER_PROXY` nor `TRUSTFILE` set the credentials stay
    /// [`Credentials::None`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = if let Ok(proxy) = env::var("X509_USER_PROXY") {
            Self {
                credentials: Credentials::ProxyFile(PathBuf::from(proxy)),
                ca_dir: env::var("X509_CERT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_CA_DIR)),
                ..Default::default()
            }
        } else if let Ok(trustfile) = env::var("TRUSTFILE") {
            Self::from_trustfile(&Properties::load(Path::new(&trustfile))?)?
        } else {
            Self::default()
        };

        settings.dangerous_skip_cert_verification = env::var("RGMA_SKIP_CERT_VERIFICATION")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        Ok(settings)
    }

    /// Build settings from the properties of a trustfile.
    pub fn from_trustfile(props: &Properties) -> Result<Self, ConfigError> {
        // Some trustfiles carry a wildcard such as `/certs/*.0`; only the directory matters.
        let ca_dir = props
            .get("sslCAFiles")
            .map(|dir| dir.split("*.").next().unwrap_or(dir))
            .map_or_else(|| PathBuf::from(DEFAULT_CA_DIR), PathBuf::from);

        let credentials = match (props.get("sslCertFile"), props.get("sslKey")) {
            (Some(cert), Some(key)) => {
                if props.get("sslKeyPassword").is_some() || props.get("sslKeyPasswd").is_some() {
                    return Err(ConfigError::Credentials {
                        path: PathBuf::from(key),
                        reason: "encrypted private keys are not supported".to_string(),
                    });
                }
                Credentials::CertificateAndKey {
                    cert: PathBuf::from(cert),
                    key: PathBuf::from(key),
                }
            }
            _ => match props.get("gridProxyFile") {
                Some(proxy) => Credentials::ProxyFile(PathBuf::from(proxy)),
                None => return Err(ConfigError::Missing("sslCertFile and sslKey, or gridProxyFile")),
            },
        };

        Ok(Self {
            credentials,
            ca_dir,
            dangerous_skip_cert_verification: false,
        })
    }
}

/// Configuration for an R-GMA client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL the servlet names are appended to, e.g. `https://host:8443/R-GMA/`
    pub base_url: String,
    /// Connection establishment timeout (default: 300s)
    pub connect_timeout: Duration,
    /// Socket read/write timeout (default: 300s)
    pub socket_timeout: Duration,
    pub tls: TlsSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(format!("https://localhost:8443/{DEFAULT_PREFIX}/"))
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: DEFAULT_TIMEOUT,
            socket_timeout: DEFAULT_TIMEOUT,
            tls: TlsSettings::default(),
        }
    }

    /// Plain-HTTP configuration for a server on the loopback interface.
    pub fn localhost(port: u16) -> Self {
        Self::new(format!("http://127.0.0.1:{port}/{DEFAULT_PREFIX}/"))
    }

    /// Load configuration from the environment.
    ///
    /// # Service location
    /// - `RGMA_SERVICE_URL` - base URL, takes precedence when set
    /// - `RGMA_HOME` - installation root; `etc/rgma/rgma.conf` below it supplies
    ///   `hostname`, `port` and `prefix` (default: `R-GMA`)
    ///
    /// # Optional Environment Variables
    /// - `RGMA_CONNECT_TIMEOUT_MS` - Connection timeout (default: 300000)
    /// - `RGMA_SOCKET_TIMEOUT_MS` - Socket read/write timeout (default: 300000)
    /// - TLS variables, see [`TlsSettings::from_env`]
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = match env::var("RGMA_SERVICE_URL") {
            Ok(url) => url,
            Err(_) => {
                let home = env::var("RGMA_HOME").map_err(|_| ConfigError::NoServiceUrl)?;
                Self::base_url_from_home(Path::new(&home))?
            }
        };

        let connect_timeout = duration_ms_from_env("RGMA_CONNECT_TIMEOUT_MS")?;
        let socket_timeout = duration_ms_from_env("RGMA_SOCKET_TIMEOUT_MS")?;

        Ok(Self {
            base_url,
            connect_timeout,
            socket_timeout,
            tls: TlsSettings::from_env()?,
        })
    }

    /// Resolve the base URL from `<home>/etc/rgma/rgma.conf`.
    pub fn base_url_from_home(home: &Path) -> Result<String, ConfigError> {
        let props = Properties::load(&home.join("etc/rgma/rgma.conf"))
            .map_err(|_| ConfigError::NoServiceUrl)?;
        let hostname = props.get("hostname").ok_or(ConfigError::NoServiceUrl)?;
        let port = props.get("port").ok_or(ConfigError::NoServiceUrl)?;
        let prefix = props.get("prefix").unwrap_or(DEFAULT_PREFIX);
        Ok(format!("https://{hostname}:{port}/{prefix}/"))
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the socket read/write timeout.
    pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    /// Set the TLS settings.
    pub fn with_tls(mut self, tls: TlsSettings) -> Self {
        self.tls = tls;
        self
    }

    /// Full URL of a servlet.
    pub fn service_url(&self, servlet: &str) -> String {
        if self.base_url.ends_with('/') {
            format!("{}{}", self.base_url, servlet)
        } else {
            format!("{}/{}", self.base_url, servlet)
        }
    }
}

fn duration_ms_from_env(var: &'static str) -> Result<Duration, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .parse()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::Invalid(var, "must be a number of milliseconds")),
        Err(_) => Ok(DEFAULT_TIMEOUT),
    }
}
