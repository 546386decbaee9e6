use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use bon::Builder;
use thiserror::Error;

use crate::protocol::BAF_PORT;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1500);
const DEFAULT_LISTENER_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_HEALTH_CHECK_INITIAL_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(120);
const DEFAULT_RECONNECT_IDLE: Duration = Duration::from_millis(500);

/// Characters that would corrupt a frame if sent inside an address field.
const FRAME_CHARACTERS: [char; 5] = ['<', '>', '(', ')', ';'];

/// Errors returned by fan configuration validation.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ConfigError {
    /// A mandatory field was empty or whitespace.
    #[error("`{field}` must not be blank")]
    Blank { field: &'static str },
    /// A field contained non-ASCII text.
    #[error("`{field}` must be ASCII: `{value}`")]
    NonAscii { field: &'static str, value: String },
    /// A field contained a frame delimiter.
    #[error("`{field}` must not contain `{character}`: `{value}`")]
    FrameCharacter {
        field: &'static str,
        value: String,
        character: char,
    },
    /// An address field was not an IPv4 address.
    #[error("`{field}` is not a valid IPv4 address: `{value}`")]
    InvalidIpv4 {
        field: &'static str,
        value: String,
        source: std::net::AddrParseError,
    },
    /// The TCP port was zero.
    #[error("port must be non-zero")]
    ZeroPort,
}

/// Unvalidated fan configuration as supplied by the host.
#[derive(Debug, Clone, Eq, PartialEq, Builder)]
pub struct FanConfig {
    #[builder(into)]
    mac: String,
    #[builder(into)]
    label: String,
    #[builder(into)]
    ip: String,
    #[builder(default = BAF_PORT)]
    port: u16,
    #[builder(into)]
    local_address: Option<String>,
}

impl FanConfig {
    /// Validates the configuration into a device address.
    ///
    /// # Errors
    ///
    /// Returns an error when a field is blank, non-ASCII, contains a frame
    /// delimiter, or an address does not parse as IPv4.
    ///
    /// ```
    /// use baf::FanConfig;
    ///
    /// let address = FanConfig::builder()
    ///     .mac("20:F8:5E:AA:BB:CC")
    ///     .label("Living Room")
    ///     .ip("192.168.1.40")
    ///     .build()
    ///     .validate()?;
    /// assert_eq!(31415, address.port());
    /// assert!(address.is_me("living room"));
    /// # Ok::<(), baf::ConfigError>(())
    /// ```
    pub fn validate(&self) -> Result<DeviceAddress, ConfigError> {
        let mac = validate_token("mac", &self.mac)?;
        let label = validate_token("label", &self.label)?;
        let ip = parse_ipv4("ip", &self.ip)?;
        if self.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        let local_address = self
            .local_address
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .map(|value| parse_ipv4("local_address", value))
            .transpose()?;

        Ok(DeviceAddress {
            mac,
            label,
            ip,
            port: self.port,
            local_address,
        })
    }

    /// Returns the configured label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Points the configuration at another fan endpoint, keeping its identity.
    #[must_use]
    pub fn with_endpoint(self, endpoint: SocketAddrV4) -> Self {
        Self {
            ip: endpoint.ip().to_string(),
            port: endpoint.port(),
            ..self
        }
    }
}

fn validate_token(field: &'static str, value: &str) -> Result<String, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Blank { field });
    }
    if !value.is_ascii() {
        return Err(ConfigError::NonAscii {
            field,
            value: value.to_owned(),
        });
    }
    if let Some(character) = value.chars().find(|c| FRAME_CHARACTERS.contains(c)) {
        return Err(ConfigError::FrameCharacter {
            field,
            value: value.to_owned(),
            character,
        });
    }

    Ok(value.to_owned())
}

fn parse_ipv4(field: &'static str, value: &str) -> Result<Ipv4Addr, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Blank { field });
    }
    value
        .parse()
        .map_err(|source| ConfigError::InvalidIpv4 {
            field,
            value: value.to_owned(),
            source,
        })
}

/// Validated, immutable addressing information for one fan.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DeviceAddress {
    mac: String,
    label: String,
    ip: Ipv4Addr,
    port: u16,
    local_address: Option<Ipv4Addr>,
}

impl DeviceAddress {
    /// MAC address used to address outbound frames.
    #[must_use]
    pub fn mac(&self) -> &str {
        &self.mac
    }

    /// Fan name as configured on the device.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Fan IPv4 address.
    #[must_use]
    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    /// Fan TCP port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Fan socket address.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip, self.port)
    }

    /// Local IPv4 address the connection binds to, when configured.
    #[must_use]
    pub fn local_address(&self) -> Option<Ipv4Addr> {
        self.local_address
    }

    /// Returns whether `token` names this fan by MAC or label.
    ///
    /// Matching ignores ASCII case.
    #[must_use]
    pub fn is_me(&self, token: &str) -> bool {
        let token = token.trim();
        token.eq_ignore_ascii_case(&self.mac) || token.eq_ignore_ascii_case(&self.label)
    }
}

/// Scheduling parameters of a fan session.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Builder)]
pub struct SessionTimings {
    /// Upper bound for a single TCP connect attempt.
    #[builder(default = DEFAULT_CONNECT_TIMEOUT)]
    pub connect_timeout: Duration,
    /// Delay between session start and the first listener read.
    #[builder(default = DEFAULT_LISTENER_DELAY)]
    pub listener_delay: Duration,
    /// Delay before the first health check.
    #[builder(default = DEFAULT_HEALTH_CHECK_INITIAL_DELAY)]
    pub health_check_initial_delay: Duration,
    /// Delay between health checks.
    #[builder(default = DEFAULT_HEALTH_CHECK_INTERVAL)]
    pub health_check_interval: Duration,
    /// Listener back-off while the link is down.
    #[builder(default = DEFAULT_RECONNECT_IDLE)]
    pub reconnect_idle: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self::builder().build()
    }
}
