use tracing::info;

use super::fake_fan::{FakeFan, FakeFanConfig};
use crate::config::FanConfig;
use crate::error::BackendError;

/// Runtime fan backend selection.
#[derive(Debug, Default)]
pub enum FanBackend {
    /// Connects to the configured fan.
    #[default]
    Real,
    /// Starts an in-process fake fan and connects to it instead.
    Fake(FakeFanConfig),
}

impl FanBackend {
    /// Resolves the endpoint a session for `config` should connect to.
    ///
    /// The fake backend starts an in-process fan and redirects `config` to it.
    pub(crate) async fn prepare(self, config: FanConfig) -> Result<PreparedFan, BackendError> {
        match self {
            Self::Real => Ok(PreparedFan { config, fake: None }),
            Self::Fake(fake_config) => {
                let fake = FakeFan::start(fake_config)
                    .await
                    .map_err(BackendError::FakeFan)?;
                info!(address = %fake.address(), "using fake fan backend");
                Ok(PreparedFan {
                    config: config.with_endpoint(fake.address()),
                    fake: Some(fake),
                })
            }
        }
    }
}

/// Fan endpoint ready for a session.
pub(crate) struct PreparedFan {
    config: FanConfig,
    fake: Option<FakeFan>,
}

impl PreparedFan {
    pub(crate) fn config(&self) -> &FanConfig {
        &self.config
    }

    /// Stops the fake fan, if one was started.
    pub(crate) async fn shutdown(self) {
        if let Some(fake) = self.fake {
            fake.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn config() -> FanConfig {
        FanConfig::builder()
            .mac("20:F8:5E:AA:BB:CC")
            .label("Fake Fan")
            .ip("192.168.1.40")
            .build()
    }

    #[tokio::test]
    async fn real_backend_keeps_configured_endpoint() {
        let prepared = FanBackend::Real
            .prepare(config())
            .await
            .expect("real backend never fails to prepare");

        let address = prepared.config().validate().expect("config is valid");
        assert_eq!("192.168.1.40:31415", address.socket_addr().to_string());
    }

    #[tokio::test]
    async fn fake_backend_redirects_to_loopback() {
        let prepared = FanBackend::Fake(FakeFanConfig::default())
            .prepare(config())
            .await
            .expect("fake fan should bind to loopback");

        let address = prepared.config().validate().expect("config is valid");
        assert!(address.ip().is_loopback());
        assert_eq!("20:F8:5E:AA:BB:CC", address.mac());
        prepared.shutdown().await;
    }
}
