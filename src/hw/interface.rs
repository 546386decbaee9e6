use std::net::{IpAddr, Ipv4Addr};

use network_interface::{NetworkInterface, NetworkInterfaceConfig};
use thiserror::Error;
use tracing::debug;

/// Errors returned by local interface resolution.
#[derive(Debug, Error)]
pub enum InterfaceError {
    /// The host's interfaces could not be listed.
    #[error("failed to enumerate network interfaces")]
    Enumerate(#[from] network_interface::Error),
    /// No interface owns the configured local address.
    #[error("no network interface owns local address {address}")]
    NotFound { address: Ipv4Addr },
}

/// Local interface a fan connection binds to.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LocalInterface {
    name: Option<String>,
    address: Ipv4Addr,
}

impl LocalInterface {
    /// Interface that lets the OS pick the route.
    #[must_use]
    pub fn unspecified() -> Self {
        Self {
            name: None,
            address: Ipv4Addr::UNSPECIFIED,
        }
    }

    /// Interface name, when bound to a specific interface.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Address the socket binds to before connecting.
    #[must_use]
    pub fn address(&self) -> Ipv4Addr {
        self.address
    }
}

/// Resolves the interface owning `local_address`.
///
/// With no local address the OS chooses the interface.
///
/// # Errors
///
/// Returns an error when interfaces cannot be listed or none carries
/// `local_address`.
pub fn resolve_local_interface(
    local_address: Option<Ipv4Addr>,
) -> Result<LocalInterface, InterfaceError> {
    let Some(address) = local_address else {
        return Ok(LocalInterface::unspecified());
    };

    let interfaces = NetworkInterface::show()?;
    let name = interfaces
        .iter()
        .find(|itf| {
            itf.addr
                .iter()
                .any(|addr| addr.ip() == IpAddr::V4(address))
        })
        .map(|itf| itf.name.clone())
        .ok_or(InterfaceError::NotFound { address })?;

    debug!(interface = %name, %address, "Resolved local network interface");
    Ok(LocalInterface {
        name: Some(name),
        address,
    })
}
