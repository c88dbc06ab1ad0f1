use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

pub const INSTANCE_PORT: u16 = 52878;

/// Process-wide exclusivity, held for as long as the socket is bound.
#[derive(Debug)]
pub struct InstanceGuard {
    _socket: UdpSocket,
}

impl InstanceGuard {
    /// `None` means another instance already owns the port.
    pub fn acquire() -> Option<Self> {
        Self::acquire_on(INSTANCE_PORT)
    }

    pub fn acquire_on(port: u16) -> Option<Self> {
        UdpSocket::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
            .ok()
            .map(|socket| Self { _socket: socket })
    }
}
