use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use crate::{
    error::RelayError,
    types::{Landmark, TrackingMode},
    wire::WireFormat,
};

/// Destination for transformed landmark sets, one call per detected frame.
pub trait LandmarkSink {
    fn publish(&mut self, mode: TrackingMode, landmarks: &[Landmark]) -> Result<(), RelayError>;
}

/// Fire-and-forget UDP sender. The socket is bound once and kept for the
/// lifetime of the sender.
#[derive(Debug)]
pub struct UdpSender {
    socket: UdpSocket,
    destination: SocketAddr,
    format: WireFormat,
    next_seq: u64,
    datagrams_sent: u64,
    send_errors: u64,
}

impl UdpSender {
    pub fn new(destination: SocketAddr, format: WireFormat) -> Result<Self, RelayError> {
        let local: SocketAddr = match destination {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local)?;
        log::info!(
            "sending {:?} datagrams from {} to {destination}",
            format,
            socket.local_addr()?
        );
        Ok(Self {
            socket,
            destination,
            format,
            next_seq: 0,
            datagrams_sent: 0,
            send_errors: 0,
        })
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    pub fn datagrams_sent(&self) -> u64 {
        self.datagrams_sent
    }

    pub fn send_errors(&self) -> u64 {
        self.send_errors
    }
}

impl LandmarkSink for UdpSender {
    fn publish(&mut self, mode: TrackingMode, landmarks: &[Landmark]) -> Result<(), RelayError> {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        let payload = self.format.encode(mode, seq, landmarks)?;

        match self.socket.send_to(&payload, self.destination) {
            Ok(_) => {
                self.datagrams_sent += 1;
                if let Some(first) = landmarks.first() {
                    log::debug!(
                        "sent {} {mode} landmarks ({} bytes), first: {first:?}",
                        landmarks.len(),
                        payload.len()
                    );
                }
            }
            Err(err) => {
                // Nobody acknowledges these datagrams, so a failed send is only reported.
                self.send_errors += 1;
                log::warn!("failed to send datagram to {}: {err}", self.destination);
            }
        }
        Ok(())
    }
}
