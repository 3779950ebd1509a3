//! Client-side retry loop over the datagram transport.
//!
//! Each logical operation mints one fresh request id and keeps resending
//! the same encoded bytes until a reply arrives or the retry budget runs
//! out. Reusing the id across retries is what lets the server's duplicate
//! suppression recognise the retransmissions.

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::net::{ToSocketAddrs, UdpSocket};
use tracing::{debug, info};

use crate::server::RECV_BUF_LEN;
use crate::wire::{self, Reply, Request, WireError};

/// Retry budget per logical operation.
pub const MAX_ATTEMPTS: usize = 4;

#[derive(Debug)]
pub enum ClientError {
    /// No reply after the whole retry budget.
    Timeout { attempts: usize },
    Wire(WireError),
    Io(io::Error),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Timeout { attempts } => {
                write!(f, "no reply after {attempts} attempts")
            }
            ClientError::Wire(e) => write!(f, "wire error: {e}"),
            ClientError::Io(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<WireError> for ClientError {
    fn from(e: WireError) -> Self {
        ClientError::Wire(e)
    }
}

impl From<io::Error> for ClientError {
    fn from(e: io::Error) -> Self {
        ClientError::Io(e)
    }
}

pub struct RetryClient {
    socket: UdpSocket,
    timeout: Duration,
    packet_demo: bool,
    next_request_id: u64,
}

impl RetryClient {
    /// Dial the server. The socket is connected, so sends omit the address
    /// and receives only accept the server's datagrams.
    pub async fn connect(
        server_addr: impl ToSocketAddrs,
        timeout: Duration,
        packet_demo: bool,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(server_addr).await?;
        Ok(Self {
            socket,
            timeout,
            packet_demo,
            // Random starting point so a restarted client on a reused port
            // does not replay ids into the server's duplicate cache.
            next_request_id: rand::random(),
        })
    }

    fn next_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }

    /// One logical operation: encode once, then send/await up to
    /// [`MAX_ATTEMPTS`] times with the same bytes and request id.
    pub async fn call(&mut self, request: &Request) -> Result<Reply, ClientError> {
        let request_id = self.next_request_id();
        let bytes = wire::encode_request(request_id, request)?;
        let mut buf = [0u8; RECV_BUF_LEN];

        for attempt in 1..=MAX_ATTEMPTS {
            self.socket.send(&bytes).await?;

            match tokio::time::timeout(self.timeout, self.socket.recv(&mut buf)).await {
                Ok(Ok(n)) => {
                    if self.packet_demo && rand::random::<f32>() < 0.5 {
                        info!("simulating lost reply on attempt {attempt} (packet demo)");
                        continue;
                    }
                    return Ok(wire::decode_reply(&buf[..n])?);
                }
                Ok(Err(e)) => return Err(ClientError::Io(e)),
                Err(_) => {
                    debug!("timeout on attempt {attempt}, retrying");
                    continue;
                }
            }
        }

        Err(ClientError::Timeout {
            attempts: MAX_ATTEMPTS,
        })
    }

    /// One polling read in monitor mode. `Ok(None)` when the deadline
    /// passes without a frame; callers keep looping until the user stops.
    pub async fn recv_frame(&self, deadline: Duration) -> Result<Option<Reply>, ClientError> {
        let mut buf = [0u8; RECV_BUF_LEN];
        match tokio::time::timeout(deadline, self.socket.recv(&mut buf)).await {
            Ok(Ok(n)) => Ok(Some(wire::decode_reply(&buf[..n])?)),
            Ok(Err(e)) => Err(ClientError::Io(e)),
            Err(_) => Ok(None),
        }
    }
}
