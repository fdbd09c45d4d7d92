use mh_protocol::{udp_control, Notification};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

const RECV_DEADLINE: Duration = Duration::from_secs(5);

/// Datagram client for the notification bus.
pub struct MockUdpClient {
    socket: UdpSocket,
    server: SocketAddr,
}

impl MockUdpClient {
    pub async fn bind(server: SocketAddr) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        Ok(Self { socket, server })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(self.socket.local_addr()?)
    }

    pub async fn send_word(&self, word: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.socket.send_to(word.as_bytes(), self.server).await?;
        Ok(())
    }

    /// `REGISTER` → expect `REGISTERED`.
    pub async fn register(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.send_word(udp_control::REGISTER).await?;
        let reply = self.recv_datagram().await?;
        if reply == udp_control::REGISTERED.as_bytes() {
            Ok(())
        } else {
            Err(format!("expected REGISTERED, got {:?}", String::from_utf8_lossy(&reply)).into())
        }
    }

    pub async fn unregister(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.send_word(udp_control::UNREGISTER).await
    }

    pub async fn pong(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.send_word(udp_control::PONG).await
    }

    /// Next raw datagram, within the receive deadline.
    pub async fn recv_datagram(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut buf = vec![0u8; 64 * 1024];
        match tokio::time::timeout(RECV_DEADLINE, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => {
                buf.truncate(len);
                Ok(buf)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err("timed out waiting for a datagram".into()),
        }
    }

    /// Next JSON notification, answering heartbeat `PING`s along the way.
    pub async fn recv_notification(&self) -> Result<Notification, Box<dyn std::error::Error>> {
        loop {
            let datagram = self.recv_datagram().await?;
            if datagram == udp_control::PING.as_bytes() {
                self.pong().await?;
                continue;
            }
            if datagram == udp_control::REGISTERED.as_bytes() {
                continue;
            }
            return Ok(serde_json::from_slice(&datagram)?);
        }
    }
}
