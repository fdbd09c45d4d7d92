use mh_protocol::{tcp_control, ProgressUpdate};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

const RECV_DEADLINE: Duration = Duration::from_secs(5);

/// Line-framed TCP client for the progress bus.
pub struct MockTcpClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl MockTcpClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, writer) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        })
    }

    pub async fn send_line(&mut self, line: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        Ok(())
    }

    pub async fn send_update(
        &mut self,
        update: &ProgressUpdate,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string(update)?;
        self.send_line(&json).await
    }

    /// Next line from the server, within the receive deadline.
    pub async fn recv_line(&mut self) -> Result<String, Box<dyn std::error::Error>> {
        match tokio::time::timeout(RECV_DEADLINE, self.lines.next_line()).await {
            Ok(Ok(Some(line))) => Ok(line),
            Ok(Ok(None)) => Err("connection closed by server".into()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err("timed out waiting for a line".into()),
        }
    }

    /// Next broadcast update, skipping `PONG` control lines.
    pub async fn recv_update(&mut self) -> Result<ProgressUpdate, Box<dyn std::error::Error>> {
        loop {
            let line = self.recv_line().await?;
            if line.trim() == tcp_control::PONG {
                continue;
            }
            return Ok(serde_json::from_str(&line)?);
        }
    }

    /// `PING` → expect exactly `PONG`.
    pub async fn ping(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.send_line(tcp_control::PING).await?;
        let line = self.recv_line().await?;
        if line.trim() == tcp_control::PONG {
            Ok(())
        } else {
            Err(format!("expected PONG, got '{line}'").into())
        }
    }
}
