use std::{net::SocketAddr, time::Duration};

use async_trait::async_trait;
use futures_lite::{AsyncBufReadExt, AsyncWriteExt, io::BufReader};
use smol::net::TcpStream;
use tracing::{debug, info, instrument};

use crate::{BlockReply, BusError, Reg, Transport, wire, with_timeout};

/// Connection to the bus server running on the Microzed.
pub struct TcpTransport {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    line: String,
    /// Set while a transaction is in flight. Still set at the start of the
    /// next one means the previous future was dropped before its reply.
    busy: bool,
}

impl TcpTransport {
    #[instrument(skip(timeout))]
    pub async fn connect(peer: SocketAddr, timeout: Duration) -> Result<Self, BusError> {
        let stream = with_timeout(timeout, || format!("connect to {peer}"), async {
            Ok(TcpStream::connect(peer).await?)
        })
        .await?;
        stream.set_nodelay(true)?;
        info!(%peer, "connected to bus server");
        Ok(Self {
            reader: BufReader::new(stream.clone()),
            writer: stream,
            line: String::new(),
            busy: false,
        })
    }

    async fn transact(&mut self, command: &str) -> Result<&str, BusError> {
        if self.busy {
            return Err(BusError::Desynchronized);
        }
        self.busy = true;
        debug!(command);
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        self.line.clear();
        if self.reader.read_line(&mut self.line).await? == 0 {
            return Err(BusError::Closed);
        }
        self.busy = false;
        let reply = self.line.trim_end();
        debug!(reply);
        Ok(reply)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn read(&mut self, reg: Reg) -> Result<u16, BusError> {
        let command = wire::read_command(reg);
        let line = self.transact(&command).await?;
        wire::parse_read(&command, line)
    }

    async fn write(&mut self, reg: Reg, value: u16) -> Result<(), BusError> {
        let command = wire::write_command(reg, value);
        let line = self.transact(&command).await?;
        wire::parse_write(&command, line)
    }

    async fn read_block(&mut self, nwords: Reg, data: Reg) -> Result<BlockReply, BusError> {
        let command = wire::block_command(nwords, data);
        let line = self.transact(&command).await?;
        wire::parse_block(&command, line)
    }
}
