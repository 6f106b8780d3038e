//! Scripted ghost agent for driving a broker over a real TCP socket.
//!
//! Speaks the newline-terminated JSON control protocol: registration,
//! pings, raw stream bytes, and replies to broker-initiated requests.

use ov_protocol::{
    FRAME_TERMINATOR, LogFormat, Mode, RegisterParams, RpcFrame, RpcRequest, RpcResponse,
};
use serde_json::Value;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

pub struct MockGhost {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl MockGhost {
    pub async fn connect(addr: SocketAddr) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(MockGhost {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    /// Send a request frame; returns the generated correlation id.
    pub async fn send_request(
        &mut self,
        name: &str,
        params: Value,
    ) -> Result<String, Box<dyn std::error::Error>> {
        let req = RpcRequest::new(name, params);
        self.send_frame(&serde_json::to_vec(&req)?).await?;
        Ok(req.rid)
    }

    /// Send pre-encoded bytes exactly as given: frames, partial frames, or
    /// raw stream data.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
        self.writer.write_all(bytes).await?;
        Ok(())
    }

    /// Register and wait for the broker's reply.
    pub async fn register(
        &mut self,
        sid: &str,
        mid: &str,
        mode: Mode,
        format: LogFormat,
    ) -> Result<RpcResponse, Box<dyn std::error::Error>> {
        let params = RegisterParams {
            sid: sid.to_owned(),
            mid: mid.to_owned(),
            mode,
            format,
            properties: serde_json::Map::new(),
        };
        self.send_request(ov_protocol::request_names::REGISTER, serde_json::to_value(params)?)
            .await?;
        self.recv_response().await
    }

    /// Ping and wait for the pong.
    pub async fn ping(&mut self) -> Result<RpcResponse, Box<dyn std::error::Error>> {
        self.send_request(ov_protocol::request_names::PING, Value::Null)
            .await?;
        self.recv_response().await
    }

    /// Next frame of either kind.
    pub async fn recv_frame(&mut self) -> Result<RpcFrame, Box<dyn std::error::Error>> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Err("connection closed by broker".into());
        }
        Ok(serde_json::from_str(line.trim_end())?)
    }

    /// Next response frame; broker-initiated requests seen on the way are
    /// discarded.
    pub async fn recv_response(&mut self) -> Result<RpcResponse, Box<dyn std::error::Error>> {
        loop {
            match self.recv_frame().await? {
                RpcFrame::Response(res) => return Ok(res),
                RpcFrame::Request(_) => continue,
            }
        }
    }

    /// Next broker-initiated request; responses seen on the way are
    /// discarded.
    pub async fn expect_request(&mut self) -> Result<RpcRequest, Box<dyn std::error::Error>> {
        loop {
            match self.recv_frame().await? {
                RpcFrame::Request(req) => return Ok(req),
                RpcFrame::Response(_) => continue,
            }
        }
    }

    /// Answer a broker-initiated request.
    pub async fn respond(
        &mut self,
        rid: &str,
        status: &str,
        params: Value,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let res = RpcResponse {
            rid: rid.to_owned(),
            response: status.to_owned(),
            params,
        };
        self.send_frame(&serde_json::to_vec(&res)?).await
    }

    /// Read exactly `n` raw bytes, for the streaming modes where the
    /// socket no longer carries frames.
    pub async fn recv_exact(&mut self, n: usize) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut buf = vec![0u8; n];
        self.reader.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Half-close the write side, as a ghost does at end of a file stream.
    pub async fn shutdown_write(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.writer.shutdown().await?;
        Ok(())
    }

    async fn send_frame(&mut self, json: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
        self.writer.write_all(json).await?;
        self.writer.write_all(&[FRAME_TERMINATOR]).await?;
        Ok(())
    }
}
