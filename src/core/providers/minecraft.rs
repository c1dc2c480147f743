use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::core::error::{chain, KeeperError};
use crate::core::models::status::ServerPing;
use crate::core::providers::GameServerProbe;

/// Protocol version sent in the handshake; servers answer status for any value.
const PROTOCOL_VERSION: i32 = 47;
const NEXT_STATE_STATUS: i32 = 1;
/// Status responses are a few KiB at most, favicon included.
const MAX_PACKET_LEN: usize = 1 << 20;

pub fn encode_varint(value: i32, buf: &mut Vec<u8>) {
    let mut v = value as u32;
    loop {
        if v & !0x7f == 0 {
            buf.push(v as u8);
            return;
        }
        buf.push((v & 0x7f) as u8 | 0x80);
        v >>= 7;
    }
}

/// Decode a VarInt from the front of `buf`, returning the value and bytes used.
pub fn decode_varint(buf: &[u8]) -> Option<(i32, usize)> {
    let mut value: u32 = 0;
    for (i, byte) in buf.iter().take(5).enumerate() {
        value |= ((byte & 0x7f) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value as i32, i + 1));
        }
    }
    None
}

async fn read_varint<R: AsyncRead + Unpin>(reader: &mut R) -> Result<i32> {
    let mut value: u32 = 0;
    for i in 0..5 {
        let byte = reader.read_u8().await.context("Connection closed mid-VarInt")?;
        value |= ((byte & 0x7f) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    anyhow::bail!("VarInt longer than 5 bytes")
}

fn frame(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 5);
    encode_varint(body.len() as i32, &mut out);
    out.extend_from_slice(body);
    out
}

pub fn handshake_packet(host: &str, port: u16) -> Vec<u8> {
    let mut body = Vec::with_capacity(host.len() + 16);
    encode_varint(0x00, &mut body);
    encode_varint(PROTOCOL_VERSION, &mut body);
    encode_varint(host.len() as i32, &mut body);
    body.extend_from_slice(host.as_bytes());
    body.extend_from_slice(&port.to_be_bytes());
    encode_varint(NEXT_STATE_STATUS, &mut body);
    frame(&body)
}

pub fn status_request_packet() -> Vec<u8> {
    frame(&[0x00])
}

/// Pull the JSON string out of a status response packet body.
fn parse_response_body(body: &[u8]) -> Result<String> {
    let (packet_id, used) = decode_varint(body).context("Missing packet id")?;
    if packet_id != 0x00 {
        anyhow::bail!("Unexpected packet id 0x{:02x}", packet_id);
    }
    let rest = &body[used..];
    let (len, used) = decode_varint(rest).context("Missing JSON length")?;
    let len = usize::try_from(len).context("Negative JSON length")?;
    let json = rest
        .get(used..used + len)
        .context("Status JSON truncated")?;
    String::from_utf8(json.to_vec()).context("Status JSON is not UTF-8")
}

#[derive(Deserialize)]
struct StatusResponse {
    players: Option<StatusPlayers>,
}

#[derive(Deserialize)]
struct StatusPlayers {
    online: u32,
    max: u32,
}

fn parse_status(json: &str, latency_ms: u64) -> Result<ServerPing> {
    let status: StatusResponse =
        serde_json::from_str(json).context("Failed to parse status JSON")?;
    let players = status
        .players
        .context("Status response has no player information")?;
    Ok(ServerPing {
        players_online: players.online,
        players_max: players.max,
        latency_ms,
    })
}

/// Split `host[:port]`, falling back to `default_port`.
pub fn split_address(address: &str, default_port: u16) -> (String, u16) {
    match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (address.to_string(), default_port),
        },
        _ => (address.to_string(), default_port),
    }
}

async fn query_status(host: &str, port: u16) -> Result<ServerPing> {
    let started = Instant::now();
    let mut stream = TcpStream::connect((host, port))
        .await
        .with_context(|| format!("Failed to connect to {}:{}", host, port))?;

    let mut request = handshake_packet(host, port);
    request.extend(status_request_packet());
    stream.write_all(&request).await.context("Failed to send status request")?;
    stream.flush().await?;

    let len = read_varint(&mut stream).await?;
    let len = usize::try_from(len).context("Negative packet length")?;
    if len == 0 || len > MAX_PACKET_LEN {
        anyhow::bail!("Implausible status packet length {}", len);
    }
    let mut body = vec![0u8; len];
    stream
        .read_exact(&mut body)
        .await
        .context("Connection closed before status response completed")?;
    let latency_ms = started.elapsed().as_millis() as u64;

    parse_status(&parse_response_body(&body)?, latency_ms)
}

/// Minecraft "Server List Ping" status query.
///
/// Frames are `VarInt length | VarInt packet id | payload`: a handshake with
/// next-state 1, an empty status request, then one JSON response packet.
pub struct MinecraftProbe {
    default_port: u16,
    timeout: Duration,
}

impl MinecraftProbe {
    pub fn new(default_port: u16, timeout: Duration) -> Self {
        Self {
            default_port,
            timeout,
        }
    }
}

#[async_trait]
impl GameServerProbe for MinecraftProbe {
    async fn ping(&self, address: &str) -> Result<ServerPing, KeeperError> {
        let (host, port) = split_address(address, self.default_port);
        let result = tokio::time::timeout(self.timeout, query_status(&host, port))
            .await
            .with_context(|| format!("No answer from {}:{} within {}s", host, port, self.timeout.as_secs()))
            .and_then(|inner| inner);
        result.map_err(|e| KeeperError::Unreachable(chain(&e)))
    }
}
