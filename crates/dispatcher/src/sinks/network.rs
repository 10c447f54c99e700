//! NetworkSink - UDP streaming of processed frames
//!
//! Every frame becomes one or more [`FramePacket`] datagrams. Large frames
//! are split by trackable so each datagram stays under `max_packet_size`;
//! receivers reassemble by `(system, trackable_type, frame_id)` using the
//! `chunk` / `chunks` counters.

use contracts::{
    ContractError, DataSink, FrameEnvelope, FrameOrigin, SystemType, Trackable, TrackableType,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, instrument, trace, warn};

const DEFAULT_MAX_PACKET_SIZE: usize = 65000;

/// Datagram encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkFormat {
    #[default]
    Json,
    /// Compact binary, for receivers written in Rust
    Bincode,
}

impl std::str::FromStr for NetworkFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "json" => Ok(NetworkFormat::Json),
            "bincode" => Ok(NetworkFormat::Bincode),
            other => Err(format!("unknown format '{other}'")),
        }
    }
}

/// Parameters of a network sink, read from the sink's `params`
#[derive(Debug, Clone)]
pub struct NetworkSinkConfig {
    /// Receiver address, `addr` param (required)
    pub addr: SocketAddr,
    pub format: NetworkFormat,
    pub max_packet_size: usize,
}

impl NetworkSinkConfig {
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let addr_text = params
            .get("addr")
            .ok_or_else(|| "missing 'addr' parameter".to_string())?;
        let addr: SocketAddr = addr_text
            .parse()
            .map_err(|e| format!("invalid address '{addr_text}': {e}"))?;

        let format = match params.get("format") {
            Some(text) => text.parse()?,
            None => NetworkFormat::default(),
        };

        let max_packet_size = match params.get("max_packet_size") {
            Some(text) => text
                .parse()
                .map_err(|e| format!("invalid max_packet_size '{text}': {e}"))?,
            None => DEFAULT_MAX_PACKET_SIZE,
        };

        Ok(Self {
            addr,
            format,
            max_packet_size,
        })
    }
}

/// One datagram: a slice of a frame's trackables plus its routing header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePacket {
    pub system: SystemType,
    pub trackable_type: TrackableType,
    pub origin: FrameOrigin,
    pub frame_id: u64,
    pub timestamp_ms: u64,
    pub fps: f32,
    /// Zero based index of this packet within the frame
    pub chunk: u16,
    pub chunks: u16,
    pub trackables: Vec<Trackable>,
}

impl FramePacket {
    fn header(envelope: &FrameEnvelope) -> Self {
        Self {
            system: envelope.system,
            trackable_type: envelope.trackable_type,
            origin: envelope.origin,
            frame_id: envelope.frame.frame_id,
            timestamp_ms: envelope.frame.timestamp_ms,
            fps: envelope.fps,
            chunk: 0,
            chunks: 1,
            trackables: Vec::new(),
        }
    }

    pub fn encode(&self, format: NetworkFormat) -> Result<Vec<u8>, String> {
        match format {
            NetworkFormat::Json => serde_json::to_vec(self).map_err(|e| format!("json error: {e}")),
            NetworkFormat::Bincode => {
                bincode::serialize(self).map_err(|e| format!("bincode error: {e}"))
            }
        }
    }

    pub fn decode(format: NetworkFormat, data: &[u8]) -> Result<Self, String> {
        match format {
            NetworkFormat::Json => {
                serde_json::from_slice(data).map_err(|e| format!("json error: {e}"))
            }
            NetworkFormat::Bincode => {
                bincode::deserialize(data).map_err(|e| format!("bincode error: {e}"))
            }
        }
    }
}

/// Encode `envelope` into datagrams no larger than `max_size` bytes.
///
/// Trackables are split into contiguous runs; a run that does not fit is
/// halved until it does. Fails only when a single trackable plus header
/// exceeds `max_size`.
pub fn packetize(
    envelope: &FrameEnvelope,
    format: NetworkFormat,
    max_size: usize,
) -> Result<Vec<Vec<u8>>, String> {
    let header = FramePacket::header(envelope);
    let trackables = &envelope.frame.trackables;

    let mut runs: Vec<&[Trackable]> = Vec::new();
    let mut pending: Vec<&[Trackable]> = vec![trackables.as_slice()];
    while let Some(run) = pending.pop() {
        let candidate = FramePacket {
            trackables: run.to_vec(),
            ..header.clone()
        };
        if candidate.encode(format)?.len() <= max_size {
            runs.push(run);
            continue;
        }
        if run.len() <= 1 {
            return Err(format!(
                "frame {} has a trackable that does not fit in {max_size} bytes",
                header.frame_id
            ));
        }
        let (head, tail) = run.split_at(run.len() / 2);
        // popped in order: head first
        pending.push(tail);
        pending.push(head);
    }

    let chunks = u16::try_from(runs.len())
        .map_err(|_| format!("frame {} needs too many packets", header.frame_id))?;
    // chunk counts are only known now, so encode again with final headers
    runs.into_iter()
        .enumerate()
        .map(|(index, run)| {
            FramePacket {
                chunk: index as u16,
                chunks,
                trackables: run.to_vec(),
                ..header.clone()
            }
            .encode(format)
        })
        .collect()
}

/// Sink that streams frames to one UDP receiver
pub struct NetworkSink {
    name: String,
    config: NetworkSinkConfig,
    socket: Option<UdpSocket>,
    packets_sent: u64,
    split_frames: u64,
}

impl NetworkSink {
    #[instrument(name = "network_sink_new", skip(name, config), fields(addr = %config.addr))]
    pub async fn new(name: impl Into<String>, config: NetworkSinkConfig) -> std::io::Result<Self> {
        let name = name.into();
        let bind: SocketAddr = if config.addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(&config.addr).await?;

        debug!(
            sink = %name,
            target = %config.addr,
            format = ?config.format,
            max_packet_size = config.max_packet_size,
            "network sink connected"
        );

        Ok(Self {
            name,
            config,
            socket: Some(socket),
            packets_sent: 0,
            split_frames: 0,
        })
    }

    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = NetworkSinkConfig::from_params(params)
            .map_err(|e| ContractError::sink_write(&name, e))?;

        Self::new(name.clone(), config)
            .await
            .map_err(|e| ContractError::sink_connection(name, e.to_string()))
    }
}

impl DataSink for NetworkSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "network_sink_write",
        skip(self, envelope),
        fields(sink = %self.name, frame_id = envelope.frame.frame_id)
    )]
    async fn write(&mut self, envelope: &FrameEnvelope) -> Result<(), ContractError> {
        let packets = packetize(envelope, self.config.format, self.config.max_packet_size)
            .map_err(|e| ContractError::sink_write(&self.name, e))?;
        if packets.len() > 1 {
            self.split_frames += 1;
            trace!(sink = %self.name, packets = packets.len(), "frame split");
        }

        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| ContractError::sink_write(&self.name, "socket closed"))?;
        for packet in &packets {
            // UDP is best effort; a missing receiver must not stall the sink
            if let Err(e) = socket.send(packet).await {
                warn!(sink = %self.name, error = %e, "datagram not sent");
                return Ok(());
            }
            self.packets_sent += 1;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "network_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.socket = None;
        debug!(
            sink = %self.name,
            packets = self.packets_sent,
            split_frames = self.split_frames,
            "network sink closed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Frame, Position};

    fn envelope(count: usize) -> FrameEnvelope {
        let frame = Frame {
            frame_id: 1,
            ..Frame::new(
                (0..count)
                    .map(|i| {
                        Trackable::at(Position::new(i as f32, 1.5, 2.5)).with_cuid(format!("c{i}"))
                    })
                    .collect(),
            )
        };
        FrameEnvelope::new(SystemType::OpenVr, TrackableType::Sample, frame)
    }

    #[test]
    fn test_network_sink_config_parsing() {
        let mut params = HashMap::new();
        params.insert("addr".to_string(), "127.0.0.1:9999".to_string());
        params.insert("format".to_string(), "bincode".to_string());

        let config = NetworkSinkConfig::from_params(&params).unwrap();
        assert_eq!(config.addr.port(), 9999);
        assert_eq!(config.format, NetworkFormat::Bincode);
        assert_eq!(config.max_packet_size, DEFAULT_MAX_PACKET_SIZE);

        params.insert("format".to_string(), "osc".to_string());
        assert!(NetworkSinkConfig::from_params(&params).is_err());

        params.insert("format".to_string(), "json".to_string());
        params.insert("max_packet_size".to_string(), "lots".to_string());
        assert!(NetworkSinkConfig::from_params(&params).is_err());
    }

    #[test]
    fn test_small_frame_is_one_packet() {
        let packets = packetize(&envelope(3), NetworkFormat::Bincode, 65000).unwrap();
        assert_eq!(packets.len(), 1);
        let packet = FramePacket::decode(NetworkFormat::Bincode, &packets[0]).unwrap();
        assert_eq!((packet.chunk, packet.chunks), (0, 1));
        assert_eq!(packet.system, SystemType::OpenVr);
        assert_eq!(packet.trackables, envelope(3).frame.trackables);
    }

    #[test]
    fn test_large_frame_is_split_in_order() {
        let source = envelope(40);
        let packets = packetize(&source, NetworkFormat::Json, 600).unwrap();
        assert!(packets.len() > 1);
        assert!(packets.iter().all(|p| p.len() <= 600));

        let decoded: Vec<FramePacket> = packets
            .iter()
            .map(|p| FramePacket::decode(NetworkFormat::Json, p).unwrap())
            .collect();
        let chunks = decoded.len() as u16;
        for (index, packet) in decoded.iter().enumerate() {
            assert_eq!(packet.chunk, index as u16);
            assert_eq!(packet.chunks, chunks);
            assert_eq!(packet.frame_id, 1);
        }
        let reassembled: Vec<Trackable> = decoded
            .into_iter()
            .flat_map(|p| p.trackables)
            .collect();
        assert_eq!(reassembled, source.frame.trackables);
    }

    #[test]
    fn test_unsplittable_trackable_fails() {
        assert!(packetize(&envelope(1), NetworkFormat::Json, 16).is_err());
    }

    #[tokio::test]
    async fn test_network_sink_delivers_datagrams() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = NetworkSinkConfig {
            addr: receiver.local_addr().unwrap(),
            format: NetworkFormat::Json,
            max_packet_size: 65000,
        };

        let mut sink = NetworkSink::new("test_net", config).await.unwrap();
        sink.write(&envelope(2)).await.unwrap();

        let mut buf = vec![0u8; 65536];
        let n = receiver.recv(&mut buf).await.unwrap();
        let packet = FramePacket::decode(NetworkFormat::Json, &buf[..n]).unwrap();
        assert_eq!(packet.trackables[1].cuid, "c1");
        assert_eq!(sink.packets_sent, 1);
        sink.close().await.unwrap();
    }
}
