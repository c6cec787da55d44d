//! ais-core: Pure decode + track reconstruction library for AIS.
//!
//! No async, no I/O beyond loading config and zone files: just algorithms.
//! `ais-server` owns storage, sessions and the websocket transport.

pub mod assembler;
pub mod config;
pub mod decode;
pub mod encoder;
pub mod geodesy;
pub mod mid;
pub mod network;
pub mod nmea;
pub mod pathways;
pub mod processor;
pub mod protocol;
pub mod sentence;
pub mod types;
pub mod wsa;
pub mod zones;

// Re-export commonly used types at crate root
pub use assembler::{assemble, AssemblerConfig, TrackAssembler, VesselTrack};
pub use decode::{decode, Decoder};
pub use encoder::{decode_response, encode, Outcome, ServerMessage, TrackVector};
pub use network::{transit_edges, TransitEdge};
pub use processor::{process, reprocess, ProcessingOptions, TrackPoint, TrackSegment};
pub use protocol::{parse_client_message, ClientMessage};
pub use types::*;
pub use zones::{ZonePolygon, ZoneSet};
