//! Decode AIS transport records into typed reports.
//!
//! Handles these message types:
//! - 1/2/3: Class A position report
//! - 4:     Base station report
//! - 5:     Class A static and voyage data
//! - 18:    Class B position report
//! - 19:    Class B extended position report (position + static)
//! - 24:    Class B static data, parts A and B
//!
//! Also accepts pre-decoded JSON location records, one object per line, in
//! the field layout used by open AIS feeds (`mmsi`, `time`, `lon`, `lat`,
//! `sog`, `cog`, `navStat`, `rot`, `heading`).

use serde::Deserialize;
use tracing::debug;

use crate::nmea::{self, BitReader};
use crate::sentence::{parse_sentence, FragmentBuffer, Payload};
use crate::types::{AisMessage, DecodeError, Mmsi, RawReport, StaticReport, SUPPORTED_TYPES};

const LON_NA: i32 = 181 * 600_000;
const LAT_NA: i32 = 91 * 600_000;
const SOG_NA: u32 = 1023;
const COG_NA: u32 = 3600;
const ROT_NA: i32 = -128;
const NAV_STATUS_NA: u32 = 15;

// ---------------------------------------------------------------------------
// Field conversions
// ---------------------------------------------------------------------------

fn position(r: &BitReader, lon_at: usize, lat_at: usize) -> Result<(f64, f64), DecodeError> {
    let lon = r.int(lon_at, 28);
    let lat = r.int(lat_at, 27);
    if lon == LON_NA || lat == LAT_NA {
        return Err(DecodeError::PositionUnavailable);
    }
    let (lon, lat) = (f64::from(lon) / 600_000.0, f64::from(lat) / 600_000.0);
    if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
        return Err(DecodeError::Malformed(format!("position out of range: {lon}, {lat}")));
    }
    Ok((lon, lat))
}

fn sog(raw: u32) -> Option<f64> {
    (raw != SOG_NA).then(|| f64::from(raw) / 10.0)
}

fn cog(raw: u32) -> Option<f64> {
    (raw < COG_NA).then(|| f64::from(raw) / 10.0)
}

fn heading(raw: u32) -> Option<f64> {
    (raw < 360).then(|| f64::from(raw))
}

/// Rate of turn from the coded `ROT_AIS = 4.733 * sqrt(ROT_IND)` value.
fn rot(raw: i32) -> Option<f64> {
    if raw == ROT_NA {
        return None;
    }
    let v = (f64::from(raw) / 4.733).powi(2);
    Some(if raw < 0 { -v } else { v })
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

fn non_zero<T: PartialEq + Default>(v: T) -> Option<T> {
    (v != T::default()).then_some(v)
}

fn require_bits(r: &BitReader, msg_type: u8, min: usize) -> Result<(), DecodeError> {
    if r.len() < min {
        return Err(DecodeError::PayloadTooShort {
            msg_type,
            bits: r.len(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Per-type decoders
// ---------------------------------------------------------------------------

/// Types 1, 2, 3.
pub fn decode_class_a_position(r: &BitReader, timestamp: i64) -> Result<RawReport, DecodeError> {
    let msg_type = r.uint(0, 6) as u8;
    require_bits(r, msg_type, 168)?;
    let (lon, lat) = position(r, 61, 89)?;
    let nav = r.uint(38, 4);
    Ok(RawReport {
        mmsi: r.uint(8, 30),
        timestamp,
        lat,
        lon,
        sog: sog(r.uint(50, 10)),
        cog: cog(r.uint(116, 12)),
        heading: heading(r.uint(128, 9)),
        rot: rot(r.int(42, 8)),
        nav_status: (nav != NAV_STATUS_NA).then_some(nav as u8),
        msg_type,
    })
}

/// Type 4. The receive timestamp is kept; the station's own UTC fields are
/// not trusted for ordering.
pub fn decode_base_station(r: &BitReader, timestamp: i64) -> Result<RawReport, DecodeError> {
    require_bits(r, 4, 168)?;
    let (lon, lat) = position(r, 79, 107)?;
    Ok(RawReport {
        mmsi: r.uint(8, 30),
        timestamp,
        lat,
        lon,
        sog: None,
        cog: None,
        heading: None,
        rot: None,
        nav_status: None,
        msg_type: 4,
    })
}

/// Type 5.
pub fn decode_static_voyage(r: &BitReader, timestamp: i64) -> Result<StaticReport, DecodeError> {
    // Some transmitters drop the trailing spare bits.
    require_bits(r, 5, 420)?;
    Ok(StaticReport {
        mmsi: r.uint(8, 30),
        timestamp,
        msg_type: 5,
        imo: non_zero(r.uint(40, 30)),
        callsign: non_empty(r.text(70, 42)),
        name: non_empty(r.text(112, 120)),
        ship_type: non_zero(r.uint(232, 8) as u8),
        dim_bow: non_zero(r.uint(240, 9) as u16),
        dim_stern: non_zero(r.uint(249, 9) as u16),
        dim_port: non_zero(r.uint(258, 6) as u16),
        dim_star: non_zero(r.uint(264, 6) as u16),
        draught: non_zero(r.uint(294, 8)).map(|d| f64::from(d) / 10.0),
        destination: non_empty(r.text(302, 120)),
        part: None,
    })
}

/// Type 18.
pub fn decode_class_b_position(r: &BitReader, timestamp: i64) -> Result<RawReport, DecodeError> {
    require_bits(r, 18, 168)?;
    class_b_position(r, timestamp)
}

/// Type 19: class B position plus name, ship type and dimensions.
pub fn decode_class_b_extended(
    r: &BitReader,
    timestamp: i64,
) -> Result<(RawReport, StaticReport), DecodeError> {
    require_bits(r, 19, 301)?;
    let mut report = class_b_position(r, timestamp)?;
    report.msg_type = 19;
    let static_data = StaticReport {
        mmsi: report.mmsi,
        timestamp,
        msg_type: 19,
        name: non_empty(r.text(143, 120)),
        ship_type: non_zero(r.uint(263, 8) as u8),
        dim_bow: non_zero(r.uint(271, 9) as u16),
        dim_stern: non_zero(r.uint(280, 9) as u16),
        dim_port: non_zero(r.uint(289, 6) as u16),
        dim_star: non_zero(r.uint(295, 6) as u16),
        ..Default::default()
    };
    Ok((report, static_data))
}

fn class_b_position(r: &BitReader, timestamp: i64) -> Result<RawReport, DecodeError> {
    let (lon, lat) = position(r, 57, 85)?;
    Ok(RawReport {
        mmsi: r.uint(8, 30),
        timestamp,
        lat,
        lon,
        sog: sog(r.uint(46, 10)),
        cog: cog(r.uint(112, 12)),
        heading: heading(r.uint(124, 9)),
        rot: None,
        nav_status: None,
        msg_type: 18,
    })
}

/// Type 24. Part A carries the name; part B the type, callsign and size.
pub fn decode_class_b_static(r: &BitReader, timestamp: i64) -> Result<StaticReport, DecodeError> {
    require_bits(r, 24, 160)?;
    let part = r.uint(38, 2) as u8;
    let base = StaticReport {
        mmsi: r.uint(8, 30),
        timestamp,
        msg_type: 24,
        part: Some(part),
        ..Default::default()
    };
    match part {
        0 => Ok(StaticReport {
            name: non_empty(r.text(40, 120)),
            ..base
        }),
        1 => {
            require_bits(r, 24, 162)?;
            Ok(StaticReport {
                ship_type: non_zero(r.uint(40, 8) as u8),
                callsign: non_empty(r.text(90, 42)),
                dim_bow: non_zero(r.uint(132, 9) as u16),
                dim_stern: non_zero(r.uint(141, 9) as u16),
                dim_port: non_zero(r.uint(150, 6) as u16),
                dim_star: non_zero(r.uint(156, 6) as u16),
                ..base
            })
        }
        _ => Err(DecodeError::Malformed(format!("type 24 part number {part}"))),
    }
}

/// Decode a dearmored payload.
pub fn decode_bits(bits: &[bool], timestamp: i64) -> Result<AisMessage, DecodeError> {
    let r = BitReader::new(bits);
    if r.len() < 38 {
        return Err(DecodeError::PayloadTooShort {
            msg_type: r.uint(0, 6) as u8,
            bits: r.len(),
        });
    }
    match r.uint(0, 6) as u8 {
        1..=3 => decode_class_a_position(&r, timestamp).map(AisMessage::Position),
        4 => decode_base_station(&r, timestamp).map(AisMessage::Position),
        5 => decode_static_voyage(&r, timestamp).map(AisMessage::Static),
        18 => decode_class_b_position(&r, timestamp).map(AisMessage::Position),
        19 => decode_class_b_extended(&r, timestamp).map(|(p, s)| AisMessage::Extended(p, s)),
        24 => decode_class_b_static(&r, timestamp).map(AisMessage::Static),
        other => Err(DecodeError::UnsupportedMessageType(other)),
    }
}

// ---------------------------------------------------------------------------
// Pre-decoded records
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LocationRecord {
    mmsi: Mmsi,
    time: i64,
    lon: f64,
    lat: f64,
    sog: Option<f64>,
    cog: Option<f64>,
    heading: Option<f64>,
    #[serde(rename = "navStat")]
    nav_stat: Option<u8>,
    /// Coded rate of turn, as transmitted.
    rot: Option<i32>,
    #[serde(rename = "type", default = "default_record_type")]
    msg_type: u8,
}

fn default_record_type() -> u8 {
    1
}

/// Decode one pre-decoded JSON location record.
pub fn decode_record(line: &str) -> Result<AisMessage, DecodeError> {
    let rec: LocationRecord =
        serde_json::from_str(line).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    if !SUPPORTED_TYPES.contains(&rec.msg_type) {
        return Err(DecodeError::UnsupportedMessageType(rec.msg_type));
    }
    if rec.lon.abs() > 180.0 || rec.lat.abs() > 90.0 {
        return Err(DecodeError::PositionUnavailable);
    }
    Ok(AisMessage::Position(RawReport {
        mmsi: rec.mmsi,
        timestamp: rec.time,
        lat: rec.lat,
        lon: rec.lon,
        sog: rec.sog.filter(|&s| s < 102.3),
        cog: rec.cog.filter(|&c| c < 360.0),
        heading: rec.heading.filter(|&h| h < 360.0),
        rot: rec.rot.and_then(rot),
        nav_status: rec.nav_stat.filter(|&n| u32::from(n) != NAV_STATUS_NA),
        msg_type: rec.msg_type,
    }))
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Streaming decoder for one input source.
///
/// Owns the fragment buffer for that source; nothing is shared between
/// decoders. Counters are kept for ingest summaries.
pub struct Decoder {
    fragments: FragmentBuffer,
    default_timestamp: Option<i64>,

    // Counters
    pub total_records: u64,
    pub decoded: u64,
    pub dropped: u64,
}

impl Decoder {
    pub fn new(fragment_window: u64, fragment_capacity: usize) -> Self {
        Decoder {
            fragments: FragmentBuffer::new(fragment_window, fragment_capacity),
            default_timestamp: None,
            total_records: 0,
            decoded: 0,
            dropped: 0,
        }
    }

    /// Timestamp used for sentences that carry none.
    pub fn set_default_timestamp(&mut self, timestamp: Option<i64>) {
        self.default_timestamp = timestamp;
    }

    /// Fragment groups dropped without completing.
    pub fn fragments_discarded(&self) -> u64 {
        self.fragments.discarded
    }

    /// Decode one raw record (a line of AIVDM text or a JSON record).
    ///
    /// Returns `Ok(None)` while a multi-part sentence is incomplete.
    pub fn decode(&mut self, raw: &[u8]) -> Result<Option<AisMessage>, DecodeError> {
        self.total_records += 1;
        let result = self.decode_inner(raw);
        match &result {
            Ok(Some(_)) => self.decoded += 1,
            Ok(None) => {}
            Err(e) => {
                self.dropped += 1;
                debug!(error = %e, "dropped AIS record");
            }
        }
        result
    }

    fn decode_inner(&mut self, raw: &[u8]) -> Result<Option<AisMessage>, DecodeError> {
        let line = std::str::from_utf8(raw)
            .map_err(|_| DecodeError::Malformed("record is not UTF-8".into()))?
            .trim();
        if line.starts_with('{') {
            return decode_record(line).map(Some);
        }

        let sentence = parse_sentence(line)?;
        let Some(payload) = self.fragments.push(sentence)? else {
            return Ok(None);
        };
        self.decode_payload(&payload).map(Some)
    }

    fn decode_payload(&self, payload: &Payload) -> Result<AisMessage, DecodeError> {
        let timestamp = payload
            .timestamp
            .or(self.default_timestamp)
            .ok_or(DecodeError::MissingTimestamp)?;
        let bits = nmea::dearmor(&payload.armored, payload.fill_bits)?;
        decode_bits(&bits, timestamp)
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Decoder::new(16, 64)
    }
}

/// Decode a single self-contained record with no reassembly state.
pub fn decode(raw: &[u8], default_timestamp: Option<i64>) -> Result<Option<AisMessage>, DecodeError> {
    let mut decoder = Decoder::default();
    decoder.set_default_timestamp(default_timestamp);
    decoder.decode(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nmea::BitWriter;

    fn class_a_bits(mmsi: u32, lon: f64, lat: f64, sog: f64, cog: f64) -> BitWriter {
        let mut w = BitWriter::new();
        w.uint(1, 6)
            .uint(0, 2)
            .uint(mmsi, 30)
            .uint(0, 4)
            .int(-128, 8)
            .uint((sog * 10.0).round() as u32, 10)
            .uint(1, 1)
            .int((lon * 600_000.0).round() as i32, 28)
            .int((lat * 600_000.0).round() as i32, 27)
            .uint((cog * 10.0).round() as u32, 12)
            .uint(511, 9)
            .uint(30, 6)
            .uint(0, 5)
            .uint(0, 1)
            .uint(0, 19);
        w
    }

    fn tagged(sentence: &str, ts: i64) -> String {
        format!("\\c:{ts}\\{sentence}")
    }

    #[test]
    fn test_decode_known_type1() {
        // gpsd reference sentence
        let msg = decode(b"!AIVDM,1,1,,B,15M67FC000G?ufbE`FepT@3n00Sa,0*5C", Some(0))
            .unwrap()
            .unwrap();
        let p = msg.position().unwrap();
        assert_eq!(p.msg_type, 1);
        assert_eq!(p.mmsi, 366053209);
        assert_eq!(p.nav_status, Some(3));
        assert_eq!(p.sog, Some(0.0));
        assert!((p.lon - -122.341618).abs() < 1e-5);
        assert!((p.lat - 37.802118).abs() < 1e-5);
        assert_eq!(p.cog, Some(219.3));
        assert_eq!(p.heading, Some(1.0));
        assert_eq!(p.rot, Some(0.0));
    }

    #[test]
    fn test_decode_synthetic_class_a() {
        let w = class_a_bits(316001234, -63.5731, 44.6488, 12.3, 271.4);
        let sentence = w.to_sentences('A', 0, 82).remove(0);
        let msg = decode(tagged(&sentence, 1625140800).as_bytes(), None)
            .unwrap()
            .unwrap();
        let p = msg.position().unwrap();
        assert_eq!(p.mmsi, 316001234);
        assert_eq!(p.timestamp, 1625140800);
        assert!((p.lon - -63.5731).abs() < 1e-6);
        assert!((p.lat - 44.6488).abs() < 1e-6);
        assert_eq!(p.sog, Some(12.3));
        assert_eq!(p.cog, Some(271.4));
        assert_eq!(p.heading, None);
        assert_eq!(p.rot, None);
        assert_eq!(p.nav_status, Some(0));
    }

    #[test]
    fn test_missing_timestamp() {
        let w = class_a_bits(316001234, -63.0, 44.0, 1.0, 1.0);
        let sentence = w.to_sentences('A', 0, 82).remove(0);
        assert_eq!(
            decode(sentence.as_bytes(), None),
            Err(DecodeError::MissingTimestamp)
        );
    }

    #[test]
    fn test_position_unavailable() {
        let w = class_a_bits(316001234, 181.0, 91.0, 1.0, 1.0);
        let sentence = w.to_sentences('A', 0, 82).remove(0);
        assert_eq!(
            decode(sentence.as_bytes(), Some(1)),
            Err(DecodeError::PositionUnavailable)
        );
    }

    #[test]
    fn test_unsupported_type() {
        let mut w = BitWriter::new();
        w.uint(8, 6).uint(0, 2).uint(316001234, 30).uint(0, 60);
        let sentence = w.to_sentences('A', 0, 82).remove(0);
        assert_eq!(
            decode(sentence.as_bytes(), Some(1)),
            Err(DecodeError::UnsupportedMessageType(8))
        );
    }

    #[test]
    fn test_checksum_error_dropped() {
        let mut decoder = Decoder::default();
        let err = decoder
            .decode(b"!AIVDM,1,1,,B,15M67FC000G?ufbE`FepT@3n00Sa,0*5D")
            .unwrap_err();
        assert!(matches!(err, DecodeError::Checksum { .. }));
        assert_eq!(decoder.dropped, 1);
        assert_eq!(decoder.decoded, 0);
    }

    #[test]
    fn test_short_payload() {
        let mut w = BitWriter::new();
        w.uint(1, 6).uint(0, 2).uint(316001234, 30).uint(0, 20);
        let sentence = w.to_sentences('A', 0, 82).remove(0);
        assert!(matches!(
            decode(sentence.as_bytes(), Some(1)),
            Err(DecodeError::PayloadTooShort { msg_type: 1, .. })
        ));
    }

    fn type5_bits() -> BitWriter {
        let mut w = BitWriter::new();
        w.uint(5, 6)
            .uint(0, 2)
            .uint(316005678, 30)
            .uint(0, 2)
            .uint(9123456, 30)
            .text("CFK2", 7)
            .text("ATLANTIC SPIRIT", 20)
            .uint(70, 8)
            .uint(120, 9)
            .uint(30, 9)
            .uint(10, 6)
            .uint(12, 6)
            .uint(1, 4)
            .uint(7, 4)
            .uint(1, 5)
            .uint(12, 5)
            .uint(0, 6)
            .uint(85, 8)
            .text("HALIFAX", 20)
            .uint(0, 1)
            .uint(0, 1);
        w
    }

    #[test]
    fn test_decode_type5_multipart() {
        let w = type5_bits();
        assert_eq!(w.len(), 424);
        let sentences = w.to_sentences('B', 4, 60);
        assert_eq!(sentences.len(), 2);

        let mut decoder = Decoder::default();
        decoder.set_default_timestamp(Some(1625097600));
        assert_eq!(decoder.decode(sentences[0].as_bytes()), Ok(None));
        let msg = decoder.decode(sentences[1].as_bytes()).unwrap().unwrap();
        let s = msg.static_data().unwrap();
        assert_eq!(s.mmsi, 316005678);
        assert_eq!(s.imo, Some(9123456));
        assert_eq!(s.callsign.as_deref(), Some("CFK2"));
        assert_eq!(s.name.as_deref(), Some("ATLANTIC SPIRIT"));
        assert_eq!(s.ship_type, Some(70));
        assert_eq!(s.dim_bow, Some(120));
        assert_eq!(s.dim_stern, Some(30));
        assert_eq!(s.draught, Some(8.5));
        assert_eq!(s.destination.as_deref(), Some("HALIFAX"));
        assert_eq!(decoder.decoded, 1);
        assert_eq!(decoder.total_records, 2);
    }

    #[test]
    fn test_decode_type18() {
        let mut w = BitWriter::new();
        w.uint(18, 6)
            .uint(0, 2)
            .uint(316009999, 30)
            .uint(0, 8)
            .uint(55, 10)
            .uint(0, 1)
            .int((-63.25 * 600_000.0) as i32, 28)
            .int((44.5 * 600_000.0) as i32, 27)
            .uint(900, 12)
            .uint(90, 9)
            .uint(0, 6)
            .uint(0, 35);
        let sentence = w.to_sentences('A', 0, 82).remove(0);
        let msg = decode(sentence.as_bytes(), Some(5)).unwrap().unwrap();
        let p = msg.position().unwrap();
        assert_eq!(p.msg_type, 18);
        assert_eq!(p.sog, Some(5.5));
        assert_eq!(p.cog, Some(90.0));
        assert_eq!(p.heading, Some(90.0));
        assert_eq!(p.lon, -63.25);
        assert_eq!(p.lat, 44.5);
    }

    #[test]
    fn test_decode_type19_extended() {
        let mut w = BitWriter::new();
        w.uint(19, 6)
            .uint(0, 2)
            .uint(316001111, 30)
            .uint(0, 8)
            .uint(100, 10)
            .uint(0, 1)
            .int((-64.0 * 600_000.0) as i32, 28)
            .int((45.0 * 600_000.0) as i32, 27)
            .uint(1800, 12)
            .uint(180, 9)
            .uint(0, 6)
            .uint(0, 4)
            .text("SEA BREEZE", 20)
            .uint(37, 8)
            .uint(10, 9)
            .uint(2, 9)
            .uint(2, 6)
            .uint(2, 6)
            .uint(0, 11);
        let sentence = w.to_sentences('A', 0, 82);
        let mut decoder = Decoder::default();
        decoder.set_default_timestamp(Some(9));
        let mut out = None;
        for s in &sentence {
            out = decoder.decode(s.as_bytes()).unwrap();
        }
        let msg = out.unwrap();
        let (p, s) = match msg {
            AisMessage::Extended(p, s) => (p, s),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(p.msg_type, 19);
        assert_eq!(p.sog, Some(10.0));
        assert_eq!(s.name.as_deref(), Some("SEA BREEZE"));
        assert_eq!(s.ship_type, Some(37));
        assert_eq!(s.dim_bow, Some(10));
    }

    #[test]
    fn test_decode_type24_parts() {
        let mut a = BitWriter::new();
        a.uint(24, 6).uint(0, 2).uint(316002222, 30).uint(0, 2).text("LITTLE TERN", 20);
        let msg = decode(a.to_sentences('A', 0, 82)[0].as_bytes(), Some(1))
            .unwrap()
            .unwrap();
        let s = msg.static_data().unwrap();
        assert_eq!(s.part, Some(0));
        assert_eq!(s.name.as_deref(), Some("LITTLE TERN"));

        let mut b = BitWriter::new();
        b.uint(24, 6)
            .uint(0, 2)
            .uint(316002222, 30)
            .uint(1, 2)
            .uint(36, 8)
            .text("ABC", 7)
            .text("VC1234", 7)
            .uint(5, 9)
            .uint(4, 9)
            .uint(1, 6)
            .uint(1, 6)
            .uint(0, 6);
        let msg = decode(b.to_sentences('A', 0, 82)[0].as_bytes(), Some(1))
            .unwrap()
            .unwrap();
        let s = msg.static_data().unwrap();
        assert_eq!(s.part, Some(1));
        assert_eq!(s.ship_type, Some(36));
        assert_eq!(s.callsign.as_deref(), Some("VC1234"));
        assert_eq!(s.dim_bow, Some(5));
        assert_eq!(s.name, None);
    }

    #[test]
    fn test_decode_base_station() {
        let mut w = BitWriter::new();
        w.uint(4, 6)
            .uint(0, 2)
            .uint(3160001, 30)
            .uint(2021, 14)
            .uint(7, 4)
            .uint(1, 5)
            .uint(0, 5)
            .uint(0, 6)
            .uint(0, 6)
            .uint(1, 1)
            .int((-63.5 * 600_000.0) as i32, 28)
            .int((44.5 * 600_000.0) as i32, 27)
            .uint(0, 34);
        let msg = decode(w.to_sentences('A', 0, 82)[0].as_bytes(), Some(7))
            .unwrap()
            .unwrap();
        let p = msg.position().unwrap();
        assert_eq!(p.msg_type, 4);
        assert_eq!(p.mmsi, 3160001);
        assert_eq!(p.timestamp, 7);
        assert_eq!(p.lon, -63.5);
    }

    #[test]
    fn test_decode_json_record() {
        let line = br#"{"mmsi":230145250,"time":1625097600,"sog":102.3,"cog":360,"navStat":15,"rot":-128,"posAcc":true,"raim":false,"heading":511,"lon":24.9,"lat":60.1}"#;
        let msg = decode(line, None).unwrap().unwrap();
        let p = msg.position().unwrap();
        assert_eq!(p.mmsi, 230145250);
        assert_eq!(p.timestamp, 1625097600);
        assert_eq!(p.sog, None);
        assert_eq!(p.cog, None);
        assert_eq!(p.heading, None);
        assert_eq!(p.rot, None);
        assert_eq!(p.nav_status, None);
        assert_eq!(p.msg_type, 1);
    }

    #[test]
    fn test_decode_json_record_malformed() {
        assert!(matches!(
            decode(br#"{"mmsi":"x"}"#, None),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_rot_conversion() {
        assert_eq!(rot(-128), None);
        assert_eq!(rot(0), Some(0.0));
        let r = rot(127).unwrap();
        assert!((r - 720.0).abs() < 5.0);
        assert!(rot(-10).unwrap() < 0.0);
    }
}
