//! Parse raw AIVDM/AIVDO lines into sentence envelopes and reassemble
//! multi-part payloads.
//!
//! Responsibilities:
//! - Strip an optional NMEA 4.0 tag block (`\s:rx,c:1625097600*hh\`)
//! - Validate the sentence checksum
//! - Extract fragment count/number, sequence id, channel, payload, fill bits
//! - Pick up a receive timestamp from the tag block or a trailing `,<epoch>`
//! - Hold incomplete fragment groups in a bounded buffer

use std::collections::HashMap;

use crate::nmea;
use crate::types::DecodeError;

// ---------------------------------------------------------------------------
// Sentence envelope
// ---------------------------------------------------------------------------

/// One parsed `!xxVDM` / `!xxVDO` sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct Sentence {
    /// Talker + formatter, e.g. `AIVDM`.
    pub talker: String,
    pub fragment_count: u8,
    pub fragment_number: u8,
    pub sequence_id: Option<u8>,
    pub channel: Option<char>,
    pub payload: String,
    pub fill_bits: u8,
    /// Receive time from the tag block or trailing field.
    pub timestamp: Option<i64>,
}

impl Sentence {
    pub fn is_multipart(&self) -> bool {
        self.fragment_count > 1
    }

    /// Own-ship report (`VDO`) rather than a received one.
    pub fn is_own_ship(&self) -> bool {
        self.talker.ends_with("VDO")
    }
}

/// Split `\tag block\rest` into the tag timestamp and the rest of the line.
fn split_tag_block(line: &str) -> (Option<i64>, &str) {
    let Some(inner) = line.strip_prefix('\\') else {
        return (None, line);
    };
    let Some((tag, rest)) = inner.split_once('\\') else {
        return (None, line);
    };
    let fields = tag.split_once('*').map_or(tag, |(f, _)| f);
    let timestamp = fields
        .split(',')
        .find_map(|kv| kv.strip_prefix("c:"))
        .and_then(|v| v.parse::<i64>().ok())
        // Some receivers stamp in milliseconds.
        .map(|t| if t > 100_000_000_000 { t / 1000 } else { t });
    (timestamp, rest)
}

/// Parse a single line into a [`Sentence`].
pub fn parse_sentence(line: &str) -> Result<Sentence, DecodeError> {
    let line = line.trim();
    let (tag_ts, rest) = split_tag_block(line);

    let start = rest
        .find(['!', '$'])
        .ok_or_else(|| DecodeError::Malformed("no sentence start".into()))?;
    let rest = &rest[start..];

    // Anything after `*hh` is a receiver suffix; an epoch there counts as
    // the receive time.
    let star = rest
        .rfind('*')
        .ok_or_else(|| DecodeError::Malformed("missing checksum delimiter".into()))?;
    let sentence_end = (star + 3).min(rest.len());
    if !rest.is_char_boundary(sentence_end) {
        return Err(DecodeError::Malformed("non-ASCII checksum".into()));
    }
    let (sentence, suffix) = rest.split_at(sentence_end);
    let suffix_ts = suffix
        .split(',')
        .filter_map(|f| f.trim().parse::<i64>().ok())
        .next_back();

    let body = nmea::verify(sentence)?;
    let fields: Vec<&str> = body.split(',').collect();
    if fields.len() < 7 {
        return Err(DecodeError::Malformed(format!(
            "expected 7 fields, got {}",
            fields.len()
        )));
    }

    let talker = fields[0];
    if talker.len() != 5 || !(talker.ends_with("VDM") || talker.ends_with("VDO")) {
        return Err(DecodeError::Malformed(format!("unsupported talker {talker:?}")));
    }

    let parse_u8 = |s: &str, what: &str| {
        s.parse::<u8>()
            .map_err(|_| DecodeError::Malformed(format!("bad {what} {s:?}")))
    };
    let fragment_count = parse_u8(fields[1], "fragment count")?;
    let fragment_number = parse_u8(fields[2], "fragment number")?;
    if fragment_count == 0 || fragment_number == 0 || fragment_number > fragment_count {
        return Err(DecodeError::Malformed(format!(
            "fragment {fragment_number} of {fragment_count}"
        )));
    }
    let sequence_id = if fields[3].is_empty() {
        None
    } else {
        Some(parse_u8(fields[3], "sequence id")?)
    };
    let channel = fields[4].chars().next();
    let fill_bits = if fields[6].is_empty() {
        0
    } else {
        parse_u8(fields[6], "fill bits")?
    };
    if fill_bits > 5 {
        return Err(DecodeError::Malformed(format!("fill bits {fill_bits}")));
    }

    Ok(Sentence {
        talker: talker.to_string(),
        fragment_count,
        fragment_number,
        sequence_id,
        channel,
        payload: fields[5].to_string(),
        fill_bits,
        timestamp: tag_ts.or(suffix_ts),
    })
}

// ---------------------------------------------------------------------------
// Fragment buffer
// ---------------------------------------------------------------------------

/// A reassembled payload ready for bit-level decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub armored: String,
    pub fill_bits: u8,
    pub timestamp: Option<i64>,
}

impl From<Sentence> for Payload {
    fn from(s: Sentence) -> Self {
        Payload {
            armored: s.payload,
            fill_bits: s.fill_bits,
            timestamp: s.timestamp,
        }
    }
}

type GroupKey = (Option<u8>, Option<char>, u8);

struct PendingGroup {
    parts: Vec<String>,
    timestamp: Option<i64>,
    /// Line counter value when the group was opened.
    opened_at: u64,
}

/// Bounded reassembly buffer for multi-part sentences.
///
/// Groups are keyed by (sequence id, channel, fragment count). A group that
/// does not complete within `window` subsequent sentences is discarded, and
/// at most `capacity` groups are held at once (oldest evicted first).
pub struct FragmentBuffer {
    window: u64,
    capacity: usize,
    clock: u64,
    pending: HashMap<GroupKey, PendingGroup>,
    /// Groups dropped as expired, evicted, or out of order.
    pub discarded: u64,
}

impl FragmentBuffer {
    pub fn new(window: u64, capacity: usize) -> Self {
        FragmentBuffer {
            window: window.max(1),
            capacity: capacity.max(1),
            clock: 0,
            pending: HashMap::new(),
            discarded: 0,
        }
    }

    /// Feed one sentence. Returns the full payload once all parts arrived.
    pub fn push(&mut self, sentence: Sentence) -> Result<Option<Payload>, DecodeError> {
        self.clock += 1;
        self.expire();

        if !sentence.is_multipart() {
            return Ok(Some(sentence.into()));
        }

        let key = (
            sentence.sequence_id,
            sentence.channel,
            sentence.fragment_count,
        );

        if sentence.fragment_number == 1 {
            if self.pending.remove(&key).is_some() {
                self.discarded += 1;
            }
            self.make_room();
            self.pending.insert(
                key,
                PendingGroup {
                    parts: vec![sentence.payload],
                    timestamp: sentence.timestamp,
                    opened_at: self.clock,
                },
            );
            return Ok(None);
        }

        let Some(group) = self.pending.get_mut(&key) else {
            self.discarded += 1;
            return Err(DecodeError::FragmentOutOfOrder {
                number: sentence.fragment_number,
                count: sentence.fragment_count,
            });
        };
        if usize::from(sentence.fragment_number) != group.parts.len() + 1 {
            self.pending.remove(&key);
            self.discarded += 1;
            return Err(DecodeError::FragmentOutOfOrder {
                number: sentence.fragment_number,
                count: sentence.fragment_count,
            });
        }

        group.parts.push(sentence.payload);
        if group.timestamp.is_none() {
            group.timestamp = sentence.timestamp;
        }
        if sentence.fragment_number < sentence.fragment_count {
            return Ok(None);
        }

        let group = self.pending.remove(&key).ok_or_else(|| {
            DecodeError::Malformed("fragment group vanished during reassembly".into())
        })?;
        Ok(Some(Payload {
            armored: group.parts.concat(),
            fill_bits: sentence.fill_bits,
            timestamp: group.timestamp,
        }))
    }

    fn expire(&mut self) {
        let (clock, window) = (self.clock, self.window);
        let before = self.pending.len();
        self.pending
            .retain(|_, g| clock.saturating_sub(g.opened_at) <= window);
        self.discarded += (before - self.pending.len()) as u64;
    }

    fn make_room(&mut self) {
        while self.pending.len() >= self.capacity {
            let oldest = self
                .pending
                .iter()
                .min_by_key(|(_, g)| g.opened_at)
                .map(|(k, _)| *k);
            match oldest {
                Some(k) => {
                    self.pending.remove(&k);
                    self.discarded += 1;
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for FragmentBuffer {
    fn default() -> Self {
        FragmentBuffer::new(16, 64)
    }
}
