//! NMEA 0183 checksum and AIS six-bit payload armoring.
//!
//! The checksum is the XOR of every byte between the leading `!`/`$` and the
//! `*`. Payload characters carry six bits each: subtract 48, and subtract a
//! further 8 when the result exceeds 40.

use crate::types::DecodeError;

/// Six-bit ASCII used by AIS text fields (names, callsigns, destinations).
const SIXBIT_ASCII: &[u8; 64] =
    b"@ABCDEFGHIJKLMNOPQRSTUVWXYZ[\\]^_ !\"#$%&'()*+,-./0123456789:;<=>?";

// ---------------------------------------------------------------------------
// Checksum
// ---------------------------------------------------------------------------

/// XOR checksum of a sentence body (without `!` and `*hh`).
pub fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Validate a full sentence `!BODY*hh`, returning the body on success.
pub fn verify(sentence: &str) -> Result<&str, DecodeError> {
    let rest = sentence
        .strip_prefix('!')
        .or_else(|| sentence.strip_prefix('$'))
        .ok_or_else(|| DecodeError::Malformed("missing sentence start".into()))?;
    let (body, tail) = rest
        .rsplit_once('*')
        .ok_or_else(|| DecodeError::Malformed("missing checksum delimiter".into()))?;
    let hex = tail.get(..2).ok_or_else(|| DecodeError::Malformed("short checksum".into()))?;
    let expected = u8::from_str_radix(hex, 16)
        .map_err(|_| DecodeError::Malformed(format!("bad checksum digits {hex:?}")))?;
    let computed = checksum(body.as_bytes());
    if expected != computed {
        return Err(DecodeError::Checksum { expected, computed });
    }
    Ok(body)
}

/// Append `*hh` to a body and prefix `!`.
pub fn with_checksum(body: &str) -> String {
    format!("!{body}*{:02X}", checksum(body.as_bytes()))
}

// ---------------------------------------------------------------------------
// Six-bit armoring
// ---------------------------------------------------------------------------

fn dearmor_char(c: u8) -> Option<u8> {
    let v = c.checked_sub(48)?;
    let v = if v > 40 { v.checked_sub(8)? } else { v };
    (v < 64).then_some(v)
}

fn armor_char(v: u8) -> char {
    let v = v & 0x3F;
    (if v < 40 { v + 48 } else { v + 56 }) as char
}

/// Unpack an armored payload into a bit vector (one bool per bit).
///
/// `fill_bits` trailing pad bits are dropped.
pub fn dearmor(payload: &str, fill_bits: u8) -> Result<Vec<bool>, DecodeError> {
    let mut bits = Vec::with_capacity(payload.len() * 6);
    for c in payload.bytes() {
        let v = dearmor_char(c)
            .ok_or_else(|| DecodeError::Malformed(format!("invalid payload char {:?}", c as char)))?;
        for shift in (0..6).rev() {
            bits.push((v >> shift) & 1 == 1);
        }
    }
    let fill = usize::from(fill_bits).min(bits.len());
    bits.truncate(bits.len() - fill);
    Ok(bits)
}

/// Pack bits into an armored payload. Returns `(payload, fill_bits)`.
pub fn armor(bits: &[bool]) -> (String, u8) {
    let fill = (6 - bits.len() % 6) % 6;
    let mut out = String::with_capacity(bits.len().div_ceil(6));
    for chunk in bits.chunks(6) {
        let mut v = 0u8;
        for i in 0..6 {
            v <<= 1;
            if chunk.get(i).copied().unwrap_or(false) {
                v |= 1;
            }
        }
        out.push(armor_char(v));
    }
    (out, fill as u8)
}

// ---------------------------------------------------------------------------
// Bit field access
// ---------------------------------------------------------------------------

/// Read-only view over a dearmored payload.
pub struct BitReader<'a> {
    bits: &'a [bool],
}

impl<'a> BitReader<'a> {
    pub fn new(bits: &'a [bool]) -> Self {
        BitReader { bits }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Unsigned field. Bits past the end read as zero.
    pub fn uint(&self, start: usize, len: usize) -> u32 {
        (start..start + len).fold(0u32, |acc, i| {
            (acc << 1) | u32::from(self.bits.get(i).copied().unwrap_or(false))
        })
    }

    /// Two's-complement signed field.
    pub fn int(&self, start: usize, len: usize) -> i32 {
        let raw = self.uint(start, len);
        if len > 0 && len < 32 && raw & (1 << (len - 1)) != 0 {
            (raw as i64 - (1i64 << len)) as i32
        } else {
            raw as i32
        }
    }

    pub fn flag(&self, pos: usize) -> bool {
        self.bits.get(pos).copied().unwrap_or(false)
    }

    /// Six-bit text field, trailing `@` padding and spaces stripped.
    pub fn text(&self, start: usize, len: usize) -> String {
        let mut s = String::with_capacity(len / 6);
        let mut pos = start;
        while pos + 6 <= start + len && pos + 6 <= self.bits.len() {
            s.push(SIXBIT_ASCII[self.uint(pos, 6) as usize] as char);
            pos += 6;
        }
        let trimmed = s.trim_end_matches(['@', ' ']);
        trimmed.trim_start().to_string()
    }
}

/// Bit-level payload builder, the inverse of [`BitReader`].
#[derive(Debug, Default)]
pub struct BitWriter {
    bits: Vec<bool>,
}

impl BitWriter {
    pub fn new() -> Self {
        BitWriter::default()
    }

    pub fn uint(&mut self, value: u32, len: usize) -> &mut Self {
        for shift in (0..len).rev() {
            self.bits.push((value >> shift) & 1 == 1);
        }
        self
    }

    pub fn int(&mut self, value: i32, len: usize) -> &mut Self {
        let mask = if len >= 32 { u32::MAX } else { (1u32 << len) - 1 };
        self.uint(value as u32 & mask, len)
    }

    pub fn text(&mut self, value: &str, chars: usize) -> &mut Self {
        let mut bytes = value.bytes().map(|b| b.to_ascii_uppercase());
        for _ in 0..chars {
            let code = bytes
                .next()
                .and_then(|b| SIXBIT_ASCII.iter().position(|&c| c == b))
                .unwrap_or(0);
            self.uint(code as u32, 6);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    /// Wrap the payload in one or more `!AIVDM` sentences.
    ///
    /// Payloads longer than `max_chars` armored characters are split into
    /// fragments sharing `sequence_id`.
    pub fn to_sentences(&self, channel: char, sequence_id: u8, max_chars: usize) -> Vec<String> {
        let (payload, fill) = armor(&self.bits);
        let max_chars = max_chars.max(1);
        let chunks: Vec<&str> = payload
            .as_bytes()
            .chunks(max_chars)
            .filter_map(|c| std::str::from_utf8(c).ok())
            .collect();
        let count = chunks.len().max(1);
        if count == 1 {
            return vec![with_checksum(&format!("AIVDM,1,1,,{channel},{payload},{fill}"))];
        }
        chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let fill = if i + 1 == count { fill } else { 0 };
                with_checksum(&format!(
                    "AIVDM,{count},{},{sequence_id},{channel},{chunk},{fill}",
                    i + 1
                ))
            })
            .collect()
    }
}
