//! Binary record codec for captured events.
//!
//! A record is a fixed 30-byte little-endian header followed by the raw
//! UTF-8 bytes of the name and the optional subject. Length checks happen
//! once against the header, then fixed-width fields are read directly.

use thiserror::Error;

/// Record magic (`SQMR` on the wire).
pub const MAGIC: u32 = 0x524D_5153;

/// Current record format version.
pub const VERSION: u16 = 1;

/// Header size in bytes.
pub const HEADER_LEN: usize = 30;

/// Longest name or subject that fits the u16 length prefix.
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

const FLAG_OK: u8 = 0b01;
const FLAG_SUBJECT: u8 = 0b10;
const KNOWN_FLAGS: u8 = FLAG_OK | FLAG_SUBJECT;

/// Caller-supplied event, borrowed for the duration of a `record` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event<'a> {
    pub name: &'a str,
    pub timestamp_ms: u64,
    pub duration_us: u64,
    pub ok: bool,
    pub subject: Option<&'a str>,
}

impl<'a> Event<'a> {
    pub fn new(
        name: &'a str,
        timestamp_ms: u64,
        duration_us: u64,
        ok: bool,
        subject: Option<&'a str>,
    ) -> Self {
        Self {
            name,
            timestamp_ms,
            duration_us,
            ok,
            subject,
        }
    }

    /// Owned copy of this event, as `decode` would return it.
    pub fn to_record(&self) -> Record {
        Record {
            name: self.name.to_string(),
            timestamp_ms: self.timestamp_ms,
            duration_us: self.duration_us,
            ok: self.ok,
            subject: self.subject.map(str::to_string),
        }
    }
}

/// Decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub timestamp_ms: u64,
    pub duration_us: u64,
    pub ok: bool,
    pub subject: Option<String>,
}

impl Record {
    /// Borrowed view of this record.
    pub fn as_event(&self) -> Event<'_> {
        Event {
            name: &self.name,
            timestamp_ms: self.timestamp_ms,
            duration_us: self.duration_us,
            ok: self.ok,
            subject: self.subject.as_deref(),
        }
    }
}

/// Reasons a byte slice is not a valid record.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record too short: {size} bytes")]
    Truncated { size: usize },

    #[error("bad magic: {found:#010x}")]
    BadMagic { found: u32 },

    #[error("unsupported record version {version}")]
    UnsupportedVersion { version: u16 },

    #[error("unknown flag bits {flags:#04x}")]
    UnknownFlags { flags: u8 },

    #[error("length mismatch: header declares {declared} bytes, buffer has {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("subject length {len} set without presence flag")]
    StraySubject { len: usize },

    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },
}

/// Encodes an event into a new buffer.
pub fn encode(event: &Event<'_>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(encoded_len(event));
    encode_into(event, &mut buf);
    buf
}

/// Encodes an event, replacing the contents of `buf`.
///
/// Never fails: over-long fields are cut at the last character boundary
/// that fits the length prefix.
pub fn encode_into(event: &Event<'_>, buf: &mut Vec<u8>) {
    let name = clamp_field(event.name);
    let subject = event.subject.map(clamp_field);

    let mut flags = 0u8;
    if event.ok {
        flags |= FLAG_OK;
    }
    if subject.is_some() {
        flags |= FLAG_SUBJECT;
    }
    let subject_bytes = subject.unwrap_or("").as_bytes();

    buf.clear();
    buf.reserve(HEADER_LEN + name.len() + subject_bytes.len());
    buf.extend_from_slice(&MAGIC.to_le_bytes());
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(&event.timestamp_ms.to_le_bytes());
    buf.extend_from_slice(&event.duration_us.to_le_bytes());
    buf.push(flags);
    buf.push(0);
    // clamp_field bounds both lengths to u16::MAX.
    buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
    buf.extend_from_slice(&(subject_bytes.len() as u16).to_le_bytes());
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(subject_bytes);
}

/// Size `encode` will produce for this event.
pub fn encoded_len(event: &Event<'_>) -> usize {
    HEADER_LEN
        + clamp_field(event.name).len()
        + event.subject.map(|s| clamp_field(s).len()).unwrap_or(0)
}

/// Best-effort decode. Malformed input yields `None`.
pub fn decode(data: &[u8]) -> Option<Record> {
    try_decode(data).ok()
}

/// Decodes a record, reporting why malformed input was rejected.
pub fn try_decode(data: &[u8]) -> Result<Record, DecodeError> {
    if data.len() < HEADER_LEN {
        return Err(DecodeError::Truncated { size: data.len() });
    }

    let magic = read_u32_le(data, 0);
    if magic != MAGIC {
        return Err(DecodeError::BadMagic { found: magic });
    }

    let version = read_u16_le(data, 4);
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion { version });
    }

    let flags = data[24];
    if flags & !KNOWN_FLAGS != 0 {
        return Err(DecodeError::UnknownFlags { flags });
    }

    let name_len = usize::from(read_u16_le(data, 26));
    let subject_len = usize::from(read_u16_le(data, 28));
    let has_subject = flags & FLAG_SUBJECT != 0;
    if !has_subject && subject_len != 0 {
        return Err(DecodeError::StraySubject { len: subject_len });
    }

    let declared = HEADER_LEN + name_len + subject_len;
    if declared != data.len() {
        return Err(DecodeError::LengthMismatch {
            declared,
            actual: data.len(),
        });
    }

    let name_end = HEADER_LEN + name_len;
    let name = std::str::from_utf8(&data[HEADER_LEN..name_end])
        .map_err(|_| DecodeError::InvalidUtf8 { field: "name" })?;
    let subject = if has_subject {
        let s = std::str::from_utf8(&data[name_end..])
            .map_err(|_| DecodeError::InvalidUtf8 { field: "subject" })?;
        Some(s.to_string())
    } else {
        None
    };

    Ok(Record {
        name: name.to_string(),
        timestamp_ms: read_u64_le(data, 8),
        duration_us: read_u64_le(data, 16),
        ok: flags & FLAG_OK != 0,
        subject,
    })
}

/// Longest prefix of `s` within `MAX_FIELD_LEN` bytes, on a char boundary.
fn clamp_field(s: &str) -> &str {
    if s.len() <= MAX_FIELD_LEN {
        return s;
    }
    let mut end = MAX_FIELD_LEN;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// Callers check `data.len() >= HEADER_LEN` first; all offsets below are in the header.

#[inline]
fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

#[inline]
fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

#[inline]
fn read_u64_le(data: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(raw)
}
