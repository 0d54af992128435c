use percent_encoding::percent_decode_str;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub type Result<T> = std::result::Result<T, MagnetError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MagnetError {
    #[error("identifier is empty")]
    Empty,
    #[error("magnet URI has no urn:btih exact topic")]
    MissingInfoHash,
    #[error("invalid info hash '{0}'")]
    InvalidInfoHash(String),
}

/// 160-bit BitTorrent v1 info hash.
///
/// Always rendered as 40 lowercase hex characters, which is also the wire
/// format used in URLs, JSON and the history file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash(pub [u8; 20]);

impl InfoHash {
    pub fn to_hex_lower(self) -> String {
        let mut s = String::with_capacity(40);
        for b in self.0 {
            use std::fmt::Write as _;
            let _ = write!(&mut s, "{:02x}", b);
        }
        s
    }

    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.trim();
        if hex.len() != 40 || !hex.is_ascii() {
            return Err(MagnetError::InvalidInfoHash(hex.to_string()));
        }
        let mut out = [0u8; 20];
        for (i, chunk) in hex.as_bytes().chunks_exact(2).enumerate() {
            let hi = hex_value(chunk[0]);
            let lo = hex_value(chunk[1]);
            match (hi, lo) {
                (Some(hi), Some(lo)) => out[i] = (hi << 4) | lo,
                _ => return Err(MagnetError::InvalidInfoHash(hex.to_string())),
            }
        }
        Ok(Self(out))
    }

    /// RFC 4648 base32 (no padding), the older magnet link encoding.
    pub fn from_base32(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != 32 {
            return Err(MagnetError::InvalidInfoHash(s.to_string()));
        }
        let mut out = [0u8; 20];
        let mut acc: u64 = 0;
        let mut bits = 0u32;
        let mut pos = 0usize;
        for c in s.bytes() {
            let v = match c.to_ascii_uppercase() {
                c @ b'A'..=b'Z' => c - b'A',
                c @ b'2'..=b'7' => c - b'2' + 26,
                _ => return Err(MagnetError::InvalidInfoHash(s.to_string())),
            };
            acc = (acc << 5) | u64::from(v);
            bits += 5;
            if bits >= 8 {
                bits -= 8;
                out[pos] = (acc >> bits) as u8;
                pos += 1;
            }
        }
        Ok(Self(out))
    }

    /// Accepts either encoding of a v1 info hash.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().len() {
            40 => Self::from_hex(s),
            32 => Self::from_base32(s),
            _ => Err(MagnetError::InvalidInfoHash(s.trim().to_string())),
        }
    }
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl std::fmt::Display for InfoHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex_lower())
    }
}

impl std::str::FromStr for InfoHash {
    type Err = MagnetError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for InfoHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex_lower())
    }
}

impl<'de> Deserialize<'de> for InfoHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// The parts of a resource identifier the gateway cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    pub info_hash: InfoHash,
    pub display_name: Option<String>,
    pub trackers: Vec<String>,
}

/// Parses a `magnet:?xt=urn:btih:...` URI or a bare info hash.
pub fn parse_identifier(identifier: &str) -> Result<MagnetLink> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return Err(MagnetError::Empty);
    }

    let Some(query) = identifier
        .strip_prefix("magnet:?")
        .or_else(|| identifier.strip_prefix("MAGNET:?"))
    else {
        return Ok(MagnetLink {
            info_hash: InfoHash::parse(identifier)?,
            display_name: None,
            trackers: Vec::new(),
        });
    };

    let mut info_hash = None;
    let mut display_name = None;
    let mut trackers = Vec::new();
    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = decode_component(value);
        match key {
            "xt" => {
                if info_hash.is_some() {
                    continue;
                }
                let Some(hash) = value
                    .strip_prefix("urn:btih:")
                    .or_else(|| value.strip_prefix("URN:BTIH:"))
                else {
                    continue;
                };
                info_hash = Some(InfoHash::parse(hash)?);
            }
            "dn" if !value.is_empty() => display_name = Some(value),
            "tr" if !value.is_empty() => trackers.push(value),
            _ => {}
        }
    }

    Ok(MagnetLink {
        info_hash: info_hash.ok_or(MagnetError::MissingInfoHash)?,
        display_name,
        trackers,
    })
}

/// Bare magnet URI carrying nothing but the hash; peers must come from DHT.
pub fn magnet_uri_for(info_hash: InfoHash) -> String {
    format!("magnet:?xt=urn:btih:{}", info_hash.to_hex_lower())
}

fn decode_component(value: &str) -> String {
    let value = value.replace('+', " ");
    percent_decode_str(&value).decode_utf8_lossy().into_owned()
}
