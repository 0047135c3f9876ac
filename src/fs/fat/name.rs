//! 8.3 short names and FAT date/time stamps.

use chrono::{Datelike, Local, NaiveDateTime, Timelike};

use super::bpb::FatType;
use crate::error::{FatError, Result};

/// Length of an on-disk short name (base + extension, no dot).
pub const SHORT_NAME_LEN: usize = 11;

pub const DOT_NAME: [u8; SHORT_NAME_LEN] = *b".          ";
pub const DOTDOT_NAME: [u8; SHORT_NAME_LEN] = *b"..         ";

/// Normalize a user-supplied name into the padded on-disk form.
///
/// On FAT12/16 the name is upper-cased and must be `BASE[.EXT]` with a
/// 1-8 character base, an extension of at most 3 characters, and only ASCII
/// letters and digits. FAT32 volumes take the raw bytes unchanged, padded
/// with spaces, but control bytes, `/` and a leading 0xE5 are refused;
/// long-name records are never generated.
pub fn format_name(fat_type: FatType, raw: &str) -> Result<[u8; SHORT_NAME_LEN]> {
    match raw {
        "." => return Ok(DOT_NAME),
        ".." => return Ok(DOTDOT_NAME),
        _ => {}
    }

    let invalid = || FatError::InvalidName(raw.to_string());
    let mut out = [b' '; SHORT_NAME_LEN];

    if fat_type == FatType::Fat32 {
        let bytes = raw.as_bytes();
        if bytes.is_empty() || bytes.len() > SHORT_NAME_LEN {
            return Err(invalid());
        }
        // name[0] doubles as the end/deleted marker
        if bytes[0] == 0xE5 || bytes.iter().any(|&b| b < 0x20 || b == 0x7F || b == b'/') {
            return Err(invalid());
        }
        out[..bytes.len()].copy_from_slice(bytes);
        return Ok(out);
    }

    let (base, ext) = match raw.split_once('.') {
        Some((base, ext)) => (base, ext),
        None => (raw, ""),
    };
    if ext.contains('.') {
        return Err(invalid());
    }
    if base.is_empty() || base.len() > 8 || ext.len() > 3 {
        return Err(invalid());
    }
    if !base
        .bytes()
        .chain(ext.bytes())
        .all(|b| b.is_ascii_alphanumeric())
    {
        return Err(invalid());
    }

    for (slot, b) in out[..8].iter_mut().zip(base.bytes()) {
        *slot = b.to_ascii_uppercase();
    }
    for (slot, b) in out[8..].iter_mut().zip(ext.bytes()) {
        *slot = b.to_ascii_uppercase();
    }
    Ok(out)
}

/// Render an on-disk short name as `BASE.EXT` (or `BASE`).
///
/// FAT short names use OEM codepage encoding (typically CP437). Bytes 0x80-0xFF
/// are decoded using the CP437 table rather than assuming UTF-8.
pub fn display_name(name: &[u8; SHORT_NAME_LEN]) -> String {
    let base = decode_oem_string(&name[..8]);
    let base = base.trim_end();
    let ext = decode_oem_string(&name[8..]);
    let ext = ext.trim_end();

    if ext.is_empty() {
        base.to_string()
    } else {
        format!("{base}.{ext}")
    }
}

/// Decode a byte slice from OEM codepage (CP437) to a UTF-8 String.
pub fn decode_oem_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| cp437_to_char(b)).collect()
}

fn cp437_to_char(b: u8) -> char {
    if b < 0x80 {
        b as char
    } else {
        CP437_HIGH[b as usize - 0x80]
    }
}

/// CP437 to Unicode mapping for bytes 0x80-0xFF.
#[rustfmt::skip]
const CP437_HIGH: [char; 128] = [
    // 0x80-0x8F
    'Ç','ü','é','â','ä','à','å','ç', 'ê','ë','è','ï','î','ì','Ä','Å',
    // 0x90-0x9F
    'É','æ','Æ','ô','ö','ò','û','ù', 'ÿ','Ö','Ü','¢','£','¥','₧','ƒ',
    // 0xA0-0xAF
    'á','í','ó','ú','ñ','Ñ','ª','º', '¿','⌐','¬','½','¼','¡','«','»',
    // 0xB0-0xBF
    '░','▒','▓','│','┤','╡','╢','╖', '╕','╣','║','╗','╝','╜','╛','┐',
    // 0xC0-0xCF
    '└','┴','┬','├','─','┼','╞','╟', '╚','╔','╩','╦','╠','═','╬','╧',
    // 0xD0-0xDF
    '╨','╤','╥','╙','╘','╒','╓','╫', '╪','┘','┌','█','▄','▌','▐','▀',
    // 0xE0-0xEF
    'α','ß','Γ','π','Σ','σ','µ','τ', 'Φ','Θ','Ω','δ','∞','φ','ε','∩',
    // 0xF0-0xFF
    '≡','±','≥','≤','⌠','⌡','÷','≈', '°','∙','·','√','ⁿ','²','■','\u{00A0}',
];

/// A packed FAT timestamp: date word, time word (2-second resolution) and
/// the 10 ms remainder used by the creation stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatTimestamp {
    pub date: u16,
    pub time: u16,
    pub tenths: u8,
}

impl FatTimestamp {
    /// Current local time.
    pub fn now() -> Self {
        Self::from_datetime(&Local::now().naive_local())
    }

    /// Pack a calendar time. Dates before 1980 clamp to 1980-01-01 00:00:00,
    /// dates past 2107 clamp to the last representable second.
    pub fn from_datetime(dt: &NaiveDateTime) -> Self {
        if dt.year() < 1980 {
            return Self {
                date: (1 << 5) | 1,
                time: 0,
                tenths: 0,
            };
        }
        if dt.year() > 2107 {
            return Self {
                date: (127 << 9) | (12 << 5) | 31,
                time: (23 << 11) | (59 << 5) | 29,
                tenths: 199,
            };
        }
        let date = (((dt.year() - 1980) as u16) << 9) | ((dt.month() as u16) << 5) | dt.day() as u16;
        let time = ((dt.hour() as u16) << 11) | ((dt.minute() as u16) << 5) | (dt.second() / 2) as u16;
        let millis = dt.nanosecond() / 1_000_000 % 1000;
        let tenths = ((dt.second() % 2) * 100 + millis / 10) as u8;
        Self { date, time, tenths }
    }
}

/// Format a FAT date/time pair as "YYYY-MM-DD HH:MM:SS".
pub fn format_fat_datetime(date: u16, time: u16) -> String {
    if date == 0 {
        return String::new();
    }
    let day = date & 0x1F;
    let month = (date >> 5) & 0x0F;
    let year = ((date >> 9) & 0x7F) + 1980;
    let second = (time & 0x1F) * 2;
    let minute = (time >> 5) & 0x3F;
    let hour = (time >> 11) & 0x1F;
    format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}")
}
