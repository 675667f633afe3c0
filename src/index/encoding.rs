// logcore - index/encoding.rs
//
// C3: EncodingDetector — given a byte block, returns a best-guess text
// codec plus the byte-width and line-terminator layout it implies.
// Deterministic and pure: no I/O, no shared state.

/// Text codec recognised by the detector, or selected explicitly via
/// `LogData::setDisplayEncoding` / `reload(forcedCodec)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    Utf32Be,
    Iso8859_1,
    Windows1251,
    /// Sentinel used when detection is not possible (e.g. an empty or
    /// unopenable file) — behaves like `Iso8859_1` for byte-width purposes.
    LocaleDefault,
}

impl Encoding {
    /// Name recognised by `setDisplayEncoding` (spec §6 codec names).
    pub fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Utf16Le => "UTF-16LE",
            Self::Utf16Be => "UTF-16BE",
            Self::Utf32Le => "UTF-32LE",
            Self::Utf32Be => "UTF-32BE",
            Self::Iso8859_1 => "ISO-8859-1",
            Self::Windows1251 => "windows-1251",
            Self::LocaleDefault => "locale default",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "UTF-8" => Some(Self::Utf8),
            "UTF-16LE" => Some(Self::Utf16Le),
            "UTF-16BE" => Some(Self::Utf16Be),
            "UTF-32LE" => Some(Self::Utf32Le),
            "UTF-32BE" => Some(Self::Utf32Be),
            "ISO-8859-1" => Some(Self::Iso8859_1),
            "windows-1251" => Some(Self::Windows1251),
            "locale default" => Some(Self::LocaleDefault),
            _ => None,
        }
    }

    /// Minimum byte width of one character unit in this encoding. Used as
    /// the scan stride when searching for line terminators.
    pub fn char_width(self) -> usize {
        match self {
            Self::Utf8 | Self::Iso8859_1 | Self::Windows1251 | Self::LocaleDefault => 1,
            Self::Utf16Le | Self::Utf16Be => 2,
            Self::Utf32Le | Self::Utf32Be => 4,
        }
    }

    /// Byte length of the line-terminator marker (GLOSSARY).
    pub fn line_terminator_width(self) -> usize {
        self.char_width()
    }

    pub fn is_little_endian(self) -> bool {
        matches!(self, Self::Utf16Le | Self::Utf32Le)
    }
}

/// Result of sniffing a leading byte block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedEncoding {
    pub encoding: Encoding,
    /// Byte length of the byte-order-mark prefix, if one was present.
    pub bom_size: usize,
    /// Byte width of the line terminator in this encoding.
    pub line_feed_width: usize,
    /// Offset, within the `line_feed_width`-byte terminator unit, of the
    /// actual `0x0A` byte (0 for little-endian wide encodings, else
    /// `line_feed_width - 1`).
    pub line_feed_trailing_byte_offset: usize,
}

impl DetectedEncoding {
    fn for_encoding(encoding: Encoding, bom_size: usize) -> Self {
        let width = encoding.line_terminator_width();
        let trailing_offset = if encoding.is_little_endian() { 0 } else { width - 1 };
        Self {
            encoding,
            bom_size,
            line_feed_width: width,
            line_feed_trailing_byte_offset: trailing_offset,
        }
    }
}

/// Decode `bytes` through `encoding` into a `String`, replacing malformed
/// sequences with `U+FFFD`. `Windows1251` and `LocaleDefault` fall back to
/// the same byte-for-codepoint mapping as `Iso8859_1` — a real cp1251 table
/// is out of scope for this engine (front-ends needing exact Cyrillic
/// fidelity should decode with a dedicated codec crate before handing text
/// to the engine).
pub fn decode(encoding: Encoding, bytes: &[u8]) -> String {
    match encoding {
        Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        Encoding::Iso8859_1 | Encoding::Windows1251 | Encoding::LocaleDefault => {
            bytes.iter().map(|&b| b as char).collect()
        }
        Encoding::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
        Encoding::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
        Encoding::Utf32Le => decode_utf32(bytes, u32::from_le_bytes),
        Encoding::Utf32Be => decode_utf32(bytes, u32::from_be_bytes),
    }
}

fn decode_utf16(bytes: &[u8], from_bytes: fn([u8; 2]) -> u16) -> String {
    let units = bytes.chunks_exact(2).map(|c| from_bytes([c[0], c[1]]));
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

fn decode_utf32(bytes: &[u8], from_bytes: fn([u8; 4]) -> u32) -> String {
    bytes
        .chunks_exact(4)
        .map(|c| from_bytes([c[0], c[1], c[2], c[3]]))
        .map(|u| char::from_u32(u).unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Sniff up to `ENCODING_SNIFF_SIZE` leading bytes of a file and return a
/// best-guess encoding plus the implied line-terminator layout.
///
/// Recognises, in order: UTF-8 BOM, UTF-32 BOM (checked before UTF-16 since
/// its 4-byte BOM prefix overlaps with UTF-16LE's 2-byte BOM), UTF-16 BOM,
/// then falls back to content heuristics: a NUL-byte stride test for
/// BOM-less UTF-16/UTF-32, then UTF-8 validity, then ISO-8859-1.
pub fn detect(block: &[u8]) -> DetectedEncoding {
    if block.is_empty() {
        return DetectedEncoding::for_encoding(Encoding::LocaleDefault, 0);
    }

    if let Some(d) = detect_bom(block) {
        return d;
    }

    if let Some(d) = detect_wide_nul_stride(block) {
        return d;
    }

    if std::str::from_utf8(block).is_ok() {
        return DetectedEncoding::for_encoding(Encoding::Utf8, 0);
    }

    DetectedEncoding::for_encoding(Encoding::Iso8859_1, 0)
}

fn detect_bom(block: &[u8]) -> Option<DetectedEncoding> {
    if block.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Some(DetectedEncoding::for_encoding(Encoding::Utf8, 3));
    }
    if block.starts_with(&[0xFF, 0xFE, 0x00, 0x00]) {
        return Some(DetectedEncoding::for_encoding(Encoding::Utf32Le, 4));
    }
    if block.starts_with(&[0x00, 0x00, 0xFE, 0xFF]) {
        return Some(DetectedEncoding::for_encoding(Encoding::Utf32Be, 4));
    }
    if block.starts_with(&[0xFF, 0xFE]) {
        return Some(DetectedEncoding::for_encoding(Encoding::Utf16Le, 2));
    }
    if block.starts_with(&[0xFE, 0xFF]) {
        return Some(DetectedEncoding::for_encoding(Encoding::Utf16Be, 2));
    }
    None
}

/// BOM-less wide-encoding heuristic: ASCII-heavy UTF-16/UTF-32 text has a
/// NUL byte in every high-order position of every code unit. Sample enough
/// leading bytes to make a confident call; bail out (return None, falling
/// through to UTF-8/ISO-8859-1) on anything that looks like plain narrow
/// text or binary noise.
fn detect_wide_nul_stride(block: &[u8]) -> Option<DetectedEncoding> {
    const SAMPLE: usize = 256;
    let sample = &block[..block.len().min(SAMPLE)];
    if sample.len() < 8 {
        return None;
    }

    // UTF-32: test 4-byte units, high 3 bytes zero (LE) or low 3 bytes zero
    // (BE) consistently.
    if sample.len() >= 16 {
        let units: Vec<[u8; 4]> = sample
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect();
        let le_hits = units
            .iter()
            .filter(|u| u[1] == 0 && u[2] == 0 && u[3] == 0 && u[0] != 0)
            .count();
        let be_hits = units
            .iter()
            .filter(|u| u[0] == 0 && u[1] == 0 && u[2] == 0 && u[3] != 0)
            .count();
        let total = units.len();
        if total >= 3 && le_hits == total {
            return Some(DetectedEncoding::for_encoding(Encoding::Utf32Le, 0));
        }
        if total >= 3 && be_hits == total {
            return Some(DetectedEncoding::for_encoding(Encoding::Utf32Be, 0));
        }
    }

    // UTF-16: test 2-byte units, high byte zero (LE) or low byte zero (BE).
    let units: Vec<[u8; 2]> = sample.chunks_exact(2).map(|c| [c[0], c[1]]).collect();
    let total = units.len();
    if total < 4 {
        return None;
    }
    let le_hits = units.iter().filter(|u| u[1] == 0 && u[0] != 0).count();
    let be_hits = units.iter().filter(|u| u[0] == 0 && u[1] != 0).count();
    if le_hits == total {
        return Some(DetectedEncoding::for_encoding(Encoding::Utf16Le, 0));
    }
    if be_hits == total {
        return Some(DetectedEncoding::for_encoding(Encoding::Utf16Be, 0));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_utf8_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"hello\n");
        let d = detect(&bytes);
        assert_eq!(d.encoding, Encoding::Utf8);
        assert_eq!(d.bom_size, 3);
        assert_eq!(d.line_feed_width, 1);
    }

    #[test]
    fn detects_utf16_le_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for b in "hi\n".encode_utf16() {
            bytes.extend_from_slice(&b.to_le_bytes());
        }
        let d = detect(&bytes);
        assert_eq!(d.encoding, Encoding::Utf16Le);
        assert_eq!(d.line_feed_width, 2);
        assert_eq!(d.line_feed_trailing_byte_offset, 0);
    }

    #[test]
    fn detects_utf16_be_bom() {
        let mut bytes = vec![0xFE, 0xFF];
        for b in "hi\n".encode_utf16() {
            bytes.extend_from_slice(&b.to_be_bytes());
        }
        let d = detect(&bytes);
        assert_eq!(d.encoding, Encoding::Utf16Be);
        assert_eq!(d.line_feed_trailing_byte_offset, 1);
    }

    #[test]
    fn detects_utf32_le_bom() {
        let mut bytes = vec![0xFF, 0xFE, 0x00, 0x00];
        bytes.extend_from_slice(&('h' as u32).to_le_bytes());
        bytes.extend_from_slice(&('\n' as u32).to_le_bytes());
        let d = detect(&bytes);
        assert_eq!(d.encoding, Encoding::Utf32Le);
        assert_eq!(d.line_feed_width, 4);
    }

    #[test]
    fn falls_back_to_utf8_for_plain_ascii() {
        let d = detect(b"plain ascii line\n");
        assert_eq!(d.encoding, Encoding::Utf8);
        assert_eq!(d.bom_size, 0);
    }

    #[test]
    fn bomless_utf16_le_detected_by_nul_stride() {
        let mut bytes = Vec::new();
        for b in "hello world this is ascii\n".encode_utf16() {
            bytes.extend_from_slice(&b.to_le_bytes());
        }
        let d = detect(&bytes);
        assert_eq!(d.encoding, Encoding::Utf16Le);
    }

    #[test]
    fn empty_block_is_locale_default() {
        let d = detect(&[]);
        assert_eq!(d.encoding, Encoding::LocaleDefault);
    }

    #[test]
    fn invalid_utf8_falls_back_to_iso8859_1() {
        let bytes = vec![0xFF, 0x00, 0x80, 0x81, 0x41, 0x42];
        let d = detect(&bytes);
        assert_eq!(d.encoding, Encoding::Iso8859_1);
    }

    #[test]
    fn decode_utf8_round_trips_ascii() {
        assert_eq!(decode(Encoding::Utf8, b"hello"), "hello");
    }

    #[test]
    fn decode_iso8859_1_maps_byte_to_codepoint() {
        assert_eq!(decode(Encoding::Iso8859_1, &[0xE9]), "\u{E9}");
    }

    #[test]
    fn decode_utf16_le_round_trips() {
        let mut bytes = Vec::new();
        for u in "hi".encode_utf16() {
            bytes.extend_from_slice(&u.to_le_bytes());
        }
        assert_eq!(decode(Encoding::Utf16Le, &bytes), "hi");
    }

    #[test]
    fn name_round_trip() {
        for e in [
            Encoding::Utf8,
            Encoding::Utf16Le,
            Encoding::Utf16Be,
            Encoding::Utf32Le,
            Encoding::Utf32Be,
            Encoding::Iso8859_1,
            Encoding::Windows1251,
            Encoding::LocaleDefault,
        ] {
            assert_eq!(Encoding::from_name(e.name()), Some(e));
        }
    }
}
