// ============================================================================
// BAG2 - base64 bitstream codec
// ============================================================================
//
// Values are written MSB-first as a stream of bits: a prefix-free type code,
// then the payload. Numbers use the narrowest of 4, 8, 16 or 32 bits (each
// width has its own type code) and are sign-extended on read. Strings are a
// UTF-8 byte length followed by the raw bytes. The bit stream is zero-padded
// to a whole byte and transported as standard padded base64 after the
// signature.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use super::{BAG_SIG_V2, BagReader, BagResult, BagUnpackError, BagWriter};

/// A prefix-free type code: (value, bit count).
type Code = (u32, u32);

const TYPE_NULL: Code = (0b0000001, 7);
const TYPE_BOOL: Code = (0b001, 3);

/// Codes for the 4, 8, 16 and 32 bit payload widths.
const TYPE_INT: [Code; 4] = [(0b1, 1), (0b0001, 4), (0b00001, 5), (0b0000000110, 10)];
const TYPE_STUFF: [Code; 4] = [(0b01, 2), (0b000000001, 9), (0b0000000111, 10), (0b0000000101, 10)];
const TYPE_STRING: [Code; 4] = [
    (0b000001, 6),
    (0b000000000, 9),
    (0b00000001001, 11),
    (0b00000001000, 11),
];

const PAYLOAD_BITS: [u32; 4] = [4, 8, 16, 32];

// Accepts unpadded input and a non-zero tail from writers that pad by character.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::RequireNone)
        .with_decode_allow_trailing_bits(true),
);

fn width_index(value: i32) -> usize {
    if (-8..=7).contains(&value) {
        0
    } else if (i8::MIN as i32..=i8::MAX as i32).contains(&value) {
        1
    } else if (i16::MIN as i32..=i16::MAX as i32).contains(&value) {
        2
    } else {
        3
    }
}

pub struct BitstreamWriter {
    bytes: Vec<u8>,
    current: u8,
    current_bits: u32,
}

impl BitstreamWriter {
    pub fn new() -> Self {
        Self { bytes: Vec::new(), current: 0, current_bits: 0 }
    }

    fn write_bits(&mut self, value: u32, bits: u32) {
        for i in (0..bits).rev() {
            let bit = ((value >> i) & 1) as u8;
            self.current = (self.current << 1) | bit;
            self.current_bits += 1;
            if self.current_bits == 8 {
                self.bytes.push(self.current);
                self.current = 0;
                self.current_bits = 0;
            }
        }
    }

    fn write_code(&mut self, code: Code) {
        self.write_bits(code.0, code.1);
    }

    fn write_number(&mut self, codes: &[Code; 4], value: i32) {
        let index = width_index(value);
        self.write_code(codes[index]);
        self.write_bits(value as u32, PAYLOAD_BITS[index]);
    }
}

impl BagWriter for BitstreamWriter {
    fn write_null(&mut self) {
        self.write_code(TYPE_NULL);
    }

    fn write_bool(&mut self, value: bool) {
        self.write_code(TYPE_BOOL);
        self.write_bits(value as u32, 1);
    }

    fn write_int(&mut self, value: i32) {
        self.write_number(&TYPE_INT, value);
    }

    fn write_string(&mut self, value: &str) {
        let encoded = value.as_bytes();
        self.write_number(&TYPE_STRING, encoded.len() as i32);
        for &byte in encoded {
            self.write_bits(byte as u32, 8);
        }
    }

    fn write_stuff_version(&mut self, version: i32) {
        self.write_number(&TYPE_STUFF, version);
    }

    fn finish(mut self: Box<Self>) -> String {
        if self.current_bits > 0 {
            let pad = 8 - self.current_bits;
            self.bytes.push(self.current << pad);
        }

        let mut out = String::from(BAG_SIG_V2);
        STANDARD.encode_string(&self.bytes, &mut out);
        out
    }
}

pub struct BitstreamReader {
    bytes: Vec<u8>,
    // Position of the next bit to read.
    pos: usize,
}

impl BitstreamReader {
    pub fn new(input: &str) -> BagResult<Self> {
        let body = input.strip_prefix(BAG_SIG_V2).ok_or(BagUnpackError::MissingSignature)?;
        if let Some(offset) = body.find(|c: char| !c.is_ascii()) {
            return Err(BagUnpackError::Malformed {
                what: "non-base64 character".to_string(),
                index: BAG_SIG_V2.len() + body[..offset].chars().count(),
            });
        }
        let mut body = body.trim_end_matches('=');

        // A lone trailing character carries fewer than 8 bits and no whole byte.
        if body.len() % 4 == 1 {
            body = &body[..body.len() - 1];
        }

        let bytes = LENIENT.decode(body).map_err(|e| BagUnpackError::Malformed {
            what: format!("base64 ({})", e),
            index: BAG_SIG_V2.len(),
        })?;

        Ok(Self { bytes, pos: 0 })
    }

    fn total_bits(&self) -> usize {
        self.bytes.len() * 8
    }

    fn bit_at(&self, pos: usize) -> u32 {
        ((self.bytes[pos / 8] >> (7 - pos % 8)) & 1) as u32
    }

    fn peek(&self, bits: u32) -> Option<u32> {
        if self.pos + bits as usize > self.total_bits() {
            return None;
        }
        let mut value = 0;
        for i in 0..bits as usize {
            value = (value << 1) | self.bit_at(self.pos + i);
        }
        Some(value)
    }

    fn matches(&self, code: Code) -> bool {
        self.peek(code.1) == Some(code.0)
    }

    fn read_bits(&mut self, bits: u32) -> BagResult<u32> {
        let value = self.peek(bits).ok_or(BagUnpackError::UnexpectedEnd { index: self.index() })?;
        self.pos += bits as usize;
        Ok(value)
    }

    /// Error for a type code that matched nothing. Trailing zero padding
    /// never forms a valid code, so running into it means the stream ended.
    fn unmatched(&self, kind: &'static str) -> BagUnpackError {
        let tail_is_padding = (self.pos..self.total_bits()).all(|p| self.bit_at(p) == 0);
        if tail_is_padding {
            BagUnpackError::UnexpectedEnd { index: self.index() }
        } else {
            BagUnpackError::UnexpectedType { kind, index: self.index() }
        }
    }

    fn read_number(&mut self, kind: &'static str, codes: &[Code; 4]) -> BagResult<i32> {
        let index = codes
            .iter()
            .position(|&code| self.matches(code))
            .ok_or_else(|| self.unmatched(kind))?;

        self.pos += codes[index].1 as usize;
        let bits = PAYLOAD_BITS[index];
        let raw = self.read_bits(bits)?;

        let shift = 32 - bits;
        Ok(((raw << shift) as i32) >> shift)
    }
}

impl BagReader for BitstreamReader {
    fn take_null(&mut self) -> BagResult<bool> {
        if self.matches(TYPE_NULL) {
            self.pos += TYPE_NULL.1 as usize;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn read_bool(&mut self) -> BagResult<bool> {
        if !self.matches(TYPE_BOOL) {
            return Err(self.unmatched("Boolean"));
        }
        self.pos += TYPE_BOOL.1 as usize;
        Ok(self.read_bits(1)? == 1)
    }

    fn read_int(&mut self) -> BagResult<i32> {
        self.read_number("Int", &TYPE_INT)
    }

    fn read_string(&mut self) -> BagResult<String> {
        let size = self.read_number("String", &TYPE_STRING)?;
        if size < 0 {
            return Err(BagUnpackError::Malformed {
                what: format!("string size={}", size),
                index: self.index(),
            });
        }

        let size = size as usize;
        if self.pos + size * 8 > self.total_bits() {
            return Err(BagUnpackError::UnexpectedEnd { index: self.index() });
        }

        let mut encoded = Vec::with_capacity(size);
        for _ in 0..size {
            encoded.push(self.read_bits(8)? as u8);
        }
        String::from_utf8(encoded).map_err(|e| BagUnpackError::Malformed {
            what: format!("string bytes ({})", e),
            index: self.index(),
        })
    }

    fn read_stuff_version(&mut self) -> BagResult<i32> {
        self.read_number("Stuff", &TYPE_STUFF)
    }

    /// Character index in the packed string.
    fn index(&self) -> usize {
        BAG_SIG_V2.len() + self.pos / 6
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn written(f: impl FnOnce(&mut BitstreamWriter)) -> String {
        let mut writer = BitstreamWriter::new();
        f(&mut writer);
        Box::new(writer).finish()
    }

    fn reader(f: impl FnOnce(&mut BitstreamWriter)) -> BitstreamReader {
        BitstreamReader::new(&written(f)).unwrap()
    }

    #[test]
    fn empty_stream_is_just_the_signature() {
        assert_eq!(written(|_| {}), "BAG2");
    }

    #[test]
    fn small_int_is_five_bits() {
        // 1 + 0111, padded to 0b1011_1000
        assert_eq!(written(|w| w.write_int(7)), "BAG2uA==");
    }

    #[test]
    fn codes_are_prefix_free() {
        let mut all: Vec<Code> = vec![TYPE_NULL, TYPE_BOOL];
        all.extend(TYPE_INT);
        all.extend(TYPE_STUFF);
        all.extend(TYPE_STRING);

        for (i, a) in all.iter().enumerate() {
            for (j, b) in all.iter().enumerate() {
                if i == j || a.1 > b.1 {
                    continue;
                }
                assert_ne!(b.0 >> (b.1 - a.1), a.0, "{:?} is a prefix of {:?}", a, b);
            }
        }
    }

    #[test]
    fn null_is_peeked_without_consuming_values() {
        let mut r = reader(|w| {
            w.write_null();
            w.write_int(-3);
        });
        assert!(r.take_null().unwrap());
        assert!(!r.take_null().unwrap());
        assert_eq!(r.read_int().unwrap(), -3);
    }

    #[test]
    fn mismatched_code_is_unexpected_type() {
        let mut r = reader(|w| w.write_bool(true));
        assert!(matches!(r.read_int(), Err(BagUnpackError::UnexpectedType { kind: "Int", .. })));
    }

    #[test]
    fn truncated_stream_is_unexpected_end() {
        let full = written(|w| w.write_int(100_000));
        let truncated = &full[..full.len() - 4];
        let mut r = BitstreamReader::new(truncated).unwrap();
        assert!(matches!(r.read_int(), Err(BagUnpackError::UnexpectedEnd { .. })));

        let full = written(|w| w.write_string("hello"));
        let truncated = &full[..full.len() - 4];
        let mut r = BitstreamReader::new(truncated).unwrap();
        assert!(matches!(r.read_string(), Err(BagUnpackError::UnexpectedEnd { .. })));
    }

    #[test]
    fn unpadded_input_is_accepted() {
        let packed = written(|w| w.write_int(7));
        let mut r = BitstreamReader::new(packed.trim_end_matches('=')).unwrap();
        assert_eq!(r.read_int().unwrap(), 7);
    }

    #[test]
    fn invalid_base64_is_malformed() {
        assert!(matches!(
            BitstreamReader::new("BAG2a*b="),
            Err(BagUnpackError::Malformed { .. })
        ));
    }

    #[test]
    fn multibyte_characters_are_malformed() {
        for input in ["BAG2abc\u{e9}", "BAG2\u{e9}", "BAG2ab\u{1F600}cd"] {
            assert!(matches!(BitstreamReader::new(input), Err(BagUnpackError::Malformed { .. })), "{input}");
        }
    }

    #[test]
    fn invalid_utf8_string_is_malformed() {
        let mut r = reader(|w| {
            w.write_number(&TYPE_STRING, 2);
            w.write_bits(0xC3, 8);
            w.write_bits(0x28, 8);
        });
        assert!(matches!(r.read_string(), Err(BagUnpackError::Malformed { .. })));
    }

    proptest! {
        #[test]
        fn ints_read_back_exactly(values in proptest::collection::vec(any::<i32>(), 0..32)) {
            let mut r = reader(|w| for &v in &values { w.write_int(v) });
            for &v in &values {
                prop_assert_eq!(r.read_int().unwrap(), v);
            }
        }

        #[test]
        fn strings_read_back_exactly(values in proptest::collection::vec(".{0,40}", 0..8)) {
            let mut r = reader(|w| for v in &values { w.write_string(v) });
            for v in &values {
                prop_assert_eq!(&r.read_string().unwrap(), v);
            }
        }
    }
}
