// ============================================================================
// BAG1 - legacy text codec
// ============================================================================
//
// Every value starts with a type tag character. Numbers (ints, string lengths,
// stuff versions) are stored as 1, 2, 4 or 8 uppercase hex digits depending on
// magnitude and are sign-extended on read. String length counts UTF-16 code units.

use super::{BAG_SIG_V1, BagReader, BagResult, BagUnpackError, BagWriter};

const TYPE_NULL: char = '_';
const TYPE_BOOL_FALSE: char = 'b';
const TYPE_BOOL_TRUE: char = 'B';
const TYPE_INT: [char; 4] = ['i', 'I', 'n', 'N'];
const TYPE_STRING: [char; 4] = ['s', 'S', 't', 'T'];
const TYPE_STUFF: [char; 4] = ['u', 'U', 'f', 'F'];

const TO_HEX: [char; 16] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F',
];

fn from_hex(c: char) -> Option<u32> {
    match c {
        '0'..='9' => Some(c as u32 - '0' as u32),
        'A'..='F' => Some(c as u32 - 'A' as u32 + 10),
        _ => None,
    }
}

/// Number of hex digits for a value, and the index of the matching type tag.
fn number_width(value: i32) -> (usize, usize) {
    if (-8..=7).contains(&value) {
        (0, 1)
    } else if (i8::MIN as i32..=i8::MAX as i32).contains(&value) {
        (1, 2)
    } else if (i16::MIN as i32..=i16::MAX as i32).contains(&value) {
        (2, 4)
    } else {
        (3, 8)
    }
}

pub struct SimpleWriter {
    buffer: String,
}

impl SimpleWriter {
    pub fn new() -> Self {
        Self { buffer: String::from(BAG_SIG_V1) }
    }

    fn write_number(&mut self, tags: &[char; 4], value: i32) {
        let (tag, digits) = number_width(value);
        self.buffer.push(tags[tag]);
        let bits = value as u32;
        for i in (0..digits).rev() {
            self.buffer.push(TO_HEX[((bits >> (i * 4)) & 15) as usize]);
        }
    }
}

impl BagWriter for SimpleWriter {
    fn write_null(&mut self) {
        self.buffer.push(TYPE_NULL);
    }

    fn write_bool(&mut self, value: bool) {
        self.buffer.push(if value { TYPE_BOOL_TRUE } else { TYPE_BOOL_FALSE });
    }

    fn write_int(&mut self, value: i32) {
        self.write_number(&TYPE_INT, value);
    }

    fn write_string(&mut self, value: &str) {
        self.write_number(&TYPE_STRING, value.encode_utf16().count() as i32);
        self.buffer.push_str(value);
    }

    fn write_stuff_version(&mut self, version: i32) {
        self.write_number(&TYPE_STUFF, version);
    }

    fn finish(self: Box<Self>) -> String {
        self.buffer
    }
}

pub struct SimpleReader {
    chars: Vec<char>,
    // Index of the next character to read.
    pos: usize,
}

impl SimpleReader {
    pub fn new(input: &str) -> BagResult<Self> {
        let body = input.strip_prefix(BAG_SIG_V1).ok_or(BagUnpackError::MissingSignature)?;
        let mut chars: Vec<char> = BAG_SIG_V1.chars().collect();
        chars.extend(body.chars());
        Ok(Self { chars, pos: BAG_SIG_V1.len() })
    }

    fn read_char(&mut self) -> BagResult<char> {
        match self.chars.get(self.pos) {
            Some(&c) => {
                self.pos += 1;
                Ok(c)
            }
            None => Err(BagUnpackError::UnexpectedEnd { index: self.pos }),
        }
    }

    fn read_hex_digit(&mut self) -> BagResult<u32> {
        let c = self.read_char()?;
        from_hex(c).ok_or_else(|| BagUnpackError::Malformed {
            what: format!("hex=\"{}\"", c),
            index: self.pos - 1,
        })
    }

    fn read_number(&mut self, kind: &'static str, tags: &[char; 4]) -> BagResult<i32> {
        let tag = self.read_char()?;
        let digits = match tags.iter().position(|&t| t == tag) {
            Some(0) => 1,
            Some(1) => 2,
            Some(2) => 4,
            Some(_) => 8,
            None => return Err(BagUnpackError::UnexpectedType { kind, index: self.pos - 1 }),
        };

        let mut raw: u32 = 0;
        for _ in 0..digits {
            raw = (raw << 4) | self.read_hex_digit()?;
        }

        let shift = 32 - digits * 4;
        Ok(((raw << shift) as i32) >> shift)
    }
}

impl BagReader for SimpleReader {
    fn take_null(&mut self) -> BagResult<bool> {
        match self.chars.get(self.pos) {
            Some(&TYPE_NULL) => {
                self.pos += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(BagUnpackError::UnexpectedEnd { index: self.pos }),
        }
    }

    fn read_bool(&mut self) -> BagResult<bool> {
        match self.read_char()? {
            TYPE_BOOL_FALSE => Ok(false),
            TYPE_BOOL_TRUE => Ok(true),
            _ => Err(BagUnpackError::UnexpectedType { kind: "Boolean", index: self.pos - 1 }),
        }
    }

    fn read_int(&mut self) -> BagResult<i32> {
        self.read_number("Int", &TYPE_INT)
    }

    fn read_string(&mut self) -> BagResult<String> {
        let length = self.read_number("String", &TYPE_STRING)?;
        if length < 0 {
            return Err(BagUnpackError::Malformed {
                what: format!("string length={}", length),
                index: self.pos,
            });
        }

        let mut units = 0;
        let mut end = self.pos;
        while units < length as usize {
            let Some(c) = self.chars.get(end) else {
                return Err(BagUnpackError::UnexpectedEnd { index: self.chars.len() });
            };
            units += c.len_utf16();
            end += 1;
        }
        if units != length as usize {
            return Err(BagUnpackError::Malformed {
                what: format!("string length={} splits a surrogate pair", length),
                index: self.pos,
            });
        }

        let value: String = self.chars[self.pos..end].iter().collect();
        self.pos = end;
        Ok(value)
    }

    fn read_stuff_version(&mut self) -> BagResult<i32> {
        self.read_number("Stuff", &TYPE_STUFF)
    }

    fn index(&self) -> usize {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(f: impl FnOnce(&mut SimpleWriter)) -> String {
        let mut writer = SimpleWriter::new();
        f(&mut writer);
        Box::new(writer).finish()
    }

    #[test]
    fn numbers_pick_the_narrowest_width() {
        assert_eq!(written(|w| w.write_int(7)), "BAG1i7");
        assert_eq!(written(|w| w.write_int(-8)), "BAG1i8");
        assert_eq!(written(|w| w.write_int(-1)), "BAG1iF");
        assert_eq!(written(|w| w.write_int(100)), "BAG1I64");
        assert_eq!(written(|w| w.write_int(-100)), "BAG1I9C");
        assert_eq!(written(|w| w.write_int(1000)), "BAG1n03E8");
        assert_eq!(written(|w| w.write_int(70000)), "BAG1N00011170");
    }

    #[test]
    fn strings_and_stuff_use_their_own_tags() {
        assert_eq!(written(|w| w.write_string("ab")), "BAG1s2ab");
        assert_eq!(written(|w| w.write_stuff_version(1)), "BAG1u1");
        assert_eq!(
            written(|w| {
                w.write_null();
                w.write_bool(true);
                w.write_bool(false);
            }),
            "BAG1_Bb"
        );
    }

    #[test]
    fn numbers_are_sign_extended() {
        let mut reader = SimpleReader::new("BAG1iFI9Cn8000NFFFFFFFF").unwrap();
        assert_eq!(reader.read_int().unwrap(), -1);
        assert_eq!(reader.read_int().unwrap(), -100);
        assert_eq!(reader.read_int().unwrap(), i16::MIN as i32);
        assert_eq!(reader.read_int().unwrap(), -1);
    }

    #[test]
    fn string_length_counts_utf16_units() {
        let packed = written(|w| w.write_string("\u{2588}x"));
        assert_eq!(packed, "BAG1s2\u{2588}x");
        let mut reader = SimpleReader::new(&packed).unwrap();
        assert_eq!(reader.read_string().unwrap(), "\u{2588}x");

        let packed = written(|w| {
            w.write_string("\u{1F600}a");
            w.write_int(5);
        });
        assert_eq!(packed, "BAG1s3\u{1F600}ai5");
        let mut reader = SimpleReader::new(&packed).unwrap();
        assert_eq!(reader.read_string().unwrap(), "\u{1F600}a");
        assert_eq!(reader.read_int().unwrap(), 5);
    }

    #[test]
    fn length_ending_inside_a_surrogate_pair_is_malformed() {
        let mut reader = SimpleReader::new("BAG1s1\u{1F600}").unwrap();
        assert!(matches!(reader.read_string(), Err(BagUnpackError::Malformed { .. })));
    }

    #[test]
    fn bad_hex_digit_is_malformed() {
        let mut reader = SimpleReader::new("BAG1Ig0").unwrap();
        let err = reader.read_int().unwrap_err();
        assert!(matches!(err, BagUnpackError::Malformed { index: 5, .. }));
    }

    #[test]
    fn wrong_tag_is_unexpected_type() {
        let mut reader = SimpleReader::new("BAG1s1a").unwrap();
        assert_eq!(
            reader.read_int().unwrap_err(),
            BagUnpackError::UnexpectedType { kind: "Int", index: 4 }
        );
    }

    #[test]
    fn truncated_string_is_unexpected_end() {
        let mut reader = SimpleReader::new("BAG1s5ab").unwrap();
        assert!(matches!(reader.read_string(), Err(BagUnpackError::UnexpectedEnd { .. })));

        let mut reader = SimpleReader::new("BAG1N0001").unwrap();
        assert!(matches!(reader.read_int(), Err(BagUnpackError::UnexpectedEnd { .. })));
    }
}
