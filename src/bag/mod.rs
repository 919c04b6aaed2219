// ============================================================================
// BAG - positional, versioned serialization container
// ============================================================================
//
// A bag is a flat sequence of nullable primitives (bool, int, string) and
// "stuff" values. A stuff is a nested object prefixed with the format version
// its packer wrote; the unpacker receives that version and decides how to read
// the fields that follow. Fields are never keyed: the unpacker must read them
// in exactly the order the packer wrote them.
//
// Two wire formats exist, told apart by a 4-character signature:
//   BAG1  legacy text format with single-character type tags and hex numbers
//   BAG2  prefix-free type codes packed into a base64 bitstream (default)

mod bitstream;
mod simple;

use thiserror::Error;

use crate::error::IllegalArgument;

pub use bitstream::{BitstreamReader, BitstreamWriter};
pub use simple::{SimpleReader, SimpleWriter};

/// Signature of the legacy text format.
pub const BAG_SIG_V1: &str = "BAG1";
/// Signature of the current bitstream format.
pub const BAG_SIG_V2: &str = "BAG2";

/// Wire format used when packing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BagFormat {
    /// `BAG1` text format. Only used to produce data for migration tests and tools.
    Legacy,
    /// `BAG2` bitstream format.
    #[default]
    Bitstream,
}

impl BagFormat {
    pub fn signature(self) -> &'static str {
        match self {
            BagFormat::Legacy => BAG_SIG_V1,
            BagFormat::Bitstream => BAG_SIG_V2,
        }
    }

    /// Detect the format from a packed string.
    pub fn detect(input: &str) -> Option<Self> {
        if input.starts_with(BAG_SIG_V1) {
            Some(BagFormat::Legacy)
        } else if input.starts_with(BAG_SIG_V2) {
            Some(BagFormat::Bitstream)
        } else {
            None
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Every way reading a bag can fail. Loading is all-or-nothing, so callers
/// propagate these unchanged and keep their previous state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BagUnpackError {
    #[error("Missing bag signature")]
    MissingSignature,

    #[error("Unsupported version={version} for {kind}")]
    UnsupportedVersion { kind: &'static str, version: i32 },

    #[error("Unknown polymorphic type={ty} for {kind}")]
    UnknownPolymorphicType { kind: &'static str, ty: i32 },

    #[error("Unexpected end of the bag while reading at index={index}")]
    UnexpectedEnd { index: usize },

    #[error("Unexpected type while reading {kind} at index={index}")]
    UnexpectedType { kind: &'static str, index: usize },

    #[error("Unexpected null-value while reading {kind} at index={index}")]
    UnexpectedNull { kind: &'static str, index: usize },

    #[error("Can't decode {what} at index={index}")]
    Malformed { what: String, index: usize },

    #[error("Mismatched type: expected {expected}, found {found}")]
    MismatchedType { expected: &'static str, found: &'static str },

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),
}

impl From<IllegalArgument> for BagUnpackError {
    fn from(e: IllegalArgument) -> Self {
        BagUnpackError::IllegalArgument(e.0)
    }
}

pub type BagResult<T> = Result<T, BagUnpackError>;

/// Fail with [`BagUnpackError::UnsupportedVersion`] when `version` is newer than `max_version`.
pub fn require_supported_stuff_version(kind: &'static str, max_version: i32, version: i32) -> BagResult<()> {
    if version > max_version {
        Err(BagUnpackError::UnsupportedVersion { kind, version })
    } else {
        Ok(())
    }
}

// ============================================================================
// STUFF TRAITS
// ============================================================================

/// A type that can be written into a bag as a versioned stuff.
pub trait BagStuffPacker {
    /// Format version written in front of the payload.
    const PUT_IN_THE_BAG_VERSION: i32;

    fn put_in_the_bag(&self, bag: &mut PackableBag);
}

/// A type that can be read back from a bag, given the version found in the stream.
pub trait BagStuffUnpacker: Sized {
    fn get_out_of_the_bag(version: i32, bag: &mut UnpackableBag) -> BagResult<Self>;
}

// ============================================================================
// WIRE CODECS
// ============================================================================

/// Low-level writer for one wire format.
pub trait BagWriter {
    fn write_null(&mut self);
    fn write_bool(&mut self, value: bool);
    fn write_int(&mut self, value: i32);
    fn write_string(&mut self, value: &str);
    fn write_stuff_version(&mut self, version: i32);
    fn finish(self: Box<Self>) -> String;
}

/// Low-level reader for one wire format.
pub trait BagReader {
    /// Consume a null marker if the next value is null.
    fn take_null(&mut self) -> BagResult<bool>;
    fn read_bool(&mut self) -> BagResult<bool>;
    fn read_int(&mut self) -> BagResult<i32>;
    fn read_string(&mut self) -> BagResult<String>;
    fn read_stuff_version(&mut self) -> BagResult<i32>;
    /// Position used in error messages.
    fn index(&self) -> usize;
}

// ============================================================================
// PACKABLE BAG
// ============================================================================

pub struct PackableBag {
    writer: Box<dyn BagWriter>,
}

impl Default for PackableBag {
    fn default() -> Self {
        Self::new()
    }
}

impl PackableBag {
    /// New bag in the current (`BAG2`) format.
    pub fn new() -> Self {
        Self::with_format(BagFormat::Bitstream)
    }

    pub fn with_format(format: BagFormat) -> Self {
        let writer: Box<dyn BagWriter> = match format {
            BagFormat::Legacy => Box::new(SimpleWriter::new()),
            BagFormat::Bitstream => Box::new(BitstreamWriter::new()),
        };
        Self { writer }
    }

    pub fn put_null(&mut self) {
        self.writer.write_null();
    }

    pub fn put_bool(&mut self, value: bool) {
        self.writer.write_bool(value);
    }

    pub fn put_int(&mut self, value: i32) {
        self.writer.write_int(value);
    }

    pub fn put_string(&mut self, value: &str) {
        self.writer.write_string(value);
    }

    pub fn put_bool_or_null(&mut self, value: Option<bool>) {
        match value {
            Some(v) => self.put_bool(v),
            None => self.put_null(),
        }
    }

    pub fn put_int_or_null(&mut self, value: Option<i32>) {
        match value {
            Some(v) => self.put_int(v),
            None => self.put_null(),
        }
    }

    pub fn put_string_or_null(&mut self, value: Option<&str>) {
        match value {
            Some(v) => self.put_string(v),
            None => self.put_null(),
        }
    }

    pub fn put_stuff<T: BagStuffPacker + ?Sized>(&mut self, value: &T) {
        self.writer.write_stuff_version(T::PUT_IN_THE_BAG_VERSION);
        value.put_in_the_bag(self);
    }

    pub fn put_stuff_or_null<T: BagStuffPacker>(&mut self, value: Option<&T>) {
        match value {
            Some(v) => self.put_stuff(v),
            None => self.put_null(),
        }
    }

    /// Write an ad-hoc stuff: used for polymorphic payloads that have no type of their own.
    pub fn put_stuff_with<F>(&mut self, version: i32, packer: F)
    where
        F: FnOnce(&mut PackableBag),
    {
        self.writer.write_stuff_version(version);
        packer(self);
    }

    /// Size-prefixed list.
    pub fn put_list<T, F>(&mut self, items: &[T], mut packer: F)
    where
        F: FnMut(&mut PackableBag, &T),
    {
        self.put_int(items.len() as i32);
        for item in items {
            packer(self, item);
        }
    }

    /// The packed document, signature included.
    pub fn into_string(self) -> String {
        self.writer.finish()
    }
}

// ============================================================================
// UNPACKABLE BAG
// ============================================================================

pub struct UnpackableBag {
    reader: Box<dyn BagReader>,
    format: BagFormat,
}

impl UnpackableBag {
    /// Open a packed document, choosing the decoder by its signature.
    pub fn new(input: &str) -> BagResult<Self> {
        let format = BagFormat::detect(input).ok_or(BagUnpackError::MissingSignature)?;
        let reader: Box<dyn BagReader> = match format {
            BagFormat::Legacy => Box::new(SimpleReader::new(input)?),
            BagFormat::Bitstream => Box::new(BitstreamReader::new(input)?),
        };
        Ok(Self { reader, format })
    }

    pub fn format(&self) -> BagFormat {
        self.format
    }

    /// Position of the next value in the packed string.
    pub fn index(&self) -> usize {
        self.reader.index()
    }

    pub fn get_bool(&mut self) -> BagResult<bool> {
        self.require_not_null("Boolean")?;
        self.reader.read_bool()
    }

    pub fn get_int(&mut self) -> BagResult<i32> {
        self.require_not_null("Int")?;
        self.reader.read_int()
    }

    pub fn get_string(&mut self) -> BagResult<String> {
        self.require_not_null("String")?;
        self.reader.read_string()
    }

    pub fn get_bool_or_null(&mut self) -> BagResult<Option<bool>> {
        if self.reader.take_null()? {
            Ok(None)
        } else {
            self.reader.read_bool().map(Some)
        }
    }

    pub fn get_int_or_null(&mut self) -> BagResult<Option<i32>> {
        if self.reader.take_null()? {
            Ok(None)
        } else {
            self.reader.read_int().map(Some)
        }
    }

    pub fn get_string_or_null(&mut self) -> BagResult<Option<String>> {
        if self.reader.take_null()? {
            Ok(None)
        } else {
            self.reader.read_string().map(Some)
        }
    }

    pub fn get_stuff<T: BagStuffUnpacker>(&mut self) -> BagResult<T> {
        self.get_stuff_with(T::get_out_of_the_bag)
    }

    pub fn get_stuff_or_null<T: BagStuffUnpacker>(&mut self) -> BagResult<Option<T>> {
        if self.reader.take_null()? {
            return Ok(None);
        }
        let version = self.reader.read_stuff_version()?;
        T::get_out_of_the_bag(version, self).map(Some)
    }

    /// Read a stuff with an explicit unpacker, for payloads that need outside
    /// context (a canvas payload needs its dimensions) or have no type of their own.
    pub fn get_stuff_with<T, F>(&mut self, unpacker: F) -> BagResult<T>
    where
        F: FnOnce(i32, &mut UnpackableBag) -> BagResult<T>,
    {
        self.require_not_null("Stuff")?;
        let version = self.reader.read_stuff_version()?;
        unpacker(version, self)
    }

    /// Size-prefixed list.
    pub fn get_list<T, F>(&mut self, mut unpacker: F) -> BagResult<Vec<T>>
    where
        F: FnMut(&mut UnpackableBag) -> BagResult<T>,
    {
        let size = self.get_int()?;
        if size < 0 {
            return Err(BagUnpackError::IllegalArgument(format!("Negative list size={}", size)));
        }
        let mut items = Vec::with_capacity((size as usize).min(1024));
        for _ in 0..size {
            items.push(unpacker(self)?);
        }
        Ok(items)
    }

    fn require_not_null(&mut self, kind: &'static str) -> BagResult<()> {
        if self.reader.take_null()? {
            Err(BagUnpackError::UnexpectedNull { kind, index: self.reader.index() })
        } else {
            Ok(())
        }
    }
}

/// Pack a single stuff into a fresh bag of the given format.
pub fn pack_stuff<T: BagStuffPacker + ?Sized>(value: &T, format: BagFormat) -> String {
    let mut bag = PackableBag::with_format(format);
    bag.put_stuff(value);
    bag.into_string()
}

/// Unpack a single stuff from a packed string.
pub fn unpack_stuff<T: BagStuffUnpacker>(input: &str) -> BagResult<T> {
    UnpackableBag::new(input)?.get_stuff()
}
