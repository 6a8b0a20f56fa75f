use std::num::ParseIntError;
use std::str::Utf8Error;

/// Errors raised while writing a snapshot.
#[derive(Debug)]
pub enum SerializeError {
    /// A text value holds a line break and cannot be written as one record.
    UnrepresentableText { key: i64 },
}

/// Errors raised while reading a snapshot.
#[derive(Debug)]
pub enum DeserializeError {
    /// The stream ended before the capacity line.
    MissingHeader,

    /// The capacity line is not a positive integer.
    InvalidHeader(String),
}

/// Why a snapshot record could not be parsed.
#[derive(Debug, PartialEq, Eq)]
pub enum RecordError {
    /// No `|` between bucket index and key.
    MissingBucketSeparator,

    /// No `:` between key and value.
    MissingValueSeparator,

    InvalidBucket(ParseIntError),

    InvalidKey(ParseIntError),

    InvalidInteger(ParseIntError),

    /// A quoted value without its closing quote.
    UnterminatedText,

    /// The line is not valid UTF-8.
    InvalidUtf8(Utf8Error),
}

/// Represents errors that can occur in the hash table
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Serialization failed
    Serialize(SerializeError),

    /// Deserialization failed
    Deserialize(DeserializeError),

    /// A table cannot be built with zero buckets
    InvalidCapacity,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HashTableError: {self:?}")
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<SerializeError> for Error {
    fn from(value: SerializeError) -> Self {
        Self::Serialize(value)
    }
}

impl From<DeserializeError> for Error {
    fn from(value: DeserializeError) -> Self {
        Self::Deserialize(value)
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(value: tempfile::PersistError) -> Self {
        Self::Io(value.error)
    }
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingBucketSeparator => f.write_str("missing '|' after bucket index"),
            Self::MissingValueSeparator => f.write_str("missing ':' after key"),
            Self::InvalidBucket(e) => write!(f, "invalid bucket index: {e}"),
            Self::InvalidKey(e) => write!(f, "invalid key: {e}"),
            Self::InvalidInteger(e) => write!(f, "invalid integer value: {e}"),
            Self::UnterminatedText => f.write_str("text value is missing its closing quote"),
            Self::InvalidUtf8(e) => write!(f, "line is not valid UTF-8: {e}"),
        }
    }
}

/// Hash table result
pub type Result<T> = std::result::Result<T, Error>;
