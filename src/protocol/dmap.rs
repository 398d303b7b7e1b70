//! Tag-length-value codec for DMAP responses.
//!
//! # Wire Format
//!
//! Every element is laid out as:
//!
//! ```text
//! tag:     4 bytes, ASCII content code
//! length:  4 bytes, big-endian unsigned payload length
//! payload: `length` bytes, interpreted according to the tag's content code
//! ```
//!
//! Containers hold more elements in their payload. A response body is a
//! sequence of elements without an outer length prefix, so the top level
//! extends to the end of the body.
//!
//! # Decoding Rules
//!
//! * Integers are big-endian and signed, of the width their type prescribes
//! * Strings are UTF-8; invalid sequences are replaced
//! * Zero-length elements are dropped
//! * Numeric elements of the wrong width are dropped with a warning
//! * Unknown tags follow the configured [`UnknownTagPolicy`]
//! * Reading past the end of the input is a [`DataLoss`] error
//!
//! [`DataLoss`]: crate::error::ErrorKind::DataLoss
//!
//! # Example
//!
//! ```rust
//! use daapr::protocol::{content_codes::{Dictionary, Tag}, dmap::Codec};
//!
//! let dictionary = Dictionary::default();
//! let codec = Codec::new(&dictionary);
//! let tree = codec.decode(&body)?;
//! let session_id = tree
//!     .container(Tag::LOGIN_RESPONSE)
//!     .and_then(|login| login.integer(Tag::SESSION_ID));
//! ```

use std::fmt;

use time::OffsetDateTime;

use super::content_codes::{ContentCode, Dictionary, Tag, WireType};
use crate::error::{Error, Result};

/// Length of the tag and length fields preceding each payload.
pub const HEADER_LENGTH: usize = 8;

/// A decoded element payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    Text(String),
    Timestamp(OffsetDateTime),
    Version(Version),
    Container(Container),
}

impl Value {
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_container(&self) -> Option<&Container> {
        match self {
            Self::Container(container) => Some(container),
            _ => None,
        }
    }
}

/// A protocol version as carried by `mpro` and `apro`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u16,
    pub minor: u8,
    pub patch: u8,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Ordered elements of a container.
///
/// Tags may repeat: a listing holds one `mlit` per item.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Container(Vec<(Tag, Value)>);

impl Container {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tag: Tag, value: Value) {
        self.0.push((tag, value));
    }

    /// Builder-style [`push`](Self::push).
    #[must_use]
    pub fn with(mut self, tag: Tag, value: Value) -> Self {
        self.push(tag, value);
        self
    }

    /// First value under `tag`.
    #[must_use]
    pub fn get(&self, tag: Tag) -> Option<&Value> {
        self.all(tag).next()
    }

    /// All values under `tag`, in wire order.
    pub fn all(&self, tag: Tag) -> impl Iterator<Item = &Value> {
        self.0
            .iter()
            .filter(move |(element, _)| *element == tag)
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn integer(&self, tag: Tag) -> Option<i64> {
        self.get(tag).and_then(Value::as_integer)
    }

    #[must_use]
    pub fn text(&self, tag: Tag) -> Option<&str> {
        self.get(tag).and_then(Value::as_text)
    }

    #[must_use]
    pub fn container(&self, tag: Tag) -> Option<&Container> {
        self.get(tag).and_then(Value::as_container)
    }

    /// Descends through the first container under each tag of `path`.
    #[must_use]
    pub fn descend(&self, path: &[Tag]) -> Option<&Container> {
        path.iter()
            .try_fold(self, |container, tag| container.container(*tag))
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Tag, Value)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// What to do with elements whose tag is not in the dictionary.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum UnknownTagPolicy {
    /// Warn and move past the payload.
    #[default]
    Skip,
    /// Fail the whole decode.
    Reject,
}

/// Decoder and encoder bound to a content code dictionary.
#[derive(Copy, Clone, Debug)]
pub struct Codec<'a> {
    dictionary: &'a Dictionary,
    unknown_tags: UnknownTagPolicy,
}

impl<'a> Codec<'a> {
    /// Containers nested deeper than this are rejected.
    ///
    /// Real responses nest four or five levels; the limit keeps hostile
    /// input from exhausting the stack.
    pub const MAX_DEPTH: usize = 32;

    #[must_use]
    pub fn new(dictionary: &'a Dictionary) -> Self {
        Self {
            dictionary,
            unknown_tags: UnknownTagPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_unknown_tags(mut self, policy: UnknownTagPolicy) -> Self {
        self.unknown_tags = policy;
        self
    }

    /// Decodes a complete response body.
    ///
    /// # Errors
    ///
    /// Returns [`DataLoss`](crate::error::ErrorKind::DataLoss) if:
    /// * an element header or payload extends past the end of its container
    /// * containers nest deeper than [`MAX_DEPTH`](Self::MAX_DEPTH)
    /// * an unknown tag is met while rejecting unknown tags
    pub fn decode(&self, bytes: &[u8]) -> Result<Container> {
        self.decode_container(bytes, 0)
    }

    fn decode_container(&self, mut bytes: &[u8], depth: usize) -> Result<Container> {
        if depth > Self::MAX_DEPTH {
            return Err(Error::data_loss(format!(
                "containers nested deeper than {} levels",
                Self::MAX_DEPTH
            )));
        }

        let mut container = Container::new();
        while !bytes.is_empty() {
            let Some((header, rest)) = bytes.split_first_chunk::<HEADER_LENGTH>() else {
                return Err(Error::data_loss(format!(
                    "element header truncated: {} of {} bytes",
                    bytes.len(),
                    HEADER_LENGTH
                )));
            };

            let tag = Tag([header[0], header[1], header[2], header[3]]);
            let length = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
            if rest.len() < length {
                return Err(Error::data_loss(format!(
                    "{tag}: {length} bytes declared but {} remain",
                    rest.len()
                )));
            }

            let (payload, rest) = rest.split_at(length);
            bytes = rest;

            if payload.is_empty() {
                continue;
            }

            let Some(code) = self.dictionary.lookup(tag) else {
                match self.unknown_tags {
                    UnknownTagPolicy::Skip => {
                        warn!("skipping unknown tag {tag} ({length} bytes)");
                        continue;
                    }
                    UnknownTagPolicy::Reject => {
                        return Err(Error::data_loss(format!("unknown tag {tag}")));
                    }
                }
            };

            if let Some(value) = self.decode_value(code, payload, depth)? {
                container.push(tag, value);
            }
        }

        Ok(container)
    }

    /// Decodes one payload. `None` means the element is dropped.
    fn decode_value(
        &self,
        code: &ContentCode,
        payload: &[u8],
        depth: usize,
    ) -> Result<Option<Value>> {
        let tag = code.tag;
        if let Some(width) = code.wire_type.width() {
            if payload.len() != width {
                warn!(
                    "{tag}: expected {width} bytes for {:?} but got {}",
                    code.wire_type,
                    payload.len()
                );
                return Ok(None);
            }
        }

        let value = match code.wire_type {
            WireType::Byte | WireType::Short | WireType::Long | WireType::LongLong => {
                signed(payload).map(Value::Integer)
            }
            WireType::String => Some(Value::Text(String::from_utf8_lossy(payload).into_owned())),
            WireType::Date => match (payload.len(), signed(payload)) {
                (4 | 8, Some(seconds)) => match OffsetDateTime::from_unix_timestamp(seconds) {
                    Ok(date) => Some(Value::Timestamp(date)),
                    Err(e) => {
                        warn!("{tag}: {e}");
                        None
                    }
                },
                (length, _) => {
                    warn!("{tag}: dates are 4 or 8 bytes but got {length}");
                    None
                }
            },
            WireType::VersionTriple => match *payload {
                [major_hi, major_lo, minor, patch] => Some(Value::Version(Version {
                    major: u16::from_be_bytes([major_hi, major_lo]),
                    minor,
                    patch,
                })),
                _ => None,
            },
            WireType::Container => Some(Value::Container(
                self.decode_container(payload, depth + 1)?,
            )),
        };

        Ok(value)
    }

    /// Encodes a container into its wire format.
    ///
    /// Integers are written in the width their content code prescribes and
    /// dates as 8 bytes. Empty strings and empty containers are left out.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgument`](crate::error::ErrorKind::InvalidArgument) if:
    /// * a tag is unknown to the dictionary
    /// * a value does not match the type of its content code
    /// * an integer does not fit its width
    pub fn encode(&self, container: &Container) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_into(container, &mut out)?;
        Ok(out)
    }

    fn encode_into(&self, container: &Container, out: &mut Vec<u8>) -> Result<()> {
        for (tag, value) in container.iter() {
            let code = self
                .dictionary
                .lookup(*tag)
                .ok_or_else(|| Error::invalid_argument(format!("unknown tag {tag}")))?;

            let mut payload = Vec::new();
            match (code.wire_type, value) {
                (WireType::Byte, Value::Integer(v)) => {
                    let v = i8::try_from(*v).map_err(|e| out_of_width(*tag, e))?;
                    payload.extend(v.to_be_bytes());
                }
                (WireType::Short, Value::Integer(v)) => {
                    let v = i16::try_from(*v).map_err(|e| out_of_width(*tag, e))?;
                    payload.extend(v.to_be_bytes());
                }
                (WireType::Long, Value::Integer(v)) => {
                    let v = i32::try_from(*v).map_err(|e| out_of_width(*tag, e))?;
                    payload.extend(v.to_be_bytes());
                }
                (WireType::LongLong, Value::Integer(v)) => payload.extend(v.to_be_bytes()),
                (WireType::String, Value::Text(text)) => payload.extend(text.as_bytes()),
                (WireType::Date, Value::Timestamp(date)) => {
                    payload.extend(date.unix_timestamp().to_be_bytes());
                }
                (WireType::VersionTriple, Value::Version(version)) => {
                    payload.extend(version.major.to_be_bytes());
                    payload.push(version.minor);
                    payload.push(version.patch);
                }
                (WireType::Container, Value::Container(inner)) => {
                    self.encode_into(inner, &mut payload)?;
                }
                (wire_type, _) => {
                    return Err(Error::invalid_argument(format!(
                        "{tag}: value does not match {wire_type:?}"
                    )));
                }
            }

            // Decoding drops zero-length elements, so they are never written.
            if payload.is_empty() {
                continue;
            }

            let length = u32::try_from(payload.len())
                .map_err(|_| Error::invalid_argument(format!("{tag}: payload too large")))?;
            out.extend(tag.as_bytes());
            out.extend(length.to_be_bytes());
            out.extend(payload);
        }

        Ok(())
    }
}

/// Reads a big-endian signed integer of 1, 2, 4 or 8 bytes.
fn signed(payload: &[u8]) -> Option<i64> {
    match *payload {
        [a] => Some(i64::from(i8::from_be_bytes([a]))),
        [a, b] => Some(i64::from(i16::from_be_bytes([a, b]))),
        [a, b, c, d] => Some(i64::from(i32::from_be_bytes([a, b, c, d]))),
        [a, b, c, d, e, f, g, h] => Some(i64::from_be_bytes([a, b, c, d, e, f, g, h])),
        _ => None,
    }
}

fn out_of_width(tag: Tag, e: std::num::TryFromIntError) -> Error {
    Error::invalid_argument(format!("{tag}: {e}"))
}
