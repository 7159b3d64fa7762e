//! Opaque resumption token (spec §3, §4.A).

use crate::error::SinkError;
use crate::pb;

/// The block a [`Cursor`] points to. Identity is `id`; `number` is
/// informational (spec §3).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockRef {
    pub id: String,
    pub number: u64,
}

impl From<pb::BlockRef> for BlockRef {
    fn from(b: pb::BlockRef) -> Self {
        BlockRef { id: b.id, number: b.number }
    }
}

/// An opaque, non-empty resumption token plus the block it points to.
///
/// The empty string is the sentinel "begin" cursor: `Cursor::parse("")`
/// succeeds and returns a cursor whose [`Cursor::block`] is the zero value,
/// meaning "start from the configured start block".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cursor {
    raw: String,
    block: BlockRef,
}

impl Cursor {
    /// The sentinel cursor meaning "no resume position yet".
    pub fn begin() -> Self {
        Cursor { raw: String::new(), block: BlockRef::default() }
    }

    /// Parse a cursor string as received from the server. The empty string
    /// always parses to [`Cursor::begin`]. Any other value must decode as
    /// base64 of `"{number}:{id}"`, or [`SinkError::InvalidCursor`] is
    /// returned — the wire format the server actually emits is opaque to
    /// the sinker, but it must still be able to recover the block it points
    /// to in order to enforce invariant 2 of spec §8.
    pub fn parse(s: &str) -> Result<Self, SinkError> {
        if s.is_empty() {
            return Ok(Cursor::begin());
        }

        let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, s)
            .map_err(|_| SinkError::InvalidCursor(s.to_string()))?;
        let decoded = String::from_utf8(decoded).map_err(|_| SinkError::InvalidCursor(s.to_string()))?;
        let (number, id) = decoded
            .split_once(':')
            .ok_or_else(|| SinkError::InvalidCursor(s.to_string()))?;
        let number: u64 = number.parse().map_err(|_| SinkError::InvalidCursor(s.to_string()))?;

        Ok(Cursor { raw: s.to_string(), block: BlockRef { id: id.to_string(), number } })
    }

    /// Construct a cursor from a raw string already known to be well-formed
    /// (e.g. as echoed back by the server in a `BlockScopedData` message),
    /// re-deriving the block reference. Equivalent to `parse` but named for
    /// the call site that already has the string handy.
    pub fn from_raw(raw: String) -> Result<Self, SinkError> {
        Self::parse(&raw)
    }

    /// Round-trips: `Cursor::parse(c.as_str()) == c`.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn block(&self) -> &BlockRef {
        &self.block
    }

    pub fn is_begin(&self) -> bool {
        self.raw.is_empty()
    }
}

impl fmt_impl::Display for Cursor {
    fn fmt(&self, f: &mut fmt_impl::Formatter<'_>) -> fmt_impl::Result {
        write!(f, "{}", self.raw)
    }
}

use std::fmt as fmt_impl;

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(number: u64, id: &str) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(format!("{number}:{id}"))
    }

    #[test]
    fn begin_cursor_round_trips() {
        let c = Cursor::parse("").unwrap();
        assert!(c.is_begin());
        assert_eq!(c.as_str(), "");
        assert_eq!(c.block(), &BlockRef::default());
    }

    #[test]
    fn parse_string_round_trip() {
        let raw = encode(104, "0xabc");
        let c = Cursor::parse(&raw).unwrap();
        assert_eq!(c.as_str(), raw);
        assert_eq!(c.block().number, 104);
        assert_eq!(c.block().id, "0xabc");

        let reparsed = Cursor::parse(c.as_str()).unwrap();
        assert_eq!(reparsed, c);
    }

    #[test]
    fn invalid_cursor_is_rejected() {
        let err = Cursor::parse("not-valid-base64!!").unwrap_err();
        assert!(matches!(err, SinkError::InvalidCursor(_)));
    }
}
