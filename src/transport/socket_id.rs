//! Type-safe socket identifier.
//!
//! [`SocketId`] is a newtype around a `u64` handed out by a transport when
//! a socket is created. It is what socket handles compare and hash by.

use std::fmt;

/// Unique identifier for a socket within one transport.
///
/// Assigned once when the socket is created and never reused by the same
/// transport instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SocketId(u64);

impl SocketId {
    /// Creates a `SocketId` from its raw value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket#{}", self.0)
    }
}

impl From<SocketId> for u64 {
    fn from(id: SocketId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_prefixed() {
        assert_eq!(SocketId::from_raw(7).to_string(), "socket#7");
    }

    #[test]
    fn raw_round_trip() {
        let id = SocketId::from_raw(42);
        assert_eq!(id.as_u64(), 42);
        assert_eq!(u64::from(id), 42);
    }

    #[test]
    fn hash_works_in_hashmap() {
        use std::collections::HashMap;
        let id = SocketId::from_raw(1);
        let mut map = HashMap::new();
        map.insert(id, "control");
        assert_eq!(map.get(&id), Some(&"control"));
        assert_eq!(map.get(&SocketId::from_raw(2)), None);
    }
}
