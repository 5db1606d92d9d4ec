use serde::Serialize;
use std::{fmt, num::ParseIntError, str};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        #[repr(C)]
        pub struct $name(u32);

        impl $name {
            pub const fn new(id: u32) -> Self {
                Self(id)
            }

            #[inline]
            pub const fn into_u32(self) -> u32 {
                self.0
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }

        impl str::FromStr for $name {
            type Err = ParseIntError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
        impl fmt::LowerHex for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::LowerHex::fmt(&self.0, f)
            }
        }
        impl fmt::UpperHex for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::UpperHex::fmt(&self.0, f)
            }
        }
    };
}

numeric_id! {
    /// Identifier of a multicast flow.
    ///
    /// Assigned by the classifier. The monitor never looks inside it, it
    /// is only used as a key.
    FlowId
}

numeric_id! {
    /// Identifier of a packet, unique within its [`FlowId`].
    ///
    /// `(FlowId, PacketId)` identifies a packet across the whole simulation.
    PacketId
}

numeric_id! {
    /// Identifier of a node of the simulated network.
    ///
    /// Used both for the node a probe is attached to and for the
    /// destinations of a multicast group.
    NodeId
}

numeric_id! {
    /// Identifier given by the monitor to a registered probe.
    ProbeId
}

impl PacketId {
    #[must_use = "function does not modify the current value"]
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl FlowId {
    #[must_use = "function does not modify the current value"]
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print() {
        assert_eq!(format!("{}", FlowId::new(42)), "42");
        assert_eq!(format!("{:x}", NodeId::new(42)), "2a");
        assert_eq!(format!("{:X}", PacketId::new(42)), "2A");
    }

    #[test]
    fn parse() {
        assert_eq!("42".parse::<NodeId>().unwrap(), NodeId::new(42));
        assert!("-1".parse::<FlowId>().is_err());
    }

    #[test]
    fn next_wraps() {
        assert_eq!(PacketId::new(u32::MAX).next(), PacketId::new(0));
        assert_eq!(FlowId::new(1).next(), FlowId::new(2));
    }
}
