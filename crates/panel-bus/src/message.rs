//! Message type tags.
//!
//! Every message on the bus carries a [`MessageType`]: a small bitmask with
//! one bit per direction/medium pair plus an independent event bit.
//! Subscribers declare an accepted mask and take a message iff the
//! intersection is not [`MessageType::NO_OUTLET`].

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Bitmask tag attached to every message published on the [`Broker`](crate::Broker).
///
/// # Examples
///
/// ```
/// use panel_bus::MessageType;
///
/// let mask = MessageType::INBOUND_ANY;
/// assert!(MessageType::INBOUND_WIRED.intersects(mask));
/// assert!(!MessageType::OUTBOUND_WIRED.intersects(mask));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MessageType(u16);

impl MessageType {
    /// Not meant for any outlet.
    pub const NO_OUTLET: Self = Self(0);
    /// Inbound message received over the wired (serial) link.
    pub const INBOUND_WIRED: Self = Self(1);
    /// Inbound message received over the wireless (WebSocket) link.
    pub const INBOUND_WIRELESS: Self = Self(1 << 1);
    /// Outbound message to be sent over the wired link.
    pub const OUTBOUND_WIRED: Self = Self(1 << 2);
    /// Outbound message to be sent over the wireless link.
    pub const OUTBOUND_WIRELESS: Self = Self(1 << 3);
    /// Event message, re-published by parsers for downstream consumers.
    pub const EVENT: Self = Self(1 << 4);
    /// Any inbound message.
    pub const INBOUND_ANY: Self = Self(Self::INBOUND_WIRED.0 | Self::INBOUND_WIRELESS.0);
    /// Any outbound message.
    pub const OUTBOUND_ANY: Self = Self(Self::OUTBOUND_WIRED.0 | Self::OUTBOUND_WIRELESS.0);

    const NAMED: [(Self, &'static str); 5] = [
        (Self::INBOUND_WIRED, "InboundWired"),
        (Self::INBOUND_WIRELESS, "InboundWireless"),
        (Self::OUTBOUND_WIRED, "OutboundWired"),
        (Self::OUTBOUND_WIRELESS, "OutboundWireless"),
        (Self::EVENT, "Event"),
    ];

    /// Build a tag from raw bits. Bits above the event bit are kept as-is.
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw bit representation.
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// True for the [`NO_OUTLET`](Self::NO_OUTLET) sentinel.
    pub const fn is_no_outlet(self) -> bool {
        self.0 == 0
    }

    /// Subscription filter: true iff `self & mask != NO_OUTLET`.
    pub const fn intersects(self, mask: Self) -> bool {
        self.0 & mask.0 != 0
    }
}

impl BitAnd for MessageType {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitOr for MessageType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MessageType {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_no_outlet() {
            return f.write_str("NoOutlet");
        }
        let mut first = true;
        for (flag, name) in Self::NAMED {
            if self.intersects(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        let unknown = self.0 & !0x1f;
        if unknown != 0 {
            if !first {
                f.write_str("|")?;
            }
            write!(f, "{unknown:#x}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const DIRECTIONAL: [MessageType; 4] = [
        MessageType::INBOUND_WIRED,
        MessageType::INBOUND_WIRELESS,
        MessageType::OUTBOUND_WIRED,
        MessageType::OUTBOUND_WIRELESS,
    ];

    fn combination(bits: u16) -> MessageType {
        DIRECTIONAL
            .iter()
            .enumerate()
            .filter(|(i, _)| bits & (1 << i) != 0)
            .fold(MessageType::NO_OUTLET, |acc, (_, t)| acc | *t)
    }

    #[test]
    fn filter_matches_bitwise_and_for_every_combination() {
        for m in 0..16u16 {
            for mask in 0..16u16 {
                for event in [false, true] {
                    let mut msg = combination(m);
                    let mut accepted = combination(mask);
                    if event {
                        msg |= MessageType::EVENT;
                        accepted |= MessageType::EVENT;
                    }
                    let expected = (msg & accepted) != MessageType::NO_OUTLET;
                    assert_eq!(msg.intersects(accepted), expected, "{msg} vs {accepted}");
                }
            }
        }
    }

    #[test]
    fn event_bit_is_independent() {
        for t in DIRECTIONAL {
            assert!(!t.intersects(MessageType::EVENT));
        }
        assert!(MessageType::EVENT.intersects(MessageType::EVENT));
    }

    #[test]
    fn no_outlet_never_matches() {
        assert!(!MessageType::NO_OUTLET.intersects(MessageType::from_bits(0xffff)));
        assert!(MessageType::NO_OUTLET.is_no_outlet());
    }

    #[test]
    fn any_masks_cover_both_media() {
        assert_eq!(
            MessageType::INBOUND_ANY,
            MessageType::INBOUND_WIRED | MessageType::INBOUND_WIRELESS
        );
        assert_eq!(MessageType::OUTBOUND_ANY.bits(), 0b1100);
    }

    #[test]
    fn display_lists_set_flags() {
        assert_eq!(MessageType::NO_OUTLET.to_string(), "NoOutlet");
        assert_eq!(MessageType::EVENT.to_string(), "Event");
        assert_eq!(
            MessageType::INBOUND_ANY.to_string(),
            "InboundWired|InboundWireless"
        );
        assert_eq!(MessageType::from_bits(0x21).to_string(), "InboundWired|0x20");
    }
}
