//! Acceptance filters and masks
//!
//! The MCP2515 discards incoming frames in hardware using six acceptance
//! filters (RXF0..RXF5) and two masks (one per receive buffer). Filters and
//! masks share the SIDH/SIDL/EID8/EID0 register layout used by the transmit
//! and receive buffers; all four bytes are written as a single block while the
//! device sits in configuration mode.

use crate::registers::{Register, SIDL_EXIDE_MASK};

/// One of the six acceptance filter slots
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AcceptanceFilter {
    Rxf0,
    Rxf1,
    Rxf2,
    Rxf3,
    Rxf4,
    Rxf5,
}

impl AcceptanceFilter {
    pub const ALL: [Self; 6] = [Self::Rxf0, Self::Rxf1, Self::Rxf2, Self::Rxf3, Self::Rxf4, Self::Rxf5];

    pub(crate) fn sidh_register(self) -> Register {
        match self {
            Self::Rxf0 => Register::Rxf0Sidh,
            Self::Rxf1 => Register::Rxf1Sidh,
            Self::Rxf2 => Register::Rxf2Sidh,
            Self::Rxf3 => Register::Rxf3Sidh,
            Self::Rxf4 => Register::Rxf4Sidh,
            Self::Rxf5 => Register::Rxf5Sidh,
        }
    }
}

/// One of the two acceptance mask slots
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AcceptanceMask {
    Mask0,
    Mask1,
}

impl AcceptanceMask {
    pub const ALL: [Self; 2] = [Self::Mask0, Self::Mask1];

    pub(crate) fn sidh_register(self) -> Register {
        match self {
            Self::Mask0 => Register::Rxm0Sidh,
            Self::Mask1 => Register::Rxm1Sidh,
        }
    }
}

/// Serializes an 11-bit or 29-bit identifier into the SIDH/SIDL/EID8/EID0
/// register block. The extended flag is encoded in the EXIDE bit of SIDL.
pub(crate) fn serialize_id(extended: bool, id: u32) -> [u8; 4] {
    let mut buffer = [0u8; 4];

    if extended {
        let low = (id & 0xFFFF) as u16;
        buffer[3] = (low & 0xFF) as u8;
        buffer[2] = (low >> 8) as u8;

        let high = (id >> 16) as u16;
        buffer[1] = (high & 0x03) as u8;
        buffer[1] += ((high & 0x1C) << 3) as u8;
        buffer[1] |= SIDL_EXIDE_MASK;
        buffer[0] = (high >> 5) as u8;
    } else {
        let id = (id & 0xFFFF) as u16;
        buffer[0] = (id >> 3) as u8;
        buffer[1] = ((id & 0x07) << 5) as u8;
    }

    buffer
}

/// Reassembles the identifier bits from a SIDH/SIDL/EID8/EID0 register block,
/// returning the raw value and whether the extended flag was set
pub(crate) fn deserialize_id(buffer: &[u8; 4]) -> (u32, bool) {
    let mut id = ((buffer[0] as u32) << 3) + ((buffer[1] as u32) >> 5);

    if buffer[1] & SIDL_EXIDE_MASK == SIDL_EXIDE_MASK {
        id = (id << 2) + (buffer[1] & 0x03) as u32;
        id = (id << 8) + buffer[2] as u32;
        id = (id << 8) + buffer[3] as u32;
        (id, true)
    } else {
        (id, false)
    }
}
