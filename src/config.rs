//! Bit-rate configuration
//!
//! The MCP2515 derives its bit timing from three configuration registers
//! (CNF1..CNF3) whose values depend on both the oscillator attached to the
//! controller and the target bus speed. The values here are the canonical
//! Microchip timings; not every speed is reachable from every oscillator.

/// Oscillator frequency driving the MCP2515
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CanClock {
    MHz8,
    MHz16,
    MHz20,
}

impl Default for CanClock {
    fn default() -> Self {
        Self::MHz8
    }
}

/// Target CAN bus speed
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CanBitrate {
    Kbps5,
    Kbps10,
    Kbps20,
    Kbps31_25,
    Kbps33_3,
    Kbps40,
    Kbps50,
    Kbps80,
    Kbps83_3,
    Kbps100,
    Kbps125,
    Kbps200,
    Kbps250,
    Kbps500,
    Kbps1000,
}

/// Returns the CNF1/CNF2/CNF3 values for the given oscillator and bus speed,
/// or `None` if the combination is not supported
pub(crate) fn cnf_values(clock: CanClock, bitrate: CanBitrate) -> Option<[u8; 3]> {
    use CanBitrate::*;

    match clock {
        CanClock::MHz8 => match bitrate {
            Kbps5 => Some([0x1F, 0xBF, 0x87]),
            Kbps10 => Some([0x0F, 0xBF, 0x87]),
            Kbps20 => Some([0x07, 0xBF, 0x87]),
            Kbps31_25 => Some([0x07, 0xA4, 0x84]),
            Kbps33_3 => Some([0x47, 0xE2, 0x85]),
            Kbps40 => Some([0x03, 0xBF, 0x87]),
            Kbps50 => Some([0x03, 0xB4, 0x86]),
            Kbps80 => Some([0x01, 0xBF, 0x87]),
            Kbps100 => Some([0x01, 0xB4, 0x86]),
            Kbps125 => Some([0x01, 0xB1, 0x85]),
            Kbps200 => Some([0x00, 0xB4, 0x86]),
            Kbps250 => Some([0x00, 0xB1, 0x85]),
            Kbps500 => Some([0x00, 0x90, 0x82]),
            Kbps1000 => Some([0x00, 0x80, 0x80]),
            Kbps83_3 => None,
        },
        CanClock::MHz16 => match bitrate {
            Kbps5 => Some([0x3F, 0xFF, 0x87]),
            Kbps10 => Some([0x1F, 0xFF, 0x87]),
            Kbps20 => Some([0x0F, 0xFF, 0x87]),
            Kbps33_3 => Some([0x4E, 0xF1, 0x85]),
            Kbps40 => Some([0x07, 0xFF, 0x87]),
            Kbps50 => Some([0x07, 0xFA, 0x87]),
            Kbps80 => Some([0x03, 0xFF, 0x87]),
            Kbps83_3 => Some([0x03, 0xBE, 0x07]),
            Kbps100 => Some([0x03, 0xFA, 0x87]),
            Kbps125 => Some([0x03, 0xF0, 0x86]),
            Kbps200 => Some([0x01, 0xFA, 0x87]),
            Kbps250 => Some([0x41, 0xF1, 0x85]),
            Kbps500 => Some([0x00, 0xF0, 0x86]),
            Kbps1000 => Some([0x00, 0xD0, 0x82]),
            Kbps31_25 => None,
        },
        CanClock::MHz20 => match bitrate {
            Kbps33_3 => Some([0x0B, 0xFF, 0x87]),
            Kbps40 => Some([0x09, 0xFF, 0x87]),
            Kbps50 => Some([0x09, 0xFA, 0x87]),
            Kbps80 => Some([0x04, 0xFF, 0x87]),
            Kbps83_3 => Some([0x04, 0xFE, 0x87]),
            Kbps100 => Some([0x04, 0xFA, 0x87]),
            Kbps125 => Some([0x03, 0xFA, 0x87]),
            Kbps200 => Some([0x01, 0xFF, 0x87]),
            Kbps250 => Some([0x41, 0xFB, 0x86]),
            Kbps500 => Some([0x00, 0xFA, 0x87]),
            Kbps1000 => Some([0x00, 0xD9, 0x82]),
            Kbps5 | Kbps10 | Kbps20 | Kbps31_25 => None,
        },
    }
}
