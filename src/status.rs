/// Operating mode of the MCP2515, as reported by the OPMOD field of CANSTAT
/// and requested through the REQOP field of CANCTRL
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperationMode {
    /// Transmits and receives on the bus
    Normal = 0b000,
    /// Internal oscillator stopped, wakes on bus activity
    Sleep = 0b001,
    /// Transmitted frames are routed back to the receiver, bus untouched
    Loopback = 0b010,
    /// Receives without transmitting or acknowledging
    ListenOnly = 0b011,
    /// Required for writing bit-timing, filter and mask registers
    Configuration = 0b100,
}

impl OperationMode {
    /// Maps the OPMOD field of a CANSTAT read to a mode, `None` for the
    /// reserved encodings
    pub(crate) fn from_register(register: u8) -> Option<Self> {
        match register >> 5 {
            0b000 => Some(Self::Normal),
            0b001 => Some(Self::Sleep),
            0b010 => Some(Self::Loopback),
            0b011 => Some(Self::ListenOnly),
            0b100 => Some(Self::Configuration),
            _ => None,
        }
    }

    /// Encodes the mode as a REQOP field value
    pub(crate) fn as_request(self) -> u8 {
        (self as u8) << 5
    }
}
