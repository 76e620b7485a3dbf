use embedded_can::Id;

/// Largest CAN 2.0 payload
pub const CAN_MAX_DLEN: usize = 8;

/// A classic CAN 2.0 frame
///
/// The identifier carries the standard/extended distinction via
/// [embedded_can::Id]; the RTR flag is orthogonal to it. The error flag marks
/// bus error reports and exists only so downstream consumers can refuse such
/// frames - the adapter never generates them itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    id: Id,
    rtr: bool,
    err: bool,
    dlc: u8,
    data: [u8; CAN_MAX_DLEN],
}

impl CanFrame {
    /// Creates a data frame. Returns `None` if `data` is longer than 8 bytes.
    pub fn new_data(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > CAN_MAX_DLEN {
            return None;
        }

        let mut copy = [0u8; CAN_MAX_DLEN];
        copy[..data.len()].copy_from_slice(data);

        Some(Self {
            id: id.into(),
            rtr: false,
            err: false,
            dlc: data.len() as u8,
            data: copy,
        })
    }

    /// Creates a remote transmission request frame with the given DLC.
    /// Returns `None` for DLC > 8.
    pub fn new_remote(id: impl Into<Id>, dlc: u8) -> Option<Self> {
        if dlc as usize > CAN_MAX_DLEN {
            return None;
        }

        Some(Self {
            id: id.into(),
            rtr: true,
            err: false,
            dlc,
            data: [0u8; CAN_MAX_DLEN],
        })
    }

    /// Creates an error frame report for the given identifier
    pub fn new_error(id: impl Into<Id>) -> Self {
        Self {
            id: id.into(),
            rtr: false,
            err: true,
            dlc: 0,
            data: [0u8; CAN_MAX_DLEN],
        }
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    pub fn is_remote(&self) -> bool {
        self.rtr
    }

    pub fn is_error(&self) -> bool {
        self.err
    }

    pub fn dlc(&self) -> u8 {
        self.dlc
    }

    /// Payload slice; empty for remote frames
    pub fn data(&self) -> &[u8] {
        if self.rtr {
            &[]
        } else {
            &self.data[..self.dlc as usize]
        }
    }

    /// Raw identifier bits without the standard/extended tag
    pub(crate) fn raw_id(&self) -> u32 {
        match self.id {
            Id::Standard(id) => id.as_raw() as u32,
            Id::Extended(id) => id.as_raw(),
        }
    }
}
