//! ASCII frame codec
//!
//! CANHacker hosts exchange frames as single-line ASCII commands: a type
//! character (`t`/`T` for data, `r`/`R` for remote), a fixed-width hex
//! identifier (3 digits standard, 8 digits extended), one DLC digit and two
//! hex digits per payload byte. Reports sent to the host optionally append a
//! four-digit millisecond timestamp and always end with a carriage return.
use crate::frame::{CanFrame, CAN_MAX_DLEN};
use crate::protocol::Error;
use embedded_can::{ExtendedId, Id, StandardId};
use log::debug;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Shortest transmit command: type, standard identifier, DLC
const MIN_MESSAGE_LENGTH: usize = 5;

pub(crate) fn to_hex_digit(value: u32) -> u8 {
    HEX_DIGITS[(value & 0xF) as usize]
}

pub(crate) fn hex_digit_to_u8(digit: u8) -> Result<u8, Error> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        _ => {
            debug!("invalid hex digit {:#04x}", digit);
            Err(Error::InvalidCommand)
        }
    }
}

fn put_hex_byte(buffer: &mut [u8], value: u8) {
    buffer[0] = to_hex_digit((value >> 4) as u32);
    buffer[1] = to_hex_digit(value as u32);
}

/// Parses a transmit command (terminator already stripped) into a frame
///
/// The command length must match the DLC exactly; a DLC of zero is rejected.
pub fn decode_frame(buffer: &[u8]) -> Result<CanFrame, Error> {
    if buffer.len() < MIN_MESSAGE_LENGTH {
        debug!("transmit command is shorter than the minimum of {} bytes", MIN_MESSAGE_LENGTH);
        return Err(Error::InvalidCommand);
    }

    let (extended, rtr) = match buffer[0] {
        b't' => (false, false),
        b'T' => (true, false),
        b'r' => (false, true),
        b'R' => (true, true),
        other => {
            debug!("unexpected transmit command type {:#04x}", other);
            return Err(Error::InvalidCommand);
        }
    };

    let id_digits = if extended { 8 } else { 3 };
    if buffer.len() < 2 + id_digits {
        debug!("transmit command is missing identifier digits");
        return Err(Error::InvalidCommand);
    }

    let mut raw = 0u32;
    for digit in &buffer[1..1 + id_digits] {
        raw = (raw << 4) | hex_digit_to_u8(*digit)? as u32;
    }

    let id = if extended {
        ExtendedId::new(raw).map(Id::Extended)
    } else {
        StandardId::new(raw as u16).map(Id::Standard)
    };
    let id = match id {
        Some(id) => id,
        None => {
            debug!("identifier {:#x} is out of range", raw);
            return Err(Error::InvalidCommand);
        }
    };

    let dlc = hex_digit_to_u8(buffer[1 + id_digits])?;
    if dlc == 0 || dlc as usize > CAN_MAX_DLEN {
        debug!("DLC {} is out of range", dlc);
        return Err(Error::InvalidCommand);
    }

    let expected = 2 + id_digits + if rtr { 0 } else { 2 * dlc as usize };
    if buffer.len() != expected {
        debug!("transmit command length {} does not match DLC {}", buffer.len(), dlc);
        return Err(Error::InvalidCommand);
    }

    let frame = if rtr {
        CanFrame::new_remote(id, dlc)
    } else {
        let mut data = [0u8; CAN_MAX_DLEN];
        for (index, pair) in buffer[2 + id_digits..].chunks_exact(2).enumerate() {
            data[index] = (hex_digit_to_u8(pair[0])? << 4) | hex_digit_to_u8(pair[1])?;
        }
        CanFrame::new_data(id, &data[..dlc as usize])
    };

    frame.ok_or(Error::InvalidCommand)
}

/// Serializes a frame into a receive report, returning the report length
///
/// The timestamp, when given, is appended as four hex digits before the
/// terminating carriage return. Fails if the report would reach or exceed
/// the buffer capacity, and refuses error frames entirely.
pub fn encode_frame(
    frame: &CanFrame,
    buffer: &mut [u8],
    timestamp: Option<u16>,
) -> Result<usize, Error> {
    if frame.is_error() {
        return Err(Error::ErrorFrameNotSupported);
    }

    let id_digits = if frame.is_extended() { 8 } else { 3 };
    let data = frame.data();

    let needed = 3 + id_digits + 2 * data.len() + if timestamp.is_some() { 4 } else { 0 };
    if needed >= buffer.len() {
        debug!("receive report of {} bytes does not fit the output buffer", needed);
        return Err(Error::BufferOverflow);
    }

    buffer[0] = match (frame.is_extended(), frame.is_remote()) {
        (false, false) => b't',
        (false, true) => b'r',
        (true, false) => b'T',
        (true, true) => b'R',
    };

    let mut id = frame.raw_id();
    for offset in (1..=id_digits).rev() {
        buffer[offset] = to_hex_digit(id);
        id >>= 4;
    }

    let mut offset = 1 + id_digits;
    buffer[offset] = to_hex_digit(frame.dlc() as u32);
    offset += 1;

    for byte in data {
        put_hex_byte(&mut buffer[offset..], *byte);
        offset += 2;
    }

    if let Some(timestamp) = timestamp {
        put_hex_byte(&mut buffer[offset..], (timestamp >> 8) as u8);
        put_hex_byte(&mut buffer[offset + 2..], timestamp as u8);
        offset += 4;
    }

    buffer[offset] = b'\r';
    Ok(offset + 1)
}
