//! CANHacker serial protocol engine
//!
//! Implements the LAWICEL-style ASCII command set spoken by CANHacker and
//! compatible hosts on top of the [Mcp2515](crate::can::Mcp2515) driver.
//! Successful commands are acknowledged with a carriage return, failed ones
//! with a BEL byte; received CAN frames are pushed to the host as unsolicited
//! `t`/`T`/`r`/`R` reports.
//!
//! # Example
//!
//! ```
//! use mcp2515_canhacker::can::Mcp2515;
//! use mcp2515_canhacker::example::{ExampleClock, ExampleCsPin, ExampleSerial, ExampleSpiBus};
//! use mcp2515_canhacker::protocol::CanHacker;
//!
//! let clock = ExampleClock::default();
//! let controller = Mcp2515::new(ExampleSpiBus::default(), ExampleCsPin);
//! let mut adapter = CanHacker::new(controller, ExampleSerial::default());
//!
//! // 125 kbps, then open the channel and transmit one frame
//! adapter.process_command(b"S4", &clock).unwrap();
//! adapter.process_command(b"O", &clock).unwrap();
//! adapter.process_command(b"t1001FF", &clock).unwrap();
//! assert!(adapter.is_connected());
//! ```
use crate::can::{CanError, Mcp2515, RxBuffer};
use crate::codec;
use crate::config::{CanBitrate, CanClock};
use crate::filter::{AcceptanceFilter, AcceptanceMask};
use crate::frame::CanFrame;
use core::fmt::Debug;
use embedded_hal::blocking::serial::Write;
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;
use embedded_time::duration::Milliseconds;
use embedded_time::Clock;
use log::debug;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Positive acknowledge, also the line terminator of every response
pub const CR: u8 = b'\r';

/// Negative acknowledge
pub const BEL: u8 = 0x07;

/// Response to the serial number command `N`
pub const SERIAL_RESPONSE: &[u8] = b"N0001\r";

/// Response to the software version command `v`
pub const SW_VERSION_RESPONSE: &[u8] = b"v0107\r";

/// Response to the hardware/software version command `V`
pub const VERSION_RESPONSE: &[u8] = b"V1010\r";

/// Receive reports wrap at one minute
const TIMESTAMP_LIMIT_MS: u32 = 0xEA60;

/// Large enough for an extended data frame report with timestamp
const REPORT_BUFFER_LENGTH: usize = 35;

/// Protocol level errors; every variant answers the host with a BEL byte
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("command is not valid while the channel is open")]
    Connected,

    #[error("command requires an open channel")]
    NotConnected,

    #[error("unknown command byte {0:#04x}")]
    UnknownCommand(u8),

    #[error("malformed command")]
    InvalidCommand,

    #[error("response does not fit the output buffer")]
    BufferOverflow,

    #[error("writing to the serial stream failed")]
    SerialTxOverrun,

    #[error("transmitting is not possible in listen-only mode")]
    ListenOnly,

    #[error("error frames can not be reported to the host")]
    ErrorFrameNotSupported,

    #[error("the monotonic clock failed")]
    ClockFailure,

    #[error("controller reset failed")]
    Mcp2515Init,

    #[error("bit-timing configuration failed")]
    Mcp2515InitBitrate,

    #[error("controller mode change failed")]
    Mcp2515InitSetMode,

    #[error("controller rejected the transmit request")]
    Mcp2515Send,

    #[error("controller read failed")]
    Mcp2515Read,

    #[error("acceptance filter programming failed")]
    Mcp2515Filter,
}

/// Command dispatch byte, the first byte of every line
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[num_enum(error_type(name = Error, constructor = Error::UnknownCommand))]
#[repr(u8)]
pub enum CommandKind {
    OpenChannel = b'O',
    CloseChannel = b'C',
    TransmitStandard = b't',
    TransmitExtended = b'T',
    RemoteStandard = b'r',
    RemoteExtended = b'R',
    SetBitrate = b'S',
    SetBitTiming = b's',
    SetAcceptanceFilter = b'M',
    SetAcceptanceMask = b'm',
    SetTimestamp = b'Z',
    ListenOnly = b'L',
    SerialNumber = b'N',
    SoftwareVersion = b'v',
    Version = b'V',
    WriteRegister = b'W',
    ReadRegister = b'G',
    ReadStatusFlags = b'F',
    ReadErrorCapture = b'E',
    ReadArbitrationLost = b'A',
}

/// A fully validated host command
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Command {
    OpenChannel,
    CloseChannel,
    Transmit(CanFrame),
    SetBitrate(CanBitrate),
    SetBitTiming,
    SetAcceptanceFilter(u32),
    SetAcceptanceMask(u32),
    SetTimestamp(bool),
    ListenOnly,
    SerialNumber,
    SoftwareVersion,
    Version,
    WriteRegister,
    ReadRegister,
    ReadStatusFlags,
    ReadErrorCapture,
    ReadArbitrationLost,
}

impl Command {
    /// Parses one command line, terminator already stripped
    pub fn parse(line: &[u8]) -> Result<Self, Error> {
        let kind = CommandKind::try_from(*line.first().ok_or(Error::InvalidCommand)?)?;

        match kind {
            CommandKind::OpenChannel => {
                Self::expect_length(line, 1)?;
                Ok(Self::OpenChannel)
            }
            CommandKind::CloseChannel => Ok(Self::CloseChannel),
            CommandKind::TransmitStandard
            | CommandKind::TransmitExtended
            | CommandKind::RemoteStandard
            | CommandKind::RemoteExtended => Ok(Self::Transmit(codec::decode_frame(line)?)),
            CommandKind::SetBitrate => {
                Self::expect_length(line, 2)?;
                Ok(Self::SetBitrate(Self::parse_bitrate(line[1])?))
            }
            CommandKind::SetBitTiming => Ok(Self::SetBitTiming),
            CommandKind::SetAcceptanceFilter => {
                Self::expect_length(line, 9)?;
                Ok(Self::SetAcceptanceFilter(Self::parse_hex_u32(&line[1..])?))
            }
            CommandKind::SetAcceptanceMask => {
                Self::expect_length(line, 9)?;
                Ok(Self::SetAcceptanceMask(Self::parse_hex_u32(&line[1..])?))
            }
            CommandKind::SetTimestamp => {
                Self::expect_length(line, 2)?;
                match line[1] {
                    b'0' => Ok(Self::SetTimestamp(false)),
                    b'1' => Ok(Self::SetTimestamp(true)),
                    other => {
                        debug!("unexpected timestamp argument {:#04x}", other);
                        Err(Error::InvalidCommand)
                    }
                }
            }
            CommandKind::ListenOnly => {
                Self::expect_length(line, 1)?;
                Ok(Self::ListenOnly)
            }
            CommandKind::SerialNumber => Ok(Self::SerialNumber),
            CommandKind::SoftwareVersion => Ok(Self::SoftwareVersion),
            CommandKind::Version => Ok(Self::Version),
            CommandKind::WriteRegister => Ok(Self::WriteRegister),
            CommandKind::ReadRegister => Ok(Self::ReadRegister),
            CommandKind::ReadStatusFlags => Ok(Self::ReadStatusFlags),
            CommandKind::ReadErrorCapture => Ok(Self::ReadErrorCapture),
            CommandKind::ReadArbitrationLost => Ok(Self::ReadArbitrationLost),
        }
    }

    fn expect_length(line: &[u8], expected: usize) -> Result<(), Error> {
        if line.len() != expected {
            debug!(
                "command {:#04x} has length {}, expected {}",
                line[0],
                line.len(),
                expected
            );
            return Err(Error::InvalidCommand);
        }

        Ok(())
    }

    /// Maps a CANHacker bit-rate digit to a bus speed. Digit 7 (800 kbps)
    /// exists in the protocol but is not reachable with any supported
    /// oscillator.
    fn parse_bitrate(digit: u8) -> Result<CanBitrate, Error> {
        match digit {
            b'0' => Ok(CanBitrate::Kbps10),
            b'1' => Ok(CanBitrate::Kbps20),
            b'2' => Ok(CanBitrate::Kbps50),
            b'3' => Ok(CanBitrate::Kbps100),
            b'4' => Ok(CanBitrate::Kbps125),
            b'5' => Ok(CanBitrate::Kbps250),
            b'6' => Ok(CanBitrate::Kbps500),
            b'8' => Ok(CanBitrate::Kbps1000),
            other => {
                debug!("unsupported bit-rate digit {:#04x}", other);
                Err(Error::InvalidCommand)
            }
        }
    }

    fn parse_hex_u32(digits: &[u8]) -> Result<u32, Error> {
        let mut value = 0u32;
        for digit in digits {
            value = (value << 4) | codec::hex_digit_to_u8(*digit)? as u32;
        }
        Ok(value)
    }
}

/// The adapter: an MCP2515 driver paired with the host serial stream and the
/// session state of the CANHacker protocol
pub struct CanHacker<B, CS, CLK, S> {
    can: Mcp2515<B, CS, CLK>,
    stream: S,
    can_clock: CanClock,
    bitrate: Option<CanBitrate>,
    timestamp_enabled: bool,
    listen_only: bool,
    loopback: bool,
    connected: bool,
}

impl<B, CS, CLK, S, E, PE, SE> CanHacker<B, CS, CLK, S>
where
    B: Transfer<u8, Error = E>,
    CS: OutputPin<Error = PE>,
    CLK: Clock,
    u32: TryFrom<CLK::T>,
    S: Write<u8, Error = SE>,
    E: Debug,
    PE: Debug,
{
    /// Creates a disconnected adapter assuming an 8 MHz oscillator
    pub fn new(can: Mcp2515<B, CS, CLK>, stream: S) -> Self {
        Self {
            can,
            stream,
            can_clock: CanClock::default(),
            bitrate: None,
            timestamp_enabled: false,
            listen_only: false,
            loopback: false,
            connected: false,
        }
    }

    /// Resets the controller and leaves it in configuration mode
    pub fn init(&mut self, clock: &CLK) -> Result<(), Error> {
        self.can
            .reset(clock)
            .map_err(|error| driver_error(error, Error::Mcp2515Init))?;
        self.can
            .set_config_mode(clock)
            .map_err(|error| driver_error(error, Error::Mcp2515Init))?;
        Ok(())
    }

    /// Sets the oscillator frequency used for bit-timing lookups
    pub fn set_clock(&mut self, can_clock: CanClock) {
        self.can_clock = can_clock;
    }

    /// Routes transmitted frames back to the receiver on the next open
    pub fn enable_loopback(&mut self) -> Result<(), Error> {
        if self.connected {
            return Err(Error::Connected);
        }

        self.loopback = true;
        Ok(())
    }

    pub fn disable_loopback(&mut self) -> Result<(), Error> {
        if self.connected {
            return Err(Error::Connected);
        }

        self.loopback = false;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Everything written to the host so far, for stream types that buffer
    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// Handles one command line (terminator already stripped), writing the
    /// response to the host stream. Every failure answers with a BEL byte
    /// and is returned to the caller as well.
    pub fn process_command(&mut self, line: &[u8], clock: &CLK) -> Result<(), Error> {
        match self.handle_command(line, clock) {
            Ok(()) => Ok(()),
            Err(error) => {
                debug!("command failed: {}", error);
                self.write_all(&[BEL])?;
                Err(error)
            }
        }
    }

    /// Serializes a received frame and reports it to the host, appending the
    /// wrapping millisecond timestamp when enabled
    pub fn receive_frame(&mut self, frame: &CanFrame, clock: &CLK) -> Result<(), Error> {
        let timestamp = if self.timestamp_enabled {
            Some(self.timestamp(clock)?)
        } else {
            None
        };

        let mut buffer = [0u8; REPORT_BUFFER_LENGTH];
        let length = codec::encode_frame(frame, &mut buffer, timestamp)?;
        self.write_all(&buffer[..length])
    }

    /// Drains both receive buffers, reporting every pending frame. Does
    /// nothing while the channel is closed.
    pub fn poll_receive(&mut self, clock: &CLK) -> Result<(), Error> {
        if !self.connected {
            return Ok(());
        }

        loop {
            let pending = self
                .can
                .check_receive()
                .map_err(|error| driver_error(error, Error::Mcp2515Read))?;
            if !pending {
                return Ok(());
            }

            let frame = self
                .can
                .read_message()
                .map_err(|error| driver_error(error, Error::Mcp2515Read))?;
            self.receive_frame(&frame, clock)?;
        }
    }

    /// Reports the frame pending in the given receive buffer, if any. Does
    /// nothing while the channel is closed.
    pub fn receive_from(&mut self, buffer: RxBuffer, clock: &CLK) -> Result<(), Error> {
        if !self.connected {
            return Ok(());
        }

        match self.can.read_message_from(buffer) {
            Ok(frame) => self.receive_frame(&frame, clock),
            Err(CanError::NoMessage) => Ok(()),
            Err(error) => Err(driver_error(error, Error::Mcp2515Read)),
        }
    }

    /// Services a device interrupt: acknowledges error conditions and
    /// reports pending frames. Called from the main loop after the interrupt
    /// line fired; does nothing while the channel is closed.
    pub fn process_interrupt(&mut self, clock: &CLK) -> Result<(), Error> {
        if !self.connected {
            return Ok(());
        }

        let interrupts = self
            .can
            .read_interrupts()
            .map_err(|error| driver_error(error, Error::Mcp2515Read))?;

        if interrupts.errif() {
            self.can
                .clear_rx_overrun()
                .map_err(|error| driver_error(error, Error::Mcp2515Read))?;
        }

        if interrupts.rx0if() {
            self.receive_from(RxBuffer::Rxb0, clock)?;
        }

        if interrupts.rx1if() {
            self.receive_from(RxBuffer::Rxb1, clock)?;
        }

        if interrupts.wakif() {
            debug!("wakeup interrupt");
            self.can
                .clear_interrupts()
                .map_err(|error| driver_error(error, Error::Mcp2515Read))?;
        }

        if interrupts.errif() {
            debug!("error interrupt");
            self.can
                .clear_merr()
                .map_err(|error| driver_error(error, Error::Mcp2515Read))?;
        }

        if interrupts.merrf() {
            debug!("message error interrupt");
            self.can
                .clear_interrupts()
                .map_err(|error| driver_error(error, Error::Mcp2515Read))?;
        }

        Ok(())
    }

    fn handle_command(&mut self, line: &[u8], clock: &CLK) -> Result<(), Error> {
        match Command::parse(line)? {
            Command::OpenChannel => {
                self.connect(clock)?;
                self.write_all(&[CR])
            }
            Command::CloseChannel => {
                if !self.connected {
                    return Err(Error::NotConnected);
                }

                self.disconnect(clock)?;
                self.write_all(&[CR])
            }
            Command::Transmit(frame) => {
                if !self.connected {
                    debug!("transmit while the channel is closed");
                    return Err(Error::NotConnected);
                }
                if self.listen_only {
                    return Err(Error::ListenOnly);
                }

                self.can
                    .send_message(&frame)
                    .map_err(|error| driver_error(error, Error::Mcp2515Send))?;
                self.write_all(&[CR])
            }
            Command::SetBitrate(bitrate) => {
                self.require_disconnected()?;
                self.bitrate = Some(bitrate);
                self.write_all(&[CR])
            }
            Command::SetBitTiming => {
                self.require_disconnected()?;
                debug!("raw bit-timing registers are not supported");
                self.write_all(&[CR])
            }
            Command::SetAcceptanceFilter(value) => {
                self.set_acceptance_filter(value, clock)?;
                self.write_all(&[CR])
            }
            Command::SetAcceptanceMask(value) => {
                self.set_acceptance_mask(value, clock)?;
                self.write_all(&[CR])
            }
            Command::SetTimestamp(enabled) => {
                self.timestamp_enabled = enabled;
                self.write_all(&[CR])
            }
            Command::ListenOnly => {
                self.require_disconnected()?;
                self.listen_only = true;
                self.write_all(&[CR])
            }
            Command::SerialNumber => self.write_all(SERIAL_RESPONSE),
            Command::SoftwareVersion => self.write_all(SW_VERSION_RESPONSE),
            Command::Version => self.write_all(VERSION_RESPONSE),
            Command::WriteRegister | Command::ReadRegister => self.write_all(&[CR]),
            Command::ReadStatusFlags | Command::ReadErrorCapture | Command::ReadArbitrationLost => {
                if !self.connected {
                    debug!("status read while the channel is closed");
                    return Err(Error::NotConnected);
                }

                self.write_all(&[CR])
            }
        }
    }

    /// Configures the bit timing and brings the controller into the
    /// operating mode of the session
    fn connect(&mut self, clock: &CLK) -> Result<(), Error> {
        let bitrate = self.bitrate.ok_or(Error::Mcp2515InitBitrate)?;

        self.can
            .set_bitrate(bitrate, self.can_clock, clock)
            .map_err(|error| driver_error(error, Error::Mcp2515InitBitrate))?;

        let result = if self.loopback {
            self.can.set_loopback_mode(clock)
        } else if self.listen_only {
            self.can.set_listen_only_mode(clock)
        } else {
            self.can.set_normal_mode(clock)
        };
        result.map_err(|error| driver_error(error, Error::Mcp2515InitSetMode))?;

        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self, clock: &CLK) -> Result<(), Error> {
        self.connected = false;
        self.can
            .set_config_mode(clock)
            .map_err(|error| driver_error(error, Error::Mcp2515InitSetMode))?;
        Ok(())
    }

    /// Writes the value to all six filter slots, cycling the connection if
    /// the channel is open
    fn set_acceptance_filter(&mut self, value: u32, clock: &CLK) -> Result<(), Error> {
        let was_connected = self.connected;
        if was_connected {
            self.disconnect(clock)?;
        }

        for slot in AcceptanceFilter::ALL {
            self.can
                .set_filter(slot, false, value, clock)
                .map_err(|error| driver_error(error, Error::Mcp2515Filter))?;
        }

        if was_connected {
            self.connect(clock)?;
        }
        Ok(())
    }

    /// Writes the value to both mask slots, cycling the connection if the
    /// channel is open
    fn set_acceptance_mask(&mut self, value: u32, clock: &CLK) -> Result<(), Error> {
        let was_connected = self.connected;
        if was_connected {
            self.disconnect(clock)?;
        }

        for slot in AcceptanceMask::ALL {
            self.can
                .set_filter_mask(slot, false, value, clock)
                .map_err(|error| driver_error(error, Error::Mcp2515Filter))?;
        }

        if was_connected {
            self.connect(clock)?;
        }
        Ok(())
    }

    fn require_disconnected(&self) -> Result<(), Error> {
        if self.connected {
            debug!("settings can not change while the channel is open");
            return Err(Error::Connected);
        }

        Ok(())
    }

    /// Milliseconds since startup, wrapping at one minute
    fn timestamp(&self, clock: &CLK) -> Result<u16, Error> {
        let now = clock.try_now().map_err(|_| Error::ClockFailure)?;
        let millis = Milliseconds::<u32>::try_from(now.duration_since_epoch())
            .map_err(|_| Error::ClockFailure)?;
        Ok((millis.0 % TIMESTAMP_LIMIT_MS) as u16)
    }

    fn write_all(&mut self, buffer: &[u8]) -> Result<(), Error> {
        self.stream
            .bwrite_all(buffer)
            .map_err(|_| Error::SerialTxOverrun)
    }
}

fn driver_error<E: Debug, PE: Debug>(error: CanError<E, PE>, mapped: Error) -> Error {
    debug!("driver error: {:?}", error);
    mapped
}
