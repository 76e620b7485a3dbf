//! MCP2515 register level driver
//!
//! All device access goes through the five SPI instructions the adapter needs
//! (RESET, READ, WRITE, BIT MODIFY and READ STATUS). Every transaction is
//! framed by the chip-select pin; the driver owns both the bus and the pin.
//!
//! # Example
//!
//! ```
//! use mcp2515_canhacker::can::Mcp2515;
//! use mcp2515_canhacker::config::{CanBitrate, CanClock};
//! use mcp2515_canhacker::example::{ExampleClock, ExampleCsPin, ExampleSpiBus};
//!
//! let clock = ExampleClock::default();
//! let mut controller = Mcp2515::new(ExampleSpiBus::default(), ExampleCsPin);
//!
//! controller.set_bitrate(CanBitrate::Kbps125, CanClock::MHz16, &clock).unwrap();
//! controller.set_normal_mode(&clock).unwrap();
//! ```
use crate::config::{self, CanBitrate, CanClock};
use crate::filter::{self, AcceptanceFilter, AcceptanceMask};
use crate::frame::{CanFrame, CAN_MAX_DLEN};
use crate::registers::{
    CanInterruptFlags, ErrorFlags, Instruction, QuickStatus, Register, RxBufferControl,
    TxBufferControl, CANCTRL_REQOP_MASK, CANINTF_ERRIF, CANINTF_MERRF, CANINTF_RX0IF,
    CANINTF_RX1IF, CANINTF_TXIF_MASK, DLC_MASK, DLC_RTR_MASK, EFLG_RXNOVR_MASK, RXB0_CTRL_BUKT,
    RXB0_CTRL_FILHIT, RXB0_CTRL_FILHIT_MASK, RXB1_CTRL_FILHIT, RXB1_CTRL_FILHIT_MASK,
    RXB_CTRL_RXM_MASK, RXB_CTRL_RXM_STDEXT, TXB_CTRL_TXREQ,
};
use crate::status::OperationMode;
use core::marker::PhantomData;
use embedded_can::{ExtendedId, Id, StandardId};
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;
use embedded_time::duration::Milliseconds;
use embedded_time::Clock;
use log::debug;

/// How long the device may take to settle a requested mode
const MODE_CHANGE_TIMEOUT_MS: u32 = 10;

/// Settle time after a RESET instruction
const RESET_DELAY_MS: u32 = 10;

/// SIDH/SIDL/EID8/EID0/DLC header plus the largest payload
const TX_BLOCK_LEN: usize = 5 + CAN_MAX_DLEN;

/// One of the three transmit buffers
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TxBuffer {
    Txb0,
    Txb1,
    Txb2,
}

impl TxBuffer {
    pub const ALL: [Self; 3] = [Self::Txb0, Self::Txb1, Self::Txb2];

    fn control_register(self) -> Register {
        match self {
            Self::Txb0 => Register::Txb0Ctrl,
            Self::Txb1 => Register::Txb1Ctrl,
            Self::Txb2 => Register::Txb2Ctrl,
        }
    }

    fn sidh_register(self) -> Register {
        match self {
            Self::Txb0 => Register::Txb0Sidh,
            Self::Txb1 => Register::Txb1Sidh,
            Self::Txb2 => Register::Txb2Sidh,
        }
    }
}

/// One of the two receive buffers
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RxBuffer {
    Rxb0,
    Rxb1,
}

impl RxBuffer {
    fn control_register(self) -> Register {
        match self {
            Self::Rxb0 => Register::Rxb0Ctrl,
            Self::Rxb1 => Register::Rxb1Ctrl,
        }
    }

    fn sidh_register(self) -> Register {
        match self {
            Self::Rxb0 => Register::Rxb0Sidh,
            Self::Rxb1 => Register::Rxb1Sidh,
        }
    }

    fn data_register(self) -> Register {
        match self {
            Self::Rxb0 => Register::Rxb0Data,
            Self::Rxb1 => Register::Rxb1Data,
        }
    }

    fn interrupt_mask(self) -> u8 {
        match self {
            Self::Rxb0 => CANINTF_RX0IF,
            Self::Rxb1 => CANINTF_RX1IF,
        }
    }
}

/// Chip-select and SPI transfer errors
#[derive(Debug, PartialEq, Eq)]
pub enum BusError<B, CS> {
    /// SPI transfer failed
    TransferError(B),
    /// Changing the chip-select state failed
    CSError(CS),
}

/// Errors of the MCP2515 driver
#[derive(Debug, PartialEq, Eq)]
pub enum CanError<B, CS> {
    /// SPI bus or chip-select fault
    BusError(BusError<B, CS>),
    /// The monotonic clock failed or overflowed
    ClockError,
    /// The device did not reach the requested mode within the timeout
    ModeTimeout,
    /// No CNF values exist for the oscillator/speed combination
    BitrateNotSupported,
    /// The device reported a DLC above 8
    InvalidDlc(u8),
    /// The receive buffer registers decoded to an impossible frame
    InvalidFrame,
    /// All three transmit buffers have a transmission pending
    AllTxBusy,
    /// The transmission was aborted, lost arbitration or hit a bus error
    TxFailed,
    /// Neither receive buffer holds a message
    NoMessage,
}

impl<B, CS> From<BusError<B, CS>> for CanError<B, CS> {
    fn from(error: BusError<B, CS>) -> Self {
        Self::BusError(error)
    }
}

impl<B, CS> From<embedded_time::clock::Error> for CanError<B, CS> {
    fn from(_error: embedded_time::clock::Error) -> Self {
        Self::ClockError
    }
}

/// MCP2515 CAN controller on a shared SPI bus
pub struct Mcp2515<B, CS, CLK> {
    /// SPI bus
    bus: B,

    /// Chip-select pin, low active
    pin_cs: CS,

    clock: PhantomData<CLK>,
}

impl<B, CS, CLK, E, PE> Mcp2515<B, CS, CLK>
where
    B: Transfer<u8, Error = E>,
    CS: OutputPin<Error = PE>,
    CLK: Clock,
{
    pub fn new(bus: B, pin_cs: CS) -> Self {
        Self {
            bus,
            pin_cs,
            clock: PhantomData,
        }
    }

    /// Issues a RESET instruction and brings the device into the power-on
    /// receive configuration: transmit buffers cleared, receive interrupts and
    /// error interrupts enabled, both receive buffers accepting standard and
    /// extended frames with rollover from RXB0 to RXB1, and all filters and
    /// masks zeroed (accept everything)
    pub fn reset(&mut self, clock: &CLK) -> Result<(), CanError<E, PE>> {
        let mut instruction = [Instruction::Reset as u8];
        self.transaction(&mut instruction, &mut [])?;
        self.wait(Milliseconds::new(RESET_DELAY_MS), clock)?;

        let zeros = [0u8; 14];
        self.set_registers(Register::Txb0Ctrl, &zeros)?;
        self.set_registers(Register::Txb1Ctrl, &zeros)?;
        self.set_registers(Register::Txb2Ctrl, &zeros)?;
        self.set_register(Register::Rxb0Ctrl, 0)?;
        self.set_register(Register::Rxb1Ctrl, 0)?;

        let interrupts = CanInterruptFlags::new()
            .with_rx0if(true)
            .with_rx1if(true)
            .with_errif(true)
            .with_merrf(true);
        self.set_register(Register::Caninte, interrupts.into())?;

        self.modify_register(
            Register::Rxb0Ctrl,
            RXB_CTRL_RXM_MASK | RXB0_CTRL_BUKT | RXB0_CTRL_FILHIT_MASK,
            RXB_CTRL_RXM_STDEXT | RXB0_CTRL_BUKT | RXB0_CTRL_FILHIT,
        )?;
        self.modify_register(
            Register::Rxb1Ctrl,
            RXB_CTRL_RXM_MASK | RXB1_CTRL_FILHIT_MASK,
            RXB_CTRL_RXM_STDEXT | RXB1_CTRL_FILHIT,
        )?;

        // RXF1 is cleared as an extended filter so both frame types pass the
        // zeroed filter bank
        for (index, slot) in AcceptanceFilter::ALL.iter().enumerate() {
            self.set_filter(*slot, index == 1, 0, clock)?;
        }
        for mask in AcceptanceMask::ALL {
            self.set_filter_mask(mask, true, 0, clock)?;
        }

        Ok(())
    }

    pub fn set_normal_mode(&mut self, clock: &CLK) -> Result<(), CanError<E, PE>> {
        self.set_mode(OperationMode::Normal, clock)
    }

    pub fn set_sleep_mode(&mut self, clock: &CLK) -> Result<(), CanError<E, PE>> {
        self.set_mode(OperationMode::Sleep, clock)
    }

    pub fn set_loopback_mode(&mut self, clock: &CLK) -> Result<(), CanError<E, PE>> {
        self.set_mode(OperationMode::Loopback, clock)
    }

    pub fn set_listen_only_mode(&mut self, clock: &CLK) -> Result<(), CanError<E, PE>> {
        self.set_mode(OperationMode::ListenOnly, clock)
    }

    pub fn set_config_mode(&mut self, clock: &CLK) -> Result<(), CanError<E, PE>> {
        self.set_mode(OperationMode::Configuration, clock)
    }

    /// Requests the given mode through CANCTRL and polls CANSTAT until the
    /// device reports it, for at most 10 ms
    pub fn set_mode(&mut self, mode: OperationMode, clock: &CLK) -> Result<(), CanError<E, PE>> {
        self.modify_register(Register::Canctrl, CANCTRL_REQOP_MASK, mode.as_request())?;

        let timeout = clock
            .try_now()?
            .checked_add(Milliseconds::new(MODE_CHANGE_TIMEOUT_MS))
            .ok_or(CanError::ClockError)?;

        loop {
            let canstat = self.read_register(Register::Canstat)?;
            if OperationMode::from_register(canstat) == Some(mode) {
                return Ok(());
            }

            if clock.try_now()? > timeout {
                debug!("mode change to {:?} timed out, CANSTAT: {:#04x}", mode, canstat);
                return Err(CanError::ModeTimeout);
            }
        }
    }

    /// Writes the bit-timing registers for the given oscillator and bus
    /// speed. Unsupported combinations fail before any register is touched.
    /// The device is left in configuration mode.
    pub fn set_bitrate(
        &mut self,
        bitrate: CanBitrate,
        can_clock: CanClock,
        clock: &CLK,
    ) -> Result<(), CanError<E, PE>> {
        let cnf = config::cnf_values(can_clock, bitrate).ok_or(CanError::BitrateNotSupported)?;

        self.set_config_mode(clock)?;
        self.set_register(Register::Cnf1, cnf[0])?;
        self.set_register(Register::Cnf2, cnf[1])?;
        self.set_register(Register::Cnf3, cnf[2])?;
        Ok(())
    }

    /// Programs one acceptance filter slot, switching to configuration mode
    /// first
    pub fn set_filter(
        &mut self,
        slot: AcceptanceFilter,
        extended: bool,
        id: u32,
        clock: &CLK,
    ) -> Result<(), CanError<E, PE>> {
        self.set_config_mode(clock)?;
        let block = filter::serialize_id(extended, id);
        self.set_registers(slot.sidh_register(), &block)?;
        Ok(())
    }

    /// Programs one acceptance mask slot, switching to configuration mode
    /// first
    pub fn set_filter_mask(
        &mut self,
        slot: AcceptanceMask,
        extended: bool,
        id: u32,
        clock: &CLK,
    ) -> Result<(), CanError<E, PE>> {
        self.set_config_mode(clock)?;
        let block = filter::serialize_id(extended, id);
        self.set_registers(slot.sidh_register(), &block)?;
        Ok(())
    }

    /// Transmits a frame through the first idle transmit buffer, scanning
    /// TXB0 to TXB2
    pub fn send_message(&mut self, frame: &CanFrame) -> Result<(), CanError<E, PE>> {
        for buffer in TxBuffer::ALL {
            let control = TxBufferControl::from(self.read_register(buffer.control_register())?);
            if !control.txreq() {
                return self.send_message_through(buffer, frame);
            }
        }

        Err(CanError::AllTxBusy)
    }

    /// Loads a frame into the given transmit buffer, requests transmission
    /// and checks the buffer control register for a failed attempt
    pub fn send_message_through(
        &mut self,
        buffer: TxBuffer,
        frame: &CanFrame,
    ) -> Result<(), CanError<E, PE>> {
        let dlc = frame.dlc();
        if dlc as usize > CAN_MAX_DLEN {
            return Err(CanError::InvalidDlc(dlc));
        }

        let mut block = [0u8; TX_BLOCK_LEN];
        block[..4].copy_from_slice(&filter::serialize_id(frame.is_extended(), frame.raw_id()));
        block[4] = if frame.is_remote() { dlc | DLC_RTR_MASK } else { dlc };
        block[5..5 + frame.data().len()].copy_from_slice(frame.data());

        self.set_registers(buffer.sidh_register(), &block[..5 + dlc as usize])?;
        self.modify_register(buffer.control_register(), TXB_CTRL_TXREQ, TXB_CTRL_TXREQ)?;

        let control = TxBufferControl::from(self.read_register(buffer.control_register())?);
        if control.transmit_failed() {
            debug!("transmission through {:?} failed", buffer);
            return Err(CanError::TxFailed);
        }

        Ok(())
    }

    /// Reads the next pending message, draining RXB0 before RXB1
    pub fn read_message(&mut self) -> Result<CanFrame, CanError<E, PE>> {
        let status = self.read_status()?;

        if status.rx0if() {
            self.read_message_from(RxBuffer::Rxb0)
        } else if status.rx1if() {
            self.read_message_from(RxBuffer::Rxb1)
        } else {
            Err(CanError::NoMessage)
        }
    }

    /// Reads a message out of the given receive buffer and clears its
    /// interrupt flag as the final step. The registers hold stale content
    /// when the buffer is empty; callers gate on the status flags.
    pub fn read_message_from(&mut self, buffer: RxBuffer) -> Result<CanFrame, CanError<E, PE>> {
        let mut header = [0u8; 5];
        self.read_registers(buffer.sidh_register(), &mut header)?;

        let id_block = [header[0], header[1], header[2], header[3]];
        let (raw, extended) = filter::deserialize_id(&id_block);

        let dlc = header[4] & DLC_MASK;
        if dlc as usize > CAN_MAX_DLEN {
            return Err(CanError::InvalidDlc(dlc));
        }

        let control = RxBufferControl::from(self.read_register(buffer.control_register())?);

        let id = if extended {
            ExtendedId::new(raw).map(Id::Extended)
        } else {
            StandardId::new(raw as u16).map(Id::Standard)
        }
        .ok_or(CanError::InvalidFrame)?;

        let frame = if control.rxrtr() {
            CanFrame::new_remote(id, dlc)
        } else {
            let mut data = [0u8; CAN_MAX_DLEN];
            self.read_registers(buffer.data_register(), &mut data[..dlc as usize])?;
            CanFrame::new_data(id, &data[..dlc as usize])
        }
        .ok_or(CanError::InvalidFrame)?;

        self.modify_register(Register::Canintf, buffer.interrupt_mask(), 0)?;
        Ok(frame)
    }

    /// Polls the READ STATUS instruction
    pub fn read_status(&mut self) -> Result<QuickStatus, CanError<E, PE>> {
        let mut instruction = [Instruction::ReadStatus as u8, 0x0];
        let mut status = [0u8; 1];
        self.transaction(&mut instruction, &mut status)?;
        Ok(QuickStatus::from(status[0]))
    }

    /// True if either receive buffer holds a pending message
    pub fn check_receive(&mut self) -> Result<bool, CanError<E, PE>> {
        Ok(self.read_status()?.rx_pending())
    }

    /// True if EFLG reports an overflow, bus-off or error-passive condition
    pub fn check_error(&mut self) -> Result<bool, CanError<E, PE>> {
        Ok(self.read_error_flags()?.has_errors())
    }

    pub fn read_error_flags(&mut self) -> Result<ErrorFlags, CanError<E, PE>> {
        Ok(ErrorFlags::from(self.read_register(Register::Eflg)?))
    }

    pub fn read_interrupts(&mut self) -> Result<CanInterruptFlags, CanError<E, PE>> {
        Ok(CanInterruptFlags::from(self.read_register(Register::Canintf)?))
    }

    pub fn read_interrupt_mask(&mut self) -> Result<CanInterruptFlags, CanError<E, PE>> {
        Ok(CanInterruptFlags::from(self.read_register(Register::Caninte)?))
    }

    /// Receive error counter
    pub fn error_count_rx(&mut self) -> Result<u8, CanError<E, PE>> {
        Ok(self.read_register(Register::Rec)?)
    }

    /// Transmit error counter
    pub fn error_count_tx(&mut self) -> Result<u8, CanError<E, PE>> {
        Ok(self.read_register(Register::Tec)?)
    }

    /// Clears all interrupt flags
    pub fn clear_interrupts(&mut self) -> Result<(), CanError<E, PE>> {
        Ok(self.set_register(Register::Canintf, 0)?)
    }

    /// Clears the three transmit-buffer-empty flags
    pub fn clear_tx_interrupts(&mut self) -> Result<(), CanError<E, PE>> {
        Ok(self.modify_register(Register::Canintf, CANINTF_TXIF_MASK, 0)?)
    }

    /// Clears the receive overflow bits of EFLG
    pub fn clear_rx_overrun_flags(&mut self) -> Result<(), CanError<E, PE>> {
        Ok(self.modify_register(Register::Eflg, EFLG_RXNOVR_MASK, 0)?)
    }

    /// Clears overflow flags and all interrupts, but only if EFLG reports
    /// anything at all
    pub fn clear_rx_overrun(&mut self) -> Result<(), CanError<E, PE>> {
        if u8::from(self.read_error_flags()?) != 0 {
            self.clear_rx_overrun_flags()?;
            self.clear_interrupts()?;
        }

        Ok(())
    }

    /// Clears the message error interrupt flag
    pub fn clear_merr(&mut self) -> Result<(), CanError<E, PE>> {
        Ok(self.modify_register(Register::Canintf, CANINTF_MERRF, 0)?)
    }

    /// Clears the error interrupt flag
    pub fn clear_errif(&mut self) -> Result<(), CanError<E, PE>> {
        Ok(self.modify_register(Register::Canintf, CANINTF_ERRIF, 0)?)
    }

    /// Busy-waits for the given duration
    fn wait(&mut self, duration: Milliseconds, clock: &CLK) -> Result<(), CanError<E, PE>> {
        let target = clock
            .try_now()?
            .checked_add(duration)
            .ok_or(CanError::ClockError)?;

        while clock.try_now()? <= target {}
        Ok(())
    }

    fn read_register(&mut self, register: Register) -> Result<u8, BusError<E, PE>> {
        let mut instruction = [Instruction::Read as u8, register as u8, 0x0];
        let mut value = [0u8; 1];
        self.transaction(&mut instruction, &mut value)?;
        Ok(value[0])
    }

    /// Reads a block of consecutive registers, the device increments the
    /// address internally
    fn read_registers(
        &mut self,
        register: Register,
        values: &mut [u8],
    ) -> Result<(), BusError<E, PE>> {
        let mut buffer = [0u8; 2 + TX_BLOCK_LEN];
        buffer[0] = Instruction::Read as u8;
        buffer[1] = register as u8;

        self.transaction(&mut buffer[..2 + values.len()], values)
    }

    fn set_register(&mut self, register: Register, value: u8) -> Result<(), BusError<E, PE>> {
        let mut instruction = [Instruction::Write as u8, register as u8, value];
        self.transaction(&mut instruction, &mut [])
    }

    /// Writes a block of consecutive registers within a single chip-select
    /// window
    fn set_registers(&mut self, register: Register, values: &[u8]) -> Result<(), BusError<E, PE>> {
        let mut buffer = [0u8; 2 + 14];
        buffer[0] = Instruction::Write as u8;
        buffer[1] = register as u8;
        buffer[2..2 + values.len()].copy_from_slice(values);

        self.transaction(&mut buffer[..2 + values.len()], &mut [])
    }

    /// Sets the masked bits of a register to the given data using the BIT
    /// MODIFY instruction
    fn modify_register(
        &mut self,
        register: Register,
        mask: u8,
        data: u8,
    ) -> Result<(), BusError<E, PE>> {
        let mut instruction = [Instruction::BitModify as u8, register as u8, mask, data];
        self.transaction(&mut instruction, &mut [])
    }

    /// Runs one SPI transfer framed by the chip-select pin. The tail of the
    /// received words is copied into `read`; the pin is released even when
    /// the transfer fails.
    fn transaction(&mut self, words: &mut [u8], read: &mut [u8]) -> Result<(), BusError<E, PE>> {
        self.pin_cs.set_low().map_err(BusError::CSError)?;

        let result = match self.bus.transfer(words) {
            Ok(response) => {
                read.copy_from_slice(&response[response.len() - read.len()..]);
                Ok(())
            }
            Err(error) => Err(BusError::TransferError(error)),
        };

        self.pin_cs.set_high().map_err(BusError::CSError)?;
        result
    }
}
