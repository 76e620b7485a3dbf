#![allow(unused_braces)]
use modular_bitfield_msb::prelude::*;

/// MCP2515 SPI instruction set
#[derive(Copy, Clone)]
pub(crate) enum Instruction {
    Write = 0x02,
    Read = 0x03,
    BitModify = 0x05,
    ReadStatus = 0xA0,
    Reset = 0xC0,
}

/// MCP2515 register address map
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Register {
    Rxf0Sidh = 0x00,
    Rxf1Sidh = 0x04,
    Rxf2Sidh = 0x08,
    Canstat = 0x0E,
    Canctrl = 0x0F,
    Rxf3Sidh = 0x10,
    Rxf4Sidh = 0x14,
    Rxf5Sidh = 0x18,
    Tec = 0x1C,
    Rec = 0x1D,
    Rxm0Sidh = 0x20,
    Rxm1Sidh = 0x24,
    Cnf3 = 0x28,
    Cnf2 = 0x29,
    Cnf1 = 0x2A,
    Caninte = 0x2B,
    Canintf = 0x2C,
    Eflg = 0x2D,
    Txb0Ctrl = 0x30,
    Txb0Sidh = 0x31,
    Txb1Ctrl = 0x40,
    Txb1Sidh = 0x41,
    Txb2Ctrl = 0x50,
    Txb2Sidh = 0x51,
    Rxb0Ctrl = 0x60,
    Rxb0Sidh = 0x61,
    Rxb0Data = 0x66,
    Rxb1Ctrl = 0x70,
    Rxb1Sidh = 0x71,
    Rxb1Data = 0x76,
}

/// REQOP field of CANCTRL, same position as the OPMOD field of CANSTAT
pub(crate) const CANCTRL_REQOP_MASK: u8 = 0xE0;

/// EXIDE/IDE bit within a SIDL register
pub(crate) const SIDL_EXIDE_MASK: u8 = 0x08;

/// DLC field and TX RTR bit within a DLC register
pub(crate) const DLC_MASK: u8 = 0x0F;
pub(crate) const DLC_RTR_MASK: u8 = 0x40;

/// TXREQ bit of a TXBnCTRL register
pub(crate) const TXB_CTRL_TXREQ: u8 = 0x08;

/// Individual CANINTF bits used by read-modify-write clears
pub(crate) const CANINTF_RX0IF: u8 = 0x01;
pub(crate) const CANINTF_RX1IF: u8 = 0x02;
pub(crate) const CANINTF_TXIF_MASK: u8 = 0x1C;
pub(crate) const CANINTF_ERRIF: u8 = 0x20;
pub(crate) const CANINTF_MERRF: u8 = 0x80;

/// Receive overflow bits of EFLG
pub(crate) const EFLG_RXNOVR_MASK: u8 = 0xC0;

/// RXBnCTRL fields touched during reset configuration
pub(crate) const RXB_CTRL_RXM_MASK: u8 = 0x60;
pub(crate) const RXB_CTRL_RXM_STDEXT: u8 = 0x00;
pub(crate) const RXB0_CTRL_BUKT: u8 = 0x04;
pub(crate) const RXB0_CTRL_FILHIT_MASK: u8 = 0x03;
pub(crate) const RXB0_CTRL_FILHIT: u8 = 0x00;
pub(crate) const RXB1_CTRL_FILHIT_MASK: u8 = 0x07;
pub(crate) const RXB1_CTRL_FILHIT: u8 = 0x01;

#[bitfield]
#[derive(Default, Copy, Clone)]
#[repr(u8)]
/// CANINTF/CANINTE interrupt flag register
pub struct CanInterruptFlags {
    /// Message error interrupt
    pub merrf: bool,
    /// Wakeup interrupt
    pub wakif: bool,
    /// Error interrupt (EFLG sources)
    pub errif: bool,
    /// Transmit buffer 2 empty
    pub tx2if: bool,
    /// Transmit buffer 1 empty
    pub tx1if: bool,
    /// Transmit buffer 0 empty
    pub tx0if: bool,
    /// Receive buffer 1 full
    pub rx1if: bool,
    /// Receive buffer 0 full
    pub rx0if: bool,
}

#[bitfield]
#[derive(Default, Copy, Clone)]
#[repr(u8)]
/// EFLG error flag register
pub struct ErrorFlags {
    /// Receive buffer 1 overflow
    pub rx1ovr: bool,
    /// Receive buffer 0 overflow
    pub rx0ovr: bool,
    /// Bus-off state (TEC reached 255)
    pub txbo: bool,
    /// Transmit error-passive state
    pub txep: bool,
    /// Receive error-passive state
    pub rxep: bool,
    /// Transmit error warning
    pub txwar: bool,
    /// Receive error warning
    pub rxwar: bool,
    /// Error warning (TEC/REC >= 96)
    pub ewarn: bool,
}

impl ErrorFlags {
    /// True if any flag the adapter treats as a bus error is raised
    pub fn has_errors(&self) -> bool {
        self.rx1ovr() || self.rx0ovr() || self.txbo() || self.txep() || self.rxep()
    }
}

#[bitfield]
#[derive(Default, Copy, Clone)]
#[repr(u8)]
/// TXBnCTRL transmit buffer control register
pub struct TxBufferControl {
    #[skip]
    __: B1,
    /// Message aborted flag
    pub abtf: bool,
    /// Message lost arbitration
    pub mloa: bool,
    /// Transmission error detected
    pub txerr: bool,
    /// Message transmit request pending
    pub txreq: bool,
    #[skip]
    __: B1,
    /// Transmit priority
    pub txp: B2,
}

impl TxBufferControl {
    /// True if the last transmission attempt failed or was aborted
    pub fn transmit_failed(&self) -> bool {
        self.abtf() || self.mloa() || self.txerr()
    }
}

#[bitfield]
#[derive(Default, Copy, Clone)]
#[repr(u8)]
/// RXBnCTRL receive buffer control register
pub struct RxBufferControl {
    #[skip]
    __: B1,
    /// Operating mode (std/ext/any)
    pub rxm: B2,
    #[skip]
    __: B1,
    /// Received message was a remote transfer request
    pub rxrtr: bool,
    /// Rollover enable (RXB0 only)
    pub bukt: bool,
    #[skip]
    __: B1,
    /// Filter hit (low bit)
    pub filhit: B1,
}

#[bitfield]
#[derive(Debug, Default, Copy, Clone)]
#[repr(u8)]
/// Result of the READ STATUS instruction
pub struct QuickStatus {
    pub tx2if: bool,
    pub tx2req: bool,
    pub tx1if: bool,
    pub tx1req: bool,
    pub tx0if: bool,
    pub tx0req: bool,
    pub rx1if: bool,
    pub rx0if: bool,
}

impl QuickStatus {
    /// True if either receive buffer holds a pending message
    pub fn rx_pending(&self) -> bool {
        self.rx0if() || self.rx1if()
    }
}
