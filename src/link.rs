//! Serial link glue
//!
//! The UART receive interrupt only enqueues raw bytes; the main loop drains
//! the queue and assembles carriage-return terminated command lines. Bytes
//! arriving while the queue is full are dropped, as are lines longer than
//! [COMMAND_MAX_LENGTH] - the engine never sees a truncated command.
use heapless::spsc::{Consumer, Producer, Queue};
use heapless::Vec;
use log::warn;

/// Capacity of the interrupt-to-main-loop byte queue
pub const RX_QUEUE_CAPACITY: usize = 256;

/// Longest accepted command line, terminator excluded
pub const COMMAND_MAX_LENGTH: usize = 26;

/// Byte queue between the UART receive interrupt and the main loop
pub type RxQueue = Queue<u8, RX_QUEUE_CAPACITY>;

/// Interrupt side of the queue
pub type RxProducer<'a> = Producer<'a, u8, RX_QUEUE_CAPACITY>;

/// Main-loop side of the queue
pub type RxConsumer<'a> = Consumer<'a, u8, RX_QUEUE_CAPACITY>;

/// A command line as handed to the engine
pub type CommandLine = Vec<u8, COMMAND_MAX_LENGTH>;

/// Assembles dequeued bytes into command lines
#[derive(Default)]
pub struct CommandReader {
    line: CommandLine,
    overrun: bool,
}

impl CommandReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one byte, returning the completed line with the terminator
    /// stripped once a carriage return arrives. Over-long lines are dropped
    /// whole when their terminator shows up.
    pub fn push_byte(&mut self, byte: u8) -> Option<CommandLine> {
        if byte == b'\r' {
            if self.overrun {
                warn!("dropping over-long command line");
                self.overrun = false;
                self.line.clear();
                return None;
            }

            return Some(core::mem::take(&mut self.line));
        }

        if self.line.push(byte).is_err() {
            self.overrun = true;
        }

        None
    }
}
