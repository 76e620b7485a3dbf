//! Hardware doubles for the documentation examples
//!
//! The SPI bus double is just smart enough to keep the driver happy: it
//! remembers the last mode requested through CANCTRL and reports it back on
//! CANSTAT reads, so mode changes settle immediately. Everything else reads
//! as zero.
use crate::registers::{Instruction, Register, CANCTRL_REQOP_MASK};
use core::cell::Cell;
use core::convert::Infallible;
use embedded_hal::blocking::serial::Write;
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;
use embedded_time::clock::Error;
use embedded_time::duration::{Duration, Fraction};
use embedded_time::fixed_point::FixedPoint;
use embedded_time::timer::param::{Armed, OneShot};
use embedded_time::{Clock, Instant, Timer};

#[derive(Default)]
pub struct ExampleSpiBus {
    mode: u8,
}

impl Transfer<u8> for ExampleSpiBus {
    type Error = Infallible;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Self::Error> {
        if words[0] == Instruction::BitModify as u8 && words[1] == Register::Canctrl as u8 {
            self.mode = words[3] & CANCTRL_REQOP_MASK;
        }

        if words[0] == Instruction::Read as u8 && words[1] == Register::Canstat as u8 {
            words[2] = self.mode;
        }

        Ok(words)
    }
}

pub struct ExampleCsPin;

impl OutputPin for ExampleCsPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Advances 20 ms on every call
#[derive(Default)]
pub struct ExampleClock {
    now: Cell<u64>,
}

impl Clock for ExampleClock {
    type T = u64;
    const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

    fn try_now(&self) -> Result<Instant<Self>, Error> {
        self.now.set(self.now.get() + 20_000);
        Ok(Instant::new(self.now.get()))
    }

    fn new_timer<Dur: Duration + FixedPoint>(
        &self,
        duration: Dur,
    ) -> Timer<OneShot, Armed, Self, Dur> {
        Timer::new(self, duration)
    }
}

/// Discards everything written to the host
#[derive(Default)]
pub struct ExampleSerial;

impl Write<u8> for ExampleSerial {
    type Error = Infallible;

    fn bwrite_all(&mut self, _buffer: &[u8]) -> Result<(), Self::Error> {
        Ok(())
    }

    fn bflush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
