use crate::can::Mcp2515;
use crate::mocks::{MockPin, MockSPIBus, TestClock};
use mockall::Sequence;

mod can;

/// SPI bus and chip-select pin mocks with an expectation helper for whole
/// chip-select framed transfers
#[derive(Default)]
pub(crate) struct Mocks {
    pub bus: MockSPIBus,
    pub pin_cs: MockPin,
}

impl Mocks {
    pub fn into_controller(self) -> Mcp2515<MockSPIBus, MockPin, TestClock> {
        Mcp2515::new(self.bus, self.pin_cs)
    }

    /// Expects one transfer of `expected`, answered with `response`. Write
    /// style instructions ignore the response, so `&[]` is fine there.
    pub fn expect_transfer(
        &mut self,
        expected: &'static [u8],
        response: &'static [u8],
        sequence: &mut Sequence,
    ) {
        self.pin_cs
            .expect_set_low()
            .times(1)
            .returning(|| Ok(()))
            .in_sequence(sequence);

        self.bus
            .expect_transfer()
            .times(1)
            .returning(move |words| {
                assert_eq!(expected, words);
                Ok(response)
            })
            .in_sequence(sequence);

        self.pin_cs
            .expect_set_high()
            .times(1)
            .returning(|| Ok(()))
            .in_sequence(sequence);
    }
}
