use crate::can::{BusError, CanError, TxBuffer};
use crate::config::{CanBitrate, CanClock};
use crate::filter::{AcceptanceFilter, AcceptanceMask};
use crate::frame::CanFrame;
use crate::mocks::TestClock;
use crate::tests::Mocks;
use embedded_can::{ExtendedId, Id, StandardId};
use mockall::Sequence;

fn standard_frame(id: u16, data: &[u8]) -> CanFrame {
    CanFrame::new_data(Id::Standard(StandardId::new(id).unwrap()), data).unwrap()
}

#[test]
fn set_config_mode_success() {
    let mut mocks = Mocks::default();
    let mut sequence = Sequence::new();

    mocks.expect_transfer(&[0x05, 0x0F, 0xE0, 0x80], &[], &mut sequence);
    mocks.expect_transfer(&[0x03, 0x0E, 0x00], &[0x0, 0x0, 0x80], &mut sequence);

    let clock = TestClock::new(vec![100]);
    mocks.into_controller().set_config_mode(&clock).unwrap();
}

#[test]
fn set_normal_mode_polls_until_settled() {
    let mut mocks = Mocks::default();
    let mut sequence = Sequence::new();

    mocks.expect_transfer(&[0x05, 0x0F, 0xE0, 0x00], &[], &mut sequence);
    // still in configuration mode on the first poll
    mocks.expect_transfer(&[0x03, 0x0E, 0x00], &[0x0, 0x0, 0x80], &mut sequence);
    mocks.expect_transfer(&[0x03, 0x0E, 0x00], &[0x0, 0x0, 0x00], &mut sequence);

    let clock = TestClock::new(vec![100, 200]);
    mocks.into_controller().set_normal_mode(&clock).unwrap();
}

#[test]
fn set_mode_timeout() {
    let mut mocks = Mocks::default();
    let mut sequence = Sequence::new();

    mocks.expect_transfer(&[0x05, 0x0F, 0xE0, 0x60], &[], &mut sequence);
    mocks.expect_transfer(&[0x03, 0x0E, 0x00], &[0x0, 0x0, 0x80], &mut sequence);
    mocks.expect_transfer(&[0x03, 0x0E, 0x00], &[0x0, 0x0, 0x80], &mut sequence);

    // 10 ms timeout window starting at 100 us
    let clock = TestClock::new(vec![100, 200, 20_000]);

    assert_eq!(
        CanError::ModeTimeout,
        mocks
            .into_controller()
            .set_listen_only_mode(&clock)
            .unwrap_err()
    );
}

#[test]
fn set_bitrate_unsupported_combination() {
    // fails before any SPI traffic
    let mocks = Mocks::default();
    let clock = TestClock::new(vec![]);

    assert_eq!(
        CanError::BitrateNotSupported,
        mocks
            .into_controller()
            .set_bitrate(CanBitrate::Kbps5, CanClock::MHz20, &clock)
            .unwrap_err()
    );
}

#[test]
fn set_bitrate_writes_cnf_registers() {
    let mut mocks = Mocks::default();
    let mut sequence = Sequence::new();

    mocks.expect_transfer(&[0x05, 0x0F, 0xE0, 0x80], &[], &mut sequence);
    mocks.expect_transfer(&[0x03, 0x0E, 0x00], &[0x0, 0x0, 0x80], &mut sequence);
    mocks.expect_transfer(&[0x02, 0x2A, 0x01], &[], &mut sequence);
    mocks.expect_transfer(&[0x02, 0x29, 0xB4], &[], &mut sequence);
    mocks.expect_transfer(&[0x02, 0x28, 0x86], &[], &mut sequence);

    let clock = TestClock::new(vec![100]);
    mocks
        .into_controller()
        .set_bitrate(CanBitrate::Kbps100, CanClock::MHz8, &clock)
        .unwrap();
}

#[test]
fn set_filter_writes_id_block() {
    let mut mocks = Mocks::default();
    let mut sequence = Sequence::new();

    mocks.expect_transfer(&[0x05, 0x0F, 0xE0, 0x80], &[], &mut sequence);
    mocks.expect_transfer(&[0x03, 0x0E, 0x00], &[0x0, 0x0, 0x80], &mut sequence);
    mocks.expect_transfer(&[0x02, 0x08, 0x24, 0x60, 0x00, 0x00], &[], &mut sequence);

    let clock = TestClock::new(vec![100]);
    mocks
        .into_controller()
        .set_filter(AcceptanceFilter::Rxf2, false, 0x123, &clock)
        .unwrap();
}

#[test]
fn set_filter_mask_writes_id_block() {
    let mut mocks = Mocks::default();
    let mut sequence = Sequence::new();

    mocks.expect_transfer(&[0x05, 0x0F, 0xE0, 0x80], &[], &mut sequence);
    mocks.expect_transfer(&[0x03, 0x0E, 0x00], &[0x0, 0x0, 0x80], &mut sequence);
    mocks.expect_transfer(&[0x02, 0x24, 0xFF, 0xEB, 0xFF, 0xFF], &[], &mut sequence);

    let clock = TestClock::new(vec![100]);
    mocks
        .into_controller()
        .set_filter_mask(AcceptanceMask::Mask1, true, 0x1FFF_FFFF, &clock)
        .unwrap();
}

#[test]
fn send_message_all_buffers_busy() {
    let mut mocks = Mocks::default();
    let mut sequence = Sequence::new();

    mocks.expect_transfer(&[0x03, 0x30, 0x00], &[0x0, 0x0, 0x08], &mut sequence);
    mocks.expect_transfer(&[0x03, 0x40, 0x00], &[0x0, 0x0, 0x08], &mut sequence);
    mocks.expect_transfer(&[0x03, 0x50, 0x00], &[0x0, 0x0, 0x08], &mut sequence);

    assert_eq!(
        CanError::AllTxBusy,
        mocks
            .into_controller()
            .send_message(&standard_frame(0x100, &[0xFF]))
            .unwrap_err()
    );
}

#[test]
fn send_message_picks_first_idle_buffer() {
    let mut mocks = Mocks::default();
    let mut sequence = Sequence::new();

    mocks.expect_transfer(&[0x03, 0x30, 0x00], &[0x0, 0x0, 0x08], &mut sequence);
    mocks.expect_transfer(&[0x03, 0x40, 0x00], &[0x0, 0x0, 0x00], &mut sequence);
    mocks.expect_transfer(
        &[0x02, 0x41, 0x20, 0x00, 0x00, 0x00, 0x01, 0xFF],
        &[],
        &mut sequence,
    );
    mocks.expect_transfer(&[0x05, 0x40, 0x08, 0x08], &[], &mut sequence);
    mocks.expect_transfer(&[0x03, 0x40, 0x00], &[0x0, 0x0, 0x08], &mut sequence);

    mocks
        .into_controller()
        .send_message(&standard_frame(0x100, &[0xFF]))
        .unwrap();
}

#[test]
fn send_message_through_extended_remote() {
    let mut mocks = Mocks::default();
    let mut sequence = Sequence::new();

    // RTR bit folded into the DLC byte, payload bytes still written as zeros
    mocks.expect_transfer(
        &[0x02, 0x31, 0xFF, 0xEB, 0xFF, 0xFF, 0x42, 0x00, 0x00],
        &[],
        &mut sequence,
    );
    mocks.expect_transfer(&[0x05, 0x30, 0x08, 0x08], &[], &mut sequence);
    mocks.expect_transfer(&[0x03, 0x30, 0x00], &[0x0, 0x0, 0x08], &mut sequence);

    let frame =
        CanFrame::new_remote(Id::Extended(ExtendedId::new(0x1FFF_FFFF).unwrap()), 2).unwrap();

    mocks
        .into_controller()
        .send_message_through(TxBuffer::Txb0, &frame)
        .unwrap();
}

#[test]
fn send_message_through_reports_failed_attempt() {
    let mut mocks = Mocks::default();
    let mut sequence = Sequence::new();

    mocks.expect_transfer(
        &[0x02, 0x31, 0x20, 0x00, 0x00, 0x00, 0x01, 0xFF],
        &[],
        &mut sequence,
    );
    mocks.expect_transfer(&[0x05, 0x30, 0x08, 0x08], &[], &mut sequence);
    // TXERR set
    mocks.expect_transfer(&[0x03, 0x30, 0x00], &[0x0, 0x0, 0x10], &mut sequence);

    assert_eq!(
        CanError::TxFailed,
        mocks
            .into_controller()
            .send_message_through(TxBuffer::Txb0, &standard_frame(0x100, &[0xFF]))
            .unwrap_err()
    );
}

#[test]
fn read_message_drains_rxb0_first() {
    let mut mocks = Mocks::default();
    let mut sequence = Sequence::new();

    mocks.expect_transfer(&[0xA0, 0x00], &[0x0, 0x03], &mut sequence);
    mocks.expect_transfer(
        &[0x03, 0x61, 0x00, 0x00, 0x00, 0x00, 0x00],
        &[0x0, 0x0, 0x20, 0x00, 0x00, 0x00, 0x01],
        &mut sequence,
    );
    mocks.expect_transfer(&[0x03, 0x60, 0x00], &[0x0, 0x0, 0x00], &mut sequence);
    mocks.expect_transfer(&[0x03, 0x66, 0x00], &[0x0, 0x0, 0xAB], &mut sequence);
    mocks.expect_transfer(&[0x05, 0x2C, 0x01, 0x00], &[], &mut sequence);

    let frame = mocks.into_controller().read_message().unwrap();
    assert_eq!(standard_frame(0x100, &[0xAB]), frame);
}

#[test]
fn read_message_falls_back_to_rxb1() {
    let mut mocks = Mocks::default();
    let mut sequence = Sequence::new();

    mocks.expect_transfer(&[0xA0, 0x00], &[0x0, 0x02], &mut sequence);
    mocks.expect_transfer(
        &[0x03, 0x71, 0x00, 0x00, 0x00, 0x00, 0x00],
        &[0x0, 0x0, 0x24, 0x60, 0x00, 0x00, 0x04],
        &mut sequence,
    );
    // RXRTR set, so no payload is read
    mocks.expect_transfer(&[0x03, 0x70, 0x00], &[0x0, 0x0, 0x08], &mut sequence);
    mocks.expect_transfer(&[0x05, 0x2C, 0x02, 0x00], &[], &mut sequence);

    let frame = mocks.into_controller().read_message().unwrap();
    let expected =
        CanFrame::new_remote(Id::Standard(StandardId::new(0x123).unwrap()), 4).unwrap();
    assert_eq!(expected, frame);
}

#[test]
fn read_message_none_pending() {
    let mut mocks = Mocks::default();
    let mut sequence = Sequence::new();

    mocks.expect_transfer(&[0xA0, 0x00], &[0x0, 0x00], &mut sequence);

    assert_eq!(
        CanError::NoMessage,
        mocks.into_controller().read_message().unwrap_err()
    );
}

#[test]
fn read_message_extended_id() {
    let mut mocks = Mocks::default();
    let mut sequence = Sequence::new();

    mocks.expect_transfer(&[0xA0, 0x00], &[0x0, 0x01], &mut sequence);
    mocks.expect_transfer(
        &[0x03, 0x61, 0x00, 0x00, 0x00, 0x00, 0x00],
        &[0x0, 0x0, 0xFF, 0xEB, 0xFF, 0xFF, 0x02],
        &mut sequence,
    );
    mocks.expect_transfer(&[0x03, 0x60, 0x00], &[0x0, 0x0, 0x00], &mut sequence);
    mocks.expect_transfer(
        &[0x03, 0x66, 0x00, 0x00],
        &[0x0, 0x0, 0xDE, 0xAD],
        &mut sequence,
    );
    mocks.expect_transfer(&[0x05, 0x2C, 0x01, 0x00], &[], &mut sequence);

    let frame = mocks.into_controller().read_message().unwrap();
    let expected = CanFrame::new_data(
        Id::Extended(ExtendedId::new(0x1FFF_FFFF).unwrap()),
        &[0xDE, 0xAD],
    )
    .unwrap();
    assert_eq!(expected, frame);
}

#[test]
fn clear_rx_overrun_without_error_flags() {
    let mut mocks = Mocks::default();
    let mut sequence = Sequence::new();

    mocks.expect_transfer(&[0x03, 0x2D, 0x00], &[0x0, 0x0, 0x00], &mut sequence);

    mocks.into_controller().clear_rx_overrun().unwrap();
}

#[test]
fn clear_rx_overrun_with_overflow() {
    let mut mocks = Mocks::default();
    let mut sequence = Sequence::new();

    mocks.expect_transfer(&[0x03, 0x2D, 0x00], &[0x0, 0x0, 0x40], &mut sequence);
    mocks.expect_transfer(&[0x05, 0x2D, 0xC0, 0x00], &[], &mut sequence);
    mocks.expect_transfer(&[0x02, 0x2C, 0x00], &[], &mut sequence);

    mocks.into_controller().clear_rx_overrun().unwrap();
}

#[test]
fn error_counters() {
    let mut mocks = Mocks::default();
    let mut sequence = Sequence::new();

    mocks.expect_transfer(&[0x03, 0x1C, 0x00], &[0x0, 0x0, 0x2A], &mut sequence);
    mocks.expect_transfer(&[0x03, 0x1D, 0x00], &[0x0, 0x0, 0x15], &mut sequence);

    let mut controller = mocks.into_controller();
    assert_eq!(0x2A, controller.error_count_tx().unwrap());
    assert_eq!(0x15, controller.error_count_rx().unwrap());
}

#[test]
fn check_error_reads_eflg() {
    let mut mocks = Mocks::default();
    let mut sequence = Sequence::new();

    // warning flags alone do not count as errors
    mocks.expect_transfer(&[0x03, 0x2D, 0x00], &[0x0, 0x0, 0x07], &mut sequence);
    mocks.expect_transfer(&[0x03, 0x2D, 0x00], &[0x0, 0x0, 0x20], &mut sequence);

    let mut controller = mocks.into_controller();
    assert!(!controller.check_error().unwrap());
    assert!(controller.check_error().unwrap());
}

#[test]
fn transfer_error_releases_chip_select() {
    let mut mocks = Mocks::default();
    let mut sequence = Sequence::new();

    mocks
        .pin_cs
        .expect_set_low()
        .times(1)
        .returning(|| Ok(()))
        .in_sequence(&mut sequence);
    mocks
        .bus
        .expect_transfer()
        .times(1)
        .returning(|_| Err(55))
        .in_sequence(&mut sequence);
    mocks
        .pin_cs
        .expect_set_high()
        .times(1)
        .returning(|| Ok(()))
        .in_sequence(&mut sequence);

    assert_eq!(
        CanError::BusError(BusError::TransferError(55)),
        mocks.into_controller().read_status().unwrap_err()
    );
}

#[test]
fn chip_select_error() {
    let mut mocks = Mocks::default();

    mocks.pin_cs.expect_set_low().times(1).returning(|| Err(21));

    assert_eq!(
        CanError::BusError(BusError::CSError(21)),
        mocks.into_controller().read_status().unwrap_err()
    );
}

#[test]
fn reset_configures_receive_path() {
    let mut mocks = Mocks::default();
    let mut sequence = Sequence::new();

    mocks.expect_transfer(&[0xC0], &[], &mut sequence);

    let zeros = &[
        0x02, 0x30, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ];
    mocks.expect_transfer(zeros, &[], &mut sequence);
    mocks.expect_transfer(
        &[
            0x02, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00,
        ],
        &[],
        &mut sequence,
    );
    mocks.expect_transfer(
        &[
            0x02, 0x50, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00,
        ],
        &[],
        &mut sequence,
    );
    mocks.expect_transfer(&[0x02, 0x60, 0x00], &[], &mut sequence);
    mocks.expect_transfer(&[0x02, 0x70, 0x00], &[], &mut sequence);

    // RX0IF, RX1IF, ERRIF and MERRF enabled
    mocks.expect_transfer(&[0x02, 0x2B, 0xA3], &[], &mut sequence);

    mocks.expect_transfer(&[0x05, 0x60, 0x67, 0x04], &[], &mut sequence);
    mocks.expect_transfer(&[0x05, 0x70, 0x67, 0x01], &[], &mut sequence);

    // filter bank cleared, RXF1 as extended slot
    for (sidh, sidl) in [
        (0x00, 0x00),
        (0x04, 0x08),
        (0x08, 0x00),
        (0x10, 0x00),
        (0x14, 0x00),
        (0x18, 0x00),
        (0x20, 0x08),
        (0x24, 0x08),
    ] {
        mocks.expect_transfer(&[0x05, 0x0F, 0xE0, 0x80], &[], &mut sequence);
        mocks.expect_transfer(&[0x03, 0x0E, 0x00], &[0x0, 0x0, 0x80], &mut sequence);

        let expected: &'static [u8] = match (sidh, sidl) {
            (0x00, 0x00) => &[0x02, 0x00, 0x00, 0x00, 0x00, 0x00],
            (0x04, 0x08) => &[0x02, 0x04, 0x00, 0x08, 0x00, 0x00],
            (0x08, 0x00) => &[0x02, 0x08, 0x00, 0x00, 0x00, 0x00],
            (0x10, 0x00) => &[0x02, 0x10, 0x00, 0x00, 0x00, 0x00],
            (0x14, 0x00) => &[0x02, 0x14, 0x00, 0x00, 0x00, 0x00],
            (0x18, 0x00) => &[0x02, 0x18, 0x00, 0x00, 0x00, 0x00],
            (0x20, 0x08) => &[0x02, 0x20, 0x00, 0x08, 0x00, 0x00],
            _ => &[0x02, 0x24, 0x00, 0x08, 0x00, 0x00],
        };
        mocks.expect_transfer(expected, &[], &mut sequence);
    }

    // two instants for the settle wait, one per mode change
    let clock = TestClock::new(vec![100, 20_000, 1, 2, 3, 4, 5, 6, 7, 8]);
    mocks.into_controller().reset(&clock).unwrap();
}
