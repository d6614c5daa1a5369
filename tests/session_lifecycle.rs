//! # Session Lifecycle Tests
//!
//! Full print jobs against the in-memory printer on virtual time.
//!
//! ## Test Coverage
//!
//! - **Happy path**: exact command order, page size vs rows, for a Left
//!   (D11) and a Top (B1) printer
//! - **Failures**: cancellation mid-print, status timeout, transport fault,
//!   device error
//! - **Negotiation**: RFID detection through the roll catalog

use std::time::Duration;

use niimbot::NiimbotError;
use niimbot::error::ProtocolError;
use niimbot::printer::DeviceProfile;
use niimbot::protocol::{Packet, commands};
use niimbot::render::encoder::GrayRaster;
use niimbot::session::{ManualClock, PrintReport, PrintSession, SessionConfig, SessionState};
use niimbot::transport::mock::{self, MockHandle, MockReply, MockTransport};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

async fn run(
    model: &str,
    mock: MockTransport,
    config: SessionConfig,
    raster: &GrayRaster,
) -> (PrintReport, MockHandle) {
    let handle = mock.handle();
    let device = DeviceProfile::get(model).unwrap();
    let report = PrintSession::with_clock(mock, ManualClock::new(), device, config)
        .print(raster)
        .await;
    (report, handle)
}

/// Writes with consecutive bitmap/empty rows collapsed into one entry.
fn command_outline(handle: &MockHandle) -> Vec<u8> {
    let mut outline: Vec<u8> = Vec::new();
    for cmd in handle.commands() {
        let is_row = cmd == commands::BITMAP_ROW || cmd == commands::EMPTY_ROW;
        if is_row && outline.last() == Some(&cmd) {
            continue;
        }
        outline.push(cmd);
    }
    outline
}

fn row_index(packet: &Packet) -> u16 {
    u16::from_be_bytes([packet.payload[0], packet.payload[1]])
}

fn page_size(handle: &MockHandle) -> (u16, u16) {
    let pkt = handle
        .writes()
        .into_iter()
        .find(|p| p.command == commands::SET_PAGE_SIZE)
        .expect("no page size sent");
    (
        u16::from_be_bytes([pkt.payload[0], pkt.payload[1]]),
        u16::from_be_bytes([pkt.payload[2], pkt.payload[3]]),
    )
}

fn rfid_reply(barcode: &str, label_type: u8) -> Packet {
    let mut payload = vec![0x88, 0x1D, 0x4A, 0x02, 0x91, 0x00, 0x00, 0x14];
    payload.push(barcode.len() as u8);
    payload.extend_from_slice(barcode.as_bytes());
    payload.push(4);
    payload.extend_from_slice(b"A1B2");
    payload.extend_from_slice(&180u16.to_be_bytes());
    payload.extend_from_slice(&12u16.to_be_bytes());
    payload.push(label_type);
    Packet::new(0x1B, payload)
}

// ============================================================================
// HAPPY PATH
// ============================================================================

#[tokio::test]
async fn test_full_job_command_order() {
    let raster = GrayRaster::from_fn(240, 96, |x, _| if x % 2 == 0 { 0 } else { 255 });
    let (report, handle) = run("D11", MockTransport::printer(), SessionConfig::default(), &raster).await;

    assert!(report.is_success(), "{:?}", report.error);
    assert_eq!(
        command_outline(&handle),
        vec![
            commands::CONNECT,
            commands::GET_INFO,
            commands::GET_INFO,
            commands::GET_INFO,
            commands::GET_INFO,
            commands::GET_RFID,
            commands::SET_DENSITY,
            commands::SET_LABEL_TYPE,
            commands::START_PRINT,
            commands::START_PAGE,
            commands::SET_PAGE_SIZE,
            commands::SET_QUANTITY,
            commands::BITMAP_ROW,
            commands::END_PAGE,
            commands::PRINT_STATUS,
            commands::END_PRINT,
        ]
    );
    assert_eq!(
        report.states,
        vec![
            SessionState::Idle,
            SessionState::Connecting,
            SessionState::Negotiating,
            SessionState::Configuring,
            SessionState::Printing,
            SessionState::AwaitingCompletion,
            SessionState::Completed,
            SessionState::Disconnected,
        ]
    );
    assert_eq!((handle.connects(), handle.disconnects()), (1, 1));
}

#[tokio::test]
async fn test_left_printer_page_matches_rows() {
    for (w, h) in [(240, 96), (96, 240)] {
        let raster = GrayRaster::new(w, h, 0);
        let (report, handle) = run("D11", MockTransport::printer(), SessionConfig::default(), &raster).await;
        assert!(report.is_success());

        assert_eq!(page_size(&handle), (240, 96), "{}x{}", w, h);
        let rows: Vec<Packet> = handle
            .writes()
            .into_iter()
            .filter(|p| p.command == commands::BITMAP_ROW)
            .collect();
        assert_eq!(rows.len(), 240);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row_index(row) as usize, i);
            // index(2) + counts(3) + repeat(1) + 96 dots
            assert_eq!(row.payload.len(), 6 + 12);
        }
    }
}

#[tokio::test]
async fn test_top_printer_no_rotation() {
    let raster = GrayRaster::new(384, 240, 0);
    let (report, handle) = run("B1", MockTransport::printer(), SessionConfig::default(), &raster).await;
    assert!(report.is_success());
    assert_eq!(page_size(&handle), (240, 384));
    assert_eq!(report.page, Some((240, 384)));
    assert_eq!(handle.count(commands::BITMAP_ROW), 240);
    for row in handle.writes().iter().filter(|p| p.command == commands::BITMAP_ROW) {
        assert_eq!(row.payload.len(), 6 + 48);
        assert_eq!(&row.payload[2..5], &[128, 128, 128]);
    }
}

#[tokio::test]
async fn test_quantity_and_pacing() {
    let config = SessionConfig {
        quantity: 3,
        row_pacing_ms: 15,
        ..Default::default()
    };
    let (report, handle) = run("B21", MockTransport::printer(), config, &GrayRaster::new(384, 40, 255)).await;
    assert!(report.is_success());

    let quantity = handle
        .writes()
        .into_iter()
        .find(|p| p.command == commands::SET_QUANTITY)
        .unwrap();
    assert_eq!(quantity.payload, vec![0x00, 0x03]);
    assert_eq!(report.elapsed, Duration::from_millis(40 * 15));
}

#[tokio::test]
async fn test_polls_until_complete() {
    let mut polls = 0u8;
    let mock = MockTransport::new(move |req| match req.command {
        commands::PRINT_STATUS => {
            polls += 1;
            let progress = (polls * 40).min(100);
            MockReply::one(Packet::new(0xB3, vec![0, 1, progress, progress]))
        }
        _ => mock::printer_reply(req),
    });
    let config = SessionConfig {
        row_pacing_ms: 0,
        ..Default::default()
    };
    let (report, _) = run("B1", mock, config, &GrayRaster::new(384, 8, 255)).await;
    assert!(report.is_success());
    assert_eq!(report.status_polls, 3);
    assert_eq!(report.elapsed, Duration::from_millis(1000));
}

// ============================================================================
// FAILURES
// ============================================================================

#[tokio::test]
async fn test_cancel_mid_printing() {
    let token = CancellationToken::new();
    let trigger = token.clone();
    let mock = MockTransport::new(move |req| {
        if req.command == commands::BITMAP_ROW && row_index(req) == 10 {
            trigger.cancel();
        }
        mock::printer_reply(req)
    });
    let handle = mock.handle();

    let device = DeviceProfile::get("D11").unwrap();
    let report = PrintSession::with_clock(mock, ManualClock::new(), device, SessionConfig::default())
        .with_cancel(token)
        .print(&GrayRaster::new(240, 96, 0))
        .await;

    assert!(matches!(report.error, Some(NiimbotError::Cancelled)));
    assert_eq!(report.final_state(), SessionState::Disconnected);
    assert!(report.states.contains(&SessionState::Printing));
    assert!(!report.states.contains(&SessionState::Completed));
    assert_eq!(report.rows_sent, 11);
    assert_eq!(handle.count(commands::BITMAP_ROW), 11);
    assert_eq!(handle.count(commands::END_PAGE), 0);
    assert_eq!(handle.count(commands::END_PRINT), 0);
    assert_eq!(handle.disconnects(), 1);
}

#[tokio::test]
async fn test_status_timeout_sends_end_print() {
    let mock = MockTransport::new(|req| match req.command {
        commands::PRINT_STATUS => MockReply::one(Packet::new(0xB3, vec![0, 1, 50, 20])),
        _ => mock::printer_reply(req),
    });
    let config = SessionConfig {
        completion_timeout_ms: 2000,
        ..Default::default()
    };
    let (report, handle) = run("B1", mock, config, &GrayRaster::new(384, 8, 255)).await;

    assert!(matches!(report.error, Some(NiimbotError::Timeout(_))));
    assert_eq!(report.status_polls, 5);
    assert_eq!(report.last_status.map(|s| s.print_progress), Some(50));
    assert!(report.states.contains(&SessionState::Failed));
    assert_eq!(report.final_state(), SessionState::Disconnected);
    assert_eq!(handle.count(commands::END_PRINT), 1);
    assert_eq!(handle.disconnects(), 1);
}

#[tokio::test]
async fn test_silent_status_times_out() {
    let mock = MockTransport::new(|req| match req.command {
        commands::PRINT_STATUS => MockReply::Silent,
        _ => mock::printer_reply(req),
    });
    let (report, handle) = run("B1", mock, SessionConfig::default(), &GrayRaster::new(384, 8, 255)).await;

    assert!(matches!(report.error, Some(NiimbotError::Timeout(_))));
    assert_eq!(handle.count(commands::PRINT_STATUS), 1);
    assert_eq!(handle.count(commands::END_PRINT), 1);
}

#[tokio::test]
async fn test_silent_connect_sends_nothing_more() {
    let mock = MockTransport::new(|req| match req.command {
        commands::CONNECT => MockReply::Silent,
        _ => mock::printer_reply(req),
    });
    let (report, handle) = run("B1", mock, SessionConfig::default(), &GrayRaster::new(384, 8, 255)).await;

    assert!(matches!(report.error, Some(NiimbotError::Timeout(_))));
    assert_eq!(
        report.states,
        vec![
            SessionState::Idle,
            SessionState::Connecting,
            SessionState::Failed,
            SessionState::Disconnected,
        ]
    );
    assert_eq!(handle.commands(), vec![commands::CONNECT]);
    assert_eq!(handle.disconnects(), 1);
}

#[tokio::test]
async fn test_request_timeout_before_completion_skips_end_print() {
    let mock = MockTransport::new(|req| match req.command {
        commands::START_PAGE => MockReply::Silent,
        _ => mock::printer_reply(req),
    });
    let (report, handle) = run("B1", mock, SessionConfig::default(), &GrayRaster::new(384, 8, 255)).await;

    assert!(matches!(report.error, Some(NiimbotError::Timeout(_))));
    assert!(!report.states.contains(&SessionState::AwaitingCompletion));
    assert_eq!(handle.count(commands::START_PRINT), 1);
    assert_eq!(handle.count(commands::END_PRINT), 0);
    assert_eq!(handle.disconnects(), 1);
}

#[tokio::test]
async fn test_oversized_page_fails_before_connect() {
    let (report, handle) = run("B1", MockTransport::printer(), SessionConfig::default(), &GrayRaster::new(2000, 8, 0)).await;

    assert!(matches!(report.error, Some(NiimbotError::Image(_))));
    assert_eq!(report.states, vec![SessionState::Idle, SessionState::Failed]);
    assert!(handle.writes().is_empty());
    assert_eq!((handle.connects(), handle.disconnects()), (0, 0));
}

#[tokio::test]
async fn test_transport_fault_skips_end_print() {
    let mock = MockTransport::new(|req| match req.command {
        commands::START_PAGE => MockReply::Fault("connection reset".into()),
        _ => mock::printer_reply(req),
    });
    let (report, handle) = run("D11", mock, SessionConfig::default(), &GrayRaster::new(240, 96, 0)).await;

    assert!(matches!(report.error, Some(NiimbotError::Transport(_))));
    assert_eq!(report.final_state(), SessionState::Disconnected);
    assert_eq!(handle.count(commands::BITMAP_ROW), 0);
    assert_eq!(handle.count(commands::END_PRINT), 0);
    assert_eq!(handle.disconnects(), 1);
}

#[tokio::test]
async fn test_device_error_fails_session() {
    let mock = MockTransport::new(|req| match req.command {
        commands::SET_PAGE_SIZE => MockReply::one(Packet::new(commands::REPLY_ERROR, vec![0x06])),
        _ => mock::printer_reply(req),
    });
    let (report, handle) = run("B1", mock, SessionConfig::default(), &GrayRaster::new(384, 8, 255)).await;

    assert!(matches!(
        report.error,
        Some(NiimbotError::Protocol(ProtocolError::DeviceError { command: 0x13, .. }))
    ));
    assert_eq!(handle.count(commands::BITMAP_ROW), 0);
    assert_eq!(handle.disconnects(), 1);
}

#[tokio::test]
async fn test_refused_start_print() {
    let mock = MockTransport::new(|req| match req.command {
        commands::START_PRINT => MockReply::one(Packet::new(0x02, vec![0x00])),
        _ => mock::printer_reply(req),
    });
    let (report, handle) = run("B1", mock, SessionConfig::default(), &GrayRaster::new(384, 8, 255)).await;
    assert!(report.into_result().is_err());
    assert_eq!(handle.count(commands::START_PAGE), 0);
}

// ============================================================================
// NEGOTIATION
// ============================================================================

#[tokio::test]
async fn test_rfid_detection_through_catalog() {
    let mock = MockTransport::new(|req| match req.command {
        commands::GET_RFID => MockReply::one(rfid_reply("6972842743589", 1)),
        _ => mock::printer_reply(req),
    });
    let mut config = SessionConfig::default();
    config.roll_catalog.insert("6972842743589", 30.0, 12.0);

    let (report, _) = run("D11", mock, config, &GrayRaster::new(240, 96, 255)).await;
    assert!(report.is_success());

    let detection = report.detection.unwrap();
    assert!(detection.success);
    assert_eq!(detection.detected_profile.unwrap().name, "D11 30x12");
    assert_eq!(detection.confidence, 1.0);
    assert_eq!(report.rfid.unwrap().used_len, 12);
}

#[tokio::test]
async fn test_no_tag_is_not_fatal() {
    let (report, _) = run("D11", MockTransport::printer(), SessionConfig::default(), &GrayRaster::new(240, 96, 255)).await;
    assert!(report.is_success());
    let detection = report.detection.unwrap();
    assert!(!detection.success);
    assert!(detection.rfid_data.is_none());
    assert_eq!(report.label_type, Some(1));
}

#[tokio::test]
async fn test_negotiation_can_be_skipped() {
    let config = SessionConfig {
        query_info: false,
        query_rfid: false,
        ..Default::default()
    };
    let (report, handle) = run("B1", MockTransport::printer(), config, &GrayRaster::new(384, 8, 255)).await;
    assert!(report.is_success());
    assert_eq!(handle.count(commands::GET_INFO), 0);
    assert_eq!(handle.count(commands::GET_RFID), 0);
    assert!(report.detection.is_none());
}

#[tokio::test]
async fn test_fragmented_replies() {
    let (report, _) = run(
        "B1",
        MockTransport::printer().fragmented(),
        SessionConfig::default(),
        &GrayRaster::new(384, 8, 255),
    )
    .await;
    assert!(report.is_success(), "{:?}", report.error);
    assert_eq!(report.device_info.len(), 4);
}
