mod common;

use std::thread;

use common::{in_frame, Reply, ScriptedTransport, TIMEOUT};
use scope_tmc::communication::header::{MsgHeader, HEADER_SIZE};
use scope_tmc::{Error, FramingError, Session, SessionConfig, SessionState, TagPolicy, TransferError};

fn ready(transport: ScriptedTransport, config: SessionConfig) -> Session<ScriptedTransport> {
    let session = Session::new(transport, config);
    session.start().unwrap();
    session
}

#[test]
fn tags_cycle_and_carry_their_complement() {
    let session = ready(ScriptedTransport::new(64), SessionConfig::default());

    for _ in 0..300 {
        assert_eq!(session.write(b"x", TIMEOUT), 1);
    }

    let headers = session.transport().sent_headers();
    assert_eq!(headers.len(), 300);
    for (i, header) in headers.iter().enumerate() {
        assert_eq!(header.tag as usize, i % 255 + 1);
        assert_eq!(header.tag_inverse, !header.tag);
    }
    assert_eq!(session.last_tag(), 45);
}

#[test]
fn write_frames_one_padded_message_with_eom() {
    let session = ready(ScriptedTransport::new(64), SessionConfig::default());

    assert_eq!(session.write(b"ABCDE", TIMEOUT), 5);

    let sent = session.transport().sent();
    assert_eq!(sent.len(), 1);
    let frame = &sent[0];
    assert_eq!(frame.len(), HEADER_SIZE + 8);
    assert_eq!(
        frame[..HEADER_SIZE],
        [0x01, 0x01, 0xFE, 0x00, 0x05, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00]
    );
    assert_eq!(&frame[HEADER_SIZE..], b"ABCDE\0\0\0");
}

#[test]
fn write_must_fit_in_one_packet() {
    let session = ready(ScriptedTransport::new(64), SessionConfig::default());

    assert_eq!(session.write(&[b'a'; 53], TIMEOUT), 0);
    assert!(matches!(
        session.try_write(&[b'a'; 53], TIMEOUT),
        Err(Error::TooLarge { len: 53, max: 64 })
    ));
    assert!(session.transport().sent().is_empty());
    assert_eq!(session.last_tag(), 0);

    assert_eq!(session.write(&[b'a'; 52], TIMEOUT), 52);
    assert_eq!(session.transport().sent()[0].len(), 64);
}

#[test]
fn nothing_moves_before_start() {
    let session = Session::new(ScriptedTransport::new(64), SessionConfig::default());
    session.transport().message(b"1\n", true);
    let mut answer = [0u8; 16];

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.write(b"*IDN?", TIMEOUT), 0);
    assert_eq!(session.read(&mut answer, TIMEOUT), 0);
    assert_eq!(session.ask(b"*IDN?", &mut answer, TIMEOUT), 0);
    assert!(matches!(session.try_read(&mut answer, TIMEOUT), Err(Error::NotReady)));

    assert!(session.transport().sent().is_empty());
    assert_eq!(session.transport().bulk_in_calls(), 0);
}

#[test]
fn read_reassembles_chunks_until_eom() {
    // 28 byte buffers leave room for 16 payload bytes per transfer
    let config = SessionConfig::default().with_buffer_size(28);
    let session = ready(ScriptedTransport::new(64), config);
    session
        .transport()
        .message(b"0123456789abcdef", false)
        .message(b"ghijklmnopqrstuv", false)
        .message(b"wxyz", true);

    let mut answer = [0xAAu8; 64];
    let len = session.read(&mut answer, TIMEOUT);

    assert_eq!(len, 36);
    assert_eq!(&answer[..len], b"0123456789abcdefghijklmnopqrstuvwxyz");
    assert_eq!(answer[len], 0);
    assert_eq!(answer[len + 1], 0xAA);

    let requests = session.transport().sent_headers();
    assert_eq!(requests.len(), 3);
    for (i, request) in requests.iter().enumerate() {
        assert_eq!(request.msg_id, 2);
        assert_eq!(request.tag as usize, i + 1);
        assert_eq!(request.transfer_size, 16);
    }
    assert_eq!(session.transport().bulk_in_calls(), 3);
}

#[test]
fn read_stops_when_the_output_is_full() {
    let session = ready(ScriptedTransport::new(64), SessionConfig::default());
    session.transport().message(b"0123456789", false);

    let mut answer = [0u8; 10];
    assert_eq!(session.read(&mut answer, TIMEOUT), 10);
    assert_eq!(&answer, b"0123456789");

    let requests = session.transport().sent_headers();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].transfer_size, 10);
}

#[test]
fn bad_tag_complement_fails_the_read() {
    let session = ready(ScriptedTransport::new(64), SessionConfig::default());
    let mut frame = in_frame(1, b"RUN\n", true);
    frame[2] = 0x00;
    session.transport().reply(Reply::Raw(frame));

    let mut answer = [0u8; 16];
    assert_eq!(session.read(&mut answer, TIMEOUT), 0);
}

#[test]
fn inconsistent_responses_are_framing_errors() {
    let session = ready(ScriptedTransport::new(64), SessionConfig::default());
    let mut answer = [0u8; 16];

    // header claims 12 bytes, only 4 follow
    let mut short = MsgHeader::dev_dep_msg_in(1, 12, true).encode().to_vec();
    short.extend_from_slice(b"0123");
    session.transport().reply(Reply::Raw(short));
    assert!(matches!(
        session.try_read(&mut answer, TIMEOUT),
        Err(Error::Framing(FramingError::ShortTransfer {
            received: 16,
            expected: 24
        }))
    ));

    // more than the 16 bytes that were asked for
    session.transport().reply(Reply::Raw(in_frame(2, &[b'x'; 20], true)));
    assert!(matches!(
        session.try_read(&mut answer, TIMEOUT),
        Err(Error::Framing(FramingError::SizeExceedsRequest {
            size: 20,
            requested: 16
        }))
    ));

    // a DEV_DEP_MSG_OUT where an IN was expected
    let mut wrong_id = in_frame(3, b"abcd", true);
    wrong_id[0] = 0x01;
    session.transport().reply(Reply::Raw(wrong_id));
    assert!(matches!(
        session.try_read(&mut answer, TIMEOUT),
        Err(Error::Framing(FramingError::UnexpectedMsgId { found: 1, .. }))
    ));
}

#[test]
fn transfer_failures_surface_through_try_read() {
    let session = ready(ScriptedTransport::new(64), SessionConfig::default());
    let mut answer = [0u8; 16];

    assert!(matches!(session.try_read(&mut answer, TIMEOUT), Err(Error::Timeout)));

    session.transport().reply(Reply::Fail(TransferError::Stall));
    assert!(matches!(
        session.try_read(&mut answer, TIMEOUT),
        Err(Error::Transport(TransferError::Stall))
    ));
}

#[test]
fn tag_policy_controls_foreign_tags() {
    let mut answer = [0u8; 16];

    let lenient = ready(ScriptedTransport::new(64), SessionConfig::default());
    lenient.transport().reply(Reply::Raw(in_frame(99, b"RUN\n", true)));
    assert_eq!(lenient.read(&mut answer, TIMEOUT), 4);
    assert_eq!(&answer[..4], b"RUN\n");

    let strict = ready(
        ScriptedTransport::new(64),
        SessionConfig::default().with_tag_policy(TagPolicy::MatchRequest),
    );
    strict.transport().reply(Reply::Raw(in_frame(99, b"RUN\n", true)));
    assert!(matches!(
        strict.try_read(&mut answer, TIMEOUT),
        Err(Error::Framing(FramingError::TagMismatch {
            tag: 99,
            expected: 1,
            ..
        }))
    ));

    strict.transport().message(b"STOP\n", true);
    assert_eq!(strict.read(&mut answer, TIMEOUT), 5);
}

#[test]
fn ask_does_not_read_after_a_failed_write() {
    let session = ready(ScriptedTransport::new(64), SessionConfig::default());
    session.transport().message(b"never read\n", true);
    let mut answer = [0u8; 32];

    session.transport().fail_next_bulk_out(TransferError::Stall);
    assert_eq!(session.ask(b"*IDN?", &mut answer, TIMEOUT), 0);
    assert_eq!(session.ask(&[b'?'; 60], &mut answer, TIMEOUT), 0);
    assert_eq!(session.transport().bulk_in_calls(), 0);

    assert_eq!(session.ask(b"*IDN?", &mut answer, TIMEOUT), 11);
    assert_eq!(&answer[..11], b"never read\n");
}

#[test]
fn concurrent_asks_get_their_own_answers() {
    let session = ready(ScriptedTransport::echo(64), SessionConfig::default());

    thread::scope(|scope| {
        for worker in 0..8 {
            let session = &session;
            scope.spawn(move || {
                for round in 0..50 {
                    let query = format!("worker {worker} round {round}");
                    let mut answer = [0u8; 64];
                    let len = session.ask(query.as_bytes(), &mut answer, TIMEOUT);
                    assert_eq!(&answer[..len], query.as_bytes());
                }
            });
        }
    });

    assert_eq!(session.transport().bulk_in_calls(), 8 * 50);
}

#[test]
fn lifecycle_opens_and_closes_endpoints() {
    let session = Session::new(ScriptedTransport::new(64), SessionConfig::default());

    session.start().unwrap();
    session.start().unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.transport().open_close_counts(), (1, 0));

    session.stop();
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.write(b"RUN", TIMEOUT), 0);
    assert_eq!(session.transport().open_close_counts(), (1, 1));

    session.start().unwrap();
    assert_eq!(session.write(b"RUN", TIMEOUT), 3);

    session.unload();
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(session.transport().open_close_counts(), (2, 2));
    assert!(matches!(session.start(), Err(Error::NotReady)));
    assert_eq!(session.write(b"RUN", TIMEOUT), 0);
}

#[test]
fn control_request_failures_are_reported() {
    let session = ready(ScriptedTransport::new(64), SessionConfig::default());
    assert!(session.indicator_pulse().is_err());
    assert!(session.get_capabilities().is_err());
}
