use std::cell::Cell;

use bytes::{Bytes, BytesMut};
use edcp_fec::{protect, CodewordError, ErasureDecoder, FecLayout, Rs255, CODEWORD_LEN};
use edcp_frame::{decode_af, encode_af, AfHeader, CrcStatus, LengthCheck, PayloadType};
use edcp_pft::{
    encode_pft, FecParams, FecRetryPolicy, PftConfig, PftDecoder, PftError, PftHeader, PftOutcome,
    ReassemblyError, StoreConfig,
};

fn header(sequence: u16, index: usize, count: usize, fec: Option<FecParams>) -> PftHeader {
    PftHeader {
        sequence,
        index: index as u32,
        count: count as u32,
        fec,
        address: None,
        declared_len: 0,
        hcrc: 0,
        hcrc_ok: false,
    }
}

fn datagram(h: &PftHeader, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::new();
    encode_pft(h, payload, &mut buf).unwrap();
    buf.freeze()
}

fn af_frame(sequence: u16, len: usize) -> Bytes {
    let payload: Vec<u8> = (0..len).map(|i| (i * 31 + 7) as u8).collect();
    let mut buf = BytesMut::new();
    encode_af(&AfHeader::new(sequence, PayloadType::Tag), &payload, &mut buf).unwrap();
    buf.freeze()
}

/// Split without FEC into chunks of `chunk` bytes.
fn plain_fragments(sequence: u16, frame: &[u8], chunk: usize) -> Vec<Bytes> {
    let parts: Vec<&[u8]> = frame.chunks(chunk).collect();
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| datagram(&header(sequence, i, parts.len(), None), part))
        .collect()
}

/// RS-protect `frame` and split it into `count` fragments of `fragment_len`.
fn fec_fragments(
    sequence: u16,
    frame: &[u8],
    fragment_len: usize,
    count: usize,
    k: u8,
) -> Vec<Bytes> {
    let layout = FecLayout::new(fragment_len, count, usize::from(k)).unwrap();
    let wire = protect(&Rs255::new(), &layout, frame).unwrap();
    let params = FecParams {
        rs_k: k,
        rs_z: (layout.data_len() - frame.len()).min(255) as u8,
    };
    wire.chunks(fragment_len)
        .enumerate()
        .map(|(i, part)| datagram(&header(sequence, i, count, Some(params)), part))
        .collect()
}

struct AlwaysOk;

impl ErasureDecoder for AlwaysOk {
    fn decode(&self, _: &mut [u8; CODEWORD_LEN], _: &[usize]) -> Result<usize, CodewordError> {
        Ok(0)
    }
}

#[derive(Default)]
struct Counting {
    calls: Cell<usize>,
}

impl ErasureDecoder for Counting {
    fn decode(&self, _: &mut [u8; CODEWORD_LEN], _: &[usize]) -> Result<usize, CodewordError> {
        self.calls.set(self.calls.get() + 1);
        Ok(0)
    }
}

#[test]
fn single_fragment_passes_straight_through() {
    let frame = af_frame(1, 20);
    let mut decoder = PftDecoder::new(PftConfig::default());
    let report = decoder
        .push(datagram(&header(3, 0, 1, None), &frame))
        .unwrap();
    assert!(report.header.hcrc_ok);
    assert_eq!(report.outcome, PftOutcome::Unfragmented(frame));
}

#[test]
fn plain_fragments_in_reverse_order() {
    let frame = af_frame(2, 250);
    let fragments = plain_fragments(10, &frame, 64);
    let mut decoder = PftDecoder::new(PftConfig::default());

    let mut delivered = Vec::new();
    for dg in fragments.iter().rev() {
        let report = decoder.push(dg.clone()).unwrap();
        if let Some(f) = report.frame() {
            delivered.push(f.clone());
        } else {
            assert!(matches!(report.outcome, PftOutcome::Incomplete { needed: 5, .. }));
        }
    }
    assert_eq!(delivered, vec![frame.clone()]);

    // A straggler after delivery is not a new message.
    let report = decoder.push(fragments[2].clone()).unwrap();
    assert_eq!(report.outcome, PftOutcome::Duplicate);
}

#[test]
fn lost_fragment_is_recovered_after_failed_attempts() {
    // 10 fragments of 100 bytes, k = 207: c_max = 3, rx_min = 7.
    let frame = af_frame(3, 300);
    let fragments = fec_fragments(20, &frame, 100, 10, 207);
    let mut decoder = PftDecoder::new(PftConfig::default());

    let mut outcomes = Vec::new();
    for (i, dg) in fragments.iter().enumerate() {
        if i == 4 {
            continue;
        }
        outcomes.push(decoder.push(dg.clone()).unwrap().outcome);
    }

    for outcome in &outcomes[..6] {
        assert!(matches!(outcome, PftOutcome::Incomplete { needed: 7, .. }));
    }
    // Three and then two fragments missing: too many erasures, kept for retry.
    for outcome in &outcomes[6..8] {
        assert!(matches!(
            outcome,
            PftOutcome::Failed {
                reason: PftError::Fec(_),
                aborted: false
            }
        ));
    }
    let PftOutcome::Delivered { frame: block, fec } = &outcomes[8] else {
        panic!("expected delivery, got {:?}", outcomes[8]);
    };
    let fec = fec.expect("fec report");
    assert_eq!(block.len(), 1000);
    assert_eq!(fec.codewords, 3);
    assert_eq!(fec.min_fragments, 7);
    assert_eq!(fec.received, 9);
    assert_eq!(fec.placeholders, 1);

    let af = decode_af(block.clone()).unwrap();
    assert_eq!(af.crc_status, CrcStatus::Valid);
    assert_eq!(
        af.length_check,
        LengthCheck::TrailingBytes {
            count: 1000 - frame.len()
        }
    );
    assert_eq!(&block[..frame.len()], frame.as_ref());

    // The missing fragment turning up late changes nothing.
    let late = decoder.push(fragments[4].clone()).unwrap();
    assert_eq!(late.outcome, PftOutcome::Duplicate);
    assert_eq!(decoder.store().in_flight(), 0);
}

#[test]
fn several_lost_fragments_small_codewords() {
    // 12 fragments of 60 bytes, k = 100: c_max = 4, rx_min = 7.
    let frame = af_frame(4, 350);
    let fragments = fec_fragments(30, &frame, 60, 12, 100);
    let mut decoder = PftDecoder::new(PftConfig::default());

    let mut delivered = Vec::new();
    for (i, dg) in fragments.iter().enumerate() {
        if [1, 5, 10].contains(&i) {
            continue;
        }
        let report = decoder.push(dg.clone()).unwrap();
        if let Some(block) = report.frame() {
            delivered.push(block.clone());
        }
    }

    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].len(), 720);
    assert_eq!(&delivered[0][..frame.len()], frame.as_ref());
}

#[test]
fn complete_fec_message_corrects_errors() {
    let frame = af_frame(5, 300);
    let mut fragments = fec_fragments(40, &frame, 100, 10, 207);
    let header_len = fragments[2].len() - 100;
    let mut damaged = BytesMut::from(&fragments[2][..]);
    for offset in [0, 17, 33, 50, 70] {
        damaged[header_len + offset] ^= 0x5A;
    }
    fragments[2] = damaged.freeze();

    let mut decoder = PftDecoder::new(PftConfig {
        fec_with_gaps: false,
        ..PftConfig::default()
    });
    let mut last = None;
    for dg in &fragments {
        last = Some(decoder.push(dg.clone()).unwrap().outcome);
    }
    let Some(PftOutcome::Delivered { frame: block, fec }) = last else {
        panic!("expected delivery, got {last:?}");
    };
    assert_eq!(fec.map(|f| f.corrected_symbols), Some(5));
    assert_eq!(&block[..frame.len()], frame.as_ref());
}

#[test]
fn below_min_fragments_no_attempt_is_made() {
    let counting = Counting::default();
    let mut decoder = PftDecoder::with_decoder(PftConfig::default(), &counting);
    let frame = af_frame(6, 300);
    let fragments = fec_fragments(50, &frame, 100, 10, 207);

    for dg in &fragments[..6] {
        let report = decoder.push(dg.clone()).unwrap();
        assert!(matches!(
            report.outcome,
            PftOutcome::Incomplete {
                needed: 7,
                ..
            }
        ));
    }
    assert_eq!(counting.calls.get(), 0);

    let undelivered = decoder.drain();
    assert_eq!(undelivered.len(), 1);
    assert_eq!(
        undelivered[0].error,
        PftError::InsufficientFragments {
            received: 6,
            needed: 7
        }
    );
}

#[test]
fn min_fragments_with_stub_decoder_yields_full_block() {
    let mut decoder = PftDecoder::with_decoder(PftConfig::default(), AlwaysOk);
    let params = FecParams { rs_k: 207, rs_z: 0 };
    // 10 fragments of 100 bytes: rx_min = 7.
    let mut result = None;
    for i in [9, 0, 3, 6, 1, 7, 2] {
        let payload = vec![i as u8 + 1; 100];
        let report = decoder
            .push(datagram(&header(60, i, 10, Some(params)), &payload))
            .unwrap();
        result = Some(report.outcome);
    }
    let Some(PftOutcome::Delivered { frame, fec }) = result else {
        panic!("expected delivery, got {result:?}");
    };
    assert_eq!(frame.len(), 1000);
    assert_eq!(fec.map(|f| f.placeholders), Some(3));
    // Bytes past c_max * k are zero.
    assert!(frame[621..].iter().all(|&b| b == 0));
}

#[test]
fn fail_permanently_drops_message() {
    let frame = af_frame(7, 300);
    let fragments = fec_fragments(70, &frame, 100, 10, 207);
    let mut decoder = PftDecoder::new(PftConfig {
        fec_retry: FecRetryPolicy::FailPermanently,
        ..PftConfig::default()
    });

    let kept: Vec<_> = fragments
        .iter()
        .enumerate()
        .filter(|(i, _)| ![2, 5, 8].contains(i))
        .map(|(_, dg)| dg.clone())
        .collect();
    for dg in &kept[..6] {
        decoder.push(dg.clone()).unwrap();
    }
    let report = decoder.push(kept[6].clone()).unwrap();
    assert!(matches!(
        report.outcome,
        PftOutcome::Failed { aborted: true, .. }
    ));

    for i in [2, 5, 8] {
        let report = decoder.push(fragments[i].clone()).unwrap();
        assert_eq!(report.outcome, PftOutcome::Duplicate);
    }
    assert_eq!(decoder.store().in_flight(), 0);
}

#[test]
fn fragment_cap_aborts_only_that_sequence() {
    let mut decoder = PftDecoder::new(PftConfig {
        store: StoreConfig {
            max_fragments_per_message: 8,
            ..StoreConfig::default()
        },
        ..PftConfig::default()
    });
    let frame = af_frame(8, 100);
    let good = plain_fragments(1, &frame, 40);
    assert_eq!(good.len(), 3);

    decoder.push(good[0].clone()).unwrap();
    let report = decoder
        .push(datagram(&header(2, 0, 9, None), b"too many"))
        .unwrap();
    assert_eq!(
        report.outcome,
        PftOutcome::Failed {
            reason: PftError::Reassembly(ReassemblyError::TooManyFragments { total: 9, max: 8 }),
            aborted: true,
        }
    );

    decoder.push(good[1].clone()).unwrap();
    let report = decoder.push(good[2].clone()).unwrap();
    assert_eq!(report.frame(), Some(&frame));
}

#[test]
fn oversized_fec_block_is_rejected() {
    let mut decoder = PftDecoder::new(PftConfig {
        max_message_bytes: 1000,
        ..PftConfig::default()
    });
    let params = FecParams { rs_k: 207, rs_z: 0 };
    let report = decoder
        .push(datagram(&header(9, 0, 11, Some(params)), &[0u8; 100]))
        .unwrap();
    assert!(matches!(
        report.outcome,
        PftOutcome::Failed {
            reason: PftError::MessageTooLarge { size: 1100, max: 1000 },
            aborted: true
        }
    ));
}

#[test]
fn unparseable_datagram_is_an_error() {
    let mut decoder = PftDecoder::new(PftConfig::default());
    assert!(decoder.push(Bytes::from_static(b"PF\x00")).is_err());
    assert!(decoder.push(Bytes::from_static(b"XX\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00")).is_err());
}

#[test]
fn fec_flag_must_agree_within_message() {
    let frame = af_frame(8, 300);
    let layout = FecLayout::new(100, 10, 207).unwrap();
    let wire = protect(&Rs255::new(), &layout, &frame).unwrap();
    let fragments = fec_fragments(60, &frame, 100, 10, 207);
    let mut decoder = PftDecoder::new(PftConfig {
        fec_with_gaps: false,
        ..PftConfig::default()
    });

    for dg in &fragments[..9] {
        let report = decoder.push(dg.clone()).unwrap();
        assert!(matches!(report.outcome, PftOutcome::Incomplete { .. }));
    }
    // Last fragment of the protected block, sent without the FEC flag.
    let unprotected = datagram(&header(60, 9, 10, None), &wire[900..]);
    let report = decoder.push(unprotected).unwrap();
    assert_eq!(
        report.outcome,
        PftOutcome::Failed {
            reason: PftError::FecFlagMismatch { index: 9 },
            aborted: true
        }
    );
    assert_eq!(decoder.store().in_flight(), 0);
    let late = decoder.push(fragments[9].clone()).unwrap();
    assert!(late.frame().is_none());

    // A plain message that turns protected midway.
    let plain = plain_fragments(61, &af_frame(9, 250), 100);
    decoder.push(plain[0].clone()).unwrap();
    let params = FecParams { rs_k: 207, rs_z: 0 };
    let protected = datagram(&header(61, 1, plain.len(), Some(params)), &[0; 100]);
    let report = decoder.push(protected).unwrap();
    assert_eq!(
        report.outcome,
        PftOutcome::Failed {
            reason: PftError::FecFlagMismatch { index: 1 },
            aborted: true
        }
    );
}
