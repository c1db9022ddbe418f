//! Black-box tests driving `put`/`link`/`encode` end to end, the way a JIT
//! host would: build an action list and operands, run the three passes, and
//! check the emitted bytes or the error the engine reports.

use armv7m_dynencode::config::Limits;
use armv7m_dynencode::errors::EncodeError;
use armv7m_dynencode::state::State;
use armv7m_dynencode::{bits, pass1, pass2, pass3};

const TAG_SECTION: u32 = 1;
const TAG_RELLG: u32 = 5;
const TAG_LABELLG: u32 = 6;
const TAG_IMM12: u32 = 11;
const TAG_VRLIST: u32 = 17;

fn action(tag: u32, low: u32) -> u32 {
    (tag << 16) | low
}

#[test]
fn empty_template_encodes_to_nothing() {
    let actionlist = [action(0, 0)]; // Stop, never reached
    let mut state = State::new(1, Limits::default());
    state.setup(&actionlist);

    let codesize = pass2::link(&mut state).expect("link");
    assert_eq!(codesize, 0);

    let mut buffer: Vec<u8> = Vec::new();
    pass3::encode(&mut state, &mut buffer, |_buf, _cp, _id, _pc| 0).expect("encode");
    assert!(buffer.is_empty());
}

#[test]
fn single_literal_instruction_round_trips() {
    const LITERAL: u32 = 0xF8DF_8000; // top bits put this well past Action::COUNT
    let actionlist = [LITERAL, action(0, 0)];
    let mut state = State::new(1, Limits::default());
    state.setup(&actionlist);

    pass1::put(&mut state, 0, &[]);
    assert!(state.status.is_none());

    let codesize = pass2::link(&mut state).expect("link");
    assert_eq!(codesize, 4);

    let mut buffer = vec![0u8; codesize];
    pass3::encode(&mut state, &mut buffer, |_buf, _cp, _id, _pc| 0).expect("encode");

    let expected = bits::encode_halfword(LITERAL, state.endianness);
    assert_eq!(buffer, expected.to_ne_bytes());
}

#[test]
fn forward_local_branch_resolves_to_a_four_byte_displacement() {
    // [literal branch placeholder] [RelLg 1, narrow] [literal NOP] [LabelLg 1]
    const BRANCH: u32 = 0xD000_0000; // arbitrary literal, tag far past Action::COUNT
    const NOP: u32 = 0xBF00_0000;
    let actionlist = [
        BRANCH,
        action(TAG_RELLG, 0x8001), // branch-style relocation, local label 1
        NOP,
        action(TAG_LABELLG, 1),
        action(0, 0), // Stop
    ];

    let mut state = State::new(1, Limits::default());
    state.setup_global(&mut [], 0);
    state.setup(&actionlist);

    pass1::put(&mut state, 0, &[]);
    assert!(state.status.is_none(), "put failed: {:?}", state.status);

    let codesize = pass2::link(&mut state).expect("link");
    assert_eq!(codesize, 8);

    let mut buffer = vec![0u8; codesize];
    pass3::encode(&mut state, &mut buffer, |_buf, _cp, _id, _pc| 0).expect("encode");

    // Displacement is 4: narrow branch packs it as imm11 = (n >> 1) & 0x7FF.
    let patched_branch = BRANCH | 2;
    let expected_first = bits::encode_halfword(patched_branch, state.endianness);
    let expected_second = bits::encode_halfword(NOP, state.endianness);
    assert_eq!(&buffer[0..4], &expected_first.to_ne_bytes());
    assert_eq!(&buffer[4..8], &expected_second.to_ne_bytes());
}

#[test]
fn backward_branch_out_of_range_reports_range_rel() {
    const BRANCH: u32 = 0xD000_0000;
    const FILLER: u32 = 0xBF00_0000;
    const NUM_FILLER: usize = 400_000; // 1.6 MiB of offset, well past the +-1 MiB narrow range

    let mut actionlist = Vec::with_capacity(NUM_FILLER + 4);
    actionlist.push(BRANCH);
    actionlist.push(action(TAG_RELLG, 0x8001));
    actionlist.extend(std::iter::repeat_n(FILLER, NUM_FILLER));
    actionlist.push(action(TAG_LABELLG, 1));
    actionlist.push(action(0, 0));

    let mut state = State::new(1, Limits::default());
    state.setup_global(&mut [], 0);
    state.setup(&actionlist);

    pass1::put(&mut state, 0, &[]);
    assert!(state.status.is_none(), "put failed: {:?}", state.status);

    let codesize = pass2::link(&mut state).expect("link");
    let mut buffer = vec![0u8; codesize];
    let err = pass3::encode(&mut state, &mut buffer, |_buf, _cp, _id, _pc| 0)
        .expect_err("displacement should be out of range");
    assert!(matches!(err, EncodeError::RangeRel(_)), "got {err:?}");
}

#[test]
fn imm12_range_failure_latches_put_status() {
    let actionlist = [action(TAG_IMM12, 0), action(0, 0)];
    let mut state = State::new(1, Limits {
        strict_checks: true,
        ..Limits::default()
    });
    state.setup(&actionlist);

    pass1::put(&mut state, 0, &[0xDEADBEEFu32 as i32]);

    assert!(matches!(state.status, Some(EncodeError::RangeImm(_))));
}

#[test]
fn vrlist_packs_s_register_range_like_the_reference_encoder() {
    const LITERAL: u32 = 0xED00_0A00; // VSTM-shaped placeholder
    let actionlist = [LITERAL, action(TAG_VRLIST, 0), action(0, 0)];

    let mut state = State::new(1, Limits::default());
    state.setup(&actionlist);

    pass1::put(&mut state, 0, &[5, 8]); // n=5, n2=8 -> count=4
    assert!(state.status.is_none(), "put failed: {:?}", state.status);

    let codesize = pass2::link(&mut state).expect("link");
    let mut buffer = vec![0u8; codesize];
    pass3::encode(&mut state, &mut buffer, |_buf, _cp, _id, _pc| 0).expect("encode");

    let expected_bits = bits::pack_vrlist(false, 5, 8);
    let expected = bits::encode_halfword(LITERAL | expected_bits, state.endianness);
    assert_eq!(&buffer[0..4], &expected.to_ne_bytes());
}

#[test]
fn section_mismatch_is_reported_by_checkstep() {
    let actionlist = [action(TAG_SECTION, 0), action(0, 0)];
    let mut state = State::new(2, Limits::default());
    state.setup(&actionlist);

    pass1::put(&mut state, 0, &[]);
    assert!(state.status.is_none());
    assert_eq!(state.active_section, 0);

    let err = state.checkstep(Some(1));
    assert!(matches!(err, Some(EncodeError::MatchSection(0))));
}
