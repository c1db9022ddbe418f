//! Pass 1 (`put`): interpret one action stream against runtime-supplied
//! operands, link label chains, range-check immediates, and accumulate a
//! conservative byte-offset estimate per section.

use crate::action::{split, Action};
use crate::bits::imm12;
use crate::diag;
use crate::errors::EncodeError;
use crate::state::labels::{define_label, link_reference, LabelKind};
use crate::state::{sec2pos, State};

/// Shift a `u32` left/right by an amount taken mod 32, matching the
/// practical (if technically UB in the original C) behaviour of `ins >>
/// shift` on the host architectures DynASM targets, where `shift` is itself
/// derived from a 5-bit field and can legitimately be 0..31.
fn shr32(n: u32, shift: u32) -> u32 {
    n.wrapping_shr(shift & 31)
}
fn shl32(n: u32, shift: u32) -> u32 {
    n.wrapping_shl(shift & 31)
}

/// Record a `put` call starting at action-list index `start`, consuming
/// runtime arguments from `args` as the action stream demands them.
#[tracing::instrument(level = "debug", skip(state, args), fields(start, nargs = args.len()))]
pub fn put(state: &mut State, start: u32, args: &[i32]) {
    if let Some(err) = state.status {
        diag::trace_short_circuit("put", err);
        return;
    }

    let sec_idx = state.active_section;
    state.grow_section(sec_idx, state.sections[sec_idx].pos);

    let mut pos = state.sections[sec_idx].pos;
    let mut ofs = state.sections[sec_idx].ofs;

    state.sections[sec_idx].buf[pos] = start;
    pos += 1;

    let mut ip = start as usize;
    let mut argi = 0usize;
    let strict = state.limits.strict_checks;

    macro_rules! fail {
        ($err:expr) => {{
            let err = $err;
            tracing::error!(%err, "put() failed, status now latched");
            state.status = Some(err);
            return;
        }};
    }

    loop {
        let word = state.actionlist[ip];
        let action_idx = ip as u32;
        ip += 1;
        let (tag, low) = split(word);

        let Some(action) = Action::from_tag(tag) else {
            ofs += 4;
            continue;
        };

        let consume = action.runtime_args();
        let n: i64 = if consume >= 1 {
            let v = args[argi] as i64;
            argi += 1;
            v
        } else {
            0
        };
        let n2: i64 = if consume >= 2 {
            let v = args[argi] as i64;
            argi += 1;
            v
        } else {
            0
        };

        match action {
            Action::Stop => break,
            Action::Section => {
                // Always bounds-checked: an out-of-range section index would
                // otherwise panic the next time any section array is
                // indexed, not just fail a semantic check.
                let n = low & 255;
                if n as usize >= state.maxsection() {
                    fail!(EncodeError::RangeSection(action_idx));
                }
                state.active_section = n as usize;
                break;
            }
            Action::Esc => {
                ip += 1;
                ofs += 4;
            }
            Action::RelExt => {}
            Action::Align => {
                ofs += (low & 255) as i64;
                state.sections[sec_idx].buf[pos] = ofs as u32;
                pos += 1;
            }
            Action::RelLg => {
                let raw = low & 2047;
                let n0 = raw as i64 - 10;
                let biased = sec2pos(sec_idx as u32) | pos as u32;
                if n0 >= 0 {
                    let idx = n0 as usize;
                    if idx >= state.lglabels.len() {
                        fail!(EncodeError::RangeLg(action_idx));
                    }
                    if strict && !(n0 >= 10 || state.lglabels[idx] < 0) {
                        fail!(EncodeError::RangeLg(action_idx));
                    }
                    link_reference(state, LabelKind::LocalGlobal, idx, biased);
                } else {
                    let idx = raw as usize;
                    if idx >= state.lglabels.len() {
                        fail!(EncodeError::RangeLg(action_idx));
                    }
                    // Local labels always bind to the *next* definition: a
                    // pending earlier definition is discarded here, forcing
                    // a fresh forward chain.
                    if state.lglabels[idx] < 0 {
                        state.lglabels[idx] = 0;
                    }
                    link_reference(state, LabelKind::LocalGlobal, idx, biased);
                }
                pos += 1;
            }
            Action::RelPc => {
                let idx = n as usize;
                if idx >= state.pclabels.len() {
                    fail!(EncodeError::RangePc(action_idx));
                }
                let biased = sec2pos(sec_idx as u32) | pos as u32;
                link_reference(state, LabelKind::Pc, idx, biased);
                pos += 1;
            }
            Action::LabelLg => {
                // Same index arithmetic as RelLg: ids >= 10 index at id-10,
                // ids < 10 (locals) index at the raw id.
                let raw = low & 2047;
                let idx = if raw >= 10 { (raw - 10) as usize } else { raw as usize };
                if idx >= state.lglabels.len() {
                    fail!(EncodeError::RangeLg(action_idx));
                }
                let biased = sec2pos(sec_idx as u32) | pos as u32;
                define_label(state, LabelKind::LocalGlobal, idx, biased);
                state.sections[sec_idx].buf[pos] = ofs as u32;
                pos += 1;
            }
            Action::LabelPc => {
                let idx = n as usize;
                if idx >= state.pclabels.len() {
                    fail!(EncodeError::RangePc(action_idx));
                }
                let biased = sec2pos(sec_idx as u32) | pos as u32;
                define_label(state, LabelKind::Pc, idx, biased);
                state.sections[sec_idx].buf[pos] = ofs as u32;
                pos += 1;
            }
            Action::Imm | Action::Imm16 | Action::Imm32 => {
                if strict && matches!(action, Action::Imm | Action::Imm16) {
                    let pre_shift = (low >> 10) & 31;
                    let bitcount = (low >> 5) & 31;
                    let mask = shl32(1, pre_shift).wrapping_sub(1);
                    if (n as u32) & mask != 0 {
                        fail!(EncodeError::RangeImm(action_idx));
                    }
                    let ok = if low & 0x8000 != 0 {
                        let half = shl32(1, bitcount.wrapping_sub(1));
                        shr32((n + half as i64) as u32, bitcount) == 0
                    } else {
                        shr32(n as u32, bitcount) == 0
                    };
                    if !ok {
                        fail!(EncodeError::RangeImm(action_idx));
                    }
                }
                state.sections[sec_idx].buf[pos] = n as u32;
                pos += 1;
            }
            Action::Immv8 | Action::Imml => {
                let mut n = n;
                if matches!(action, Action::Immv8) {
                    if strict && n & 3 != 0 {
                        fail!(EncodeError::RangeImm(action_idx));
                    }
                    n >>= 2;
                }
                if strict {
                    let bitcount = (low >> 5) & 31;
                    let ok = if n >= 0 {
                        shr32(n as u32, bitcount) == 0
                    } else {
                        shr32((-n) as u32, bitcount) == 0
                    };
                    if !ok {
                        fail!(EncodeError::RangeImm(action_idx));
                    }
                }
                state.sections[sec_idx].buf[pos] = n as u32;
                pos += 1;
            }
            Action::Imm12 => {
                if strict && imm12(n as u32).is_none() {
                    fail!(EncodeError::RangeImm(action_idx));
                }
                state.sections[sec_idx].buf[pos] = n as u32;
                pos += 1;
            }
            Action::RelApc | Action::Immshift => {
                state.sections[sec_idx].buf[pos] = n as u32;
                pos += 1;
            }
            Action::Vrlist => {
                if strict && !((0..31).contains(&n) && (0..31).contains(&n2)) {
                    fail!(EncodeError::RangeImm(action_idx));
                }
                state.sections[sec_idx].buf[pos] = n as u32;
                state.sections[sec_idx].buf[pos + 1] = n2 as u32;
                pos += 2;
            }
        }
    }

    state.sections[sec_idx].pos = pos;
    state.sections[sec_idx].ofs = ofs;
    tracing::debug!(section = sec_idx, ofs, "put() recorded");
}
