//! Pass 3 (`encode`): walk the finalized action streams one last time,
//! emitting bit-exact Thumb-2 machine code into the caller's buffer and
//! patching every relocation pass 1/2 recorded.
//!
//! The buffer is written a 32-bit cell at a time. Each new cell is left
//! "pending" (not yet halfword-swapped for the target's byte order) so that
//! later actions in the same action stream can still OR bits into it; it's
//! only committed — swapped and finalized — the moment a *new* cell is
//! about to be opened, or at the very end of `encode`.

use crate::action::{split, Action};
use crate::bits::{encode_halfword, imm12, Endianness};
use crate::diag;
use crate::errors::EncodeError;
use crate::state::State;

fn read_word(buf: &[u8], off: usize) -> u32 {
    u32::from_ne_bytes(buf[off..off + 4].try_into().unwrap())
}

fn write_word(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_ne_bytes());
}

/// Commit the word just before `cp` (if any), then open a new pending word
/// at `cp` holding `value`. Returns the advanced cursor.
fn push_word(buf: &mut [u8], cp: usize, endianness: Endianness, value: u32) -> usize {
    if cp != 0 {
        let prev = read_word(buf, cp - 4);
        write_word(buf, cp - 4, encode_halfword(prev, endianness));
    }
    write_word(buf, cp, value);
    cp + 4
}

/// OR `bits` into the still-pending word just before `cp`.
fn patch_or(buf: &mut [u8], cp: usize, bits: u32) {
    let prev = read_word(buf, cp - 4);
    write_word(buf, cp - 4, prev | bits);
}

/// Shared tail for the branch-style `B`/`BL`/`REL_APC` displacement patch:
/// packs `S:I1:I2:imm10:imm11` (wide) or `S:J2:J1:imm6:imm11` (narrow).
fn patch_branch(buf: &mut [u8], cp: usize, low: u32, action_ip: u32, n: i64) -> Result<(), EncodeError> {
    let isimm10 = low & 16384 != 0;
    let (lo, hi) = if isimm10 {
        (-16_777_216i64, 16_777_216i64)
    } else {
        (-1_048_576i64, 1_048_576i64)
    };
    if n & 1 != 0 || n < lo || n > hi {
        return Err(EncodeError::RangeRel(action_ip));
    }
    let s_bit = (n < 0) as u32;
    let imm11 = ((n >> 1) & 0x7FF) as u32;
    let immr_mask = if isimm10 { 0x3FF } else { 0x3F };
    let immr = (((n >> 12) as u32) & immr_mask) << 16;
    let mut bits = imm11 | immr | (s_bit << 26);
    if isimm10 {
        let i1 = (((n >> 1) as u32) & (1 << 22)) >> 22;
        let i2 = (((n >> 1) as u32) & (1 << 21)) >> 21;
        let j1 = (!(s_bit ^ i1) & 1) << 13;
        let j2 = (!(s_bit ^ i2) & 1) << 11;
        bits |= j1 | j2;
    } else {
        let j1 = (((n >> 1) as u32) & (1 << 18)) >> (18 - 13);
        let j2 = (((n >> 1) as u32) & (1 << 19)) >> (19 - 11);
        bits |= j1 | j2;
    }
    patch_or(buf, cp, bits);
    Ok(())
}

/// Shared tail for a `REL_LG`/`REL_PC`/`REL_EXT` relocation: dispatches on
/// the action word's flag bits to the branch, VFP-load, `ADR`, or plain
/// signed-magnitude ("imm-L") patch form.
fn patch_relocation(
    buf: &mut [u8],
    cp: usize,
    low: u32,
    action_ip: u32,
    mut n: i64,
) -> Result<(), EncodeError> {
    if low & 32768 != 0 {
        // The C original always runs this wide, exclusive-upper-bound check
        // before falling into the shared branch-patch tail (`patchrel`'s own
        // `CK`), on top of that tail's own isimm10-dependent, inclusive-upper
        // bound check — `REL_APC` skips straight to the tail and is the only
        // caller entitled to the inclusive bound.
        if n & 1 != 0 || !(-16_777_216..16_777_216).contains(&n) {
            return Err(EncodeError::RangeRel(action_ip));
        }
        return patch_branch(buf, cp, low, action_ip, n);
    } else if low & 16384 != 0 {
        n /= 4;
    } else if low & 8192 != 0 {
        if n & 1 != 0 || n <= -4096 || n >= 4096 {
            return Err(EncodeError::RangeRel(action_ip));
        }
        let mut bits = 0u32;
        if n < 0 {
            bits |= 0x00A0_0000;
            n = -n;
        }
        bits |= (n as u32 & 0xFF) | (((n as u32 >> 8) & 0x7) << 12) | (((n as u32 >> 11) & 0x1) << 26);
        patch_or(buf, cp, bits);
        return Ok(());
    }
    if n & 3 != 0 || !(-4096..4096).contains(&n) {
        return Err(EncodeError::RangeRel(action_ip));
    }
    let bits = if n >= 0 { 0x0080_0000 | n as u32 } else { (-n) as u32 };
    patch_or(buf, cp, bits);
    Ok(())
}

/// Run pass 3, writing machine code into `buffer` (must be exactly
/// `codesize` bytes, as reported by [`crate::pass2::link`]). `resolve_extern`
/// answers `REL_EXT` relocations: given the in-progress buffer, the byte
/// cursor the reference appears at, the extern id, and whether the
/// reference should be PC-relative, it returns the displacement to patch.
#[tracing::instrument(level = "debug", skip(state, buffer, resolve_extern), fields(len = buffer.len()))]
pub fn encode(
    state: &mut State,
    buffer: &mut [u8],
    mut resolve_extern: impl FnMut(&[u8], usize, usize, bool) -> i32,
) -> Result<(), EncodeError> {
    if let Some(err) = state.status {
        diag::trace_short_circuit("encode", err);
        return Err(err);
    }
    let codesize = state
        .codesize
        .expect("link() must run before encode() can size the buffer");
    assert_eq!(
        buffer.len(),
        codesize,
        "encode() buffer must be exactly codesize bytes"
    );

    let endianness = state.endianness;
    let base_addr = buffer.as_ptr() as i64;
    let mut cp = 0usize;

    for secnum in 0..state.maxsection() {
        let lastpos = state.sections[secnum].pos;
        let mut pos = 0usize;
        while pos != lastpos {
            let start = state.sections[secnum].buf[pos];
            pos += 1;
            let mut ip = start as usize;
            loop {
                let action_ip = ip as u32;
                let ins_word = state.actionlist[ip];
                ip += 1;
                let (tag, low) = split(ins_word);
                let action_opt = Action::from_tag(tag);

                let mut n: i64 = 0;
                let mut n2: i64 = 0;
                if let Some(action) = action_opt {
                    let stored = action.stored_args();
                    if stored >= 1 {
                        n = state.sections[secnum].buf[pos] as i32 as i64;
                        pos += 1;
                    }
                    if stored >= 2 {
                        n2 = state.sections[secnum].buf[pos] as i32 as i64;
                        pos += 1;
                    }
                }

                let Some(action) = action_opt else {
                    // Instruction literal: not an action tag at all, just
                    // raw machine code to emit verbatim.
                    cp = push_word(buffer, cp, endianness, ins_word);
                    continue;
                };

                match action {
                    Action::Stop | Action::Section => break,
                    Action::Esc => {
                        let literal = state.actionlist[ip];
                        ip += 1;
                        cp = push_word(buffer, cp, endianness, literal);
                    }
                    Action::RelExt => {
                        let id = (low & 2047) as usize;
                        let pc_relative = low & 2048 == 0;
                        n = resolve_extern(buffer, cp, id, pc_relative) as i64;
                        patch_relocation(buffer, cp, low, action_ip, n)?;
                    }
                    Action::Align => {
                        let mask = low & 255;
                        while (cp as u32) & mask != 0 {
                            cp = push_word(buffer, cp, endianness, 0xf3af_8000);
                        }
                    }
                    Action::RelLg => {
                        if n < 0 {
                            return Err(EncodeError::UndefLg((-n) as u32));
                        }
                        let target = state.cell(n as u32);
                        n = target - cp as i64;
                        patch_relocation(buffer, cp, low, action_ip, n)?;
                    }
                    Action::RelPc => {
                        if n < 0 {
                            return Err(EncodeError::UndefPc(action_ip));
                        }
                        let target = state.cell(n as u32);
                        n = target - cp as i64;
                        patch_relocation(buffer, cp, low, action_ip, n)?;
                    }
                    Action::LabelLg => {
                        // The C engine biases its globals pointer by -10 so
                        // one array serves both the local/global label
                        // numbering and the host's 0-indexed globals table;
                        // this slice isn't pointer-biased, so true globals
                        // (id >= 20) land at `id - 20` instead of `id - 10`.
                        let id = low & 2047;
                        if id >= 20
                            && let Some(globals) = state.globals.as_deref_mut()
                            && let Some(slot) = globals.get_mut((id - 20) as usize)
                        {
                            *slot = (base_addr + n) as usize;
                        }
                    }
                    Action::LabelPc => {}
                    Action::Imm => {
                        let mut shift_bits = (low >> 10) & 31;
                        let mut value = n;
                        if low & 0x8000 != 0 {
                            let delta = ((low >> 10) & 0x0F) as i64;
                            value += if (low >> 10) & 0x10 != 0 { -delta } else { delta };
                            shift_bits = 0;
                        }
                        let bitcount = (low >> 5) & 31;
                        let mask = (1u32 << bitcount).wrapping_sub(1);
                        let bits = (((value >> shift_bits) as u32) & mask) << (low & 31);
                        patch_or(buffer, cp, bits);
                    }
                    Action::Imm12 => {
                        let Some(enc) = imm12(n as u32) else {
                            return Err(EncodeError::RangeImm(action_ip));
                        };
                        patch_or(buffer, cp, enc);
                    }
                    Action::Imm16 => {
                        let bits = (n as u32 & 0xFF)
                            | (((n >> 8) as u32 & 0x7) << 12)
                            | (((n >> 11) as u32 & 0x1) << 26)
                            | (((n >> 12) as u32 & 0xF) << 16);
                        patch_or(buffer, cp, bits);
                    }
                    Action::Imm32 => {
                        patch_or(buffer, cp, n as u32);
                    }
                    Action::Imml | Action::Immv8 => {
                        let bits = if n >= 0 {
                            0x0080_0000 | n as u32
                        } else {
                            (-n) as u32
                        };
                        patch_or(buffer, cp, bits);
                    }
                    Action::Immshift => {
                        let bits = low << ((n as u32) & 31);
                        patch_or(buffer, cp, bits);
                    }
                    Action::Vrlist => {
                        let count = (n2 + 1 - n) as u32;
                        let bits = if low & 1 == 0 {
                            (((n as u32 & 31) >> 1) << 12) + ((n as u32 & 1) << 22) + count
                        } else {
                            ((n as u32 & 15) << 12) + (((n as u32 & 31) >> 4) << 22) + count * 2 + 0x100
                        };
                        patch_or(buffer, cp, bits);
                    }
                    Action::RelApc => {
                        // Unlike the in-stream relocations above, this one
                        // is relative to the buffer's real, final execution
                        // address: the caller is assumed to have already
                        // placed `buffer` where it will run.
                        n -= base_addr + cp as i64 - 4;
                        patch_branch(buffer, cp, low, action_ip, n)?;
                    }
                }
            }
        }
    }

    if cp != 0 {
        let prev = read_word(buffer, cp - 4);
        write_word(buffer, cp - 4, encode_halfword(prev, endianness));
    }

    if cp != codesize {
        tracing::error!(cp, codesize, "encode() phase error");
        return Err(EncodeError::Phase);
    }
    tracing::debug!(codesize, "encode() finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Invert `patch_branch`'s narrow encode path field by field.
    fn decode_narrow_branch(bits: u32) -> i64 {
        let s = (bits >> 26) & 1;
        let j1 = (bits >> 13) & 1;
        let j2 = (bits >> 11) & 1;
        let immr = (bits >> 16) & 0x3F;
        let imm11 = bits & 0x7FF;
        let mut magnitude =
            ((imm11 as i64) << 1) | ((immr as i64) << 12) | ((j1 as i64) << 19) | ((j2 as i64) << 20);
        if s == 1 {
            magnitude -= 1 << 21;
        }
        magnitude
    }

    #[test]
    fn patch_branch_narrow_round_trips_a_forward_displacement() {
        let mut buf = vec![0u8; 4];
        patch_branch(&mut buf, 4, 0x8000, 0, 4).expect("in range");
        let bits = read_word(&buf, 0);
        assert_eq!(decode_narrow_branch(bits), 4);
    }

    #[test]
    fn patch_branch_narrow_rejects_an_odd_displacement() {
        let mut buf = vec![0u8; 4];
        let err = patch_branch(&mut buf, 4, 0x8000, 7, 5).expect_err("odd displacement");
        assert!(matches!(err, EncodeError::RangeRel(7)));
    }

    #[test]
    fn patch_branch_wide_rejects_beyond_the_24_bit_range() {
        let mut buf = vec![0u8; 4];
        let err = patch_branch(&mut buf, 4, 0xC000, 3, 16_777_218).expect_err("out of range");
        assert!(matches!(err, EncodeError::RangeRel(3)));
    }

    #[test]
    fn patch_relocation_wide_branch_rejects_exactly_2_pow_24() {
        // REL_LG/REL_PC/REL_EXT go through patch_relocation's own strict,
        // exclusive-upper-bound pre-check before the shared branch tail's
        // inclusive one; REL_APC (patch_branch called directly, as in the
        // test above) is the only caller allowed to reach exactly 2^24.
        let mut buf = vec![0u8; 4];
        let err = patch_relocation(&mut buf, 4, 0xC000, 9, 16_777_216)
            .expect_err("2^24 is in-range for patch_branch alone but not via patch_relocation");
        assert!(matches!(err, EncodeError::RangeRel(9)));
    }

    #[test]
    fn patch_relocation_wide_branch_accepts_just_under_2_pow_24() {
        let mut buf = vec![0u8; 4];
        patch_relocation(&mut buf, 4, 0xC000, 9, 16_777_214).expect("one below the strict bound");
    }

    #[test]
    fn patch_or_ors_into_the_pending_word() {
        let mut buf = vec![0u8; 8];
        write_word(&mut buf, 0, 0x0000_00F0);
        patch_or(&mut buf, 4, 0x0000_000F);
        assert_eq!(read_word(&buf, 0), 0x0000_00FF);
    }
}
