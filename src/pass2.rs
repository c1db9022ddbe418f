//! Pass 2 (`link`): verify every PC label got defined somewhere, collapse
//! any local/global chain nobody ever defined to an extern marker, fold
//! `ALIGN` padding into each section's running offset, and bake that running
//! offset into every label's pass-1 estimate so pass 3 can read it directly.

use crate::action::{split, Action};
use crate::diag;
use crate::errors::EncodeError;
use crate::state::State;

/// Run pass 2 across every section, returning the combined code size in
/// bytes that the caller must hand `encode()` a buffer of exactly.
#[tracing::instrument(level = "debug", skip(state))]
pub fn link(state: &mut State) -> Result<usize, EncodeError> {
    if let Some(err) = state.status {
        diag::trace_short_circuit("link", err);
        return Err(err);
    }

    // Unlike `put()`'s failures, a `link()`/`encode()` failure is not
    // latched into `state.status` — the C engine's own `CK` macros only
    // persist a sticky status from within `dasm_put`; pass 2 and pass 3
    // simply return their error to the caller for this call only.
    for (pc, &slot) in state.pclabels.iter().enumerate() {
        if slot > 0 {
            let err = EncodeError::UndefPc(pc as u32);
            tracing::error!(%err, "link() failed");
            return Err(err);
        }
    }

    // Ids 0..19 are reserved (locals 1-9, a dead zone 10-19); true globals
    // start at 20. Any global chain still unresolved here was never defined
    // by a `put()` call in this run — collapse it to a negative `-idx`
    // marker so pass 3 can recognise it as "resolve via the globals array"
    // rather than a normal intra-stream relocation.
    for idx in 20..state.lglabels.len() {
        let mut n = state.lglabels[idx];
        while n > 0 {
            let next = state.cell(n as u32);
            state.set_cell(n as u32, -(idx as i64));
            n = next;
        }
    }

    let mut ofs: i64 = 0;
    for secnum in 0..state.maxsection() {
        let lastpos = state.sections[secnum].pos;
        let mut pos = 0usize;
        while pos != lastpos {
            let start = state.sections[secnum].buf[pos];
            pos += 1;
            let mut ip = start as usize;
            loop {
                let word = state.actionlist[ip];
                ip += 1;
                let (tag, low) = split(word);
                let Some(action) = Action::from_tag(tag) else {
                    continue;
                };
                match action {
                    Action::Stop | Action::Section => break,
                    Action::Esc => ip += 1,
                    Action::RelExt => {}
                    Action::Align => {
                        let o = state.sections[secnum].buf[pos] as i64;
                        pos += 1;
                        ofs -= (o + ofs) & (low & 255) as i64;
                    }
                    Action::RelLg | Action::RelPc | Action::RelApc => pos += 1,
                    Action::LabelLg | Action::LabelPc => {
                        state.sections[secnum].buf[pos] =
                            (state.sections[secnum].buf[pos] as i64 + ofs) as u32;
                        pos += 1;
                    }
                    Action::Imm
                    | Action::Imm12
                    | Action::Imm16
                    | Action::Imm32
                    | Action::Imml
                    | Action::Immv8
                    | Action::Immshift => pos += 1,
                    Action::Vrlist => pos += 2,
                }
            }
        }
        ofs += state.sections[secnum].ofs;
    }

    state.codesize = Some(ofs as usize);
    tracing::debug!(codesize = ofs, "link() finished");
    Ok(ofs as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use crate::state::State;

    #[test]
    fn link_reports_an_undefined_pc_label() {
        let actionlist = [0u32]; // Stop, never reached by this test
        let mut state = State::new(1, Limits::default());
        state.grow_pc(1);
        state.setup(&actionlist);
        state.pclabels[0] = 1; // referenced but never defined

        let err = link(&mut state).expect_err("undefined pc label");
        assert!(matches!(err, EncodeError::UndefPc(0)));
        // link() failures never latch into state.status, only put() failures do.
        assert!(state.status.is_none());
    }

    #[test]
    fn link_short_circuits_when_status_already_latched() {
        let actionlist = [0u32];
        let mut state = State::new(1, Limits::default());
        state.setup(&actionlist);
        state.status = Some(EncodeError::Phase);

        let err = link(&mut state).expect_err("status already set");
        assert!(matches!(err, EncodeError::Phase));
    }
}
