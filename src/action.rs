//! The action-list tag set. An action word's upper 16 bits select one of
//! these; a value at or beyond [`Action::COUNT`] names an instruction
//! literal to be emitted verbatim instead.

/// One entry of the action enumeration, in the exact order the numeric
/// opcode space assigns them — order is load-bearing, `Action::from_tag`
/// and every `tag >= X` range check in pass1/pass2/pass3 depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Stop,
    Section,
    Esc,
    RelExt,
    // Actions from here on need a buffer position.
    Align,
    RelLg,
    LabelLg,
    // Actions from here on also carry a runtime argument.
    RelPc,
    LabelPc,
    RelApc,
    Imm,
    Imm12,
    Imm16,
    Imm32,
    Imml,
    Immv8,
    Immshift,
    // Actions from here on carry two runtime arguments.
    Vrlist,
}

impl Action {
    pub const COUNT: u32 = 18;

    /// Decode the upper 16 bits of an action word. Returns `None` when the
    /// tag is an instruction literal (`tag >= Action::COUNT`).
    pub fn from_tag(tag: u32) -> Option<Action> {
        use Action::*;
        Some(match tag {
            0 => Stop,
            1 => Section,
            2 => Esc,
            3 => RelExt,
            4 => Align,
            5 => RelLg,
            6 => LabelLg,
            7 => RelPc,
            8 => LabelPc,
            9 => RelApc,
            10 => Imm,
            11 => Imm12,
            12 => Imm16,
            13 => Imm32,
            14 => Imml,
            15 => Immv8,
            16 => Immshift,
            17 => Vrlist,
            _ => return None,
        })
    }

    /// Number of runtime (`put`-call variadic) arguments this action consumes.
    pub fn runtime_args(self) -> usize {
        use Action::*;
        match self {
            RelPc | LabelPc | RelApc | Imm | Imm12 | Imm16 | Imm32 | Imml | Immv8 | Immshift => 1,
            Vrlist => 2,
            _ => 0,
        }
    }

    /// Number of section-buffer cells this action stores during pass 1,
    /// walked again (without re-deriving the value) during pass 2 and 3.
    pub fn stored_args(self) -> usize {
        use Action::*;
        match self {
            Align | RelLg | LabelLg | RelPc | LabelPc | RelApc | Imm | Imm12 | Imm16 | Imm32
            | Imml | Immv8 | Immshift => 1,
            Vrlist => 2,
            _ => 0,
        }
    }
}

/// Decode an action word into its tag and low-16-bit payload.
pub fn split(word: u32) -> (u32, u32) {
    (word >> 16, word & 0xFFFF)
}
