use thiserror::Error;

/// Status of the encoder. Mirrors the `DASM_S_*` family: every non-`Ok`
/// variant carries the action-list index or label id that triggered it,
/// the way the C engine ORs the index into the low bits of the status code.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    #[error("immediate at action index {0} does not fit its encoding")]
    RangeImm(u32),

    #[error("section index {0} out of range")]
    RangeSection(u32),

    #[error("local/global label id {0} out of range")]
    RangeLg(u32),

    #[error("PC label id {0} out of range")]
    RangePc(u32),

    #[error("relocation at cursor {0} does not fit its displacement field")]
    RangeRel(u32),

    #[error("backward reference to undefined local/global label {0}")]
    UndefLg(u32),

    #[error("reference to undefined PC label {0}")]
    UndefPc(u32),

    #[error("put() call finished in section {0}, expected the checked section")]
    MatchSection(u32),

    #[error("pass 3 emitted a different byte count than pass 2 reported")]
    Phase,
}

/// Result of `State::getpclabel`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcLabelError {
    #[error("PC label is declared but was never defined")]
    Undefined,
    #[error("PC label id is out of range")]
    OutOfRange,
}
