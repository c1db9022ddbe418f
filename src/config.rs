/// Host-tunable limits, generalising the historical C compile-time constants
/// (`DASM_MAXSECPOS`, the `DASM_CHECKS` build switch) into runtime values the
/// host can adjust per `State`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of section-buffer cells a single `put` call may need.
    /// The C engine hard-codes this at 25; kept as the default here.
    pub max_put_slots: usize,
    /// Initial section buffer capacity, in 32-bit cells, on first growth.
    pub initial_section_capacity: usize,
    /// Whether to run the `CK`/`CKPL` range and bounds checks. The C engine
    /// compiles these in or out with `#ifdef DASM_CHECKS`; here it is a
    /// runtime flag so a release host can skip them without a rebuild.
    pub strict_checks: bool,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_put_slots: 25,
            initial_section_capacity: 2 * 25,
            strict_checks: cfg!(debug_assertions),
        }
    }
}
