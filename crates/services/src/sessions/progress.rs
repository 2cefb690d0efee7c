/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub remaining: usize,
    pub is_complete: bool,
    /// Seconds left on the countdown; `None` for untimed modes.
    pub remaining_secs: Option<u32>,
}
