/// The last maximal run a query resolved: `[start, end)` is entirely set
/// when `value` is true and entirely clear otherwise.
///
/// Purely an accelerator. An empty cache (`start == end`) answers nothing,
/// and every mutation resets the tower's cache to empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Cache {
    start: u64,
    end: u64,
    value: bool,
}

impl Cache {
    pub(crate) const EMPTY: Cache = Cache {
        start: 0,
        end: 0,
        value: false,
    };

    pub(crate) fn new(start: u64, end: u64, value: bool) -> Self {
        debug_assert!(start <= end);
        Self { start, end, value }
    }

    /// The cached verdict for `position`, if it falls inside the cached run.
    pub(crate) fn get(&self, position: u64) -> Option<bool> {
        (self.start..self.end)
            .contains(&position)
            .then_some(self.value)
    }
}
