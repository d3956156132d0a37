/// An address inside some process's address space.
///
/// Addresses arriving from callers are plain integers; nothing here makes them
/// safe to dereference. Only the host's transfer primitive decides whether a
/// range is mapped.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Addr(pub u64);

impl Addr {
    /// End of the `length` bytes starting here, or `None` if they wrap.
    #[inline]
    pub fn add_length(&self, length: u64) -> Option<Self> {
        let end = self.0.checked_add(length)?;
        Some(Addr(end))
    }
}

impl std::fmt::Display for Addr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
