use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic id source shared by a single owner.
///
/// Ids start at 1 so `0` can never be mistaken for an issued id.
#[derive(Debug, Default)]
pub struct IdSequence {
    last: AtomicU64,
}

impl IdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn last(&self) -> u64 {
        self.last.load(Ordering::Relaxed)
    }
}

/// Identity of one user selection; later selections have larger ids.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SelectionId(pub u64);

#[cfg(test)]
mod tests {
    use super::IdSequence;

    #[test]
    fn ids_are_monotonic_from_one() {
        let seq = IdSequence::new();
        assert_eq!(seq.last(), 0);
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
        assert_eq!(seq.last(), 2);
    }
}
