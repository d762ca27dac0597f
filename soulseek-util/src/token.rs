use std::sync::atomic::{AtomicI32, Ordering};

use rand::Rng;

/// Allocates the caller-correlation tokens used to match search requests,
/// transfer requests, and solicited connections to their eventual replies
/// (§4.10, GLOSSARY "Token"). Two modes: monotonic (deterministic, good for
/// tests) and randomized (the default, matching how a real client avoids a
/// predictable token sequence).
pub struct TokenAllocator {
    mode: Mode,
}

enum Mode {
    Monotonic(AtomicI32),
    Randomized,
}

impl TokenAllocator {
    pub fn monotonic(start: i32) -> Self {
        Self {
            mode: Mode::Monotonic(AtomicI32::new(start)),
        }
    }

    pub fn randomized() -> Self {
        Self {
            mode: Mode::Randomized,
        }
    }

    pub fn next(&self) -> i32 {
        match &self.mode {
            Mode::Monotonic(counter) => counter.fetch_add(1, Ordering::Relaxed),
            Mode::Randomized => rand::thread_rng().gen_range(0..i32::MAX),
        }
    }

    /// Allocate a token that doesn't collide with an in-flight set, as
    /// described in §4.10 ("the caller may probe with a predicate").
    pub fn next_unused(&self, mut in_use: impl FnMut(i32) -> bool) -> i32 {
        loop {
            let candidate = self.next();
            if !in_use(candidate) {
                return candidate;
            }
        }
    }
}

impl Default for TokenAllocator {
    fn default() -> Self {
        Self::randomized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn monotonic_increments() {
        let alloc = TokenAllocator::monotonic(0);
        assert_eq!(alloc.next(), 0);
        assert_eq!(alloc.next(), 1);
        assert_eq!(alloc.next(), 2);
    }

    #[test]
    fn next_unused_avoids_collisions() {
        let alloc = TokenAllocator::monotonic(0);
        let mut used = HashSet::new();
        used.insert(0);
        used.insert(1);
        let token = alloc.next_unused(|t| used.contains(&t));
        assert_eq!(token, 2);
    }
}
