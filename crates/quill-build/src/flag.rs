//! The "update in progress" flag.

use std::sync::atomic::{AtomicBool, Ordering};

/// Single-bit build state shared by the builder and every serving path.
#[derive(Debug, Default)]
pub struct BuildFlag {
    updating: AtomicBool,
}

impl BuildFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a build currently holds the flag.
    pub fn is_set(&self) -> bool {
        self.updating.load(Ordering::Acquire)
    }

    /// Set the flag if it is clear.
    ///
    /// Returns `None` when another build already holds it. The flag is
    /// cleared when the returned guard drops.
    pub fn try_acquire(&self) -> Option<BuildGuard<'_>> {
        self.updating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BuildGuard { flag: self })
    }

    fn release(&self) {
        if self
            .updating
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("Update flag already cleared");
        }
    }
}

/// Holds the [`BuildFlag`] until dropped.
#[must_use = "the flag is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct BuildGuard<'a> {
    flag: &'a BuildFlag,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.flag.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release() {
        let flag = BuildFlag::new();
        assert!(!flag.is_set());

        let guard = flag.try_acquire().unwrap();
        assert!(flag.is_set());
        assert!(flag.try_acquire().is_none());

        drop(guard);
        assert!(!flag.is_set());
        assert!(flag.try_acquire().is_some());
    }

    #[test]
    fn test_release_of_clear_flag_is_harmless() {
        let flag = BuildFlag::new();
        let guard = flag.try_acquire().unwrap();
        flag.updating.store(false, Ordering::Release);
        drop(guard);
        assert!(!flag.is_set());
    }

    #[test]
    fn test_contenders_fail_while_held() {
        let flag = BuildFlag::new();
        let guard = flag.try_acquire().unwrap();

        let acquired = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| flag.try_acquire().is_some()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count()
        });

        assert_eq!(acquired, 0);
        assert!(flag.is_set());
        drop(guard);
        assert!(!flag.is_set());
    }
}
