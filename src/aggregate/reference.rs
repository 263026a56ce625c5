use std::sync::OnceLock;

/// Exactly-once lazy slot for the shared reference state.
///
/// The first caller of [`ReferenceCell::get_or_compute`] runs the computation
/// while holding the cell; callers arriving during that time block until it is
/// stored, callers arriving later read the stored value. The value is never
/// replaced.
pub struct ReferenceCell<R> {
    slot: OnceLock<R>,
}

impl<R> Default for ReferenceCell<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ReferenceCell<R> {
    pub fn new() -> Self {
        ReferenceCell {
            slot: OnceLock::new(),
        }
    }

    /// `compute` must not wait on work scheduled on the pool that is calling this.
    pub fn get_or_compute(&self, compute: impl FnOnce() -> R) -> &R {
        self.slot.get_or_init(compute)
    }

    pub fn into_inner(self) -> Option<R> {
        self.slot.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn racing_threads_compute_once() {
        let cell = ReferenceCell::new();
        let calls = AtomicUsize::new(0);
        let seen: Vec<i32> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|t| {
                    let cell = &cell;
                    let calls = &calls;
                    s.spawn(move || {
                        *cell.get_or_compute(|| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(20));
                            t
                        })
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // everybody sees the same winner
        let winner = cell.into_inner().unwrap();
        assert!(seen.iter().all(|&v| v == winner));
    }

    #[test]
    fn untouched_cell_is_empty() {
        let cell: ReferenceCell<u8> = ReferenceCell::default();
        assert!(cell.into_inner().is_none());
    }
}
