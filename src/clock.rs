/// Monotonic time source with microsecond resolution.
///
/// Read from both the host context and the edge callback, so implementations
/// must be cheap and must not block.
pub trait Clock {
    /// Microseconds since an arbitrary, fixed origin. Never decreases.
    fn now_us(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}
