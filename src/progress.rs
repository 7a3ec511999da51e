//! Liveness callbacks for long directory walks.

/// Called repeatedly while a traversal makes forward progress.
///
/// The call carries no payload. It only lets a caller (typically a watchdog
/// around cache cleaning) tell a slow walk from a stuck one.
pub trait ProgressNotifier {
    /// Signal that work is still happening.
    fn notify(&self);
}

/// Ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressNotifier;

impl ProgressNotifier for NullProgressNotifier {
    fn notify(&self) {}
}

impl<F: Fn()> ProgressNotifier for F {
    fn notify(&self) {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn closures_are_notifiers() {
        let count = Cell::new(0);
        let notifier = || count.set(count.get() + 1);
        notifier.notify();
        notifier.notify();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn null_notifier_is_object_safe() {
        let n: &dyn ProgressNotifier = &NullProgressNotifier;
        n.notify();
    }
}
