//! Handles to values produced by protocols that have not been evaluated yet.

use std::{cell::OnceCell, fmt, rc::Rc};

use crate::Error;

enum Slot<T> {
    Value(T),
    /// Result is the value of another handle, e.g. of the last step of a sub-build.
    Forward(Deferred<T>),
}

/// Placeholder for the output of a protocol.
///
/// The producing protocol completes the handle exactly once; any number of
/// dependent protocols may hold clones and read it afterwards.
pub struct Deferred<T> {
    slot: Rc<OnceCell<Slot<T>>>,
}

impl<T> Deferred<T> {
    /// Handle that is already completed with given value.
    pub fn ready(value: T) -> Self {
        let slot = OnceCell::new();
        let _ = slot.set(Slot::Value(value));
        Self {
            slot: Rc::new(slot),
        }
    }

    pub(crate) fn pending() -> Self {
        Self {
            slot: Rc::new(OnceCell::new()),
        }
    }

    pub(crate) fn complete(&self, value: T) -> Result<(), Error> {
        self.slot
            .set(Slot::Value(value))
            .map_err(|_| Error::AlreadyCompleted)
    }

    /// Make this handle resolve to whatever `other` resolves to.
    pub(crate) fn forward(&self, other: Deferred<T>) -> Result<(), Error> {
        self.slot
            .set(Slot::Forward(other))
            .map_err(|_| Error::AlreadyCompleted)
    }

    /// Value of the completed handle.
    pub fn value(&self) -> Result<&T, Error> {
        let mut current = self;
        loop {
            match current.slot.get() {
                Some(Slot::Value(value)) => return Ok(value),
                Some(Slot::Forward(next)) => current = next,
                None => return Err(Error::NotReady),
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.value().is_ok()
    }
}

impl<T: Clone> Deferred<T> {
    /// Clone of the completed value.
    pub fn get(&self) -> Result<T, Error> {
        self.value().cloned()
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value() {
            Ok(value) => f.debug_tuple("Deferred").field(value).finish(),
            Err(_) => f.write_str("Deferred(<pending>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_once() {
        let handle = Deferred::pending();
        let reader = handle.clone();
        assert!(matches!(reader.value(), Err(Error::NotReady)));
        handle.complete(5).unwrap();
        assert_eq!(reader.get().unwrap(), 5);
        assert!(matches!(handle.complete(6), Err(Error::AlreadyCompleted)));
        assert_eq!(*reader.value().unwrap(), 5);
    }

    #[test]
    fn test_forward_chain() {
        let first = Deferred::pending();
        let second = Deferred::pending();
        let third = Deferred::pending();
        first.forward(second.clone()).unwrap();
        second.forward(third.clone()).unwrap();
        assert!(!first.is_done());
        third.complete("done").unwrap();
        assert_eq!(first.get().unwrap(), "done");
    }
}
