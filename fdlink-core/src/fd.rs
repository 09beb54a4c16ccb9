//! Shared file descriptor handles and per-message descriptor arrays.

use core::{
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use std::{
    os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd},
    sync::Arc,
};

use pin_project_lite::pin_project;

/// A shared handle to an open file descriptor.
///
/// Cloning a handle never duplicates the underlying descriptor; the descriptor is closed
/// exactly once, when the last handle is dropped. Equality is handle identity — two handles
/// compare equal only if they share the same underlying descriptor object, regardless of the
/// descriptor numbers involved.
#[derive(Clone)]
pub struct Fd(Arc<OwnedFd>);

impl Fd {
    /// Whether `self` and `other` are handles to the same underlying descriptor.
    pub fn same_handle(&self, other: &Fd) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The raw descriptor number.
    ///
    /// Only valid for as long as at least one handle is alive.
    pub fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.0.as_raw_fd()
    }

    /// Duplicate the underlying descriptor into an independently owned one.
    pub fn try_clone_owned(&self) -> std::io::Result<OwnedFd> {
        self.0.as_fd().try_clone_to_owned()
    }
}

impl AsFd for Fd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl From<OwnedFd> for Fd {
    fn from(fd: OwnedFd) -> Self {
        Self(Arc::new(fd))
    }
}

impl PartialEq for Fd {
    fn eq(&self, other: &Self) -> bool {
        self.same_handle(other)
    }
}

impl Eq for Fd {}

impl fmt::Debug for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Fd").field(&self.0.as_raw_fd()).finish()
    }
}

/// The descriptors that arrived with a single message.
///
/// Descriptor-typed fields in the message's parameters carry indices into this array. The
/// array's lifetime is the handling of that one message, unless a handler extends it with
/// [`FdArray::retain_until`] or detaches individual entries with [`FdArray::take`]. Dropping
/// the array releases every handle that was not taken.
#[derive(Debug, Default)]
pub struct FdArray {
    slots: Vec<Option<Fd>>,
}

impl FdArray {
    /// Create an empty array.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_owned(fds: Vec<OwnedFd>) -> Self {
        Self {
            slots: fds.into_iter().map(|fd| Some(Fd::from(fd))).collect(),
        }
    }

    /// The number of slots, including already-taken ones.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the array has no slots at all.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Borrow the handle at `index`, if present and not taken.
    pub fn get(&self, index: usize) -> Option<&Fd> {
        self.slots.get(index).and_then(|slot| slot.as_ref())
    }

    /// Detach the handle at `index` from the array.
    ///
    /// The returned handle lives independently of the array; the slot stays vacant and the
    /// array will not release the descriptor on drop.
    pub fn take(&mut self, index: usize) -> Option<Fd> {
        self.slots.get_mut(index).and_then(|slot| slot.take())
    }

    /// Iterate over the handles that are still attached.
    pub fn iter(&self) -> impl Iterator<Item = &Fd> {
        self.slots.iter().filter_map(|slot| slot.as_ref())
    }

    /// Keep the array (and so its descriptors) alive until `future` resolves.
    ///
    /// The returned future yields `future`'s output and drops the array afterwards.
    pub fn retain_until<F: Future>(self, future: F) -> RetainUntil<F> {
        RetainUntil {
            future,
            fds: Some(self),
        }
    }
}

pin_project! {
    /// Future adapter that parks an [`FdArray`] until the inner future resolves.
    #[derive(Debug)]
    #[must_use = "futures do nothing unless polled"]
    pub struct RetainUntil<F> {
        #[pin]
        future: F,
        fds: Option<FdArray>,
    }
}

impl<F: Future> Future for RetainUntil<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let output = core::task::ready!(this.future.poll(cx));
        // Release the descriptors only once the guarded future is done.
        this.fds.take();
        Poll::Ready(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_null() -> OwnedFd {
        std::fs::File::open("/dev/null").unwrap().into()
    }

    #[test]
    fn take_detaches_slot() {
        let mut array = FdArray::from_owned(vec![dev_null(), dev_null()]);
        assert_eq!(array.len(), 2);

        let taken = array.take(0).unwrap();
        assert!(array.get(0).is_none());
        assert!(array.take(0).is_none());
        assert!(array.get(1).is_some());
        assert_eq!(array.iter().count(), 1);

        // The taken handle outlives the array.
        drop(array);
        assert!(taken.as_raw_fd() >= 0);
    }

    #[test]
    fn handle_identity() {
        let owned = dev_null();
        let raw = owned.as_raw_fd();
        let a = Fd::from(owned);
        let b = a.clone();
        assert!(a.same_handle(&b));
        assert_eq!(a, b);
        assert_eq!(b.as_raw_fd(), raw);

        let c = Fd::from(dev_null());
        assert!(!a.same_handle(&c));
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn retain_until_holds_fds() {
        let array = FdArray::from_owned(vec![dev_null()]);
        let out = array.retain_until(async { 7 }).await;
        assert_eq!(out, 7);
    }
}
