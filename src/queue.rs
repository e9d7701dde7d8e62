//! Lock-free unbounded MPMC queue (Michael & Scott)
//!
//! Nodes are linked through [`crossbeam::epoch::Atomic`] pointers and retired
//! through epoch-based reclamation, so a node unlinked by one thread is never
//! freed while another pinned thread may still be reading it. This also rules
//! out ABA on the head and tail pointers: an address cannot be reused while
//! any thread that loaded it is still pinned.

use crossbeam::epoch::{self, Atomic, Guard, Owned, Shared};
use crossbeam::utils::CachePadded;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Node<T> {
    /// Uninitialized in the sentinel, and again once the value was taken by
    /// the dequeuer that turned this node into the new sentinel.
    value: MaybeUninit<T>,
    next: Atomic<Node<T>>,
}

impl<T> Node<T> {
    fn sentinel() -> Self {
        Self {
            value: MaybeUninit::uninit(),
            next: Atomic::null(),
        }
    }
}

/// Unbounded multi-producer multi-consumer FIFO queue.
///
/// Neither [`enqueue`](Self::enqueue) nor [`dequeue`](Self::dequeue) ever
/// blocks; contended operations retry only when a compare-and-swap fails.
///
/// # Examples
///
/// ```
/// use roundpool::LockFreeQueue;
///
/// let queue = LockFreeQueue::new();
/// queue.enqueue(1);
/// queue.enqueue(2);
///
/// assert_eq!(queue.dequeue(), Some(1));
/// assert_eq!(queue.dequeue(), Some(2));
/// assert_eq!(queue.dequeue(), None);
/// ```
pub struct LockFreeQueue<T> {
    head: CachePadded<Atomic<Node<T>>>,
    tail: CachePadded<Atomic<Node<T>>>,
    len: AtomicUsize,
}

// SAFETY: values are moved in by one thread and moved out by exactly one
// other thread, never shared, so `T: Send` is all that is required.
unsafe impl<T: Send> Send for LockFreeQueue<T> {}
unsafe impl<T: Send> Sync for LockFreeQueue<T> {}

impl<T> LockFreeQueue<T> {
    /// Create an empty queue holding only the sentinel node
    pub fn new() -> Self {
        let queue = Self {
            head: CachePadded::new(Atomic::null()),
            tail: CachePadded::new(Atomic::null()),
            len: AtomicUsize::new(0),
        };
        // SAFETY: the queue is not shared with any other thread yet.
        let guard = unsafe { epoch::unprotected() };
        let sentinel = Owned::new(Node::sentinel()).into_shared(guard);
        queue.head.store(sentinel, Ordering::Relaxed);
        queue.tail.store(sentinel, Ordering::Relaxed);
        queue
    }

    /// Append a value at the tail. Always succeeds.
    pub fn enqueue(&self, value: T) {
        // Counted up front so a racing dequeue can never drive `len` below zero.
        self.len.fetch_add(1, Ordering::Relaxed);

        let guard = &epoch::pin();
        let new = Owned::new(Node {
            value: MaybeUninit::new(value),
            next: Atomic::null(),
        })
        .into_shared(guard);

        loop {
            let tail = self.tail.load(Ordering::Acquire, guard);
            // SAFETY: tail is never null and the node cannot be reclaimed
            // while this thread is pinned.
            let next = unsafe { tail.deref() }.next.load(Ordering::Acquire, guard);

            if !next.is_null() {
                // Another enqueue linked its node but has not swung the tail yet.
                let _ = self.tail.compare_exchange(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                    guard,
                );
                continue;
            }

            // SAFETY: as above.
            let linked = unsafe { tail.deref() }.next.compare_exchange(
                Shared::null(),
                new,
                Ordering::Release,
                Ordering::Relaxed,
                guard,
            );
            if linked.is_ok() {
                // Best effort; a racing thread may already have helped.
                let _ = self.tail.compare_exchange(
                    tail,
                    new,
                    Ordering::Release,
                    Ordering::Relaxed,
                    guard,
                );
                return;
            }
        }
    }

    /// Remove and return the oldest value, or `None` if the queue is empty
    pub fn dequeue(&self) -> Option<T> {
        let guard = &epoch::pin();
        let value = self.dequeue_pinned(guard);
        if value.is_some() {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
        value
    }

    fn dequeue_pinned(&self, guard: &Guard) -> Option<T> {
        loop {
            let head = self.head.load(Ordering::Acquire, guard);
            let tail = self.tail.load(Ordering::Acquire, guard);
            // SAFETY: head is never null and is protected by the guard.
            let next = unsafe { head.deref() }.next.load(Ordering::Acquire, guard);

            if head == tail {
                if next.is_null() {
                    return None;
                }
                // An enqueue is mid-flight; help it before retrying.
                let _ = self.tail.compare_exchange(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                    guard,
                );
                continue;
            }

            // SAFETY: head != tail means head has a successor, protected by the guard.
            let Some(node) = (unsafe { next.as_ref() }) else {
                continue;
            };

            if self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire, guard)
                .is_ok()
            {
                // SAFETY: winning the CAS makes this thread the only reader of
                // `node.value`; the node is now the sentinel and its value is
                // never read or dropped again. The old head is unreachable from
                // `head`, and `tail` is already past it, so it can be retired.
                unsafe {
                    let value = node.value.assume_init_read();
                    guard.defer_destroy(head);
                    return Some(value);
                }
            }
        }
    }

    /// Best-effort snapshot of the number of queued values
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Whether the queue currently holds no values
    pub fn is_empty(&self) -> bool {
        let guard = &epoch::pin();
        let head = self.head.load(Ordering::Acquire, guard);
        // SAFETY: head is never null and is protected by the guard.
        unsafe { head.deref() }.next.load(Ordering::Acquire, guard).is_null()
    }
}

impl<T> Default for LockFreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for LockFreeQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeQueue")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<T> Drop for LockFreeQueue<T> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no other thread can observe the queue, so
        // nodes may be destroyed immediately.
        unsafe {
            let guard = epoch::unprotected();
            while self.dequeue_pinned(guard).is_some() {}
            let sentinel = self.head.load(Ordering::Relaxed, guard);
            drop(sentinel.into_owned());
        }
    }
}
