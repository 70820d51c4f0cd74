//! # Tether
//!
//! Weak references for a tracing garbage collector. A weak reference lets code hold on to an
//! object without keeping it alive and later ask whether the object is still there.
//!
//! Every object that was ever weakly referenced owns exactly one [WeakCounter](counter::WeakCounter):
//! a small heap object holding the object's address as an [UntracedRef](gcref::UntracedRef). The
//! counter is found through the object's lazily created [ObjectMetadata](metadata::ObjectMetadata)
//! and is installed with a compare-and-swap, so threads racing on the first weak access all
//! observe the same counter. Each collection cycle clears counters of unreachable objects after
//! marking and before any memory is reclaimed.
//!
//! Threads use the heap through a [Mutator](mutator::Mutator) each. Resolving a weak reference
//! roots the result in the resolving mutator, so no other thread's collection can reclaim it
//! while it is in use.
//!
//! # Features
//! - `threads` (default): heap can be shared between threads and statistics counters use
//!   hardware atomics. Without it the heap is `!Sync`.
//!
//! # Example
//! ```
//! use tether::heap::Heap;
//!
//! let heap = Heap::default();
//! let mutator = heap.mutator();
//! let object = mutator.allocate_rooted(42i32).unwrap();
//! let weak = mutator.allocate_weak(*object).unwrap();
//! assert_eq!(**weak.upgrade(&mutator).unwrap(), 42);
//!
//! mutator.collect(&mut []);
//! assert!(weak.upgrade(&mutator).is_some());
//!
//! drop(object);
//! let mut weak = weak;
//! mutator.collect(&mut [&mut weak]);
//! assert!(weak.upgrade(&mutator).is_none());
//! ```

pub mod atomic_cell;
pub mod c_api;
pub mod counter;
pub mod error;
pub mod gc_info;
pub mod gcref;
pub mod header;
pub mod heap;
pub mod metadata;
pub mod mutator;
pub mod sweep;
pub mod util;
pub mod weak;

pub use counter::WeakCounter;
pub use error::{AllocError, AllocResult};
pub use gcref::{Collectable, Gc, Trace, UntracedRef, UntypedGcRef, Visitor};
pub use heap::{Heap, HeapOptions};
pub use mutator::{Mutator, MutatorScope, Root};
pub use weak::Weak;
