//! A thread-safe shared-ownership pointer, [`SharedPtr`].
//!
//! A `SharedPtr` is either empty or shares one heap allocated value with every
//! pointer cloned from it. The pointers of such a group count themselves in a
//! separately allocated [`AtomicUsize`], and whichever pointer takes the count
//! from one to zero frees the value and the counter, exactly once. There are
//! no locks, cloning and dropping are a single atomic operation each.
//!
//! ```
//! use shared_ptr::SharedPtr;
//!
//! let a = SharedPtr::new(10);
//! let b = a.clone();
//! assert_eq!(a.use_count(), 2);
//!
//! std::thread::spawn(move || assert_eq!(*b, 10)).join().unwrap();
//! assert_eq!(a.use_count(), 1);
//! ```
//!
//! Unlike [`std::sync::Arc`] a pointer can be empty, can be [reset] to a new
//! value in place, and can adopt raw allocations made with [`Box::into_raw`].
//! There are no weak pointers.
//!
//! [`AtomicUsize`]: std::sync::atomic::AtomicUsize
//! [reset]: SharedPtr::reset_with

mod alloc;
mod error;
mod primitive;
mod shared_ptr;

pub use crate::{
    error::{Error, Result},
    shared_ptr::SharedPtr,
};
