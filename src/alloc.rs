use std::{
    alloc::{self, Layout},
    ptr::NonNull,
};

use crate::{primitive::atomic::AtomicUsize, Error, Result};

/// Boxes `value`, reporting allocation failure instead of aborting.
pub fn try_box<T>(value: T) -> Result<Box<T>> {
    let layout = Layout::new::<T>();
    if layout.size() == 0 {
        // zero-sized boxes never touch the allocator
        return Ok(Box::new(value));
    }

    let Some(ptr) = NonNull::new(unsafe { alloc::alloc(layout) }.cast::<T>()) else {
        return Err(Error::Alloc {
            size: layout.size(),
            align: layout.align(),
        });
    };

    // SAFETY: `ptr` was allocated by the global allocator with the layout of
    //         `T`, which is exactly what `Box` expects to free.
    unsafe {
        ptr.as_ptr().write(value);
        Ok(Box::from_raw(ptr.as_ptr()))
    }
}

/// Allocates a reference counter starting at one owner.
pub fn new_counter() -> NonNull<AtomicUsize> {
    NonNull::from(Box::leak(Box::new(AtomicUsize::new(1))))
}

pub fn try_new_counter() -> Result<NonNull<AtomicUsize>> {
    try_box(AtomicUsize::new(1)).map(|counter| NonNull::from(Box::leak(counter)))
}
