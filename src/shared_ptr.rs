use std::{fmt, marker::PhantomData, mem, ops::Deref, process, ptr, ptr::NonNull};

use crate::{
    alloc,
    primitive::atomic::{self, AtomicUsize, Ordering::Acquire, Ordering::Relaxed, Ordering::Release},
    Result,
};

/// Clones past this count abort, the same limit `std::sync::Arc` uses.
const MAX_COUNT: usize = isize::MAX as usize;

/// The payload and counter addresses of an occupied pointer. Keeping both in
/// one `Option` means a pointer can never hold just one of them.
struct Raw<T>
where
    T: ?Sized,
{
    value: NonNull<T>,
    count: NonNull<AtomicUsize>,
}

impl<T: ?Sized> Clone for Raw<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for Raw<T> {}

impl<T: ?Sized> Raw<T> {
    fn count(&self) -> &AtomicUsize {
        unsafe { self.count.as_ref() }
    }

    /// Frees the counter and hands back the payload.
    ///
    /// # Safety
    ///
    /// The caller must have observed the count drop to zero, so that no other
    /// pointer references this pair.
    unsafe fn into_box(self) -> Box<T> {
        log::trace!("freeing shared allocation at {:p}", self.value);
        drop(Box::from_raw(self.count.as_ptr()));
        Box::from_raw(self.value.as_ptr())
    }
}

/// A reference counted pointer, similar to [`Arc`], that may also be empty.
///
/// Every group of pointers sharing one value also shares one separately
/// allocated atomic counter. The value and the counter are freed together when
/// the last pointer of the group is dropped or reset.
///
/// Different pointers of the same group can be cloned, dropped and read from
/// different threads at the same time. Changing a single pointer takes
/// `&mut self`, so hand each thread its own clone.
///
/// [`Arc`]: std::sync::Arc
pub struct SharedPtr<T>
where
    T: ?Sized,
{
    raw: Option<Raw<T>>,
    _marker: PhantomData<T>,
}

impl<T: ?Sized> Drop for SharedPtr<T> {
    fn drop(&mut self) {
        self.release();
    }
}

unsafe impl<T> Send for SharedPtr<T> where T: ?Sized + Send + Sync {}

unsafe impl<T> Sync for SharedPtr<T> where T: ?Sized + Send + Sync {}

static_assertions::assert_impl_all!(SharedPtr<String>: Send, Sync);
static_assertions::assert_not_impl_any!(SharedPtr<std::cell::Cell<u8>>: Send, Sync);
static_assertions::assert_not_impl_any!(SharedPtr<std::rc::Rc<u8>>: Send, Sync);

impl<T> SharedPtr<T> {
    /// Moves `value` to the heap and creates the first pointer to it.
    ///
    /// Aborts if the allocation fails, see [`SharedPtr::try_new`] for a
    /// fallible version.
    ///
    /// # Examples
    ///
    /// ```
    /// # use shared_ptr::SharedPtr;
    /// let s = SharedPtr::new(10);
    /// assert_eq!(s.use_count(), 1);
    /// assert_eq!(*s, 10);
    /// ```
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }

    /// Like [`SharedPtr::new`], but reports allocation failure instead of
    /// aborting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Alloc`] when either the value or the counter cannot be
    /// allocated. `value` is dropped in that case.
    ///
    /// [`Error::Alloc`]: crate::Error::Alloc
    pub fn try_new(value: T) -> Result<Self> {
        let value = alloc::try_box(value)?;
        let count = alloc::try_new_counter()?;
        Ok(Self::adopt(value, count))
    }

    /// Replaces the value with a freshly allocated `value`, releasing the old
    /// one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Alloc`] when the allocation fails. The current value
    /// is kept in that case.
    ///
    /// [`Error::Alloc`]: crate::Error::Alloc
    pub fn try_reset_with(&mut self, value: T) -> Result<()> {
        let new = Self::try_new(value)?;
        self.assign(new);
        Ok(())
    }

    /// Returns the value if this is the only pointer to it. Otherwise, or if
    /// the pointer is empty, the pointer is handed back unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// # use shared_ptr::SharedPtr;
    /// let s1 = SharedPtr::new(String::from("a"));
    /// let s2 = s1.clone();
    ///
    /// let s1 = s1.try_unwrap().unwrap_err();
    /// drop(s2);
    /// assert_eq!(s1.try_unwrap().unwrap(), "a");
    /// ```
    pub fn try_unwrap(mut self) -> std::result::Result<T, Self> {
        let Some(raw) = self.raw else {
            return Err(self);
        };

        if raw.count().compare_exchange(1, 0, Acquire, Relaxed).is_err() {
            return Err(self);
        }

        self.raw = None;
        Ok(*unsafe { raw.into_box() })
    }

    /// Gets a raw pointer to the value, or null if the pointer is empty. The
    /// ownership of the value is not affected.
    ///
    /// # Examples
    ///
    /// ```
    /// # use shared_ptr::SharedPtr;
    /// let s1 = SharedPtr::new(5);
    /// let s2 = s1.clone();
    /// assert_eq!(s1.as_ptr(), s2.as_ptr());
    ///
    /// assert!(SharedPtr::<i32>::empty().as_ptr().is_null());
    /// ```
    pub fn as_ptr(&self) -> *const T {
        self.raw.map_or(ptr::null(), |raw| raw.value.as_ptr().cast_const())
    }
}

impl<T: ?Sized> SharedPtr<T> {
    /// Creates a pointer that holds nothing. Does not allocate.
    pub const fn empty() -> Self {
        SharedPtr {
            raw: None,
            _marker: PhantomData,
        }
    }

    /// Takes ownership of a boxed value and creates the first pointer to it.
    ///
    /// # Examples
    ///
    /// ```
    /// # use shared_ptr::SharedPtr;
    /// let s: SharedPtr<[u8]> = SharedPtr::from_box(vec![1, 2, 3].into_boxed_slice());
    /// assert_eq!(&*s, &[1, 2, 3]);
    /// ```
    pub fn from_box(value: Box<T>) -> Self {
        Self::adopt(value, alloc::new_counter())
    }

    /// Takes ownership of `ptr`, which must come from [`Box::into_raw`]. A
    /// null `ptr` gives an empty pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or obtained from [`Box::into_raw`], and nothing else
    /// may own it afterwards. In particular, creating two pointers from the
    /// same address frees it twice.
    ///
    /// # Examples
    ///
    /// ```
    /// # use shared_ptr::SharedPtr;
    /// let s = unsafe { SharedPtr::from_raw(Box::into_raw(Box::new(7))) };
    /// assert_eq!(*s, 7);
    ///
    /// let e = unsafe { SharedPtr::<i32>::from_raw(std::ptr::null_mut()) };
    /// assert!(e.is_empty());
    /// ```
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        if ptr.is_null() {
            Self::empty()
        } else {
            Self::from_box(Box::from_raw(ptr))
        }
    }

    fn adopt(value: Box<T>, count: NonNull<AtomicUsize>) -> Self {
        SharedPtr {
            raw: Some(Raw {
                value: NonNull::from(Box::leak(value)),
                count,
            }),
            _marker: PhantomData,
        }
    }

    /// Whether the pointer holds nothing.
    pub fn is_empty(&self) -> bool {
        self.raw.is_none()
    }

    /// Gets the number of pointers sharing the value, including `self`.
    /// Returns `0` for an empty pointer.
    ///
    /// # Examples
    ///
    /// ```
    /// # use shared_ptr::SharedPtr;
    /// let s1 = SharedPtr::new(5);
    /// assert_eq!(s1.use_count(), 1);
    ///
    /// let s2 = s1.clone();
    /// assert_eq!(s1.use_count(), 2);
    ///
    /// drop(s2);
    /// assert_eq!(s1.use_count(), 1);
    /// ```
    pub fn use_count(&self) -> usize {
        self.raw.map_or(0, |raw| raw.count().load(Acquire))
    }

    /// Gets a reference to the value, or `None` if the pointer is empty.
    pub fn get(&self) -> Option<&T> {
        self.raw.map(|raw| unsafe { raw.value.as_ref() })
    }

    /// Gets a reference to the value without checking for emptiness.
    ///
    /// # Safety
    ///
    /// The pointer must not be empty.
    pub unsafe fn get_unchecked(&self) -> &T {
        self.raw.unwrap_unchecked().value.as_ref()
    }

    /// Whether both pointers share the same value. Two empty pointers are
    /// considered equal.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        match (this.raw, other.raw) {
            (Some(a), Some(b)) => a.count == b.count,
            (None, None) => true,
            _ => false,
        }
    }

    /// Moves the value out into a new pointer, leaving `self` empty. The count
    /// is not touched.
    ///
    /// # Examples
    ///
    /// ```
    /// # use shared_ptr::SharedPtr;
    /// let mut a = SharedPtr::new(10);
    /// let c = a.take();
    ///
    /// assert_eq!(a.use_count(), 0);
    /// assert_eq!(c.use_count(), 1);
    /// assert_eq!(*c, 10);
    /// ```
    pub fn take(&mut self) -> Self {
        mem::replace(self, Self::empty())
    }

    /// Releases the current value and moves `other` into `self`.
    pub fn assign(&mut self, mut other: Self) {
        self.release();
        self.raw = other.raw.take();
    }

    /// Releases the current value, leaving the pointer empty. Resetting an
    /// empty pointer does nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// # use shared_ptr::SharedPtr;
    /// let a = SharedPtr::new(10);
    /// let mut b = a.clone();
    ///
    /// b.reset();
    /// assert_eq!(a.use_count(), 1);
    /// assert_eq!(b.use_count(), 0);
    /// assert!(b.get().is_none());
    /// ```
    pub fn reset(&mut self) {
        self.release();
    }

    /// Releases the current value and takes ownership of `value` instead.
    pub fn reset_with(&mut self, value: Box<T>) {
        self.release();
        *self = Self::from_box(value);
    }

    /// Releases the current value and takes ownership of `ptr` instead. A null
    /// `ptr` leaves the pointer empty.
    ///
    /// Passing the address this pointer already holds does nothing: the value
    /// is kept and the count is unchanged. Zero-sized values all share one
    /// dangling address, so for them `ptr` is always adopted.
    ///
    /// # Safety
    ///
    /// Same as [`SharedPtr::from_raw`].
    pub unsafe fn reset_raw(&mut self, ptr: *mut T) {
        if let Some(raw) = self.raw {
            let has_size = mem::size_of_val(raw.value.as_ref()) != 0;
            if has_size && ptr.cast::<()>() == raw.value.as_ptr().cast::<()>() {
                log::warn!(
                    "ignoring reset of a SharedPtr to the address it already holds ({ptr:p})"
                );
                return;
            }
        }

        self.release();
        *self = Self::from_raw(ptr);
    }

    fn release(&mut self) {
        let Some(raw) = self.raw.take() else {
            return;
        };

        // the release half publishes our writes to whoever frees the value,
        // the fence below makes the freeing thread see all of them.
        if raw.count().fetch_sub(1, Release) != 1 {
            return;
        }
        atomic::fence(Acquire);

        drop(unsafe { raw.into_box() });
    }
}

impl<T: ?Sized> Clone for SharedPtr<T> {
    /// Creates another pointer to the same value. Cloning an empty pointer
    /// gives an empty pointer.
    fn clone(&self) -> Self {
        if let Some(raw) = self.raw {
            // the new owner only has to be visible to later decrements.
            if raw.count().fetch_add(1, Relaxed) > MAX_COUNT {
                process::abort();
            }
        }

        SharedPtr {
            raw: self.raw,
            _marker: PhantomData,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        if Self::ptr_eq(self, source) {
            return;
        }

        self.release();
        *self = source.clone();
    }
}

impl<T: ?Sized> Default for SharedPtr<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized> Deref for SharedPtr<T> {
    type Target = T;

    /// # Panics
    ///
    /// Panics if the pointer is empty.
    fn deref(&self) -> &T {
        self.get().expect("dereferenced an empty SharedPtr")
    }
}

impl<T: ?Sized> fmt::Debug for SharedPtr<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => fmt::Debug::fmt(value, f),
            None => f.write_str("SharedPtr(<empty>)"),
        }
    }
}

impl<T> From<T> for SharedPtr<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: ?Sized> From<Box<T>> for SharedPtr<T> {
    fn from(value: Box<T>) -> Self {
        Self::from_box(value)
    }
}
