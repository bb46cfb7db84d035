#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The global allocator could not satisfy a request for the payload or
    /// its reference counter.
    #[error("failed to allocate {size} bytes (align {align})")]
    Alloc { size: usize, align: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
