use ash::vk;
use thiserror::Error;

use crate::descriptor::HeapClass;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// A static arena could not satisfy a single-slot or contiguous range request.
    #[error("{class:?} heap exhausted: no room for {requested} contiguous slot(s)")]
    Exhausted { class: HeapClass, requested: u32 },

    /// A transient ring ran past its per-frame capacity.
    #[error("transient ring overflow: requested {requested} with {used}/{capacity} in use")]
    Overflow {
        requested: u32,
        used: u32,
        capacity: u32,
    },

    /// The device rejected a pipeline or command block creation request.
    #[error("device build failure: {0}")]
    BuildFailure(#[from] vk::Result),

    /// A layout or heap configuration exceeds backend limits or is malformed.
    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, PoolError>;
