//! The shared-segment collaborator (`§6`): one real backend and one
//! in-process dummy, mirroring the split used for the GPU graphics API.

pub mod traits;
pub use traits::{Offset, Segment};

pub mod dummy;

#[cfg(feature = "shm")]
pub mod shm;
#[cfg(feature = "shm")]
pub use shm::ShmSegment;
