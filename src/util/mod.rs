//! Small standalone helpers shared by the rest of the crate.

pub(crate) mod size;
