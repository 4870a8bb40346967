
//! Bricked multi-resolution volume storage and adaptive level-of-detail
//! scheduling.
//!
//! The on-disk format stores a 3D scalar field as a pyramid of
//! downsampled copies, each cut into overlapping bricks. A binary table
//! of contents locates every brick payload in the file. The render
//! module selects, per frame, which bricks of which level to submit so
//! that a target frame budget is met.

#![warn(
    rust_2018_idioms,
    future_incompatible,
    unused_extern_crates,
    unused,

    missing_copy_implementations,
    missing_debug_implementations,
)]

#![deny(
    unused_variables,
    unused_assignments,
    unused_must_use,
    trivial_numeric_casts,
)]

#![forbid(unsafe_code)]

pub mod io; // public to allow for custom byte parsing
pub mod math;
pub mod error;
pub mod meta;
pub mod compression;
pub mod volume;
pub mod render;

/// Re-exports of the types commonly required for
/// simply reading and rendering a bricked volume.
pub mod prelude {

    // main exports
    pub use crate::volume::{Volume, VolumeWriter};
    pub use crate::meta::{VolumeMeta, ComponentType, BrickCoord};
    pub use crate::render::scheduler::{Scheduler, PerfOptions};

    // secondary data types
    pub use crate::meta;
    pub use crate::render;
    pub use crate::error;

    // export math and error types
    pub use crate::math::{Vec2, Vec3, Mat4};
    pub use crate::compression::Compression;
    pub use crate::error::{Result, Error};
}
