
//! Per-frame brick selection and adaptive level-of-detail scheduling.
//!
//! The scheduler plans which bricks of which level a rendering backend
//! should submit next. The backend, GPU memory management, and view
//! frustum mathematics stay outside this crate; they are reached through
//! the trait contracts in this module, bundled into a `Services` context
//! that is passed to every planning entry point.

pub mod region;
pub mod selection;
pub mod scheduler;
pub mod dataset;

use std::fmt;

use crate::math::{Vec3, Mat4};
use crate::meta::BrickCoord;


/// Opaque handle identifying one dataset towards external services
/// such as the residency oracle of a memory manager.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct DatasetId(pub u64);


/// Uniquely identifies a brick of one dataset at one point in time.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct BrickKey {

    /// The timestep this brick belongs to. Static volumes only have
    /// timestep zero.
    pub timestep: usize,

    /// Position and level of the brick.
    pub brick: BrickCoord,
}


/// Static per-brick metadata in the normalized domain: the whole volume
/// spans a box whose largest extent is one, centered at the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrickMd {

    /// Center of the brick in the normalized domain.
    pub center: Vec3<f32>,

    /// Extent of the brick in the normalized domain.
    pub extents: Vec3<f32>,

    /// Voxel count of the brick payload, including overlap.
    pub voxels: Vec3<u32>,
}


/// One brick selected for rendering, with everything the backend
/// needs to place and sample its texture. Lives for one subframe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Brick {

    /// Which brick this record describes.
    pub key: BrickKey,

    /// Center in the aspect-scaled normalized domain.
    pub center: Vec3<f32>,

    /// Extent in the aspect-scaled normalized domain.
    pub extension: Vec3<f32>,

    /// Voxel count of the brick payload, including overlap.
    pub voxel_count: Vec3<u32>,

    /// Lower texture coordinate, positioned so that sampling never
    /// bleeds into the overlap of a neighboring brick.
    pub tex_coords_min: Vec3<f32>,

    /// Upper texture coordinate, see `tex_coords_min`.
    pub tex_coords_max: Vec3<f32>,

    /// Sort key: view-space distance to the closest brick corner,
    /// or a residency rank for rotation series.
    pub distance: f32,
}


/// A data-emptiness question asked of the dataset for one brick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DataQuery {

    /// Does the brick contain values inside this range?
    Range {
        /// Lower bound, in data value units.
        min: f64,
        /// Upper bound, in data value units.
        max: f64,
    },

    /// Does the brick contain values inside this range
    /// whose gradient magnitude also falls into the second range?
    RangeAndGradient {
        /// Lower value bound, in data value units.
        min: f64,
        /// Upper value bound, in data value units.
        max: f64,
        /// Lower gradient magnitude bound.
        min_gradient: f64,
        /// Upper gradient magnitude bound.
        max_gradient: f64,
    },

    /// Do the brick values straddle this isovalue?
    Isovalue(f64),
}


/// What the volume is rendered with, including the parameters brick
/// selection needs to decide whether a brick contributes at all.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderMode {

    /// A one-dimensional transfer function lookup.
    OneD {
        /// Number of entries of the lookup table.
        lut_size: usize,
        /// First and last table entry with non-zero opacity.
        non_zero: (f64, f64),
    },

    /// A two-dimensional transfer function lookup
    /// over value and gradient magnitude.
    TwoD {
        /// Number of entries of the lookup table along the value axis.
        lut_size: usize,
        /// First and last value entry with non-zero opacity.
        non_zero: (f64, f64),
        /// Gradient magnitude range with non-zero opacity.
        gradient: (f64, f64),
    },

    /// An isosurface extraction at a fixed value.
    Iso {
        /// The isovalue, in data value units.
        value: f64,
    },
}

impl Default for RenderMode {
    fn default() -> Self {
        RenderMode::OneD { lut_size: 256, non_zero: (0.0, 255.0) }
    }
}


/// Answers brick metadata and data-emptiness queries for one dataset.
/// Implementations must answer synchronously from in-memory tables;
/// planning never blocks on I/O.
pub trait Dataset {

    /// The handle external services know this dataset by.
    fn id(&self) -> DatasetId;

    /// Number of levels in the pyramid, at least one.
    fn level_count(&self) -> u64;

    /// Voxel extent of the level.
    fn domain_size(&self, level: u64) -> Vec3<u64>;

    /// Physical aspect ratio of the whole volume.
    fn scale(&self) -> Vec3<f64>;

    /// Voxels of halo on each brick face.
    fn brick_overlap(&self) -> Vec3<u32>;

    /// Number of bricks of the level at the timestep.
    fn brick_count(&self, level: u64, timestep: usize) -> u64;

    /// All bricks of the level at the timestep, in z-major order.
    fn bricks(&self, level: u64, timestep: usize) -> Vec<(BrickKey, BrickMd)>;

    /// Whether the brick is first along the dimension (0, 1, or 2).
    fn is_first_in_dimension(&self, dimension: usize, key: &BrickKey) -> bool;

    /// Whether the brick is last along the dimension (0, 1, or 2).
    fn is_last_in_dimension(&self, dimension: usize, key: &BrickKey) -> bool;

    /// Whether the brick contains any data matching the query.
    /// Answering `true` for unknown bricks is always safe.
    fn contains_data(&self, key: &BrickKey, query: &DataQuery) -> bool;

    /// The value range of the whole dataset. A minimum greater than
    /// the maximum means the range is unknown.
    fn value_range(&self) -> (f64, f64);

    /// Bits of one voxel component.
    fn bit_width(&self) -> u32;
}


/// View-frustum culling combined with a screen-space voxel size test.
/// Implemented by the rendering backend.
pub trait FrustumCuller {

    /// Pass the model-view matrix the next queries are relative to.
    fn set_view_matrix(&mut self, model_view: Mat4);

    /// Recompute the frustum planes from the current matrix.
    fn update(&mut self);

    /// Whether a box at the center with the extension intersects the frustum.
    fn is_visible(&self, center: Vec3<f32>, extension: Vec3<f32>) -> bool;

    /// The finest level justified by the screen-space size of a voxel
    /// of a box at the center with the extension.
    fn lod_level(&self, center: Vec3<f32>, extension: Vec3<f32>, domain_size: Vec3<u64>) -> i64;

    /// When set, `is_visible` reports everything as visible.
    fn set_pass_all(&mut self, pass_all: bool);
}


/// Answers whether a brick is already resident in GPU memory.
/// Implemented by the memory manager.
pub trait ResidencyOracle {

    /// Whether the brick texture is resident under the given
    /// texture creation parameters.
    fn is_resident(
        &self, dataset: DatasetId, key: &BrickKey,
        pow2_textures: bool, downsampled_to_8bit: bool, border_disabled: bool,
    ) -> bool;
}


/// The external collaborators planning needs, passed explicitly
/// to every planning entry point.
pub struct Services<'a> {

    /// The dataset to plan for. Planning without one is a state error.
    pub dataset: Option<&'a dyn Dataset>,

    /// The frustum culling service of the rendering backend.
    pub frustum: &'a mut dyn FrustumCuller,

    /// The residency oracle of the memory manager, if one exists.
    /// Without it, all bricks count as not resident.
    pub residency: Option<&'a dyn ResidencyOracle>,
}

impl fmt::Debug for Services<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("Services")
            .field("dataset", &self.dataset.map(|dataset| dataset.id()))
            .field("residency", &self.residency.is_some())
            .finish()
    }
}
