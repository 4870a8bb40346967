
//! Builds the depth-sorted list of visible, non-empty bricks
//! for one subframe.

use std::fmt;

use log::debug;

use crate::math::{Vec3, Vec4, Mat4};
use super::{Brick, BrickKey, Dataset, DataQuery, FrustumCuller, RenderMode, ResidencyOracle};
use super::region::RenderRegion;


/// Everything brick selection needs besides the region itself.
#[derive(Clone, Copy)]
pub struct SelectionContext<'a> {

    /// The dataset bricks are selected from.
    pub dataset: &'a dyn Dataset,

    /// The frustum culling service, already updated
    /// with the current model-view matrix.
    pub frustum: &'a dyn FrustumCuller,

    /// The residency oracle, consulted for residency-ordered lists.
    pub residency: Option<&'a dyn ResidencyOracle>,

    /// The render mode including transfer-function limits or isovalue.
    pub mode: &'a RenderMode,

    /// The level to select bricks of.
    pub level: u64,

    /// The timestep to select bricks of.
    pub timestep: usize,

    /// Whether brick textures are padded to power-of-two sizes.
    pub pow2_textures: bool,

    /// Whether brick textures are downsampled to eight bits.
    pub downsample_to_8bit: bool,

    /// Whether brick borders are disabled in texture memory.
    pub disable_border: bool,

    /// Sort resident bricks first instead of sorting by distance.
    /// The depth order does not matter for rotation series where every
    /// brick is traversed anyway, but cache hit rates do.
    pub order_by_residency: bool,
}

impl fmt::Debug for SelectionContext<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("SelectionContext")
            .field("level", &self.level)
            .field("timestep", &self.timestep)
            .field("mode", self.mode)
            .field("order_by_residency", &self.order_by_residency)
            .finish()
    }
}


/// Run the whole selection pipeline: frustum culling, clip-plane culling,
/// data-emptiness culling, texture coordinates, and the depth sort.
/// An empty result is a normal "nothing visible" outcome.
pub fn build_brick_list(context: &SelectionContext<'_>, region: &RenderRegion) -> Vec<Brick> {
    let dataset = context.dataset;

    let overlap = dataset.brick_overlap();
    let domain_size = dataset.domain_size(context.level);
    let mut scale = dataset.scale().to_f32();

    let corrected_scale = scale
        * (domain_size.to_f32() / domain_size.to_f32().max_component());
    scale = scale / corrected_scale.max_component();

    debug!(
        "building brick list from {} bricks of level {}",
        dataset.brick_count(context.level, context.timestep), context.level,
    );

    let mut bricks = Vec::new();

    for (key, metadata) in dataset.bricks(context.level, context.timestep) {
        let mut brick = Brick {
            key,
            center: metadata.center * scale,
            extension: metadata.extents * scale,
            voxel_count: metadata.voxels,
            tex_coords_min: Vec3(0.0, 0.0, 0.0),
            tex_coords_max: Vec3(1.0, 1.0, 1.0),
            distance: 0.0,
        };

        if !context.frustum.is_visible(brick.center, brick.extension) {
            continue;
        }

        if clipped_by_plane(&brick, region) {
            continue;
        }

        if !contains_renderable_data(context, &key) {
            debug!(
                "skipping brick {:?} because it contains no data under the current {}",
                key.brick.position,
                if matches!(context.mode, RenderMode::Iso { .. }) { "isovalue" } else { "transfer function" },
            );
            continue;
        }

        let (tex_min, tex_max) = texture_bounds(context, &key, metadata.voxels, overlap);
        brick.tex_coords_min = tex_min;
        brick.tex_coords_max = tex_max;

        brick.distance = if context.order_by_residency {
            let resident = context.residency.map_or(false, |residency| residency.is_resident(
                dataset.id(), &key,
                context.pow2_textures, context.downsample_to_8bit, context.disable_border,
            ));

            if resident { 0.0 } else { 1.0 }
        }
        else {
            brick_distance(&brick, &region.model_view[0])
        };

        bricks.push(brick);
    }

    // stable, so bricks at equal distance keep their z-major order
    bricks.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    bricks
}


/// Re-sort an already selected brick list for the left eye.
/// Only the sort key changes; culling is shared between the eyes
/// because their views are nearly identical.
pub fn build_left_eye_brick_list(right_eye_bricks: &[Brick], left_model_view: &Mat4) -> Vec<Brick> {
    let mut bricks = right_eye_bricks.to_vec();

    for brick in &mut bricks {
        brick.distance = brick_distance(brick, left_model_view);
    }

    bricks.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    bricks
}


/// The distance from the view position to the closest of the eight brick
/// corners. Each corner is pulled slightly towards the center to resolve
/// ties between bricks sharing a corner.
pub fn brick_distance(brick: &Brick, model_view: &Mat4) -> f32 {
    const EPSILON: f32 = 0.4999;

    let mut distance = f32::MAX;

    for corner in corners(brick.center, brick.extension, EPSILON) {
        let view_space = model_view.transform(Vec4::from_point(corner)).xyz();
        distance = distance.min(view_space.length());
    }

    distance
}


/// A brick is only dropped when the region's clip plane
/// removes all eight of its corners.
fn clipped_by_plane(brick: &Brick, region: &RenderRegion) -> bool {
    let plane = match region.clip_plane {
        Some(plane) => plane,
        None => return false,
    };

    let world = region.rotation * region.translation;

    corners(brick.center, brick.extension, 0.5).iter()
        .all(|corner| plane.clips(world.transform_point(*corner)))
}

fn corners(center: Vec3<f32>, extension: Vec3<f32>, factor: f32) -> [Vec3<f32>; 8] {
    let offset = |x: f32, y: f32, z: f32| {
        center + Vec3(extension.0 * x, extension.1 * y, extension.2 * z) * factor
    };

    [
        offset(-1.0, -1.0, -1.0), offset(-1.0, -1.0, 1.0),
        offset(-1.0, 1.0, -1.0), offset(-1.0, 1.0, 1.0),
        offset(1.0, -1.0, -1.0), offset(1.0, -1.0, 1.0),
        offset(1.0, 1.0, -1.0), offset(1.0, 1.0, 1.0),
    ]
}


/// Ask the dataset whether the brick contributes anything under the
/// current render mode. Transfer-function limits are table indices;
/// they are rescaled into data value units first.
fn contains_renderable_data(context: &SelectionContext<'_>, key: &BrickKey) -> bool {
    let dataset = context.dataset;

    let query = match *context.mode {
        RenderMode::OneD { lut_size, non_zero } => {
            let rescale = max_data_value(context, lut_size) / lut_size as f64;
            DataQuery::Range { min: non_zero.0 * rescale, max: non_zero.1 * rescale }
        },

        RenderMode::TwoD { lut_size, non_zero, gradient } => {
            let rescale = max_data_value(context, lut_size) / lut_size as f64;
            DataQuery::RangeAndGradient {
                min: non_zero.0 * rescale, max: non_zero.1 * rescale,
                min_gradient: gradient.0, max_gradient: gradient.1,
            }
        },

        RenderMode::Iso { value } => DataQuery::Isovalue(value),
    };

    dataset.contains_data(key, &query)
}

/// The largest data value the transfer function domain must cover.
fn max_data_value(context: &SelectionContext<'_>, lut_size: usize) -> f64 {
    let dataset = context.dataset;

    if dataset.bit_width() != 8 && context.downsample_to_8bit {
        return 255.0;
    }

    let (min, max) = dataset.value_range();
    if min > max { lut_size as f64 } else { max }
}


/// Texture coordinates that sample the payload but not the halo of
/// neighboring bricks. Bricks at the volume boundary have no halo on
/// their outer faces, so the half-texel inset applies there instead.
/// Power-of-two padding shifts the upper bound further down to skip
/// the padding texels.
fn texture_bounds(
    context: &SelectionContext<'_>, key: &BrickKey,
    voxels: Vec3<u32>, overlap: Vec3<u32>,
) -> (Vec3<f32>, Vec3<f32>)
{
    let dataset = context.dataset;

    let first = Vec3(
        dataset.is_first_in_dimension(0, key),
        dataset.is_first_in_dimension(1, key),
        dataset.is_first_in_dimension(2, key),
    );

    let last = Vec3(
        dataset.is_last_in_dimension(0, key),
        dataset.is_last_in_dimension(1, key),
        dataset.is_last_in_dimension(2, key),
    );

    let texture_voxels = if context.pow2_textures {
        voxels.map(u32::next_power_of_two)
    } else { voxels };

    let bound = |first: bool, resolution: u32, overlap: u32| {
        let resolution = resolution as f32;
        if first { 0.5 / resolution } else { overlap as f32 * 0.5 / resolution }
    };

    let min = Vec3(
        bound(first.0, texture_voxels.0, overlap.0),
        bound(first.1, texture_voxels.1, overlap.1),
        bound(first.2, texture_voxels.2, overlap.2),
    );

    let mut max = Vec3(
        1.0 - bound(last.0, texture_voxels.0, overlap.0),
        1.0 - bound(last.1, texture_voxels.1, overlap.1),
        1.0 - bound(last.2, texture_voxels.2, overlap.2),
    );

    if context.pow2_textures {
        // compensate for the padding texels behind the payload
        max = max - (texture_voxels - voxels).to_f32() / texture_voxels.to_f32();
    }

    (min, max)
}
