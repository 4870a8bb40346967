
//! Render regions: independent views onto the shared dataset,
//! each with its own transforms, timers, and quality state.

use crate::math::{Vec3, Mat4, Plane};
use super::Brick;


/// Index of a region inside its scheduler.
pub type RegionId = usize;


/// A volume axis.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Axis { X, Y, Z }


/// What a region displays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegionKind {

    /// An axis-aligned 2D slice view. Slice regions select a single
    /// slice and do not participate in brick planning.
    Slice {
        /// The axis the slice is perpendicular to.
        axis: Axis,
        /// The selected slice, in voxels of the finest level.
        depth: u64,
        /// Mirror the slice horizontally.
        flip_x: bool,
        /// Mirror the slice vertically.
        flip_y: bool,
    },

    /// A perspective 3D view, driven by brick planning.
    View3d,
}


/// Iso-appearance parameters of the clear-view mode.
/// Changing these only requires recompositing the last shaded buffers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearView {

    /// Whether clear-view rendering is active.
    pub enabled: bool,

    /// Color of the focus isosurface.
    pub color: Vec3<f32>,

    /// Radius of the transparent context region.
    pub size: f32,

    /// Scale of the context isosurface.
    pub context_scale: f32,

    /// Scale of the border between focus and context.
    pub border_scale: f32,

    /// Isovalue of the focus surface.
    pub focus_isovalue: f64,
}

impl Default for ClearView {
    fn default() -> Self {
        ClearView {
            enabled: false,
            color: Vec3(1.0, 0.0, 0.0),
            size: 5.5,
            context_scale: 1.0,
            border_scale: 60.0,
            focus_isovalue: 0.8,
        }
    }
}


/// The per-region quality state machine signals.
/// Levels count from the finest (zero) to the coarsest.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LodState {

    /// How many levels finer than the coarsest the region starts
    /// rendering at. Grows while frames finish within budget.
    pub perf_lod_skip: u64,

    /// The level the current refinement cycle started at.
    pub start_lod_offset: u64,

    /// The level the current subframe renders at.
    /// Decrements towards `min_lod_for_view` as subframes complete.
    pub current_lod_offset: u64,

    /// The finest level that screen-space voxel sizes justify
    /// for the current view.
    pub min_lod_for_view: u64,

    /// The level the current brick list was built for.
    pub current_lod: u64,

    /// Consecutive over-budget first subframes. Rendering gets this
    /// many grace frames before quality is reduced.
    pub lod_not_ok_counter: u32,
}


/// One independent view onto the dataset. Regions schedule independently
/// but share the dataset and transfer functions of their scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRegion {

    /// What this region displays.
    pub kind: RegionKind,

    /// Rotation part of the object transform.
    pub rotation: Mat4,

    /// Translation part of the object transform.
    pub translation: Mat4,

    /// Model-view matrix per eye. The second entry is only
    /// valid while stereo rendering is active.
    pub model_view: [Mat4; 2],

    /// Nothing of the current frame has been rendered yet.
    pub is_blank: bool,

    /// The render target still holds no finished subframe.
    pub is_target_blank: bool,

    /// The region was invalidated and must be repainted.
    pub needs_redraw: bool,

    /// A degraded subframe was rendered and a full-quality pass
    /// is still owed.
    pub extra_pass_for_degradation: bool,

    /// Only the appearance changed: re-blit the last shaded buffers
    /// instead of re-rendering bricks.
    pub perform_recompose: bool,

    /// Render the next frames at reduced viewport resolution.
    pub want_low_res: bool,

    /// Render the next frames at reduced sampling rate.
    pub want_low_rate: bool,

    /// `want_low_res`, latched for the subframe being rendered.
    pub low_res_now: bool,

    /// `want_low_rate`, latched for the subframe being rendered.
    pub low_rate_now: bool,

    /// Milliseconds of the first and second subframe of the current
    /// refinement cycle. Negative while not yet measured.
    pub msec_passed: [f32; 2],

    /// Milliseconds accumulated for the subframe being rendered.
    pub msec_this_frame: f32,

    /// The clip plane of this region, if one is active.
    pub clip_plane: Option<Plane>,

    /// Color of the isosurface. Changing it only recomposites.
    pub iso_color: Vec3<f32>,

    /// Clear-view parameters of this region.
    pub clear_view: ClearView,

    /// The quality state machine of this region.
    pub lod: LodState,

    /// The bricks of the current subframe, sorted by `distance`.
    pub brick_list: Vec<Brick>,

    /// The brick list re-sorted for the left eye.
    /// Empty unless stereo rendering is active.
    pub left_eye_brick_list: Vec<Brick>,

    /// How many bricks of `brick_list` the backend has consumed.
    pub bricks_rendered_in_subframe: usize,
}

impl RenderRegion {

    /// A 3D view region with identity transforms.
    pub fn new_3d() -> Self {
        Self::new(RegionKind::View3d)
    }

    /// A 2D slice region perpendicular to the axis.
    pub fn new_slice(axis: Axis) -> Self {
        Self::new(RegionKind::Slice { axis, depth: 0, flip_x: false, flip_y: false })
    }

    fn new(kind: RegionKind) -> Self {
        let mut region = RenderRegion {
            kind,
            rotation: Mat4::identity(),
            translation: Mat4::identity(),
            model_view: [Mat4::identity(); 2],

            is_blank: true,
            is_target_blank: true,
            needs_redraw: true,
            extra_pass_for_degradation: false,
            perform_recompose: false,

            want_low_res: false,
            want_low_rate: false,
            low_res_now: false,
            low_rate_now: false,

            msec_passed: [0.0; 2],
            msec_this_frame: 0.0,

            clip_plane: None,
            iso_color: Vec3(0.5, 0.5, 0.5),
            clear_view: ClearView::default(),

            lod: LodState::default(),
            brick_list: Vec::new(),
            left_eye_brick_list: Vec::new(),
            bricks_rendered_in_subframe: 0,
        };

        region.restart_timers();
        region
    }

    /// Whether this region is a 3D view.
    pub fn is_3d(&self) -> bool {
        matches!(self.kind, RegionKind::View3d)
    }

    /// Whether the backend has consumed the whole current brick list.
    pub fn subframe_finished(&self) -> bool {
        self.brick_list.len() == self.bricks_rendered_in_subframe
    }

    /// Forget both subframe time measurements.
    pub fn restart_timers(&mut self) {
        self.msec_passed = [-1.0, -1.0];
    }
}
