
//! The adaptive quality scheduler: decides per region at which level to
//! start rendering, when to degrade resolution or sampling rate, and how
//! to refine across subframes until the view-dependent finest level is
//! reached.

use log::{debug, info, warn};

use crate::error::{Error, UnitResult};
use crate::math::{Vec2, Vec3, Mat4, Plane};
use super::{Dataset, FrustumCuller, ResidencyOracle, RenderMode, Services, Brick};
use super::region::{RenderRegion, RegionId, RegionKind, Axis, ClearView};
use super::selection::{self, SelectionContext};


/// Caps on the reachable level window.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct LodLimits {

    /// How many levels below the coarsest rendering must start at least.
    pub coarsest: u64,

    /// The finest level rendering may refine down to.
    pub finest: u64,
}


/// Performance tuning knobs of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerfOptions {

    /// The frame rate the quality state machine tries to hold.
    /// Zero means a practically unlimited budget of ten seconds.
    pub min_framerate_fps: u32,

    /// Permit reducing screen resolution and sampling rate when
    /// starting at the coarsest level alone is not fast enough.
    pub use_all_means: bool,

    /// Factor the viewport is shrunk by while `want_low_res` is active.
    pub screen_res_dec_factor: f32,

    /// Factor the sampling rate is reduced by while `want_low_rate` is active.
    pub sample_rate_dec_factor: f32,

    /// Initial value of the redraw-inquiry grace counter after a
    /// control change.
    pub start_delay_frames: u32,

    /// Caps on the reachable level window.
    pub lod_limits: LodLimits,
}

impl Default for PerfOptions {
    fn default() -> Self {
        PerfOptions {
            min_framerate_fps: 0,
            use_all_means: false,
            screen_res_dec_factor: 2.0,
            sample_rate_dec_factor: 2.0,
            start_delay_frames: 1000,
            lod_limits: LodLimits::default(),
        }
    }
}

impl PerfOptions {

    /// The subframe budget in milliseconds.
    pub fn max_ms_per_frame(&self) -> f32 {
        if self.min_framerate_fps == 0 { 10_000.0 }
        else { 1000.0 / self.min_framerate_fps as f32 }
    }
}


/// Owns the render regions and plans their frames.
///
/// The scheduler itself is strictly synchronous: the rendering backend
/// asks `needs_redraw`, calls `plan_3d_frame`, consumes the brick list,
/// reports times with `add_frame_time`, and closes the pass with
/// `completed_subframe`.
#[derive(Debug)]
pub struct Scheduler {
    regions: Vec<RenderRegion>,
    options: PerfOptions,
    check_counter: u32,

    mode: RenderMode,
    timestep: usize,
    view: [Mat4; 2],
    stereo: bool,
    capture_mode: bool,
    window_size: Vec2<u32>,

    pow2_textures: bool,
    downsample_to_8bit: bool,
    disable_border: bool,

    frame_counter: u64,
    intra_frame_counter: u32,

    // cached from the dataset while planning
    max_lod_index: u64,
}

impl Scheduler {

    /// Create a scheduler with a single 3D region. The texture flags
    /// describe how the backend creates brick textures; they are passed
    /// through to the residency oracle and texture coordinates.
    pub fn new(
        options: PerfOptions,
        pow2_textures: bool, downsample_to_8bit: bool, disable_border: bool,
    ) -> Self
    {
        let check_counter = options.start_delay_frames;

        Scheduler {
            regions: vec![RenderRegion::new_3d()],
            options,
            check_counter,

            mode: RenderMode::default(),
            timestep: 0,
            view: [Mat4::identity(); 2],
            stereo: false,
            capture_mode: false,
            window_size: Vec2(0, 0),

            pow2_textures,
            downsample_to_8bit,
            disable_border,

            frame_counter: 0,
            intra_frame_counter: 0,
            max_lod_index: 0,
        }
    }


    // --- region management ---------------------------------------------

    /// Add another 3D region and return its id.
    pub fn add_3d_region(&mut self) -> RegionId {
        self.regions.push(RenderRegion::new_3d());
        self.regions.len() - 1
    }

    /// Add a 2D slice region perpendicular to the axis and return its id.
    pub fn add_slice_region(&mut self, axis: Axis) -> RegionId {
        self.regions.push(RenderRegion::new_slice(axis));
        self.regions.len() - 1
    }

    /// All regions of this scheduler.
    pub fn regions(&self) -> &[RenderRegion] { &self.regions }

    /// One region. Panics for an unknown id.
    pub fn region(&self, id: RegionId) -> &RenderRegion { &self.regions[id] }

    /// Mutable access to one region. Panics for an unknown id.
    pub fn region_mut(&mut self, id: RegionId) -> &mut RenderRegion { &mut self.regions[id] }

    /// The conventional target of global operations.
    pub fn first_3d_region(&self) -> Option<RegionId> {
        self.regions.iter().position(RenderRegion::is_3d)
    }

    fn resolve_3d(&self, region: Option<RegionId>) -> Option<RegionId> {
        region.or_else(|| self.first_3d_region())
    }


    // --- global state --------------------------------------------------

    /// The performance options currently in effect.
    pub fn options(&self) -> &PerfOptions { &self.options }

    /// The render mode brick selection currently filters for.
    pub fn render_mode(&self) -> &RenderMode { &self.mode }

    /// Replace the performance options. Leaving `use_all_means` disabled
    /// also withdraws all active degradations.
    pub fn set_perf_options(&mut self, options: PerfOptions) {
        self.options = options;

        if !options.use_all_means {
            for region in &mut self.regions {
                region.want_low_res = false;
                region.low_res_now = false;
                region.want_low_rate = false;
                region.low_rate_now = false;
                region.extra_pass_for_degradation = false;
            }
        }

        self.schedule_complete_redraw();
    }

    /// Constrain the reachable level window.
    pub fn set_lod_limits(&mut self, limits: LodLimits) {
        self.options.lod_limits = limits;
        self.schedule_complete_redraw();
    }

    /// Switch the render mode, including transfer-function limits
    /// or the isovalue.
    pub fn set_render_mode(&mut self, mode: RenderMode) {
        if self.mode != mode {
            self.mode = mode;
            self.schedule_complete_redraw();
        }
    }

    /// Select the timestep brick selection draws from.
    pub fn set_timestep(&mut self, timestep: usize) {
        self.timestep = timestep;
    }

    /// The currently selected timestep.
    pub fn timestep(&self) -> usize { self.timestep }

    /// In capture mode, frames always render at full quality,
    /// ignoring the frame budget.
    pub fn set_capture_mode(&mut self, capture: bool) {
        if self.capture_mode != capture {
            self.capture_mode = capture;
            self.schedule_complete_redraw();
        }
    }

    /// Whether capture mode is active.
    pub fn capture_mode(&self) -> bool { self.capture_mode }

    /// Enable or disable stereo rendering. While enabled, planning also
    /// produces the re-sorted left-eye brick list.
    pub fn set_stereo(&mut self, stereo: bool) {
        self.stereo = stereo;
        self.schedule_3d_redraws();
    }

    /// Pass the view matrix of one eye (0 = right, 1 = left).
    pub fn set_view_matrix(&mut self, eye: usize, view: Mat4) {
        self.view[eye] = view;
        self.schedule_3d_redraws();
    }

    /// Announce the window size. A zero window suppresses all redraws.
    pub fn resize(&mut self, window_size: Vec2<u32>) {
        self.window_size = window_size;
        self.schedule_complete_redraw();
    }

    /// Monotonic counter of started frames.
    pub fn frame_counter(&self) -> u64 { self.frame_counter }

    /// Counter of subframes within the current frame,
    /// reset whenever a new frame starts.
    pub fn intra_frame_counter(&self) -> u32 { self.intra_frame_counter }


    // --- per-region state ----------------------------------------------

    /// Rotate the region's object transform.
    pub fn set_rotation(&mut self, id: RegionId, rotation: Mat4) {
        self.regions[id].rotation = rotation;
        self.schedule_window_redraw(id);
    }

    /// Translate the region's object transform.
    pub fn set_translation(&mut self, id: RegionId, translation: Mat4) {
        self.regions[id].translation = translation;
        self.schedule_window_redraw(id);
    }

    /// Select the slice of a 2D region. A 3D region is a state error.
    pub fn set_slice_depth(&mut self, id: RegionId, slice_depth: u64) -> UnitResult {
        match self.regions[id].kind {
            RegionKind::Slice { ref mut depth, .. } => {
                if *depth != slice_depth {
                    *depth = slice_depth;
                    self.schedule_window_redraw(id);
                }
                Ok(())
            },

            RegionKind::View3d => Err(Error::State("slice depth requires a 2d region")),
        }
    }

    /// Mirror a 2D region horizontally or vertically.
    /// A 3D region is a state error.
    pub fn set_flip_mode(&mut self, id: RegionId, horizontal: bool, vertical: bool) -> UnitResult {
        match self.regions[id].kind {
            RegionKind::Slice { ref mut flip_x, ref mut flip_y, .. } => {
                if (*flip_x, *flip_y) != (horizontal, vertical) {
                    *flip_x = horizontal;
                    *flip_y = vertical;
                    self.schedule_window_redraw(id);
                }
                Ok(())
            },

            RegionKind::View3d => Err(Error::State("flip modes require a 2d region")),
        }
    }

    /// Activate a clip plane on the region, or on the first 3D region.
    pub fn set_clip_plane(&mut self, region: Option<RegionId>, plane: Plane) {
        if let Some(id) = self.resolve_3d(region) {
            if self.regions[id].clip_plane != Some(plane) {
                self.regions[id].clip_plane = Some(plane);
                self.schedule_window_redraw(id);
            }
        }
    }

    /// Deactivate the clip plane of the region, or of the first 3D region.
    pub fn disable_clip_plane(&mut self, region: Option<RegionId>) {
        if let Some(id) = self.resolve_3d(region) {
            if self.regions[id].clip_plane.is_some() {
                self.regions[id].clip_plane = None;
                self.schedule_window_redraw(id);
            }
        }
    }

    /// Change the isosurface color. In isosurface mode this only
    /// requires recompositing the last shaded buffers.
    pub fn set_iso_color(&mut self, region: Option<RegionId>, color: Vec3<f32>) {
        if let Some(id) = self.resolve_3d(region) {
            self.regions[id].iso_color = color;
            if matches!(self.mode, RenderMode::Iso { .. }) {
                self.schedule_recompose(Some(id));
            }
        }
    }

    /// Switch clear-view rendering on or off.
    pub fn enable_clear_view(&mut self, region: Option<RegionId>, enabled: bool) {
        if let Some(id) = self.resolve_3d(region) {
            if self.regions[id].clear_view.enabled != enabled {
                self.regions[id].clear_view.enabled = enabled;
                if matches!(self.mode, RenderMode::Iso { .. }) {
                    self.schedule_3d_redraws();
                }
            }
        }
    }

    /// Change the clear-view appearance. While clear view is active in
    /// isosurface mode, this only requires recompositing.
    pub fn set_clear_view_appearance(&mut self, region: Option<RegionId>, clear_view: ClearView) {
        if let Some(id) = self.resolve_3d(region) {
            let enabled = self.regions[id].clear_view.enabled;
            let merged = ClearView { enabled, ..clear_view };

            let changed = self.regions[id].clear_view != merged;
            self.regions[id].clear_view = merged;

            if changed && enabled && matches!(self.mode, RenderMode::Iso { .. }) {
                self.schedule_recompose(Some(id));
            }
        }
    }


    // --- redraw scheduling ---------------------------------------------

    /// Invalidate all regions. Any in-flight brick list is discarded;
    /// consumers are expected to throw away partial results.
    pub fn schedule_complete_redraw(&mut self) {
        self.check_counter = self.options.start_delay_frames;

        for id in 0 .. self.regions.len() {
            self.blank_region(id);
            self.regions[id].bricks_rendered_in_subframe = 0;
        }
    }

    /// Invalidate all 3D regions.
    pub fn schedule_3d_redraws(&mut self) {
        self.check_counter = self.options.start_delay_frames;

        for id in 0 .. self.regions.len() {
            if self.regions[id].is_3d() {
                self.blank_region(id);
            }
        }
    }

    /// Invalidate a single region.
    pub fn schedule_window_redraw(&mut self, id: RegionId) {
        self.check_counter = self.options.start_delay_frames;
        self.blank_region(id);
    }

    // does not touch the rendered-brick counter: the escalation machine
    // still needs to know whether the previous frame was finished
    fn blank_region(&mut self, id: RegionId) {
        let region = &mut self.regions[id];
        region.needs_redraw = true;
        region.is_blank = true;
        region.is_target_blank = true;
    }

    /// Request that the region re-blits its last shaded buffers with the
    /// current appearance parameters. Falls back to a full redraw while a
    /// subframe is still in flight.
    pub fn schedule_recompose(&mut self, region: Option<RegionId>) {
        if let Some(id) = self.resolve_3d(region) {
            if self.regions[id].subframe_finished() {
                self.regions[id].perform_recompose = true;
                self.regions[id].needs_redraw = true;
            }
            else {
                self.schedule_window_redraw(id);
            }
        }
    }

    /// Whether the region only needs recompositing, not re-rendering.
    pub fn only_recomposite(&self, id: RegionId) -> bool {
        let region = &self.regions[id];
        !region.is_blank && region.perform_recompose && !region.extra_pass_for_degradation
    }

    /// The consumer reports that it re-blitted the region.
    pub fn recompose_done(&mut self, id: RegionId) {
        self.regions[id].perform_recompose = false;
    }

    /// Whether any region wants to be painted. Blank regions and pending
    /// recomposites report immediately; continuing an unfinished
    /// refinement is debounced by the check counter, which decrements
    /// once per inquiry until the refinement may proceed.
    pub fn needs_redraw(&mut self) -> bool {
        if self.window_size.area() == 0 {
            return false; // cannot draw to a size zero window
        }

        let mut decrement_counter = false;
        let mut redraw_required = false;

        for region in &self.regions {
            redraw_required |= region.perform_recompose;

            // unfinished refinement: bricks remain, the finest justified
            // level is not reached yet, or a full-quality pass is owed
            if region.brick_list.len() > region.bricks_rendered_in_subframe
                || region.lod.current_lod_offset > region.lod.min_lod_for_view
                || region.extra_pass_for_degradation
            {
                if self.check_counter == 0 || self.capture_mode {
                    debug!("still drawing");
                    return true;
                }

                decrement_counter = true;
            }

            redraw_required |= region.is_blank;
        }

        if decrement_counter {
            self.check_counter -= 1;
        }

        redraw_required
    }


    // --- planning ------------------------------------------------------

    /// Plan the next subframe of a 3D region: recompute view state if the
    /// region is blank, pick the level to render, and build the brick
    /// list. Completes fully or leaves the state unchanged.
    pub fn plan_3d_frame(&mut self, services: &mut Services<'_>, id: RegionId) -> UnitResult {
        let dataset = services.dataset
            .ok_or(Error::State("planning requires a dataset"))?;

        if !self.regions.get(id).map_or(false, RenderRegion::is_3d) {
            return Err(Error::State("plan_3d_frame requires a 3d region"));
        }

        if self.only_recomposite(id) {
            // appearance-only change: the consumer re-blits the last
            // shaded buffers, the brick list stays untouched
            return Ok(());
        }

        self.max_lod_index = dataset.level_count().saturating_sub(1);

        if self.regions[id].is_blank {
            let view = self.view;
            let stereo = self.stereo;

            let region = &mut self.regions[id];
            region.model_view[0] = region.rotation * region.translation * view[0];
            if stereo {
                region.model_view[1] = region.rotation * region.translation * view[1];
            }

            // both eye views are similar, culling uses only one
            services.frustum.set_view_matrix(region.model_view[0]);
            services.frustum.update();

            self.compute_min_lod_for_view(&*services.frustum, dataset, id);
            self.compute_start_lod(id);
        }

        if self.regions[id].is_blank || self.regions[id].subframe_finished() {
            let mut build_new_list = false;

            {
                let region = &mut self.regions[id];

                if region.is_blank {
                    region.low_rate_now = region.want_low_rate;
                    region.low_res_now = region.want_low_res;
                    build_new_list = true;

                    if region.low_rate_now || region.low_res_now {
                        region.extra_pass_for_degradation = true;
                    }
                }
                else if region.low_rate_now || region.low_res_now {
                    // the degraded pass is done, render the same level
                    // again at full quality before refining further
                    region.low_res_now = false;
                    region.low_rate_now = false;
                    region.bricks_rendered_in_subframe = 0;
                    region.extra_pass_for_degradation = false;
                }
                else if region.lod.current_lod_offset > region.lod.min_lod_for_view {
                    region.lod.current_lod_offset -= 1;
                    build_new_list = true;
                }
            }

            if build_new_list {
                let level =
                    if self.capture_mode { 0 }
                    else { self.regions[id].lod.current_lod_offset.min(self.max_lod_index) };

                self.regions[id].lod.current_lod = level;
                self.build_lists(&*services.frustum, services.residency, dataset, id, level, false);
            }
        }

        if self.regions[id].is_blank {
            self.intra_frame_counter = 0;
            self.frame_counter += 1;
        }

        Ok(())
    }

    /// Plan a maximum-intensity-projection rotation frame: culling passes
    /// everything, the level is chosen so the volume does not exceed the
    /// window, and the list is ordered by residency for cache hits.
    pub fn plan_mip_frame(&mut self, services: &mut Services<'_>, id: RegionId) -> UnitResult {
        let dataset = services.dataset
            .ok_or(Error::State("planning requires a dataset"))?;

        if self.regions.get(id).is_none() {
            return Err(Error::State("plan_mip_frame requires a region"));
        }

        self.max_lod_index = dataset.level_count().saturating_sub(1);

        let view = self.view[0];
        let region = &mut self.regions[id];
        region.model_view[0] = region.rotation * region.translation * view;

        // every brick is traversed for a projection anyway
        services.frustum.set_pass_all(true);

        let window_max = u64::from(self.window_size.max_component());
        let mut voxels = dataset.domain_size(0);
        let mut level = 0_u64;

        if window_max > 0 {
            while voxels.min_component() >= window_max {
                voxels = voxels.map(|count| count / 2);
                level += 1;
            }
        }

        if level > 0 {
            level = (level - 1).min(self.max_lod_index);
        }

        self.regions[id].lod.current_lod = level;
        self.regions[id].lod.current_lod_offset = 0;
        self.build_lists(&*services.frustum, services.residency, dataset, id, level, true);

        self.intra_frame_counter = 0;
        self.frame_counter += 1;
        Ok(())
    }

    fn build_lists(
        &mut self,
        frustum: &dyn FrustumCuller, residency: Option<&dyn ResidencyOracle>,
        dataset: &dyn Dataset, id: RegionId, level: u64, order_by_residency: bool,
    ) {
        debug!("building new brick list for level {}", level);

        let context = SelectionContext {
            dataset, frustum, residency,
            mode: &self.mode,
            level,
            timestep: self.timestep,
            pow2_textures: self.pow2_textures,
            downsample_to_8bit: self.downsample_to_8bit,
            disable_border: self.disable_border,
            order_by_residency,
        };

        let bricks = selection::build_brick_list(&context, &self.regions[id]);
        debug!("{} bricks made the cut", bricks.len());

        let left_eye_bricks = if self.stereo && !order_by_residency {
            selection::build_left_eye_brick_list(&bricks, &self.regions[id].model_view[1])
        } else { Vec::new() };

        let region = &mut self.regions[id];
        region.brick_list = bricks;
        region.left_eye_brick_list = left_eye_bricks;
        region.bricks_rendered_in_subframe = 0;
    }

    /// How fine the current view needs the data: the frustum oracle
    /// relates screen-space voxel sizes to the level pyramid, clamped
    /// by the finest-level cap.
    fn compute_min_lod_for_view(&mut self, frustum: &dyn FrustumCuller, dataset: &dyn Dataset, id: RegionId) {
        let domain_size = dataset.domain_size(0);

        let mut extent = domain_size.to_f32() * dataset.scale().to_f32();
        extent = extent / extent.max_component();

        let coarsest_possible = dataset.level_count().saturating_sub(1) as i64;
        let finest = (self.options.lod_limits.finest as i64).min(coarsest_possible);

        let level = frustum.lod_level(Vec3(0.0, 0.0, 0.0), extent, domain_size);
        self.regions[id].lod.min_lod_for_view = level.max(finest).min(coarsest_possible).max(0) as u64;
    }

    /// The escalation state machine: decide at which coarse level the
    /// next refinement cycle starts, based on how long the previous
    /// subframes took.
    fn compute_start_lod(&mut self, id: RegionId) {
        let max_ms = self.options.max_ms_per_frame();
        let use_all_means = self.options.use_all_means;
        let max_lod_index = self.max_lod_index;
        let capture_mode = self.capture_mode;

        let region = &mut self.regions[id];

        if !capture_mode && region.msec_passed[0] >= 0.0 {
            if region.msec_passed[0] > max_ms {
                // too slow; allow a few grace frames before reducing quality
                if region.lod.lod_not_ok_counter < 3 {
                    info!(
                        "start level too slow, giving the renderer {} more frame(s) to become faster",
                        3 - region.lod.lod_not_ok_counter,
                    );
                    region.lod.lod_not_ok_counter += 1;
                }
                else {
                    region.lod.lod_not_ok_counter = 0;

                    let reduced_skip = region.lod.perf_lod_skip.max(1) - 1;
                    if region.lod.perf_lod_skip != reduced_skip {
                        info!(
                            "starting one level coarser, the first subframe took {} ms (budget {} ms)",
                            region.msec_passed[0], max_ms,
                        );

                        region.msec_passed[0] = region.msec_passed[1];
                        region.lod.perf_lod_skip = reduced_skip;
                    }
                    else if use_all_means {
                        if region.want_low_rate && region.want_low_res {
                            warn!("the frame budget is unreachable even with all degradations");
                        }
                        else if !region.want_low_res {
                            info!("reducing screen resolution to meet the frame budget");
                            region.want_low_res = true;
                        }
                        else {
                            info!("reducing sampling rate to meet the frame budget");
                            region.want_low_rate = true;
                        }
                    }
                    else {
                        warn!("the frame budget cannot be met by starting coarser alone");
                    }
                }
            }
            else if region.subframe_finished()
                && region.msec_passed[1] >= 0.0
                && region.msec_passed[1] <= max_ms
            {
                region.lod.lod_not_ok_counter = 0;

                // fast enough; first withdraw degradations, then start finer
                if region.want_low_rate {
                    info!(
                        "restoring the full sampling rate, the subframe took only {} ms",
                        region.msec_passed[0],
                    );
                    region.want_low_rate = false;
                }
                else if region.want_low_res {
                    info!(
                        "restoring the full viewport, the subframe took only {} ms",
                        region.msec_passed[0],
                    );
                    region.want_low_res = false;
                }
                else {
                    let raised_skip = (region.lod.perf_lod_skip + 1)
                        .min(max_lod_index.saturating_sub(region.lod.min_lod_for_view));

                    if region.lod.perf_lod_skip != raised_skip {
                        info!(
                            "starting one level finer, the second subframe took only {} ms",
                            region.msec_passed[1],
                        );
                        region.lod.perf_lod_skip = raised_skip;
                    }
                }
            }
            else if region.subframe_finished() {
                debug!("start level seems to be ok");
            }

            region.lod.start_lod_offset = region.lod.min_lod_for_view
                .max(max_lod_index.saturating_sub(region.lod.perf_lod_skip));
        }
        else if capture_mode {
            region.lod.start_lod_offset = region.lod.min_lod_for_view;
        }
        else {
            // the very first frame of this region, take it easy
            region.lod.start_lod_offset = max_lod_index;
        }

        region.lod.start_lod_offset = region.lod.start_lod_offset
            .min(max_lod_index.saturating_sub(self.options.lod_limits.coarsest.min(max_lod_index)));

        region.lod.current_lod_offset = region.lod.start_lod_offset;
        region.restart_timers();
    }


    // --- subframe bookkeeping ------------------------------------------

    /// The bricks the backend must render next, sorted front to back.
    pub fn brick_list(&self, id: RegionId) -> &[Brick] {
        &self.regions[id].brick_list
    }

    /// The brick list re-sorted for the left eye.
    /// Empty unless stereo rendering is active.
    pub fn left_eye_brick_list(&self, id: RegionId) -> &[Brick] {
        &self.regions[id].left_eye_brick_list
    }

    /// The backend reports that it consumed more bricks of the list.
    pub fn add_rendered_bricks(&mut self, id: RegionId, count: usize) {
        let region = &mut self.regions[id];
        region.bricks_rendered_in_subframe =
            (region.bricks_rendered_in_subframe + count).min(region.brick_list.len());
    }

    /// The backend reports rendering time spent on the current subframe.
    pub fn add_frame_time(&mut self, id: RegionId, msec: f32) {
        self.regions[id].msec_this_frame += msec;
    }

    /// The backend reports that the current subframe is on screen.
    /// Stores the time of the first and second subframe of the cycle,
    /// which drive the quality state machine, and un-blanks the region.
    pub fn completed_subframe(&mut self, id: RegionId) {
        let region = &mut self.regions[id];

        let first_subframe =
            region.lod.current_lod_offset == region.lod.start_lod_offset
                && (!region.want_low_res || region.low_res_now)
                && (!region.want_low_rate || region.low_rate_now);

        let second_subframe = !first_subframe
            && (region.lod.current_lod_offset == region.lod.start_lod_offset
                || (region.lod.current_lod_offset + 1 == region.lod.start_lod_offset
                    && !(region.want_low_res || region.want_low_rate)));

        if first_subframe {
            // time of the interaction level, used to detect being too slow
            region.msec_passed[0] = region.msec_this_frame;
        }
        else if second_subframe {
            region.msec_passed[1] = region.msec_this_frame;
        }

        region.msec_this_frame = 0.0;
        region.is_target_blank = false;
        region.is_blank = false;

        self.intra_frame_counter += 1;
    }

    /// The viewport to render at, honoring an active resolution
    /// degradation of the region.
    pub fn effective_window_size(&self, id: RegionId) -> Vec2<u32> {
        if self.regions[id].low_res_now {
            let factor = self.options.screen_res_dec_factor;
            Vec2(
                (self.window_size.0 as f32 / factor).ceil() as u32,
                (self.window_size.1 as f32 / factor).ceil() as u32,
            )
        }
        else { self.window_size }
    }

    /// The factor to scale the sampling rate by, honoring an active
    /// sampling degradation of the region.
    pub fn effective_sample_rate_factor(&self, id: RegionId) -> f32 {
        if self.regions[id].low_rate_now { 1.0 / self.options.sample_rate_dec_factor }
        else { 1.0 }
    }
}
