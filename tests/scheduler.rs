
//! Drives the adaptive scheduler through complete frame cycles:
//! start level escalation, degradations, refinement,
//! and the recomposite fast path.

extern crate voxtree;

use voxtree::error::Error;
use voxtree::math::{Vec2, Vec3, Mat4};
use voxtree::meta::{VolumeMeta, ComponentType};
use voxtree::render::{Services, FrustumCuller, ResidencyOracle, RenderMode, DatasetId, BrickKey};
use voxtree::render::dataset::VolumeIndex;
use voxtree::render::region::Axis;
use voxtree::render::scheduler::{Scheduler, PerfOptions};


/// Accepts every brick and reports a fixed view-dependent level.
#[derive(Debug)]
struct Frustum {
    lod: i64,
    pass_all: bool,
}

impl FrustumCuller for Frustum {
    fn set_view_matrix(&mut self, _: Mat4) {}
    fn update(&mut self) {}
    fn is_visible(&self, _: Vec3<f32>, _: Vec3<f32>) -> bool { true }
    fn lod_level(&self, _: Vec3<f32>, _: Vec3<f32>, _: Vec3<u64>) -> i64 { self.lod }
    fn set_pass_all(&mut self, pass_all: bool) { self.pass_all = pass_all; }
}

/// Bricks at even x positions count as resident.
#[derive(Debug)]
struct HalfResident;

impl ResidencyOracle for HalfResident {
    fn is_resident(&self, _: DatasetId, key: &BrickKey, _: bool, _: bool, _: bool) -> bool {
        key.brick.position.0 % 2 == 0
    }
}

/// Four levels: brick counts 125, 27, 8, 1.
fn dataset() -> VolumeIndex {
    let meta = VolumeMeta::new(
        ComponentType::U8, 1,
        Vec3(256, 256, 256), Vec3(1.0, 1.0, 1.0),
        Vec3(64, 64, 64), 2,
    ).unwrap();

    VolumeIndex::new(meta, DatasetId(0))
}

fn scheduler(fps: u32, start_delay: u32) -> Scheduler {
    let mut scheduler = Scheduler::new(
        PerfOptions {
            min_framerate_fps: fps,
            start_delay_frames: start_delay,
            .. PerfOptions::default()
        },
        false, false, false,
    );

    scheduler.resize(Vec2(512, 512));
    scheduler
}

/// Render the whole current brick list in one go and close the subframe.
fn render_subframe(scheduler: &mut Scheduler, msec: f32) {
    let count = scheduler.brick_list(0).len();
    scheduler.add_rendered_bricks(0, count);
    scheduler.add_frame_time(0, msec);
    scheduler.completed_subframe(0);
}


#[test]
fn first_frame_starts_at_the_coarsest_level_and_refines() {
    let index = dataset();
    let mut frustum = Frustum { lod: 0, pass_all: false };
    let mut services = Services { dataset: Some(&index), frustum: &mut frustum, residency: None };

    let mut scheduler = scheduler(60, 0);
    assert!(scheduler.needs_redraw());

    // the very first frame takes it easy: coarsest level, one brick
    scheduler.plan_3d_frame(&mut services, 0).unwrap();
    assert_eq!(scheduler.region(0).lod.start_lod_offset, 3);
    assert_eq!(scheduler.region(0).lod.current_lod, 3);
    assert_eq!(scheduler.brick_list(0).len(), 1);

    render_subframe(&mut scheduler, 5.0);
    assert!(!scheduler.region(0).is_blank);

    // refinement walks the levels down without ever going back up
    let mut offsets = vec![scheduler.region(0).lod.current_lod_offset];
    let expected_counts = [8, 27, 125];

    for expected in expected_counts {
        assert!(scheduler.needs_redraw());
        scheduler.plan_3d_frame(&mut services, 0).unwrap();
        assert_eq!(scheduler.brick_list(0).len(), expected);

        offsets.push(scheduler.region(0).lod.current_lod_offset);
        render_subframe(&mut scheduler, 5.0);
    }

    assert_eq!(offsets, vec![3, 2, 1, 0]);
    assert!(!scheduler.needs_redraw()); // the finest justified level is reached
}

#[test]
fn fast_second_subframes_start_the_next_frame_finer() {
    let index = dataset();
    let mut frustum = Frustum { lod: 0, pass_all: false };
    let mut services = Services { dataset: Some(&index), frustum: &mut frustum, residency: None };

    let mut scheduler = scheduler(60, 0);

    // one complete fast frame: coarsest down to the finest level
    scheduler.plan_3d_frame(&mut services, 0).unwrap();
    render_subframe(&mut scheduler, 5.0);
    for _ in 0 .. 3 {
        scheduler.plan_3d_frame(&mut services, 0).unwrap();
        render_subframe(&mut scheduler, 5.0);
    }

    assert_eq!(scheduler.region(0).lod.perf_lod_skip, 0);

    // the next interaction starts one level finer
    scheduler.schedule_window_redraw(0);
    scheduler.plan_3d_frame(&mut services, 0).unwrap();

    assert_eq!(scheduler.region(0).lod.perf_lod_skip, 1);
    assert_eq!(scheduler.region(0).lod.start_lod_offset, 2);
    assert_eq!(scheduler.brick_list(0).len(), 8);
}

#[test]
fn slow_frames_get_three_grace_frames_before_starting_coarser() {
    let index = dataset();
    let mut frustum = Frustum { lod: 0, pass_all: false };
    let mut services = Services { dataset: Some(&index), frustum: &mut frustum, residency: None };

    let mut scheduler = scheduler(60, 0); // budget is 16.7 ms
    scheduler.region_mut(0).lod.perf_lod_skip = 2;

    // first frame is the "first ever" special case
    scheduler.plan_3d_frame(&mut services, 0).unwrap();
    render_subframe(&mut scheduler, 25.0);

    // three slow frames are forgiven
    for _ in 0 .. 3 {
        scheduler.schedule_window_redraw(0);
        scheduler.plan_3d_frame(&mut services, 0).unwrap();
        assert_eq!(scheduler.region(0).lod.perf_lod_skip, 2);
        render_subframe(&mut scheduler, 25.0);
    }

    // the fourth slow frame starts coarser
    scheduler.schedule_window_redraw(0);
    scheduler.plan_3d_frame(&mut services, 0).unwrap();
    assert_eq!(scheduler.region(0).lod.perf_lod_skip, 1);
}

#[test]
fn degradations_engage_in_order_once_the_skip_hits_the_floor() {
    let index = dataset();
    let mut frustum = Frustum { lod: 0, pass_all: false };
    let mut services = Services { dataset: Some(&index), frustum: &mut frustum, residency: None };

    let mut scheduler = Scheduler::new(
        PerfOptions {
            min_framerate_fps: 60,
            start_delay_frames: 0,
            use_all_means: true,
            .. PerfOptions::default()
        },
        false, false, false,
    );
    scheduler.resize(Vec2(512, 512));

    let mut slow_frame = |scheduler: &mut Scheduler| {
        scheduler.schedule_window_redraw(0);
        scheduler.plan_3d_frame(&mut services, 0).unwrap();
        render_subframe(scheduler, 25.0);
    };

    // first ever frame, then four slow evaluations reduce the resolution
    for _ in 0 .. 5 { slow_frame(&mut scheduler); }
    assert!(scheduler.region(0).want_low_res);
    assert!(!scheduler.region(0).want_low_rate);

    // four more reduce the sampling rate as well
    for _ in 0 .. 4 { slow_frame(&mut scheduler); }
    assert!(scheduler.region(0).want_low_rate);

    // the degraded viewport and sampling rate are exposed to the backend
    scheduler.schedule_window_redraw(0);
    scheduler.plan_3d_frame(&mut services, 0).unwrap();
    assert!(scheduler.region(0).low_res_now);
    assert_eq!(scheduler.effective_window_size(0), Vec2(256, 256));
    assert_eq!(scheduler.effective_sample_rate_factor(0), 0.5);
    assert!(scheduler.region(0).extra_pass_for_degradation);
}

#[test]
fn fast_frames_withdraw_degradations_before_refining() {
    let index = dataset();
    let mut frustum = Frustum { lod: 0, pass_all: false };
    let mut services = Services { dataset: Some(&index), frustum: &mut frustum, residency: None };

    let mut scheduler = Scheduler::new(
        PerfOptions {
            min_framerate_fps: 60,
            start_delay_frames: 0,
            use_all_means: true,
            .. PerfOptions::default()
        },
        false, false, false,
    );
    scheduler.resize(Vec2(512, 512));

    {
        let region = scheduler.region_mut(0);
        region.want_low_res = true;
        region.want_low_rate = true;
    }

    let mut fast_plan = |scheduler: &mut Scheduler| {
        scheduler.region_mut(0).msec_passed = [5.0, 5.0];
        scheduler.schedule_window_redraw(0);
        scheduler.plan_3d_frame(&mut services, 0).unwrap();
    };

    // sampling rate recovers first, then the viewport, then the start level
    fast_plan(&mut scheduler);
    assert!(!scheduler.region(0).want_low_rate);
    assert!(scheduler.region(0).want_low_res);

    fast_plan(&mut scheduler);
    assert!(!scheduler.region(0).want_low_res);

    assert_eq!(scheduler.region(0).lod.perf_lod_skip, 0);
    fast_plan(&mut scheduler);
    assert_eq!(scheduler.region(0).lod.perf_lod_skip, 1);
}

#[test]
fn degraded_subframes_are_repeated_at_full_quality() {
    let index = dataset();
    let mut frustum = Frustum { lod: 0, pass_all: false };
    let mut services = Services { dataset: Some(&index), frustum: &mut frustum, residency: None };

    let mut scheduler = scheduler(60, 0);
    scheduler.region_mut(0).want_low_res = true;

    scheduler.plan_3d_frame(&mut services, 0).unwrap();
    assert!(scheduler.region(0).low_res_now);
    assert!(scheduler.region(0).extra_pass_for_degradation);

    let degraded_level = scheduler.region(0).lod.current_lod;
    render_subframe(&mut scheduler, 5.0);

    // the next plan repeats the same level at full quality
    // instead of advancing
    scheduler.plan_3d_frame(&mut services, 0).unwrap();
    assert!(!scheduler.region(0).low_res_now);
    assert!(!scheduler.region(0).extra_pass_for_degradation);
    assert_eq!(scheduler.region(0).lod.current_lod, degraded_level);
    assert_eq!(scheduler.region(0).bricks_rendered_in_subframe, 0);
}

#[test]
fn redraw_inquiries_are_debounced_by_the_check_counter() {
    let index = dataset();
    let mut frustum = Frustum { lod: 0, pass_all: false };
    let mut services = Services { dataset: Some(&index), frustum: &mut frustum, residency: None };

    let mut scheduler = scheduler(60, 2);

    // a blank region always reports, no matter the counter
    assert!(scheduler.needs_redraw());

    scheduler.plan_3d_frame(&mut services, 0).unwrap();
    render_subframe(&mut scheduler, 5.0);

    // refinement work remains, but two inquiries are absorbed first
    assert!(!scheduler.needs_redraw());
    assert!(!scheduler.needs_redraw());
    assert!(scheduler.needs_redraw());
}

#[test]
fn appearance_changes_only_recomposite_finished_frames() {
    let index = dataset();
    let mut frustum = Frustum { lod: 0, pass_all: false };
    let mut services = Services { dataset: Some(&index), frustum: &mut frustum, residency: None };

    let mut scheduler = scheduler(60, 0);
    scheduler.set_render_mode(RenderMode::Iso { value: 0.5 });

    scheduler.plan_3d_frame(&mut services, 0).unwrap();
    render_subframe(&mut scheduler, 5.0);
    assert!(scheduler.region(0).subframe_finished());

    let list_before: Vec<_> = scheduler.brick_list(0).iter().map(|brick| brick.key).collect();
    let level_before = scheduler.region(0).lod.current_lod;

    scheduler.set_iso_color(None, Vec3(0.1, 0.9, 0.1));

    // the region is not blanked, but a redraw is requested
    assert!(!scheduler.region(0).is_blank);
    assert!(scheduler.region(0).perform_recompose);
    assert!(scheduler.only_recomposite(0));
    assert!(scheduler.needs_redraw());

    // planning must not rebuild the brick list
    scheduler.plan_3d_frame(&mut services, 0).unwrap();
    let list_after: Vec<_> = scheduler.brick_list(0).iter().map(|brick| brick.key).collect();
    assert_eq!(list_before, list_after);
    assert_eq!(scheduler.region(0).lod.current_lod, level_before);

    scheduler.recompose_done(0);
    assert!(!scheduler.region(0).perform_recompose);
}

#[test]
fn appearance_changes_mid_frame_fall_back_to_a_redraw() {
    let index = dataset();
    let mut frustum = Frustum { lod: 0, pass_all: false };
    let mut services = Services { dataset: Some(&index), frustum: &mut frustum, residency: None };

    let mut scheduler = scheduler(60, 0);
    scheduler.set_render_mode(RenderMode::Iso { value: 0.5 });

    scheduler.plan_3d_frame(&mut services, 0).unwrap();
    render_subframe(&mut scheduler, 5.0);

    // an unfinished subframe: bricks of the finer list remain
    scheduler.plan_3d_frame(&mut services, 0).unwrap();
    scheduler.add_rendered_bricks(0, 2);
    assert!(!scheduler.region(0).subframe_finished());

    scheduler.set_iso_color(None, Vec3(0.9, 0.1, 0.1));
    assert!(!scheduler.region(0).perform_recompose);
    assert!(scheduler.region(0).is_blank); // full redraw instead
}

#[test]
fn planning_twice_without_progress_changes_nothing() {
    let index = dataset();
    let mut frustum = Frustum { lod: 0, pass_all: false };
    let mut services = Services { dataset: Some(&index), frustum: &mut frustum, residency: None };

    let mut scheduler = scheduler(60, 0);

    scheduler.plan_3d_frame(&mut services, 0).unwrap();
    render_subframe(&mut scheduler, 5.0);

    // this plan advances to the next finer level
    scheduler.plan_3d_frame(&mut services, 0).unwrap();
    let snapshot = scheduler.region(0).clone();
    let frames = scheduler.frame_counter();

    // planning again without any completed subframe is a no-op
    scheduler.plan_3d_frame(&mut services, 0).unwrap();
    assert_eq!(scheduler.region(0), &snapshot);
    assert_eq!(scheduler.frame_counter(), frames);
}

#[test]
fn capture_mode_always_plans_the_finest_level() {
    let index = dataset();
    let mut frustum = Frustum { lod: 2, pass_all: false };
    let mut services = Services { dataset: Some(&index), frustum: &mut frustum, residency: None };

    let mut scheduler = scheduler(60, 0);
    scheduler.set_capture_mode(true);

    scheduler.plan_3d_frame(&mut services, 0).unwrap();

    // the view would justify level 2, capture mode ignores that
    assert_eq!(scheduler.region(0).lod.min_lod_for_view, 2);
    assert_eq!(scheduler.region(0).lod.start_lod_offset, 2);
    assert_eq!(scheduler.region(0).lod.current_lod, 0);
    assert_eq!(scheduler.brick_list(0).len(), 125);
}

#[test]
fn the_view_dependent_level_bounds_refinement() {
    let index = dataset();
    let mut frustum = Frustum { lod: 2, pass_all: false };
    let mut services = Services { dataset: Some(&index), frustum: &mut frustum, residency: None };

    let mut scheduler = scheduler(60, 0);

    scheduler.plan_3d_frame(&mut services, 0).unwrap();
    render_subframe(&mut scheduler, 5.0);

    // refinement stops at level 2, the view justifies nothing finer
    scheduler.plan_3d_frame(&mut services, 0).unwrap();
    render_subframe(&mut scheduler, 5.0);
    assert_eq!(scheduler.region(0).lod.current_lod_offset, 2);
    assert!(!scheduler.needs_redraw());
}

#[test]
fn stereo_builds_the_left_eye_list() {
    let index = dataset();
    let mut frustum = Frustum { lod: 0, pass_all: false };
    let mut services = Services { dataset: Some(&index), frustum: &mut frustum, residency: None };

    let mut scheduler = scheduler(60, 0);
    scheduler.set_stereo(true);

    scheduler.plan_3d_frame(&mut services, 0).unwrap();
    render_subframe(&mut scheduler, 5.0);
    scheduler.plan_3d_frame(&mut services, 0).unwrap();

    let right = scheduler.brick_list(0);
    let left = scheduler.left_eye_brick_list(0);

    assert_eq!(right.len(), 8);
    assert_eq!(left.len(), right.len());

    for window in left.windows(2) {
        assert!(window[0].distance <= window[1].distance);
    }
}

#[test]
fn mip_planning_orders_by_residency() {
    let index = dataset();
    let mut frustum = Frustum { lod: 0, pass_all: false };
    let residency = HalfResident;
    let mut services = Services {
        dataset: Some(&index),
        frustum: &mut frustum,
        residency: Some(&residency),
    };

    let mut scheduler = Scheduler::new(
        PerfOptions { start_delay_frames: 0, .. PerfOptions::default() },
        false, false, false,
    );
    scheduler.resize(Vec2(64, 64));

    scheduler.plan_mip_frame(&mut services, 0).unwrap();

    // 256 halves under the 64 pixel window after three steps; the level
    // above that halt is used
    assert_eq!(scheduler.region(0).lod.current_lod, 2);

    let list = scheduler.brick_list(0);
    assert_eq!(list.len(), 8);

    // resident bricks come first
    let first_non_resident = list.iter()
        .position(|brick| brick.distance > 0.0).unwrap();
    assert!(list[.. first_non_resident].iter().all(|brick| brick.distance == 0.0));
    assert!(list[first_non_resident ..].iter().all(|brick| brick.distance == 1.0));
    assert_eq!(first_non_resident, 4);
}

#[test]
fn planning_without_a_dataset_or_on_a_slice_region_is_a_state_error() {
    let index = dataset();
    let mut frustum = Frustum { lod: 0, pass_all: false };

    let mut scheduler = scheduler(60, 0);
    let slice = scheduler.add_slice_region(Axis::Z);

    let mut no_dataset = Services { dataset: None, frustum: &mut frustum, residency: None };
    assert!(matches!(
        scheduler.plan_3d_frame(&mut no_dataset, 0),
        Err(Error::State(_))
    ));

    let mut frustum = Frustum { lod: 0, pass_all: false };
    let mut services = Services { dataset: Some(&index), frustum: &mut frustum, residency: None };
    assert!(matches!(
        scheduler.plan_3d_frame(&mut services, slice),
        Err(Error::State(_))
    ));

    // slice regions take slice depths, 3d regions do not
    scheduler.set_slice_depth(slice, 17).unwrap();
    assert!(scheduler.region(slice).is_blank);
    assert!(matches!(scheduler.set_slice_depth(0, 17), Err(Error::State(_))));
}

#[test]
fn a_zero_window_suppresses_redraws() {
    let mut scheduler = Scheduler::new(PerfOptions::default(), false, false, false);
    assert!(!scheduler.needs_redraw());

    scheduler.resize(Vec2(512, 512));
    assert!(scheduler.needs_redraw());
}
