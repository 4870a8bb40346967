
//! Adapters that answer the `Dataset` contract from an opened volume.
//!
//! `VolumeIndex` serves brick metadata purely from the level table,
//! so planning never touches the disk. `VolumeDataset` couples an index
//! with the opened file for actually reading payloads.

use crate::error::{Error, UnitResult, u64_to_usize, usize_to_u64};
use crate::math::Vec3;
use crate::meta::{VolumeMeta, BrickCoord};
use crate::volume::Volume;
use super::{Dataset, DatasetId, DataQuery, BrickKey, BrickMd};


/// Precomputed value and gradient extrema of one brick,
/// used to answer data-emptiness queries without reading the payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrickStats {

    /// Smallest value in the brick.
    pub min: f64,

    /// Largest value in the brick.
    pub max: f64,

    /// Smallest gradient magnitude in the brick.
    pub min_gradient: f64,

    /// Largest gradient magnitude in the brick.
    pub max_gradient: f64,
}


/// Answers all planning queries from the level table alone.
/// Without a statistics table, every brick counts as containing data,
/// which keeps it in the frame at the cost of rendering empty space.
#[derive(Debug, Clone)]
pub struct VolumeIndex {
    meta: VolumeMeta,
    id: DatasetId,
    stats: Option<Vec<BrickStats>>,
}

impl VolumeIndex {

    /// Create an index without brick statistics.
    pub fn new(meta: VolumeMeta, id: DatasetId) -> Self {
        VolumeIndex { meta, id, stats: None }
    }

    /// Attach per-brick statistics, one entry per table-of-contents entry.
    pub fn set_stats(&mut self, stats: Vec<BrickStats>) -> UnitResult {
        if usize_to_u64(stats.len()) != self.meta.total_brick_count() {
            return Err(Error::State("statistics table length does not match the brick count"));
        }

        self.stats = Some(stats);
        Ok(())
    }

    /// The header and level table this index answers from.
    pub fn meta(&self) -> &VolumeMeta { &self.meta }

    fn brick_stats(&self, coord: BrickCoord) -> Option<&BrickStats> {
        let index = self.meta.brick_index(coord).ok()?;
        self.stats.as_ref()?.get(u64_to_usize(index))
    }
}

impl Dataset for VolumeIndex {

    fn id(&self) -> DatasetId { self.id }

    fn level_count(&self) -> u64 { self.meta.level_count() }

    fn domain_size(&self, level: u64) -> Vec3<u64> {
        self.meta.level(level).map(|info| info.level_size).unwrap_or_default()
    }

    fn scale(&self) -> Vec3<f64> { self.meta.volume_aspect }

    fn brick_overlap(&self) -> Vec3<u32> {
        Vec3(self.meta.overlap, self.meta.overlap, self.meta.overlap)
    }

    fn brick_count(&self, level: u64, timestep: usize) -> u64 {
        if timestep != 0 { return 0; }
        self.meta.level(level).map(|info| info.brick_count.volume()).unwrap_or(0)
    }

    fn bricks(&self, level: u64, timestep: usize) -> Vec<(BrickKey, BrickMd)> {
        if timestep != 0 { return Vec::new(); }

        let info = match self.meta.level(level) {
            Ok(info) => *info,
            Err(_) => return Vec::new(),
        };

        let level_size = info.level_size;
        let largest_extent = level_size.max_component() as f32;
        let usable = self.meta.usable_brick_size();

        let mut bricks = Vec::with_capacity(u64_to_usize(info.brick_count.volume()));

        for z in 0 .. info.brick_count.2 {
            for y in 0 .. info.brick_count.1 {
                for x in 0 .. info.brick_count.0 {
                    let coord = BrickCoord::new(x, y, z, level);

                    // the payload without overlap covers these level voxels
                    let start = coord.position * usable;
                    let end = (start + usable).zip(level_size, u64::min);

                    let center = (start + end).to_f32()
                        .zip(level_size.to_f32(), |sum, size| (sum - size) * 0.5)
                        / largest_extent;

                    let extents = (end - start).to_f32() / largest_extent;

                    let voxels = self.meta.brick_size_at(coord)
                        .expect("coordinates iterate the level table");

                    bricks.push((
                        BrickKey { timestep, brick: coord },
                        BrickMd { center, extents, voxels },
                    ));
                }
            }
        }

        bricks
    }

    fn is_first_in_dimension(&self, dimension: usize, key: &BrickKey) -> bool {
        key.brick.position.component(dimension) == 0
    }

    fn is_last_in_dimension(&self, dimension: usize, key: &BrickKey) -> bool {
        self.meta.is_last_brick(key.brick)
            .map(|last| last.component(dimension))
            .unwrap_or(false)
    }

    fn contains_data(&self, key: &BrickKey, query: &DataQuery) -> bool {
        let stats = match self.brick_stats(key.brick) {
            Some(stats) => *stats,
            None => return true, // unknown bricks are kept
        };

        match *query {
            DataQuery::Range { min, max } =>
                stats.max >= min && stats.min <= max,

            DataQuery::RangeAndGradient { min, max, min_gradient, max_gradient } =>
                stats.max >= min && stats.min <= max
                    && stats.max_gradient >= min_gradient
                    && stats.min_gradient <= max_gradient,

            DataQuery::Isovalue(value) =>
                stats.min <= value && value <= stats.max,
        }
    }

    fn value_range(&self) -> (f64, f64) {
        match &self.stats {
            // a minimum above the maximum marks the range as unknown
            None => (1.0, 0.0),

            Some(stats) => stats.iter().fold((f64::MAX, f64::MIN), |(min, max), brick| {
                (min.min(brick.min), max.max(brick.max))
            }),
        }
    }

    fn bit_width(&self) -> u32 {
        self.meta.component_type.bit_width()
    }
}


/// A dataset backed by an opened volume file: planning queries are
/// answered from the in-memory index, payloads are read from disk.
#[derive(Debug)]
pub struct VolumeDataset {
    volume: Volume,
    index: VolumeIndex,
}

impl VolumeDataset {

    /// Wrap an opened volume under the given service handle.
    pub fn new(volume: Volume, id: DatasetId) -> Self {
        let index = VolumeIndex::new(volume.meta().clone(), id);
        VolumeDataset { volume, index }
    }

    /// Attach per-brick statistics, see `VolumeIndex::set_stats`.
    pub fn set_stats(&mut self, stats: Vec<BrickStats>) -> UnitResult {
        self.index.set_stats(stats)
    }

    /// The underlying volume file.
    pub fn volume(&self) -> &Volume { &self.volume }

    /// The planning index of this dataset.
    pub fn index(&self) -> &VolumeIndex { &self.index }

    /// Read one brick payload from disk, see `Volume::read_brick_at`.
    /// May block on disk I/O.
    pub fn read_brick(&mut self, coord: BrickCoord, buffer: &mut Vec<u8>) -> UnitResult {
        self.volume.read_brick_at(coord, buffer)
    }
}

impl Dataset for VolumeDataset {

    fn id(&self) -> DatasetId { self.index.id() }
    fn level_count(&self) -> u64 { self.index.level_count() }
    fn domain_size(&self, level: u64) -> Vec3<u64> { self.index.domain_size(level) }
    fn scale(&self) -> Vec3<f64> { self.index.scale() }
    fn brick_overlap(&self) -> Vec3<u32> { self.index.brick_overlap() }

    fn brick_count(&self, level: u64, timestep: usize) -> u64 {
        self.index.brick_count(level, timestep)
    }

    fn bricks(&self, level: u64, timestep: usize) -> Vec<(BrickKey, BrickMd)> {
        self.index.bricks(level, timestep)
    }

    fn is_first_in_dimension(&self, dimension: usize, key: &BrickKey) -> bool {
        self.index.is_first_in_dimension(dimension, key)
    }

    fn is_last_in_dimension(&self, dimension: usize, key: &BrickKey) -> bool {
        self.index.is_last_in_dimension(dimension, key)
    }

    fn contains_data(&self, key: &BrickKey, query: &DataQuery) -> bool {
        self.index.contains_data(key, query)
    }

    fn value_range(&self) -> (f64, f64) { self.index.value_range() }
    fn bit_width(&self) -> u32 { self.index.bit_width() }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::ComponentType;

    fn index() -> VolumeIndex {
        let meta = VolumeMeta::new(
            ComponentType::U8, 1,
            Vec3(100, 100, 100), Vec3(1.0, 1.0, 1.0),
            Vec3(64, 64, 64), 4,
        ).unwrap();

        VolumeIndex::new(meta, DatasetId(0))
    }

    #[test]
    fn brick_extents_tile_the_unit_domain() {
        let index = index();
        let bricks = index.bricks(0, 0);
        assert_eq!(bricks.len(), 8);

        let (_, first) = bricks[0];
        let (_, last) = bricks[7];

        // 56 + 44 voxels of a 100 voxel level
        assert!((first.extents.0 - 0.56).abs() < 1e-6);
        assert!((last.extents.0 - 0.44).abs() < 1e-6);

        // adjacent inner ranges touch: first ends where last begins
        assert!((first.center.0 + first.extents.0 * 0.5
            - (last.center.0 - last.extents.0 * 0.5)).abs() < 1e-6);

        // the domain is centered
        assert!((first.center.0 - first.extents.0 * 0.5 + 0.5).abs() < 1e-6);
        assert!((last.center.0 + last.extents.0 * 0.5 - 0.5).abs() < 1e-6);

        // voxel counts include the overlap
        assert_eq!(first.voxels, Vec3(64, 64, 64));
        assert_eq!(last.voxels, Vec3(52, 52, 52));
    }

    #[test]
    fn only_timestep_zero_has_bricks() {
        let index = index();
        assert_eq!(index.brick_count(0, 0), 8);
        assert_eq!(index.brick_count(0, 1), 0);
        assert!(index.bricks(0, 1).is_empty());
    }

    #[test]
    fn stats_answer_emptiness_queries() {
        let mut index = index();
        let total = index.meta().total_brick_count();

        let mut stats = vec![
            BrickStats { min: 0.0, max: 10.0, min_gradient: 0.0, max_gradient: 1.0 };
            u64_to_usize(total)
        ];
        stats[0] = BrickStats { min: 100.0, max: 200.0, min_gradient: 0.0, max_gradient: 1.0 };
        index.set_stats(stats).unwrap();

        let meta = index.meta().clone();
        let key = |index: u64| BrickKey {
            timestep: 0,
            brick: meta.brick_coord(index).unwrap(),
        };

        // brick zero only holds values 100 ..= 200
        assert!(index.contains_data(&key(0), &DataQuery::Range { min: 150.0, max: 180.0 }));
        assert!(!index.contains_data(&key(0), &DataQuery::Range { min: 0.0, max: 50.0 }));
        assert!(index.contains_data(&key(1), &DataQuery::Range { min: 0.0, max: 50.0 }));

        assert!(index.contains_data(&key(0), &DataQuery::Isovalue(150.0)));
        assert!(!index.contains_data(&key(1), &DataQuery::Isovalue(150.0)));

        assert!(!index.contains_data(&key(0), &DataQuery::RangeAndGradient {
            min: 150.0, max: 180.0, min_gradient: 5.0, max_gradient: 9.0,
        }));

        assert_eq!(index.value_range(), (0.0, 200.0));
    }

    #[test]
    fn missing_stats_keep_every_brick() {
        let index = index();
        let bricks = index.bricks(0, 0);
        let (key, _) = bricks[0];

        assert!(index.contains_data(&key, &DataQuery::Range { min: 1e9, max: 2e9 }));

        let (min, max) = index.value_range();
        assert!(min > max); // unknown
    }
}
