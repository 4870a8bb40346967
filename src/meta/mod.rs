
//! Describes the global header of a bricked volume file
//! and all metadata derived from it: the level-of-detail table,
//! per-brick dimensions, aspect ratios, and brick indexing.

use ::smallvec::SmallVec;

use crate::io::{Data, Read, Write};
use crate::error::{Error, Result, UnitResult};
use crate::math::{Vec3, ceil_div};


/// Byte count of the fixed part of the global header:
/// component tag, component count, volume size, aspect, brick size, overlap.
pub const FIXED_HEADER_BYTES: u64 =
    (u32::BYTE_SIZE + u64::BYTE_SIZE
        + 3 * u64::BYTE_SIZE + 3 * f64::BYTE_SIZE
        + 3 * u32::BYTE_SIZE + u32::BYTE_SIZE) as u64;

/// Byte count of one table-of-contents entry: payload length and codec tag.
pub const TOC_ENTRY_BYTES: u64 = (u64::BYTE_SIZE + u32::BYTE_SIZE) as u64;

/// Byte position of the three aspect doubles inside the global header,
/// relative to the start of the header.
pub const ASPECT_FIELD_OFFSET: u64 =
    (u32::BYTE_SIZE + u64::BYTE_SIZE + 3 * u64::BYTE_SIZE) as u64;


/// The scalar type of a single voxel component.
/// The wire tags are fixed for bit-exact compatibility.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ComponentType {
    I8, U8,
    I16, U16,
    I32, U32,
    I64, U64,
    F32, F64,
}

impl ComponentType {

    /// The tag persisted in the global header.
    pub fn tag(self) -> u32 {
        match self {
            ComponentType::I8 => 1, ComponentType::U8 => 2,
            ComponentType::I16 => 3, ComponentType::U16 => 4,
            ComponentType::I32 => 5, ComponentType::U32 => 6,
            ComponentType::I64 => 7, ComponentType::U64 => 8,
            ComponentType::F32 => 9, ComponentType::F64 => 10,
        }
    }

    /// The component type for a persisted tag.
    pub fn from_tag(tag: u32) -> Result<Self> {
        Ok(match tag {
            1 => ComponentType::I8, 2 => ComponentType::U8,
            3 => ComponentType::I16, 4 => ComponentType::U16,
            5 => ComponentType::I32, 6 => ComponentType::U32,
            7 => ComponentType::I64, 8 => ComponentType::U64,
            9 => ComponentType::F32, 10 => ComponentType::F64,
            _ => return Err(Error::format(format!("unknown component type tag {}", tag))),
        })
    }

    /// Number of bytes one component occupies.
    pub fn byte_size(self) -> u64 {
        match self {
            ComponentType::I8 | ComponentType::U8 => 1,
            ComponentType::I16 | ComponentType::U16 => 2,
            ComponentType::I32 | ComponentType::U32 | ComponentType::F32 => 4,
            ComponentType::I64 | ComponentType::U64 | ComponentType::F64 => 8,
        }
    }

    /// Number of bits one component occupies.
    pub fn bit_width(self) -> u32 {
        self.byte_size() as u32 * 8
    }
}


/// Identifies a brick inside one volume:
/// a position in brick units and a level-of-detail index.
/// Level zero is the finest level.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct BrickCoord {

    /// Brick position within the level, in brick units.
    pub position: Vec3<u64>,

    /// Index into the level table. Level zero is the finest.
    pub level: u64,
}

impl BrickCoord {

    /// Create a brick coordinate from its components.
    pub fn new(x: u64, y: u64, z: u64, level: u64) -> Self {
        BrickCoord { position: Vec3(x, y, z), level }
    }
}


/// One entry of the derived level-of-detail table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelInfo {

    /// Voxel extent of this level.
    pub level_size: Vec3<u64>,

    /// Number of bricks along each axis of this level.
    pub brick_count: Vec3<u64>,

    /// Anisotropy accumulated from halving odd dimensions,
    /// normalized so that the largest component is one.
    pub aspect: Vec3<f64>,

    /// Number of bricks in all finer levels. This locates the
    /// first brick of this level in the table of contents.
    pub brick_offset: u64,
}

/// The derived level table. Realistic volumes have
/// far fewer levels than the inline capacity.
pub type Levels = SmallVec<[LevelInfo; 12]>;


/// The global header of a bricked volume file,
/// together with the level table derived from it.
///
/// The persisted fields describe the finest level and the brick layout;
/// everything else is recomputed when a file is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeMeta {

    /// Scalar type of each voxel component.
    pub component_type: ComponentType,

    /// Number of components per voxel, at least one.
    pub components_per_voxel: u64,

    /// Voxel extent of the finest level.
    pub volume_size: Vec3<u64>,

    /// Physical aspect ratio of the whole volume.
    pub volume_aspect: Vec3<f64>,

    /// Maximum brick extent, including the overlap on both sides.
    pub brick_size: Vec3<u32>,

    /// Voxels of halo replicated on each brick face.
    pub overlap: u32,

    /// The derived level-of-detail table. Not persisted.
    pub levels: Levels,
}

impl VolumeMeta {

    /// Validate the field combination and derive the level table.
    pub fn new(
        component_type: ComponentType, components_per_voxel: u64,
        volume_size: Vec3<u64>, volume_aspect: Vec3<f64>,
        brick_size: Vec3<u32>, overlap: u32,
    ) -> Result<Self>
    {
        let mut meta = VolumeMeta {
            component_type, components_per_voxel,
            volume_size, volume_aspect, brick_size, overlap,
            levels: Levels::new(),
        };

        meta.validate()?;
        meta.levels = derive_levels(meta.volume_size, meta.usable_brick_size());
        Ok(meta)
    }

    /// Read the global header in wire order, validate it,
    /// and derive the level table.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let component_type = ComponentType::from_tag(u32::read(read)?)?;
        let components_per_voxel = u64::read(read)?;

        let volume_size = Vec3(u64::read(read)?, u64::read(read)?, u64::read(read)?);
        let volume_aspect = Vec3(f64::read(read)?, f64::read(read)?, f64::read(read)?);
        let brick_size = Vec3(u32::read(read)?, u32::read(read)?, u32::read(read)?);
        let overlap = u32::read(read)?;

        Self::new(
            component_type, components_per_voxel,
            volume_size, volume_aspect, brick_size, overlap,
        )
    }

    /// Write the global header in wire order.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        self.validate()?;

        self.component_type.tag().write(write)?;
        self.components_per_voxel.write(write)?;

        self.volume_size.0.write(write)?;
        self.volume_size.1.write(write)?;
        self.volume_size.2.write(write)?;

        self.volume_aspect.0.write(write)?;
        self.volume_aspect.1.write(write)?;
        self.volume_aspect.2.write(write)?;

        self.brick_size.0.write(write)?;
        self.brick_size.1.write(write)?;
        self.brick_size.2.write(write)?;

        self.overlap.write(write)?;
        Ok(())
    }

    /// Check all header invariants that do not require file contents.
    pub fn validate(&self) -> UnitResult {
        if self.components_per_voxel == 0 {
            return Err(Error::format("zero components per voxel"));
        }

        if self.volume_size.0 == 0 || self.volume_size.1 == 0 || self.volume_size.2 == 0 {
            return Err(Error::format("zero volume dimension"));
        }

        if !(self.volume_aspect.0 > 0.0 && self.volume_aspect.1 > 0.0 && self.volume_aspect.2 > 0.0) {
            return Err(Error::format("volume aspect must be positive"));
        }

        let min_brick = self.brick_size.min_component();
        if min_brick == 0 {
            return Err(Error::format("zero brick dimension"));
        }

        if u64::from(min_brick) <= 2 * u64::from(self.overlap) {
            return Err(Error::format("brick size must exceed twice the overlap"));
        }

        Ok(())
    }

    /// The non-halo payload extent of a full brick on each axis.
    pub fn usable_brick_size(&self) -> Vec3<u64> {
        self.brick_size.to_u64().map(|size| size - 2 * u64::from(self.overlap))
    }

    /// Number of levels in the pyramid.
    pub fn level_count(&self) -> u64 {
        self.levels.len() as u64
    }

    /// The level table entry for a level index.
    pub fn level(&self, level: u64) -> Result<&LevelInfo> {
        self.levels.get(level as usize)
            .ok_or_else(|| Error::bounds(format!("level {} of {}", level, self.levels.len())))
    }

    /// Total number of bricks over all levels,
    /// which equals the number of table-of-contents entries.
    pub fn total_brick_count(&self) -> u64 {
        let last = self.levels.last().expect("level table is never empty");
        last.brick_offset + last.brick_count.volume()
    }

    /// Byte count of the global header including the table of contents.
    /// The first brick payload starts at this position.
    pub fn header_byte_size(&self) -> u64 {
        FIXED_HEADER_BYTES + self.total_brick_count() * TOC_ENTRY_BYTES
    }

    /// Bytes of a single uncompressed voxel.
    pub fn voxel_byte_size(&self) -> u64 {
        self.components_per_voxel * self.component_type.byte_size()
    }

    /// Whether the brick is the last of its row, column, and slice.
    pub fn is_last_brick(&self, coord: BrickCoord) -> Result<Vec3<bool>> {
        let level = self.level(coord.level)?;
        Ok(coord.position.zip(level.brick_count, |position, count| position + 1 >= count))
    }

    /// The voxel extent of a brick, including overlap. Inner bricks have
    /// the full brick size. A brick that is last on an axis is smaller
    /// when the level does not tile exactly: the remainder of the level
    /// size under the usable brick size, plus both overlaps.
    pub fn brick_size_at(&self, coord: BrickCoord) -> Result<Vec3<u32>> {
        let is_last = self.is_last_brick(coord)?;
        let level_size = self.level(coord.level)?.level_size;
        let usable = self.usable_brick_size();

        self.check_position(coord)?;

        let axis = |last: bool, level_size: u64, usable: u64, full: u32| {
            let remainder = level_size % usable;
            if last && remainder != 0 { 2 * self.overlap + remainder as u32 }
            else { full }
        };

        Ok(Vec3(
            axis(is_last.0, level_size.0, usable.0, self.brick_size.0),
            axis(is_last.1, level_size.1, usable.1, self.brick_size.1),
            axis(is_last.2, level_size.2, usable.2, self.brick_size.2),
        ))
    }

    /// The deformation of a unit cube into this brick: the anisotropy of
    /// its level times the brick extent normalized by its maximum.
    pub fn brick_aspect(&self, coord: BrickCoord) -> Result<Vec3<f64>> {
        let level_aspect = self.level(coord.level)?.aspect;
        let size = self.brick_size_at(coord)?.map(f64::from);
        Ok(level_aspect * (size / size.max_component()))
    }

    /// Bytes of the uncompressed payload of this brick.
    pub fn brick_byte_size(&self, coord: BrickCoord) -> Result<u64> {
        Ok(self.brick_size_at(coord)?.to_u64().volume() * self.voxel_byte_size())
    }

    /// The position of this brick in the table of contents:
    /// the brick offset of its level plus its z-major rank within the level.
    pub fn brick_index(&self, coord: BrickCoord) -> Result<u64> {
        let level = self.level(coord.level)?;
        self.check_position(coord)?;

        let count = level.brick_count;
        Ok(level.brick_offset
            + coord.position.0
            + coord.position.1 * count.0
            + coord.position.2 * count.0 * count.1)
    }

    /// The inverse of `brick_index`.
    pub fn brick_coord(&self, index: u64) -> Result<BrickCoord> {
        for (level_index, level) in self.levels.iter().enumerate() {
            if index < level.brick_offset { break; }

            let local = index - level.brick_offset;
            if local < level.brick_count.volume() {
                let count = level.brick_count;
                return Ok(BrickCoord {
                    position: Vec3(
                        local % count.0,
                        (local / count.0) % count.1,
                        local / (count.0 * count.1),
                    ),
                    level: level_index as u64,
                });
            }
        }

        Err(Error::bounds(format!("brick index {} of {}", index, self.total_brick_count())))
    }

    fn check_position(&self, coord: BrickCoord) -> UnitResult {
        let count = self.level(coord.level)?.brick_count;

        let inside = coord.position.0 < count.0
            && coord.position.1 < count.1
            && coord.position.2 < count.2;

        if inside { Ok(()) }
        else {
            Err(Error::bounds(format!(
                "brick position {:?} outside level of {:?} bricks",
                coord.position, count,
            )))
        }
    }
}


/// Build the level table by repeatedly halving all dimensions that still
/// exceed the usable brick size, with ceiling, until everything fits into
/// a single brick. Level zero keeps the unmodified volume size. Halving an
/// odd dimension accumulates an anisotropy factor of `old / new` instead
/// of two; the aspect is re-normalized after every step so its largest
/// component stays at one.
fn derive_levels(volume_size: Vec3<u64>, usable: Vec3<u64>) -> Levels {
    let mut levels = Levels::new();
    let mut size = volume_size;
    let mut aspect = Vec3(1.0, 1.0, 1.0);

    loop {
        if !levels.is_empty() {
            let halve = |size: u64, aspect: &mut f64, usable: u64| {
                if size > usable {
                    let halved = ceil_div(size, 2);
                    *aspect *= if size % 2 == 1 { size as f64 / halved as f64 } else { 2.0 };
                    halved
                }
                else { size }
            };

            size = Vec3(
                halve(size.0, &mut aspect.0, usable.0),
                halve(size.1, &mut aspect.1, usable.1),
                halve(size.2, &mut aspect.2, usable.2),
            );

            aspect = aspect / aspect.max_component();
        }

        levels.push(LevelInfo {
            level_size: size,
            brick_count: size.zip(usable, ceil_div),
            aspect,
            brick_offset: 0,
        });

        if size.0 <= usable.0 && size.1 <= usable.1 && size.2 <= usable.2 {
            break;
        }
    }

    let mut offset = 0;
    for level in &mut levels {
        level.brick_offset = offset;
        offset += level.brick_count.volume();
    }

    levels
}
