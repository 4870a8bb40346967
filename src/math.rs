
//! Minimal vector and matrix math for brick geometry and view transforms.
//! Matrices use the row-vector convention: `point * rotation * translation`
//! applies the rotation first.

use std::ops::{Add, Sub, Mul, Div};


/// A generic 2-dimensional vector, mostly used for window sizes.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Vec2<A> (pub A, pub A);

/// A generic 3-dimensional vector. Used for voxel counts (`Vec3<u64>`),
/// brick dimensions (`Vec3<u32>`), aspect ratios (`Vec3<f64>`),
/// and world-space geometry (`Vec3<f32>`).
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Vec3<A> (pub A, pub A, pub A);

/// A generic 4-dimensional vector, used for homogeneous coordinates.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Vec4<A> (pub A, pub A, pub A, pub A);


impl<A> Vec2<A> {

    /// The first component of this vector.
    pub fn x(self) -> A { self.0 }

    /// The second component of this vector.
    pub fn y(self) -> A { self.1 }
}

impl<A: Copy + Mul<Output = A>> Vec2<A> {

    /// The product of both components.
    pub fn area(self) -> A { self.0 * self.1 }
}

impl<A: Copy + PartialOrd> Vec2<A> {

    /// The larger of both components.
    pub fn max_component(self) -> A {
        if self.0 > self.1 { self.0 } else { self.1 }
    }
}


impl<A> Vec3<A> {

    /// The first component of this vector.
    pub fn x(self) -> A where A: Copy { self.0 }

    /// The second component of this vector.
    pub fn y(self) -> A where A: Copy { self.1 }

    /// The third component of this vector.
    pub fn z(self) -> A where A: Copy { self.2 }

    /// Apply a function to each component.
    pub fn map<B>(self, mut action: impl FnMut(A) -> B) -> Vec3<B> {
        Vec3(action(self.0), action(self.1), action(self.2))
    }

    /// Combine this vector with another one, component by component.
    pub fn zip<B, C>(self, other: Vec3<B>, mut action: impl FnMut(A, B) -> C) -> Vec3<C> {
        Vec3(action(self.0, other.0), action(self.1, other.1), action(self.2, other.2))
    }

    /// The component selected by a dimension index `0..3`.
    pub fn component(self, dimension: usize) -> A where A: Copy {
        match dimension {
            0 => self.0,
            1 => self.1,
            2 => self.2,
            _ => panic!("dimension index out of range"),
        }
    }
}

impl<A: Copy + Mul<Output = A>> Vec3<A> {

    /// The product of all three components.
    pub fn volume(self) -> A { self.0 * self.1 * self.2 }
}

impl<A: Copy + PartialOrd> Vec3<A> {

    /// The largest of the three components.
    pub fn max_component(self) -> A {
        let max_xy = if self.0 > self.1 { self.0 } else { self.1 };
        if max_xy > self.2 { max_xy } else { self.2 }
    }

    /// The smallest of the three components.
    pub fn min_component(self) -> A {
        let min_xy = if self.0 < self.1 { self.0 } else { self.1 };
        if min_xy < self.2 { min_xy } else { self.2 }
    }
}

impl Vec3<u64> {

    /// Convert each component to `f32`, losing precision for huge volumes.
    pub fn to_f32(self) -> Vec3<f32> { self.map(|x| x as f32) }

    /// Convert each component to `f64`.
    pub fn to_f64(self) -> Vec3<f64> { self.map(|x| x as f64) }
}

impl Vec3<u32> {

    /// Convert each component to `f32`.
    pub fn to_f32(self) -> Vec3<f32> { self.map(|x| x as f32) }

    /// Widen each component to `u64`.
    pub fn to_u64(self) -> Vec3<u64> { self.map(u64::from) }
}

impl Vec3<f64> {

    /// Narrow each component to `f32`.
    pub fn to_f32(self) -> Vec3<f32> { self.map(|x| x as f32) }
}

impl Vec3<f32> {

    /// The dot product with another vector.
    pub fn dot(self, other: Self) -> f32 {
        self.0 * other.0 + self.1 * other.1 + self.2 * other.2
    }

    /// The euclidean length of this vector.
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }
}

impl<A: Add<Output = A>> Add for Vec3<A> {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Vec3(self.0 + other.0, self.1 + other.1, self.2 + other.2)
    }
}

impl<A: Sub<Output = A>> Sub for Vec3<A> {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Vec3(self.0 - other.0, self.1 - other.1, self.2 - other.2)
    }
}

/// Component-wise multiplication.
impl<A: Mul<Output = A>> Mul for Vec3<A> {
    type Output = Self;
    fn mul(self, other: Self) -> Self {
        Vec3(self.0 * other.0, self.1 * other.1, self.2 * other.2)
    }
}

/// Component-wise division.
impl<A: Div<Output = A>> Div for Vec3<A> {
    type Output = Self;
    fn div(self, other: Self) -> Self {
        Vec3(self.0 / other.0, self.1 / other.1, self.2 / other.2)
    }
}

/// Scale all components by a single factor.
impl<A: Copy + Mul<Output = A>> Mul<A> for Vec3<A> {
    type Output = Self;
    fn mul(self, factor: A) -> Self {
        Vec3(self.0 * factor, self.1 * factor, self.2 * factor)
    }
}

/// Divide all components by a single divisor.
impl<A: Copy + Div<Output = A>> Div<A> for Vec3<A> {
    type Output = Self;
    fn div(self, divisor: A) -> Self {
        Vec3(self.0 / divisor, self.1 / divisor, self.2 / divisor)
    }
}


impl Vec4<f32> {

    /// Extend a point to homogeneous coordinates with `w = 1`.
    pub fn from_point(point: Vec3<f32>) -> Self {
        Vec4(point.0, point.1, point.2, 1.0)
    }

    /// Discard the `w` component.
    pub fn xyz(self) -> Vec3<f32> {
        Vec3(self.0, self.1, self.2)
    }

    /// Divide by the `w` component, projecting back to 3D space.
    pub fn dehomogenized(self) -> Vec3<f32> {
        Vec3(self.0 / self.3, self.1 / self.3, self.2 / self.3)
    }
}


/// A 4×4 matrix of `f32`, stored row-major,
/// multiplied with row vectors from the left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4 (pub [[f32; 4]; 4]);

impl Default for Mat4 {
    fn default() -> Self { Self::identity() }
}

impl Mat4 {

    /// The matrix that maps every vector to itself.
    pub fn identity() -> Self {
        Mat4([
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// A matrix translating points by the specified offset.
    pub fn translation(offset: Vec3<f32>) -> Self {
        Mat4([
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [offset.0, offset.1, offset.2, 1.0],
        ])
    }

    /// Transform a homogeneous row vector: `vector * self`.
    pub fn transform(&self, vector: Vec4<f32>) -> Vec4<f32> {
        let v = [vector.0, vector.1, vector.2, vector.3];
        let mut result = [0.0_f32; 4];

        for (row_index, row) in self.0.iter().enumerate() {
            for (column, result_entry) in result.iter_mut().enumerate() {
                *result_entry += v[row_index] * row[column];
            }
        }

        Vec4(result[0], result[1], result[2], result[3])
    }

    /// Transform a 3D point, including the projective division.
    pub fn transform_point(&self, point: Vec3<f32>) -> Vec3<f32> {
        self.transform(Vec4::from_point(point)).dehomogenized()
    }
}

/// Standard matrix product. Row vectors transformed by the product
/// see the left factor applied first.
impl Mul for Mat4 {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        let mut result = [[0.0_f32; 4]; 4];

        for row in 0 .. 4 {
            for column in 0 .. 4 {
                let mut sum = 0.0;
                for k in 0 .. 4 {
                    sum += self.0[row][k] * other.0[k][column];
                }
                result[row][column] = sum;
            }
        }

        Mat4(result)
    }
}


/// An oriented plane in world space. Points on the negative side
/// are considered removed by the plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {

    /// The unit normal of the plane.
    pub normal: Vec3<f32>,

    /// Signed distance of the plane from the origin, along the normal.
    pub distance: f32,
}

impl Plane {

    /// Create a plane from its normal and signed origin distance.
    pub fn new(normal: Vec3<f32>, distance: f32) -> Self {
        Plane { normal, distance }
    }

    /// Returns whether the point lies in the half space
    /// that the plane removes.
    pub fn clips(&self, point: Vec3<f32>) -> bool {
        self.normal.dot(point) + self.distance < 0.0
    }
}


/// Integer division, rounding up.
/// Only works for positive numbers.
pub fn ceil_div(dividend: u64, divisor: u64) -> u64 {
    debug_assert_ne!(divisor, 0);
    (dividend + divisor - 1) / divisor
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ceiling_division() {
        assert_eq!(ceil_div(256, 60), 5);
        assert_eq!(ceil_div(60, 60), 1);
        assert_eq!(ceil_div(61, 60), 2);
        assert_eq!(ceil_div(1, 60), 1);
    }

    #[test]
    fn translation_applies_after_rotation_factor() {
        let translate = Mat4::translation(Vec3(1.0, 2.0, 3.0));
        let moved = translate.transform_point(Vec3(1.0, 1.0, 1.0));
        assert_eq!(moved, Vec3(2.0, 3.0, 4.0));

        // composing two translations adds the offsets
        let twice = translate * Mat4::translation(Vec3(1.0, 0.0, 0.0));
        assert_eq!(twice.transform_point(Vec3(0.0, 0.0, 0.0)), Vec3(2.0, 2.0, 3.0));
    }

    #[test]
    fn plane_clips_negative_side() {
        let plane = Plane::new(Vec3(1.0, 0.0, 0.0), 0.0);
        assert!(plane.clips(Vec3(-0.5, 0.0, 0.0)));
        assert!(!plane.clips(Vec3(0.5, 0.0, 0.0)));
    }
}
