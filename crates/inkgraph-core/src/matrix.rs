//! Affine matrix helpers.
//!
//! Matrices are [`kurbo::Affine`] values with coefficients `[a, b, c, d, e, f]`,
//! mapping `x' = a·x + c·y + e` and `y' = b·x + d·y + f`.
//!
//! `multiply(left, right)` applies `right` first and `left` second. Every
//! parent/child composition in the crate uses this order:
//! `world(child) = world(parent) * local(child)`.

use kurbo::{Affine, Point, Vec2};
use thiserror::Error;

/// Tolerance used by [`decompose`] when checking that a matrix is a pure
/// rotation + translation.
pub const RIGID_TOLERANCE: f64 = 1e-9;

/// Matrix operation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MatrixError {
    #[error("matrix is not invertible")]
    NotInvertible,
    #[error("matrix carries scale or shear and cannot be decomposed")]
    NotRigid,
}

pub fn identity() -> Affine {
    Affine::IDENTITY
}

pub fn translate(tx: f64, ty: f64) -> Affine {
    Affine::translate(Vec2::new(tx, ty))
}

pub fn scale(sx: f64, sy: f64) -> Affine {
    Affine::scale_non_uniform(sx, sy)
}

/// Rotation about the origin, in radians.
pub fn rotate(radians: f64) -> Affine {
    Affine::rotate(radians)
}

/// Compose two matrices: the result applies `right` first, then `left`.
pub fn multiply(left: Affine, right: Affine) -> Affine {
    left * right
}

pub fn apply_to_point(m: Affine, p: Point) -> Point {
    m * p
}

/// Apply only the linear part of `m` (no translation) to a vector.
pub fn transform_vector(m: Affine, v: Vec2) -> Vec2 {
    let [a, b, c, d, _, _] = m.as_coeffs();
    Vec2::new(a * v.x + c * v.y, b * v.x + d * v.y)
}

pub fn determinant(m: Affine) -> f64 {
    let [a, b, c, d, _, _] = m.as_coeffs();
    a * d - b * c
}

/// Invert a matrix.
///
/// Fails with [`MatrixError::NotInvertible`] when the determinant is exactly
/// zero. A non-finite determinant (NaN or infinite coefficients) fails the
/// same way.
pub fn invert(m: Affine) -> Result<Affine, MatrixError> {
    let det = determinant(m);
    if det == 0.0 || !det.is_finite() {
        return Err(MatrixError::NotInvertible);
    }
    let [a, b, c, d, e, f] = m.as_coeffs();
    let inv_det = 1.0 / det;
    Ok(Affine::new([
        d * inv_det,
        -b * inv_det,
        -c * inv_det,
        a * inv_det,
        (c * f - d * e) * inv_det,
        (b * e - a * f) * inv_det,
    ]))
}

/// Build `translate(x, y) * rotate(rotation)`.
pub fn compose_translate_rotate(x: f64, y: f64, rotation: f64) -> Affine {
    translate(x, y) * rotate(rotation)
}

/// Inverse of [`compose_translate_rotate`].
///
/// Only valid for rigid matrices; anything with scale or shear is rejected
/// rather than approximated.
pub fn decompose(m: Affine) -> Result<(f64, f64, f64), MatrixError> {
    let [a, b, c, d, e, f] = m.as_coeffs();
    let unit = (a * a + b * b - 1.0).abs() <= RIGID_TOLERANCE;
    let orthogonal = (c + b).abs() <= RIGID_TOLERANCE && (d - a).abs() <= RIGID_TOLERANCE;
    if !unit || !orthogonal {
        return Err(MatrixError::NotRigid);
    }
    Ok((e, f, b.atan2(a)))
}

/// Coefficient-wise comparison within `eps`.
pub fn approx_eq(lhs: Affine, rhs: Affine, eps: f64) -> bool {
    lhs.as_coeffs()
        .iter()
        .zip(rhs.as_coeffs().iter())
        .all(|(l, r)| (l - r).abs() <= eps)
}
