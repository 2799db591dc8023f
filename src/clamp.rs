//! Plausibility clamps: bound a raw sample to a symmetric physical envelope.
//!
//! Clamped data is still delivered; `clamped` only tells the caller the
//! sample was degraded so it can raise its diagnostic signal.
use libm::{fabsf, sqrtf};

use crate::state::{Quaternion, Vector3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clamped<T> {
    pub value: T,
    pub clamped: bool,
}

impl<T> Clamped<T> {
    const fn unchanged(value: T) -> Self {
        Self {
            value,
            clamped: false,
        }
    }
}

/// `|v| <= bound`, false for NaN.
fn within(v: f32, bound: f32) -> bool {
    fabsf(v) <= bound
}

fn clamp_component(v: f32, bound: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(-bound, bound)
    }
}

/// Per-axis clamp for acceleration, angular rate and magnetic field.
pub fn clamp_vector(v: Vector3, bound: f32) -> Clamped<Vector3> {
    if within(v.x, bound) && within(v.y, bound) && within(v.z, bound) {
        return Clamped::unchanged(v);
    }

    Clamped {
        value: Vector3 {
            x: clamp_component(v.x, bound),
            y: clamp_component(v.y, bound),
            z: clamp_component(v.z, bound),
        },
        clamped: true,
    }
}

/// Orientation quaternions are renormalized instead of clamped per axis.
/// A zero (or non-finite) norm yields the identity rotation.
pub fn clamp_quaternion(q: Quaternion, bound: f32) -> Clamped<Quaternion> {
    if within(q.w, bound) && within(q.x, bound) && within(q.y, bound) && within(q.z, bound) {
        return Clamped::unchanged(q);
    }

    let norm = sqrtf(q.w * q.w + q.x * q.x + q.y * q.y + q.z * q.z);
    let value = if norm > 0.0 && norm.is_finite() {
        Quaternion {
            w: q.w / norm,
            x: q.x / norm,
            y: q.y / norm,
            z: q.z / norm,
        }
    } else {
        Quaternion::IDENTITY
    };

    Clamped {
        value,
        clamped: true,
    }
}
