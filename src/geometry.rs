//! Triangulation of one sensor from two base stations' sweep angles.
//!
//! Each station's two angles define two planes through the station; their intersection is
//! the ray from the station to the sensor. The sensor sits where the two stations' rays
//! pass closest to each other.
//!
//! Station-local axes: the station looks down -Z, with axis 0 sweeping along X and axis 1
//! along Y.

use serde::{Deserialize, Serialize};

use crate::shared_constants::SLOT_COUNT;

pub type Vec3 = [f32; 3];

/// Row-major 3×3 matrix.
pub type Mat3 = [f32; 9];

/// Below this, two rays are treated as parallel.
const PARALLEL_EPSILON: f32 = 1e-5;

const IDENTITY: Mat3 = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// Calibrated pose of one base station in world space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LightSource {
    /// Station-local to world rotation.
    pub rotation: Mat3,
    pub origin: Vec3,
}

impl LightSource {
    #[must_use]
    pub const fn new(rotation: Mat3, origin: Vec3) -> Self {
        Self { rotation, origin }
    }

    /// A station at `origin` whose axes are aligned with the world's.
    #[must_use]
    pub const fn at(origin: Vec3) -> Self {
        Self::new(IDENTITY, origin)
    }

    /// World-space unit direction toward a sensor seen at the two sweep angles.
    ///
    /// Returns `None` when the two sweep planes do not intersect in a line.
    #[must_use]
    pub fn ray(&self, angle_x: f32, angle_y: f32) -> Option<Vec3> {
        // Normals of the two sweep planes.
        let normal_x = [libm::cosf(angle_x), 0.0, -libm::sinf(angle_x)];
        let normal_y = [0.0, libm::cosf(angle_y), libm::sinf(angle_y)];

        let local = cross(normal_y, normal_x);
        let len = length(local);
        if len < PARALLEL_EPSILON {
            return None;
        }
        Some(rotate(&self.rotation, scale(local, 1.0 / len)))
    }
}

/// A solved position and the gap between the two rays that produced it.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Fix {
    pub position: Vec3,
    /// Closest-approach distance between the rays; smaller is better.
    pub distance: f32,
}

/// Point midway between the closest points of two lines.
///
/// See <http://geomalgorithms.com/a07-_distance.html> for the derivation.
#[must_use]
pub fn intersect_lines(origin1: Vec3, dir1: Vec3, origin2: Vec3, dir2: Vec3) -> Option<Fix> {
    let w0 = sub(origin1, origin2);
    let a = dot(dir1, dir1);
    let b = dot(dir1, dir2);
    let c = dot(dir2, dir2);
    let d = dot(dir1, w0);
    let e = dot(dir2, w0);

    let denom = a * c - b * b;
    if libm::fabsf(denom) < PARALLEL_EPSILON {
        return None;
    }

    let t1 = (b * e - c * d) / denom;
    let t2 = (a * e - b * d) / denom;
    let point1 = add(origin1, scale(dir1, t1));
    let point2 = add(origin2, scale(dir2, t2));

    Some(Fix {
        position: scale(add(point1, point2), 0.5),
        distance: length(sub(point1, point2)),
    })
}

/// Collects the four sweep angles of one sensor and triangulates when all are new.
///
/// Slots are `station * 2 + axis`: 0 and 1 belong to the first light source, 2 and 3 to
/// the second.
#[derive(Clone, Debug)]
pub struct PositionSolver {
    id: u8,
    sources: [LightSource; 2],
    angles: [f32; SLOT_COUNT],
    fresh: u8,
    fix: Option<Fix>,
}

/// One freshness bit per slot.
const ALL_FRESH: u8 = 0b1111;

impl PositionSolver {
    #[must_use]
    pub const fn new(id: u8, sources: [LightSource; 2]) -> Self {
        Self {
            id,
            sources,
            angles: [0.0; SLOT_COUNT],
            fresh: 0,
            fix: None,
        }
    }

    /// Store an angle. Returns `true` when it completed a set of four and the solve
    /// produced a new position.
    ///
    /// Freshness clears after every solve attempt, successful or not. Out-of-range slots
    /// are ignored.
    pub fn update(&mut self, slot: usize, angle: f32) -> bool {
        let (Some(stored), Ok(bit)) = (self.angles.get_mut(slot), u32::try_from(slot)) else {
            return false;
        };
        *stored = angle;
        self.fresh |= 1u8.wrapping_shl(bit);
        if self.fresh != ALL_FRESH {
            return false;
        }
        self.fresh = 0;
        self.compute()
    }

    /// Triangulate from the current angles. On failure the previous fix is kept.
    pub fn compute(&mut self) -> bool {
        let [first, second] = &self.sources;
        let [x0, y0, x1, y1] = self.angles;

        let fix = first.ray(x0, y0).zip(second.ray(x1, y1)).and_then(|(ray1, ray2)| {
            intersect_lines(first.origin, ray1, second.origin, ray2)
        });
        match fix {
            Some(fix) => {
                self.fix = Some(fix);
                true
            }
            None => {
                log_debug!("solver {}: rays parallel", self.id);
                false
            }
        }
    }

    /// Replace the light source poses, e.g. after a new calibration is loaded.
    pub fn set_sources(&mut self, sources: [LightSource; 2]) {
        self.sources = sources;
    }

    #[must_use]
    pub const fn sources(&self) -> &[LightSource; 2] {
        &self.sources
    }

    #[must_use]
    pub const fn id(&self) -> u8 {
        self.id
    }

    /// Last successful solve.
    #[must_use]
    pub const fn fix(&self) -> Option<Fix> {
        self.fix
    }

    #[must_use]
    pub fn position(&self) -> Option<Vec3> {
        self.fix.map(|fix| fix.position)
    }

    #[must_use]
    pub const fn angles(&self) -> &[f32; SLOT_COUNT] {
        &self.angles
    }
}

// ===== Vector helpers =======================================================

const fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

const fn dot(a: Vec3, b: Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

const fn add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

const fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

const fn scale(a: Vec3, k: f32) -> Vec3 {
    [a[0] * k, a[1] * k, a[2] * k]
}

fn length(a: Vec3) -> f32 {
    libm::sqrtf(dot(a, a))
}

const fn rotate(m: &Mat3, v: Vec3) -> Vec3 {
    [
        m[0] * v[0] + m[1] * v[1] + m[2] * v[2],
        m[3] * v[0] + m[4] * v[1] + m[5] * v[2],
        m[6] * v[0] + m[7] * v[1] + m[8] * v[2],
    ]
}
