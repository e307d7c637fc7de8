use crate::{ssa, SimulationError};
use nalgebra::{Matrix3, Vector3};

/// Spacing in `u` of the coarse samples taken before the closest point refinement
const PROJECTION_SAMPLE_SPACING: f64 = 0.5;
const PROJECTION_MIN_SAMPLES: usize = 16;
const PROJECTION_MAX_SAMPLES: usize = 4096;
const PROJECTION_TOLERANCE: f64 = 1e-9;
const GOLDEN_SECTION_MAX_ITERATIONS: usize = 200;
/// Per-axis distance to the endpoint at which the lookahead point locks onto it
const LOOKAHEAD_LOCK_DISTANCE: f64 = 1.0;
const DUPLICATE_WAYPOINT_TOLERANCE: f64 = 1e-9;

/// Quadratic `a t^2 + b t + c` in the shifted parameter `t = u - u_ref`
#[derive(Clone, Debug)]
struct Quadratic {
    u_ref: f64,
    a: Vector3<f64>,
    b: Vector3<f64>,
    c: Vector3<f64>,
}

impl Quadratic {
    /// Interpolates three consecutive waypoints at their path parameters
    fn through(points: &[Vector3<f64>], us: &[f64]) -> Result<Self, SimulationError> {
        let u_ref = us[1];
        let t: Vec<f64> = us.iter().map(|u| u - u_ref).collect();
        let vandermonde = Matrix3::new(
            t[0] * t[0],
            t[0],
            1.0,
            t[1] * t[1],
            t[1],
            1.0,
            t[2] * t[2],
            t[2],
            1.0,
        );
        let rhs = Matrix3::from_rows(&[
            points[0].transpose(),
            points[1].transpose(),
            points[2].transpose(),
        ]);
        let coeffs = vandermonde
            .lu()
            .solve(&rhs)
            .ok_or(SimulationError::NalgebraError(
                "Failed to solve for quadratic path coefficients".to_string(),
            ))?;
        Ok(Self {
            u_ref,
            a: coeffs.row(0).transpose(),
            b: coeffs.row(1).transpose(),
            c: coeffs.row(2).transpose(),
        })
    }

    fn line(start: Vector3<f64>, end: Vector3<f64>, length: f64) -> Self {
        Self {
            u_ref: 0.0,
            a: Vector3::zeros(),
            b: (end - start) / length,
            c: start,
        }
    }

    #[inline]
    fn eval(&self, u: f64) -> Vector3<f64> {
        let t = u - self.u_ref;
        self.a * (t * t) + self.b * t + self.c
    }

    #[inline]
    fn derivative(&self, u: f64) -> Vector3<f64> {
        self.a * (2.0 * (u - self.u_ref)) + self.b
    }
}

/// Piecewise quadratic interpolation of an ordered list of waypoints
///
/// The path parameter `u` is the cumulative chord length through the waypoints, so `u = 0`
/// is the first waypoint and `u = length` the last. Each interior waypoint owns a quadratic
/// through itself and its two neighbours; an interior segment blends the quadratics of its
/// two end waypoints linearly, which keeps the curve on every waypoint with a continuous
/// tangent.
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use quad_pathfollow::Path;
/// let path = Path::new(&[
///     Vector3::new(0.0, 0.0, 0.0),
///     Vector3::new(50.0, 0.0, 0.0),
///     Vector3::new(100.0, 0.0, 0.0),
/// ]).unwrap();
/// assert_eq!(path.length(), 100.0);
/// assert_eq!(path.u_to_segment_index(75.0), 1);
/// ```
#[derive(Clone, Debug)]
pub struct Path {
    waypoints: Vec<Vector3<f64>>,
    us: Vec<f64>,
    length: f64,
    quadratics: Vec<Quadratic>,
    lookahead_locked: bool,
}

impl Path {
    /// Builds the path through `waypoints`
    /// # Arguments
    /// * `waypoints` - Ordered waypoints, consecutive duplicates are collapsed
    /// # Returns
    /// * The interpolated path
    /// # Errors
    /// * `InvalidPath` if fewer than two distinct finite waypoints are given
    pub fn new(waypoints: &[Vector3<f64>]) -> Result<Self, SimulationError> {
        let mut distinct: Vec<Vector3<f64>> = Vec::with_capacity(waypoints.len());
        for waypoint in waypoints {
            if !waypoint.iter().all(|v| v.is_finite()) {
                return Err(SimulationError::InvalidPath(format!(
                    "non-finite waypoint {:?}",
                    waypoint.as_slice()
                )));
            }
            if distinct
                .last()
                .map_or(true, |last| (waypoint - last).norm() > DUPLICATE_WAYPOINT_TOLERANCE)
            {
                distinct.push(*waypoint);
            }
        }
        if distinct.len() < 2 {
            return Err(SimulationError::InvalidPath(format!(
                "at least two distinct waypoints are required, got {}",
                distinct.len()
            )));
        }
        let us: Vec<f64> = std::iter::once(0.0)
            .chain(distinct.windows(2).scan(0.0, |u, pair| {
                *u += (pair[1] - pair[0]).norm();
                Some(*u)
            }))
            .collect();
        let length = us[us.len() - 1];
        let quadratics = if distinct.len() == 2 {
            vec![Quadratic::line(distinct[0], distinct[1], length)]
        } else {
            (1..distinct.len() - 1)
                .map(|n| Quadratic::through(&distinct[n - 1..=n + 1], &us[n - 1..=n + 1]))
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(Self {
            waypoints: distinct,
            us,
            length,
            quadratics,
            lookahead_locked: false,
        })
    }

    /// Total length of the path
    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn waypoints(&self) -> &[Vector3<f64>] {
        &self.waypoints
    }

    /// Waypoint at `index`, the last waypoint when `index` is past the end
    pub fn waypoint(&self, index: usize) -> Vector3<f64> {
        let last = self.waypoints.len() - 1;
        self.waypoints[index.min(last)]
    }

    /// Path parameter of the waypoint at `index`, clamped to the last waypoint
    pub fn waypoint_u(&self, index: usize) -> f64 {
        self.us[index.min(self.us.len() - 1)]
    }

    pub fn endpoint(&self) -> Vector3<f64> {
        self.waypoints[self.waypoints.len() - 1]
    }

    /// Number of segments between waypoints
    pub fn segment_count(&self) -> usize {
        self.waypoints.len() - 1
    }

    /// Index of the segment that `u` falls in, monotone non-decreasing in `u`
    pub fn u_to_segment_index(&self, u: f64) -> usize {
        let last_segment = self.us.len() - 2;
        (0..last_segment)
            .find(|&n| u <= self.us[n + 1])
            .unwrap_or(last_segment)
    }

    /// Quadratics blended on segment `n` and the weight of the second one
    fn blend(&self, u: f64, n: usize) -> (&Quadratic, &Quadratic, f64) {
        let last = self.quadratics.len() - 1;
        if n == 0 {
            (&self.quadratics[0], &self.quadratics[0], 1.0)
        } else if n > last {
            (&self.quadratics[last], &self.quadratics[last], 1.0)
        } else {
            let ur = (u - self.us[n]) / (self.us[n + 1] - self.us[n]);
            (&self.quadratics[n - 1], &self.quadratics[n], ur)
        }
    }

    /// Point on the path at `u`, clamped to `[0, length]`
    pub fn position_at(&self, u: f64) -> Vector3<f64> {
        let u = u.clamp(0.0, self.length);
        let (prev, next, ur) = self.blend(u, self.u_to_segment_index(u));
        prev.eval(u) * (1.0 - ur) + next.eval(u) * ur
    }

    /// Derivative of the path with respect to `u`
    pub fn tangent_at(&self, u: f64) -> Vector3<f64> {
        let u = u.clamp(0.0, self.length);
        let n = self.u_to_segment_index(u);
        let (prev, next, ur) = self.blend(u, n);
        let blend_rate = if std::ptr::eq(prev, next) {
            Vector3::zeros()
        } else {
            (next.eval(u) - prev.eval(u)) / (self.us[n + 1] - self.us[n])
        };
        prev.derivative(u) * (1.0 - ur) + next.derivative(u) * ur + blend_rate
    }

    /// Course and elevation angles of the path tangent at `u`
    /// # Returns
    /// * Course in `(-pi, pi]` and elevation in `[-pi/2, pi/2]`, positive when climbing
    pub fn direction_angles_at(&self, u: f64) -> (f64, f64) {
        let tangent = self.tangent_at(u);
        let course = ssa(tangent.y.atan2(tangent.x));
        let elevation = tangent.z.atan2(tangent.xy().norm());
        (course, elevation)
    }

    /// Path parameter of the point on the path closest to `point`
    ///
    /// The search never goes below the parameter of waypoint `hint_index`, so the projection
    /// cannot slide back past a waypoint that was already passed. Equally close samples
    /// resolve to the larger parameter.
    /// # Arguments
    /// * `point` - Point to project
    /// * `hint_index` - Index of the last passed waypoint
    /// # Returns
    /// * The projected path parameter in `[u_hint, length]`
    pub fn closest_u(&self, point: &Vector3<f64>, hint_index: usize) -> f64 {
        let lower = self.waypoint_u(hint_index);
        let upper = self.length;
        let window = upper - lower;
        if window <= PROJECTION_TOLERANCE {
            return lower;
        }
        let distance_sq = |u: f64| (self.position_at(u) - point).norm_squared();
        let samples = ((window / PROJECTION_SAMPLE_SPACING).ceil() as usize)
            .clamp(PROJECTION_MIN_SAMPLES, PROJECTION_MAX_SAMPLES);
        let step = window / samples as f64;
        let (mut best_u, mut best_distance) = (lower, distance_sq(lower));
        for i in 1..=samples {
            let u = (lower + step * i as f64).min(upper);
            let distance = distance_sq(u);
            if distance <= best_distance {
                (best_u, best_distance) = (u, distance);
            }
        }
        let refined = golden_section_minimize(
            &distance_sq,
            (best_u - step).max(lower),
            (best_u + step).min(upper),
        );
        if distance_sq(refined) <= best_distance {
            refined
        } else {
            best_u
        }
    }

    /// Closest point on the path to `point`, see [`Path::closest_u`]
    pub fn closest_position(&self, point: &Vector3<f64>, hint_index: usize) -> Vector3<f64> {
        self.position_at(self.closest_u(point, hint_index))
    }

    /// Point `distance` ahead of the projection of `position`, clamped to the endpoint
    ///
    /// Once the lookahead point comes within one unit of the endpoint on every axis it stays
    /// pinned to the endpoint until the path is rebuilt.
    pub fn lookahead_point(
        &mut self,
        position: &Vector3<f64>,
        distance: f64,
        hint_index: usize,
    ) -> Vector3<f64> {
        if self.lookahead_locked {
            return self.endpoint();
        }
        let u = self.closest_u(position, hint_index);
        self.lookahead_from(u, distance)
    }

    /// Lookahead point from an already projected parameter `u`
    pub fn lookahead_from(&mut self, u: f64, distance: f64) -> Vector3<f64> {
        let endpoint = self.endpoint();
        if self.lookahead_locked {
            return endpoint;
        }
        let point = self.position_at((u + distance).min(self.length));
        if (point - endpoint)
            .iter()
            .all(|d| d.abs() < LOOKAHEAD_LOCK_DISTANCE)
        {
            self.lookahead_locked = true;
            return endpoint;
        }
        point
    }

    pub fn is_lookahead_locked(&self) -> bool {
        self.lookahead_locked
    }
}

/// Golden-section search for the minimum of a unimodal function on `[a, b]`
fn golden_section_minimize<F: Fn(f64) -> f64>(f: &F, mut a: f64, mut b: f64) -> f64 {
    let inv_phi = (5.0_f64.sqrt() - 1.0) / 2.0;
    let mut c = b - inv_phi * (b - a);
    let mut d = a + inv_phi * (b - a);
    let (mut fc, mut fd) = (f(c), f(d));
    for _ in 0..GOLDEN_SECTION_MAX_ITERATIONS {
        if (b - a).abs() <= PROJECTION_TOLERANCE {
            break;
        }
        if fc < fd {
            (b, d, fd) = (d, c, fc);
            c = b - inv_phi * (b - a);
            fc = f(c);
        } else {
            (a, c, fc) = (c, d, fd);
            d = a + inv_phi * (b - a);
            fd = f(d);
        }
    }
    (a + b) / 2.0
}
