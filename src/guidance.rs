//! Serret-Frenet guidance errors of the vehicle relative to the path
use crate::path::Path;
use crate::quadrotor::QuadrotorState;
use crate::{rzyx, ssa};
use nalgebra::{Matrix3, Vector3};

/// Guidance quantities of one step, derived from the path parameter and vehicle state
#[derive(Clone, Debug, PartialEq)]
pub struct GuidanceState {
    /// Path parameter of the projection of the vehicle
    pub u: f64,
    /// Index of the last passed waypoint
    pub waypoint_index: usize,
    /// Closest point on the path
    pub closest_point: Vector3<f64>,
    /// Cross-track error, positive to the left of the path
    pub e: f64,
    /// Vertical-track error, positive above the path
    pub h: f64,
    pub chi_p: f64,
    pub upsilon_p: f64,
    pub chi_r: f64,
    pub upsilon_r: f64,
    pub chi_d: f64,
    pub upsilon_d: f64,
    /// Desired course minus the course of the vehicle velocity, in `(-pi, pi]`
    pub course_error: f64,
    /// Desired elevation minus the elevation of the vehicle velocity, in `(-pi, pi]`
    pub elevation_error: f64,
}

/// Rotation from the Serret-Frenet frame at the path point to the world frame
///
/// The frame's x-axis is the path tangent, y points left and z up. Positive elevation climbs,
/// which is a negative ZYX pitch in the ENU world frame.
pub fn serret_frenet_rotation(chi_p: f64, upsilon_p: f64) -> Matrix3<f64> {
    rzyx(0.0, -upsilon_p, chi_p)
}

/// Computes the guidance errors at path parameter `u`
/// # Arguments
/// * `path` - Path being followed
/// * `state` - Current vehicle state
/// * `u` - Path parameter of the projection of the vehicle
/// * `waypoint_index` - Index of the last passed waypoint, carried through
/// * `lookahead_distance` - Lookahead distance of the velocity guidance law
/// # Returns
/// * The guidance state of this step
pub fn compute_guidance(
    path: &Path,
    state: &QuadrotorState,
    u: f64,
    waypoint_index: usize,
    lookahead_distance: f64,
) -> GuidanceState {
    let (chi_p, upsilon_p) = path.direction_angles_at(u);
    let closest_point = path.position_at(u);
    let epsilon = serret_frenet_rotation(chi_p, upsilon_p).transpose() * (state.position - closest_point);
    let (e, h) = (epsilon.y, epsilon.z);

    let chi_r = e.atan2(lookahead_distance);
    let upsilon_r = h.atan2((e * e + lookahead_distance * lookahead_distance).sqrt());
    let chi_d = chi_p - chi_r;
    let upsilon_d = upsilon_p - upsilon_r;

    GuidanceState {
        u,
        waypoint_index,
        closest_point,
        e,
        h,
        chi_p,
        upsilon_p,
        chi_r,
        upsilon_r,
        chi_d,
        upsilon_d,
        course_error: ssa(chi_d - state.course()),
        elevation_error: ssa(upsilon_d - state.elevation()),
    }
}
