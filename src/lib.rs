//! # Quadrotor Path Following
//! This crate provides the simulation-and-guidance core of a quadrotor path-following and
//! obstacle-avoidance environment, meant to be driven by a control policy that is trained
//! against the shaped reward it produces.
//! ## Features
//! - Rigid-body quadrotor dynamics with an actuator allocation matrix and Euler or RK4 integration
//! - Quadratic polynomial path interpolation with closest-point projection and lookahead
//! - Serret-Frenet cross-track/vertical-track guidance errors
//! - Nonlinear geometric velocity/attitude controller mapping normalized actions to rotor thrusts
//! - Analytic ray-marching or externally rendered proximity sensing with collision detection
//! - Multi-term shaped reward and a bounded-duration episode state machine
//! - Built-in scenario generators seeded from an owned pseudo-random source
use nalgebra::{Matrix3, Rotation3, Vector3};
use std::f64::consts::PI;

pub mod config;
pub mod controller;
pub mod environment;
pub mod episode;
pub mod guidance;
pub mod path;
pub mod quadrotor;
pub mod reward;
pub mod sensor;

pub use config::Config;
pub use controller::GeometricController;
pub use environment::{Obstacle, ScenarioGenerator, ScenarioSetup};
pub use episode::{
    Diagnostics, EpisodeStatus, Observation, QuadEnv, StepResult, TerminationReason,
};
pub use guidance::{compute_guidance, GuidanceState};
pub use path::Path;
pub use quadrotor::{Imu, Quadrotor, QuadrotorState};
pub use reward::{RewardBreakdown, RewardInputs, RewardModel};
pub use sensor::{
    CollisionChecker, DepthImage, ProximitySensor, RangeRenderer, RaySensor, RenderedSensor,
    SensorType, SphereCollisionVolume, SphereDepthCamera,
};

#[derive(thiserror::Error, Debug)]
/// Represents errors that can occur during simulation
pub enum SimulationError {
    /// Missing or invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
    /// Path could not be built from the given waypoints
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    /// Rotor thrust command was NaN or infinite
    #[error("Invalid actuation: {0}")]
    InvalidActuation(String),
    /// Policy action contained a non-finite component
    #[error("Invalid action: {0}")]
    InvalidAction(String),
    /// Integration produced a non-finite state
    #[error("Numerical error: {0}")]
    Numerical(String),
    /// Scenario name is not registered
    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),
    /// Step called before reset, after termination or after a fault
    #[error("Episode is not active: {0}")]
    EpisodeNotActive(String),
    /// Error reported by an external range renderer or collision checker
    #[error("Renderer error: {0}")]
    Renderer(String),
    /// Error related to linear algebra operations
    #[error("Nalgebra error: {0}")]
    NalgebraError(String),
    /// Error related to normal distribution calculations
    #[error("Normal error: {0}")]
    NormalError(#[from] rand_distr::NormalError),
    /// Error while parsing a YAML configuration
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// Error while reading a configuration file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Smallest signed angle, wraps `angle` into `(-pi, pi]`
/// # Example
/// ```
/// use quad_pathfollow::ssa;
/// let wrapped = ssa(3.0 * std::f64::consts::PI / 2.0);
/// assert!((wrapped + std::f64::consts::PI / 2.0).abs() < 1e-12);
/// ```
#[inline]
pub fn ssa(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

/// Normalizes `value` from `[min, max]` to `[-1, 1]`, clipping values outside the range
#[inline]
pub fn m1to1(value: f64, min: f64, max: f64) -> f64 {
    (2.0 * (value - min) / (max - min) - 1.0).clamp(-1.0, 1.0)
}

/// Rotation matrix from body to world for ZYX Euler angles, `Rz(psi) * Ry(theta) * Rx(phi)`
#[inline]
pub fn rzyx(phi: f64, theta: f64, psi: f64) -> Matrix3<f64> {
    Rotation3::from_euler_angles(phi, theta, psi).into_inner()
}

/// Euler angle rate matrix, maps body angular velocity to ZYX Euler angle rates
/// Singular at `theta = +-pi/2`
#[inline]
pub fn tzyx(phi: f64, theta: f64) -> Matrix3<f64> {
    let (sphi, cphi) = phi.sin_cos();
    let (cth, tth) = (theta.cos(), theta.tan());
    Matrix3::new(
        1.0,
        sphi * tth,
        cphi * tth,
        0.0,
        cphi,
        -sphi,
        0.0,
        sphi / cth,
        cphi / cth,
    )
}

/// Maps ZYX Euler angle rates to body angular velocity, inverse of [`tzyx`]
#[inline]
pub fn euler_rates_to_body(phi: f64, theta: f64) -> Matrix3<f64> {
    let (sphi, cphi) = phi.sin_cos();
    let (sth, cth) = theta.sin_cos();
    Matrix3::new(
        1.0,
        0.0,
        -sth,
        0.0,
        cphi,
        sphi * cth,
        0.0,
        -sphi,
        cphi * cth,
    )
}

/// Vee map of a skew-symmetric matrix
#[inline]
pub fn vee(m: &Matrix3<f64>) -> Vector3<f64> {
    Vector3::new(m[(2, 1)], m[(0, 2)], m[(1, 0)])
}
