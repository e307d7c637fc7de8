use crate::SimulationError;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub simulation: SimulationConfig,
    pub quadrotor: QuadrotorConfig,
    pub controller: ControllerConfig,
    pub guidance: GuidanceConfig,
    pub reward: RewardConfig,
    pub sensor: SensorConfig,
    #[serde(default)]
    pub imu: ImuConfig,
    pub scenario: ScenarioConfig,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntegratorKind {
    Euler,
    Rk4,
}

#[derive(Deserialize, Clone, Debug)]
pub struct SimulationConfig {
    /// Physics integration step in seconds
    pub step_size: f64,
    /// Physics steps per environment step
    #[serde(default = "default_substeps")]
    pub physics_substeps: usize,
    pub integrator: IntegratorKind,
    pub max_t_steps: usize,
    /// Cumulative reward below which the episode ends
    pub min_reward: f64,
}

fn default_substeps() -> usize {
    1
}

#[derive(Deserialize, Clone, Debug)]
pub struct QuadrotorConfig {
    pub mass: f64,
    pub gravity: f64,
    pub drag_coefficient: f64,
    /// Row-major 3x3 inertia tensor
    pub inertia_matrix: [f64; 9],
    /// Row-major 4x4 matrix mapping rotor thrusts to `[thrust, tau_x, tau_y, tau_z]`
    pub allocation_matrix: [f64; 16],
    pub thrust_min: f64,
    pub thrust_max: f64,
    pub safety_radius: f64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ControllerConfig {
    pub k_v: f64,
    pub k_r: f64,
    pub k_omega: f64,
    /// Maximum commanded speed (m/s)
    pub s_max: f64,
    /// Maximum velocity inclination (rad)
    pub i_max: f64,
    /// Maximum yaw rate (rad/s)
    pub r_max: f64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct GuidanceConfig {
    pub la_dist: f64,
    pub accept_rad: f64,
    /// Body-frame distance that saturates the closest-point observation
    pub closest_point_range: f64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RewardConfig {
    pub pa_band_edge: f64,
    pub pa_scale: f64,
    pub pp_vel_scale: f64,
    pub pp_rew_min: f64,
    pub pp_rew_max: f64,
    pub danger_range: f64,
    pub abs_inv_ca_min_rew: f64,
    pub rew_collision: f64,
    pub rew_reach_end: f64,
    pub existence_reward: f64,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Analytic,
    Rendered,
}

#[derive(Deserialize, Clone, Debug)]
pub struct SensorConfig {
    pub kind: SensorKind,
    /// Rays per row and column of the analytic sensor grid
    pub sensor_suite: (usize, usize),
    /// Horizontal and vertical span of the analytic sensor grid (deg)
    pub sensor_span: (f64, f64),
    pub sonar_range: f64,
    pub ray_step: f64,
    pub camera: CameraConfig,
}

#[derive(Deserialize, Clone, Debug)]
pub struct CameraConfig {
    /// Width and height in pixels
    pub resolution: (usize, usize),
    /// Horizontal field of view (rad)
    pub fov: f64,
    pub near: f64,
    pub max_depth: f64,
    /// Side length of the square image handed to the perception encoder
    pub compressed_size: usize,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct ImuConfig {
    pub accel_noise_std: f64,
    pub gyro_noise_std: f64,
    pub accel_bias_std: f64,
    pub gyro_bias_std: f64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ScenarioConfig {
    pub n_waypoints: usize,
}

impl Config {
    pub fn from_yaml(filename: &str) -> Result<Self, SimulationError> {
        let mut contents = String::new();
        File::open(filename)?.read_to_string(&mut contents)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, SimulationError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would only fail mid-episode
    pub fn validate(&self) -> Result<(), SimulationError> {
        let positive = [
            ("simulation.step_size", self.simulation.step_size),
            ("quadrotor.mass", self.quadrotor.mass),
            ("quadrotor.safety_radius", self.quadrotor.safety_radius),
            ("controller.s_max", self.controller.s_max),
            ("controller.r_max", self.controller.r_max),
            ("guidance.la_dist", self.guidance.la_dist),
            ("guidance.accept_rad", self.guidance.accept_rad),
            ("guidance.closest_point_range", self.guidance.closest_point_range),
            ("reward.pa_band_edge", self.reward.pa_band_edge),
            ("reward.danger_range", self.reward.danger_range),
            ("reward.abs_inv_ca_min_rew", self.reward.abs_inv_ca_min_rew),
            ("sensor.sonar_range", self.sensor.sonar_range),
            ("sensor.ray_step", self.sensor.ray_step),
            ("sensor.camera.fov", self.sensor.camera.fov),
            ("sensor.camera.max_depth", self.sensor.camera.max_depth),
        ];
        for (key, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimulationError::Config(format!(
                    "{} must be positive and finite, got {}",
                    key, value
                )));
            }
        }
        let finite = [
            ("quadrotor.gravity", self.quadrotor.gravity),
            ("quadrotor.drag_coefficient", self.quadrotor.drag_coefficient),
            ("quadrotor.thrust_min", self.quadrotor.thrust_min),
            ("quadrotor.thrust_max", self.quadrotor.thrust_max),
            ("controller.k_v", self.controller.k_v),
            ("controller.k_r", self.controller.k_r),
            ("controller.k_omega", self.controller.k_omega),
            ("controller.i_max", self.controller.i_max),
            ("reward.pa_scale", self.reward.pa_scale),
            ("reward.pp_vel_scale", self.reward.pp_vel_scale),
            ("reward.pp_rew_min", self.reward.pp_rew_min),
            ("reward.pp_rew_max", self.reward.pp_rew_max),
            ("reward.rew_collision", self.reward.rew_collision),
            ("reward.rew_reach_end", self.reward.rew_reach_end),
            ("reward.existence_reward", self.reward.existence_reward),
            ("simulation.min_reward", self.simulation.min_reward),
            ("sensor.camera.near", self.sensor.camera.near),
        ];
        let matrices = self
            .quadrotor
            .inertia_matrix
            .iter()
            .map(|v| ("quadrotor.inertia_matrix", *v))
            .chain(
                self.quadrotor
                    .allocation_matrix
                    .iter()
                    .map(|v| ("quadrotor.allocation_matrix", *v)),
            );
        for (key, value) in finite.into_iter().chain(matrices) {
            if !value.is_finite() {
                return Err(SimulationError::Config(format!(
                    "{} must be finite, got {}",
                    key, value
                )));
            }
        }
        let noise = [
            ("imu.accel_noise_std", self.imu.accel_noise_std),
            ("imu.gyro_noise_std", self.imu.gyro_noise_std),
            ("imu.accel_bias_std", self.imu.accel_bias_std),
            ("imu.gyro_bias_std", self.imu.gyro_bias_std),
        ];
        for (key, value) in noise {
            if !(value.is_finite() && value >= 0.0) {
                return Err(SimulationError::Config(format!(
                    "{} must be non-negative and finite, got {}",
                    key, value
                )));
            }
        }
        if self.quadrotor.gravity < 0.0 || self.quadrotor.drag_coefficient < 0.0 {
            return Err(SimulationError::Config(
                "quadrotor.gravity and quadrotor.drag_coefficient must be non-negative"
                    .to_string(),
            ));
        }
        if self.quadrotor.thrust_min > self.quadrotor.thrust_max {
            return Err(SimulationError::Config(format!(
                "quadrotor.thrust_min ({}) exceeds thrust_max ({})",
                self.quadrotor.thrust_min, self.quadrotor.thrust_max
            )));
        }
        if self.reward.pp_rew_min > self.reward.pp_rew_max {
            return Err(SimulationError::Config(
                "reward.pp_rew_min exceeds reward.pp_rew_max".to_string(),
            ));
        }
        if self.simulation.physics_substeps == 0 || self.simulation.max_t_steps == 0 {
            return Err(SimulationError::Config(
                "simulation.physics_substeps and simulation.max_t_steps must be at least 1"
                    .to_string(),
            ));
        }
        let (n_h, n_v) = self.sensor.sensor_suite;
        let (width, height) = self.sensor.camera.resolution;
        if n_h == 0 || n_v == 0 || width == 0 || height == 0 || self.sensor.camera.compressed_size == 0
        {
            return Err(SimulationError::Config(
                "sensor grid and camera resolutions must be non-zero".to_string(),
            ));
        }
        if self.sensor.camera.near >= self.sensor.camera.max_depth {
            return Err(SimulationError::Config(
                "sensor.camera.near must be below sensor.camera.max_depth".to_string(),
            ));
        }
        if self.scenario.n_waypoints < 2 {
            return Err(SimulationError::Config(
                "scenario.n_waypoints must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}
