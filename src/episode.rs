//! Episode state machine driving one quadrotor along one path
use crate::config::Config;
use crate::controller::GeometricController;
use crate::environment::{BuiltinScenario, Obstacle, ScenarioGenerator, ScenarioSetup};
use crate::guidance::{compute_guidance, GuidanceState};
use crate::path::Path;
use crate::quadrotor::{Imu, Quadrotor, QuadrotorState};
use crate::reward::{RewardBreakdown, RewardInputs, RewardModel};
use crate::sensor::{ProximitySensor, SensorType};
use crate::{m1to1, SimulationError};
use log::{debug, info};
use nalgebra::{Vector3, Vector4};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

pub const IMU_OBS_LEN: usize = 6;
pub const DOMAIN_OBS_LEN: usize = 19;
/// Raw values behind the domain observation, angles instead of their sin/cos pairs
pub const RAW_DOMAIN_OBS_LEN: usize = 15;

/// Lifecycle state of an episode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
    Active,
    Success,
    Collided,
    Timeout,
    RewardFloor,
}

impl EpisodeStatus {
    /// Reason the episode ended, `None` while active
    pub fn termination(&self) -> Option<TerminationReason> {
        match self {
            EpisodeStatus::Active => None,
            EpisodeStatus::Success => Some(TerminationReason::Success),
            EpisodeStatus::Collided => Some(TerminationReason::Collision),
            EpisodeStatus::Timeout => Some(TerminationReason::Timeout),
            EpisodeStatus::RewardFloor => Some(TerminationReason::RewardFloor),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Success,
    Collision,
    Timeout,
    RewardFloor,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TerminationReason::Success => "success",
            TerminationReason::Collision => "collision",
            TerminationReason::Timeout => "timeout",
            TerminationReason::RewardFloor => "reward_floor",
        };
        f.write_str(name)
    }
}

/// Normalized observation handed to the policy
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Observation {
    /// Body acceleration and angular velocity
    pub imu: [f64; IMU_OBS_LEN],
    /// Guidance, path geometry and previous action
    pub domain: [f64; DOMAIN_OBS_LEN],
    /// Compressed range image of the rendered sensor
    pub perception: Option<Vec<f64>>,
}

/// Per-step information for logging and analysis
#[derive(Clone, Debug, Serialize)]
pub struct Diagnostics {
    pub reward: RewardBreakdown,
    pub env_steps: usize,
    /// Simulated time in seconds
    pub time: f64,
    /// Fraction of the path length covered by the projection of the vehicle
    pub progression: f64,
    /// Raw IMU values followed by the raw domain values, angles in radians
    pub pure_obs: Vec<f64>,
    pub domain_obs: [f64; DOMAIN_OBS_LEN],
    /// `[position, attitude, body velocity, body angular velocity]`
    pub state: [f64; 12],
    /// Cross-track and vertical-track errors
    pub errors: [f64; 2],
    pub thrusts: [f64; 4],
    pub action: [f64; 3],
    pub cumulative_reward: f64,
    pub waypoint_index: usize,
    pub nearest_obstacle_distance: f64,
    pub collided: bool,
    pub status: EpisodeStatus,
    pub termination: Option<TerminationReason>,
}

/// Result of one environment step
#[derive(Clone, Debug)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: f64,
    pub terminated: bool,
    /// Always false, episodes only end through `terminated`
    pub truncated: bool,
    pub info: Diagnostics,
}

/// Mutable state of the running episode
struct Episode {
    path: Path,
    obstacles: Vec<Obstacle>,
    guidance: GuidanceState,
    waypoint_index: usize,
    steps: usize,
    cumulative_reward: f64,
    status: EpisodeStatus,
    faulted: bool,
    previous_action: [f64; 3],
    imu_reading: [f64; IMU_OBS_LEN],
    reward: RewardBreakdown,
}

/// Path-following environment owning the vehicle, its sensors and the episode
pub struct QuadEnv {
    config: Config,
    scenarios: HashMap<String, Box<dyn ScenarioGenerator + Send>>,
    rng: ChaCha8Rng,
    quadrotor: Quadrotor,
    controller: GeometricController,
    imu: Imu,
    sensor: SensorType,
    reward_model: RewardModel,
    episode: Option<Episode>,
}

impl QuadEnv {
    /// Creates an environment with the sensing strategy named in the configuration
    /// # Errors
    /// * `Config` if the configuration is invalid or the allocation matrix singular
    /// * `NalgebraError` if the inertia matrix cannot be inverted
    pub fn new(config: Config) -> Result<Self, SimulationError> {
        let sensor = SensorType::from_config(&config);
        Self::with_sensor(config, sensor)
    }

    /// Creates an environment with an explicitly constructed sensor
    pub fn with_sensor(config: Config, sensor: SensorType) -> Result<Self, SimulationError> {
        config.validate()?;
        let mut scenarios: HashMap<String, Box<dyn ScenarioGenerator + Send>> = HashMap::new();
        for scenario in BuiltinScenario::ALL {
            scenarios.insert(scenario.name().to_string(), Box::new(scenario));
        }
        Ok(Self {
            quadrotor: Quadrotor::from_config(&config)?,
            controller: GeometricController::from_config(&config)?,
            imu: Imu::new(&config.imu),
            reward_model: RewardModel::new(&config.reward),
            rng: ChaCha8Rng::from_entropy(),
            scenarios,
            sensor,
            config,
            episode: None,
        })
    }

    /// Registers a scenario generator under `name`, replacing any previous one
    pub fn register(&mut self, name: &str, generator: Box<dyn ScenarioGenerator + Send>) {
        self.scenarios.insert(name.to_string(), generator);
    }

    pub fn scenario_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.scenarios.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Starts a new episode from a registered scenario
    /// # Arguments
    /// * `seed` - Reseeds the environment random source when given
    /// * `scenario` - Name of a registered scenario generator
    /// # Returns
    /// * The initial observation and diagnostics without step data
    /// # Errors
    /// * `UnknownScenario` if no generator is registered under `scenario`
    /// * Any error of the generator or of [`QuadEnv::reset_with`]
    pub fn reset(
        &mut self,
        seed: Option<u64>,
        scenario: &str,
    ) -> Result<(Observation, Diagnostics), SimulationError> {
        self.episode = None;
        if let Some(seed) = seed {
            self.rng = ChaCha8Rng::seed_from_u64(seed);
        }
        let generator = self
            .scenarios
            .get(scenario)
            .ok_or_else(|| SimulationError::UnknownScenario(scenario.to_string()))?;
        let setup = generator.generate(&mut self.rng, self.config.scenario.n_waypoints)?;
        debug!(
            "Generated scenario {} with {} waypoints and {} obstacles",
            scenario,
            setup.waypoints.len(),
            setup.obstacles.len()
        );
        self.reset_with(setup)
    }

    /// Starts a new episode from an externally generated setup
    /// # Errors
    /// * `InvalidPath` if the waypoints do not form a path
    /// * `Renderer` if the sensor collaborators fail
    pub fn reset_with(
        &mut self,
        setup: ScenarioSetup,
    ) -> Result<(Observation, Diagnostics), SimulationError> {
        self.episode = None;
        let path = Path::new(&setup.waypoints)?;
        let state = QuadrotorState::new(setup.initial_position, setup.initial_attitude);
        self.quadrotor.reset(state.clone());
        self.imu.reset();
        self.sensor.reset(&setup.obstacles, &state)?;

        let u = path.closest_u(&state.position, 0);
        let guidance = compute_guidance(&path, &state, u, 0, self.config.guidance.la_dist);
        self.episode = Some(Episode {
            path,
            obstacles: setup.obstacles,
            guidance,
            waypoint_index: 0,
            steps: 0,
            cumulative_reward: 0.0,
            status: EpisodeStatus::Active,
            faulted: false,
            previous_action: [0.0; 3],
            imu_reading: [0.0; IMU_OBS_LEN],
            reward: RewardBreakdown::default(),
        });
        debug!(
            "Reset episode at {:?} facing {:.3} rad",
            state.position.as_slice(),
            state.heading()
        );
        let (observation, pure_obs) = self.observe()?;
        let info = self.diagnostics(pure_obs, &observation)?;
        Ok((observation, info))
    }

    /// Advances the episode by one environment step
    /// # Arguments
    /// * `action` - Normalized `[speed, inclination, yaw rate]`, clipped into `[-1, 1]`
    /// # Errors
    /// * `EpisodeNotActive` before the first reset, after termination or after a fault
    /// * `InvalidAction`, `InvalidActuation` or `Numerical` on a runtime fault, after which
    ///   the episode stays inert until the next reset
    pub fn step(&mut self, action: [f64; 3]) -> Result<StepResult, SimulationError> {
        let episode = self.episode.as_ref().ok_or_else(|| {
            SimulationError::EpisodeNotActive("reset has not been called".to_string())
        })?;
        if episode.faulted {
            return Err(SimulationError::EpisodeNotActive(
                "episode stopped after a runtime fault".to_string(),
            ));
        }
        if let Some(reason) = episode.status.termination() {
            return Err(SimulationError::EpisodeNotActive(format!(
                "episode terminated with {}",
                reason
            )));
        }
        let result = self.advance(action);
        if result.is_err() {
            if let Some(episode) = self.episode.as_mut() {
                episode.faulted = true;
            }
        }
        result
    }

    fn advance(&mut self, action: [f64; 3]) -> Result<StepResult, SimulationError> {
        let action = GeometricController::clip_action(&action)?;
        let start = self.quadrotor.state.position;
        for _ in 0..self.config.simulation.physics_substeps {
            let control = self.controller.compute(&action, &self.quadrotor.state)?;
            self.quadrotor.step(&control.thrusts)?;
            self.imu.update(self.config.simulation.step_size, &mut self.rng)?;
        }
        let state = self.quadrotor.state.clone();
        let (true_acceleration, true_angular_velocity) = self.quadrotor.read_imu();
        let (acceleration, angular_velocity) =
            self.imu
                .read(true_acceleration, true_angular_velocity, &mut self.rng)?;

        let episode = self.episode.as_mut().ok_or_else(|| {
            SimulationError::EpisodeNotActive("reset has not been called".to_string())
        })?;
        let u = episode.path.closest_u(&state.position, episode.waypoint_index);
        let segment = episode.path.u_to_segment_index(u);
        if segment > episode.waypoint_index {
            info!(
                "Passed waypoint {} at {:?}",
                segment,
                episode.path.waypoint(segment).as_slice()
            );
            episode.waypoint_index = segment;
        }
        episode.guidance = compute_guidance(
            &episode.path,
            &state,
            u,
            episode.waypoint_index,
            self.config.guidance.la_dist,
        );
        self.sensor
            .update(&episode.obstacles, &state, &(state.position - start))?;
        episode.steps += 1;
        episode.previous_action = action;
        episode.imu_reading = [
            acceleration.x,
            acceleration.y,
            acceleration.z,
            angular_velocity.x,
            angular_velocity.y,
            angular_velocity.z,
        ];

        let collided = self.sensor.in_collision();
        let reached_end = (episode.path.endpoint() - state.position).norm()
            < self.config.guidance.accept_rad
            && episode.waypoint_index == episode.path.segment_count() - 1;
        episode.status = if reached_end {
            EpisodeStatus::Success
        } else if collided {
            EpisodeStatus::Collided
        } else if episode.steps >= self.config.simulation.max_t_steps {
            EpisodeStatus::Timeout
        } else if episode.cumulative_reward < self.config.simulation.min_reward {
            EpisodeStatus::RewardFloor
        } else {
            EpisodeStatus::Active
        };

        let inputs = RewardInputs {
            path_distance: (episode.guidance.closest_point - state.position).norm(),
            course_error: episode.guidance.course_error,
            elevation_error: episode.guidance.elevation_error,
            speed: state.speed(),
            nearest_obstacle_distance: self.sensor.nearest_obstacle_distance(),
            has_obstacles: !episode.obstacles.is_empty(),
            collided,
            reached_end,
        };
        episode.reward = self.reward_model.evaluate(&inputs);
        episode.cumulative_reward += episode.reward.reward;
        let (reward, status, steps, cumulative) = (
            episode.reward.reward,
            episode.status,
            episode.steps,
            episode.cumulative_reward,
        );
        if let Some(reason) = status.termination() {
            info!(
                "Episode ended with {} after {} steps, cumulative reward {:.2}",
                reason, steps, cumulative
            );
        }

        let (observation, pure_obs) = self.observe()?;
        let info = self.diagnostics(pure_obs, &observation)?;
        Ok(StepResult {
            observation,
            reward,
            terminated: status != EpisodeStatus::Active,
            truncated: false,
            info,
        })
    }

    /// Builds the normalized observation and the raw values it came from
    fn observe(&mut self) -> Result<(Observation, Vec<f64>), SimulationError> {
        let la_dist = self.config.guidance.la_dist;
        let closest_range = self.config.guidance.closest_point_range;
        let (s_max, r_max) = (self.config.controller.s_max, self.config.controller.r_max);
        let state = &self.quadrotor.state;
        let episode = self.episode.as_mut().ok_or_else(|| {
            SimulationError::EpisodeNotActive("reset has not been called".to_string())
        })?;
        let world_to_body = state.rotation().transpose();
        let guidance = &episode.guidance;

        let closest_body = world_to_body * (guidance.closest_point - state.position);
        let closest_elevation = closest_body.z.atan2(closest_body.xy().norm());
        let closest_azimuth = closest_body.y.atan2(closest_body.x);
        let next_waypoint_distance =
            (episode.path.waypoint(episode.waypoint_index + 1) - state.position).norm();
        let end_distance = (episode.path.endpoint() - state.position).norm();
        let lookahead = episode.path.lookahead_from(guidance.u, la_dist);
        let lookahead_body = world_to_body * (lookahead - state.position);

        let length = episode.path.length();
        let segment_length = length / episode.path.segment_count() as f64;
        let action = episode.previous_action;
        let raw_domain: [f64; RAW_DOMAIN_OBS_LEN] = [
            guidance.course_error,
            guidance.elevation_error,
            closest_body.x,
            closest_body.y,
            closest_body.z,
            closest_elevation,
            closest_azimuth,
            next_waypoint_distance,
            end_distance,
            lookahead_body.x,
            lookahead_body.y,
            lookahead_body.z,
            action[0],
            action[1],
            action[2],
        ];
        let closest_norm = closest_body.map(|v| m1to1(v, -closest_range, closest_range));
        let lookahead_norm = lookahead_body.map(|v| m1to1(v, -2.0 * la_dist, 2.0 * la_dist));
        let domain: [f64; DOMAIN_OBS_LEN] = [
            guidance.course_error.sin(),
            guidance.course_error.cos(),
            guidance.elevation_error.sin(),
            guidance.elevation_error.cos(),
            closest_norm.x,
            closest_norm.y,
            closest_norm.z,
            closest_elevation.sin(),
            closest_elevation.cos(),
            closest_azimuth.sin(),
            closest_azimuth.cos(),
            m1to1(next_waypoint_distance, -2.0 * segment_length, 2.0 * segment_length),
            m1to1(end_distance, -2.0 * length, 2.0 * length),
            lookahead_norm.x,
            lookahead_norm.y,
            lookahead_norm.z,
            action[0],
            action[1],
            action[2],
        ];

        let raw_imu = episode.imu_reading;
        let mut imu = [0.0; IMU_OBS_LEN];
        for (i, value) in raw_imu.iter().enumerate() {
            let bound = if i < 3 { 2.0 * s_max } else { 2.0 * r_max };
            imu[i] = m1to1(*value, -bound, bound);
        }
        let pure_obs = raw_imu.iter().chain(raw_domain.iter()).copied().collect();
        Ok((
            Observation {
                imu,
                domain,
                perception: self.sensor.perception(),
            },
            pure_obs,
        ))
    }

    fn diagnostics(
        &self,
        pure_obs: Vec<f64>,
        observation: &Observation,
    ) -> Result<Diagnostics, SimulationError> {
        let episode = self.episode()?;
        let mut state = [0.0; 12];
        state.copy_from_slice(self.quadrotor.state.to_vector().as_slice());
        let thrusts: Vector4<f64> = self.quadrotor.last_thrusts();
        let status = episode.status;
        Ok(Diagnostics {
            reward: episode.reward.clone(),
            env_steps: episode.steps,
            time: episode.steps as f64
                * self.config.simulation.step_size
                * self.config.simulation.physics_substeps as f64,
            progression: episode.guidance.u / episode.path.length(),
            pure_obs,
            domain_obs: observation.domain,
            state,
            errors: [episode.guidance.e, episode.guidance.h],
            thrusts: [thrusts[0], thrusts[1], thrusts[2], thrusts[3]],
            action: episode.previous_action,
            cumulative_reward: episode.cumulative_reward,
            waypoint_index: episode.waypoint_index,
            nearest_obstacle_distance: self.sensor.nearest_obstacle_distance(),
            collided: self.sensor.in_collision(),
            status,
            termination: status.termination(),
        })
    }

    fn episode(&self) -> Result<&Episode, SimulationError> {
        self.episode.as_ref().ok_or_else(|| {
            SimulationError::EpisodeNotActive("reset has not been called".to_string())
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &QuadrotorState {
        &self.quadrotor.state
    }

    /// Status of the current episode, `None` before the first reset
    pub fn status(&self) -> Option<EpisodeStatus> {
        self.episode.as_ref().map(|episode| episode.status)
    }

    pub fn path(&self) -> Option<&Path> {
        self.episode.as_ref().map(|episode| &episode.path)
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        self.episode
            .as_ref()
            .map_or(&[], |episode| episode.obstacles.as_slice())
    }

    pub fn guidance(&self) -> Option<&GuidanceState> {
        self.episode.as_ref().map(|episode| &episode.guidance)
    }

    pub fn cumulative_reward(&self) -> f64 {
        self.episode
            .as_ref()
            .map_or(0.0, |episode| episode.cumulative_reward)
    }

    /// Current lookahead point on the path, used by scripted policies
    pub fn lookahead_point(&mut self) -> Option<Vector3<f64>> {
        let la_dist = self.config.guidance.la_dist;
        self.episode
            .as_mut()
            .map(|episode| episode.path.lookahead_from(episode.guidance.u, la_dist))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::reference_config;

    fn straight_setup(start: Vector3<f64>, obstacles: Vec<Obstacle>) -> ScenarioSetup {
        ScenarioSetup::new(
            vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(50.0, 0.0, 0.0),
                Vector3::new(100.0, 0.0, 0.0),
            ],
            obstacles,
        )
        .unwrap()
        .with_initial_position(start)
    }

    #[test]
    fn step_before_reset_is_rejected() {
        let mut env = QuadEnv::new(reference_config()).unwrap();
        assert!(matches!(
            env.step([0.0; 3]),
            Err(SimulationError::EpisodeNotActive(_))
        ));
        assert_eq!(env.status(), None);
    }

    #[test]
    fn unknown_scenario_is_rejected() {
        let mut env = QuadEnv::new(reference_config()).unwrap();
        assert!(matches!(
            env.reset(Some(1), "no_such_scenario"),
            Err(SimulationError::UnknownScenario(_))
        ));
    }

    #[test]
    fn reset_observation_has_no_step_data() {
        let mut env = QuadEnv::new(reference_config()).unwrap();
        let (observation, info) = env.reset(Some(3), "line").unwrap();
        assert_eq!(observation.imu, [0.0; IMU_OBS_LEN]);
        assert!(observation.perception.is_none());
        assert!(observation.domain.iter().all(|v| (-1.0..=1.0).contains(v)));
        assert_eq!(info.env_steps, 0);
        assert_eq!(info.reward, RewardBreakdown::default());
        assert_eq!(info.pure_obs.len(), IMU_OBS_LEN + RAW_DOMAIN_OBS_LEN);
        assert_eq!(info.termination, None);
        assert_eq!(env.status(), Some(EpisodeStatus::Active));
    }

    #[test]
    fn invalid_action_faults_the_episode() {
        let mut env = QuadEnv::new(reference_config()).unwrap();
        env.reset_with(straight_setup(Vector3::zeros(), Vec::new()))
            .unwrap();
        assert!(matches!(
            env.step([f64::NAN, 0.0, 0.0]),
            Err(SimulationError::InvalidAction(_))
        ));
        assert!(matches!(
            env.step([0.0; 3]),
            Err(SimulationError::EpisodeNotActive(_))
        ));
        env.reset_with(straight_setup(Vector3::zeros(), Vec::new()))
            .unwrap();
        assert!(env.step([0.0; 3]).is_ok());
    }

    #[test]
    fn timeout_ends_the_episode() {
        let mut config = reference_config();
        config.simulation.max_t_steps = 3;
        let mut env = QuadEnv::new(config).unwrap();
        env.reset_with(straight_setup(Vector3::zeros(), Vec::new()))
            .unwrap();
        assert!(!env.step([-1.0, 0.0, 0.0]).unwrap().terminated);
        assert!(!env.step([-1.0, 0.0, 0.0]).unwrap().terminated);
        let result = env.step([-1.0, 0.0, 0.0]).unwrap();
        assert!(result.terminated);
        assert!(!result.truncated);
        assert_eq!(result.info.termination, Some(TerminationReason::Timeout));
        assert!(matches!(
            env.step([0.0; 3]),
            Err(SimulationError::EpisodeNotActive(_))
        ));
    }

    #[test]
    fn reward_floor_uses_the_cumulative_reward_before_the_step() {
        let mut config = reference_config();
        config.simulation.min_reward = -1.0;
        let mut env = QuadEnv::new(config).unwrap();
        // far off the path, every step costs roughly the adherence scale
        env.reset_with(straight_setup(Vector3::new(10.0, 30.0, 0.0), Vec::new()))
            .unwrap();
        let first = env.step([-1.0, 0.0, 0.0]).unwrap();
        assert!(!first.terminated);
        assert!(first.info.cumulative_reward < -1.0);
        let second = env.step([-1.0, 0.0, 0.0]).unwrap();
        assert_eq!(second.info.termination, Some(TerminationReason::RewardFloor));
        assert_eq!(second.info.status, EpisodeStatus::RewardFloor);
    }

    #[test]
    fn termination_reason_names() {
        assert_eq!(TerminationReason::Success.to_string(), "success");
        assert_eq!(TerminationReason::Collision.to_string(), "collision");
        assert_eq!(TerminationReason::Timeout.to_string(), "timeout");
        assert_eq!(TerminationReason::RewardFloor.to_string(), "reward_floor");
    }

    #[test]
    fn registered_scenarios_are_available() {
        struct Fixed;
        impl ScenarioGenerator for Fixed {
            fn generate(
                &self,
                _rng: &mut ChaCha8Rng,
                _n_waypoints: usize,
            ) -> Result<ScenarioSetup, SimulationError> {
                ScenarioSetup::new(
                    vec![Vector3::zeros(), Vector3::new(0.0, 20.0, 0.0)],
                    Vec::new(),
                )
            }
        }
        let mut env = QuadEnv::new(reference_config()).unwrap();
        env.register("fixed", Box::new(Fixed));
        assert!(env.scenario_names().contains(&"fixed"));
        assert!(env.scenario_names().contains(&"deadend"));
        env.reset(None, "fixed").unwrap();
        assert_eq!(env.path().unwrap().length(), 20.0);
        approx::assert_relative_eq!(
            env.state().heading(),
            std::f64::consts::FRAC_PI_2,
            epsilon = 1e-9
        );
    }

    #[test]
    fn waypoint_index_only_moves_forward() {
        let mut env = QuadEnv::new(reference_config()).unwrap();
        env.reset_with(straight_setup(Vector3::new(60.0, 0.0, 0.0), Vec::new()))
            .unwrap();
        let result = env.step([-1.0, 0.0, 0.0]).unwrap();
        assert_eq!(result.info.waypoint_index, 1);
        let guidance = env.guidance().unwrap();
        assert!(guidance.u >= 50.0);
    }

    #[test]
    fn failed_reset_ends_the_previous_episode() {
        let mut env = QuadEnv::new(reference_config()).unwrap();
        env.reset(Some(1), "line").unwrap();
        assert_eq!(env.status(), Some(EpisodeStatus::Active));
        assert!(matches!(
            env.reset(Some(2), "spiral"),
            Err(SimulationError::UnknownScenario(_))
        ));
        assert_eq!(env.status(), None);
        assert!(env.path().is_none());
        assert!(matches!(
            env.step([0.0; 3]),
            Err(SimulationError::EpisodeNotActive(_))
        ));
    }

    #[test]
    fn diverging_dynamics_fault_the_episode() {
        let mut env = QuadEnv::new(reference_config()).unwrap();
        env.reset_with(straight_setup(Vector3::new(10.0, 0.0, 0.0), Vec::new()))
            .unwrap();
        env.quadrotor.state.velocity = Vector3::new(5e307, 0.0, 0.0);
        let before = env.state().clone();
        assert!(matches!(
            env.step([-1.0, 0.0, 0.0]),
            Err(SimulationError::Numerical(_))
        ));
        assert_eq!(*env.state(), before);
        assert!(matches!(
            env.step([-1.0, 0.0, 0.0]),
            Err(SimulationError::EpisodeNotActive(_))
        ));
        env.reset_with(straight_setup(Vector3::new(10.0, 0.0, 0.0), Vec::new()))
            .unwrap();
        assert!(env.step([-1.0, 0.0, 0.0]).is_ok());
    }

    #[test]
    fn physics_substeps_match_repeated_single_steps() {
        let action = [1.0, 0.2, 0.3];
        let mut single = QuadEnv::new(reference_config()).unwrap();
        single
            .reset_with(straight_setup(Vector3::new(10.0, 0.0, 0.0), Vec::new()))
            .unwrap();
        let mut single_info = None;
        for _ in 0..4 {
            single_info = Some(single.step(action).unwrap().info);
        }
        let single_info = single_info.unwrap();

        let mut config = reference_config();
        config.simulation.physics_substeps = 4;
        let mut multi = QuadEnv::new(config).unwrap();
        multi
            .reset_with(straight_setup(Vector3::new(10.0, 0.0, 0.0), Vec::new()))
            .unwrap();
        let multi_info = multi.step(action).unwrap().info;

        assert_eq!(single_info.env_steps, 4);
        assert_eq!(multi_info.env_steps, 1);
        approx::assert_relative_eq!(single_info.time, 0.04, epsilon = 1e-12);
        approx::assert_relative_eq!(multi_info.time, 0.04, epsilon = 1e-12);
        approx::assert_relative_eq!(
            multi.state().to_vector(),
            single.state().to_vector(),
            epsilon = 1e-9
        );
        assert!(multi.state().speed() > 0.0);
    }

    #[test]
    fn pure_observation_keeps_raw_angles() {
        let mut env = QuadEnv::new(reference_config()).unwrap();
        let (observation, info) = env
            .reset_with(straight_setup(Vector3::new(10.0, 5.0, 0.0), Vec::new()))
            .unwrap();
        let raw = &info.pure_obs[IMU_OBS_LEN..];
        assert_eq!(raw.len(), RAW_DOMAIN_OBS_LEN);
        approx::assert_relative_eq!(raw[3], -5.0, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(raw[5], 0.0, epsilon = 1e-6);
        approx::assert_relative_eq!(raw[6], -std::f64::consts::FRAC_PI_2, epsilon = 1e-6);
        assert!(raw[0].abs() > 0.0);
        approx::assert_relative_eq!(observation.domain[0], raw[0].sin(), epsilon = 1e-12);
        approx::assert_relative_eq!(observation.domain[1], raw[0].cos(), epsilon = 1e-12);
        approx::assert_relative_eq!(observation.domain[5], -0.25, epsilon = 1e-6);
        approx::assert_relative_eq!(observation.domain[9], -1.0, epsilon = 1e-6);
    }
}
