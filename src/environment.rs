//! Obstacles and scenario generation
use crate::path::Path;
use crate::SimulationError;
use log::warn;
use nalgebra::Vector3;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, FRAC_PI_8, PI};

/// Clearance kept between generated obstacles and to the path endpoint
const OVERLAP_MARGIN: f64 = 5.0;
/// Clearance between a lateral obstacle and the path point it was placed beside
const LATERAL_PATH_MARGIN: f64 = 2.0;
const MAX_PLACEMENT_ATTEMPTS: usize = 1000;

/// Represents a static spherical obstacle
#[derive(Clone, Debug, PartialEq)]
pub struct Obstacle {
    /// The position of the obstacle center
    pub position: Vector3<f64>,
    /// The radius of the obstacle
    pub radius: f64,
}

impl Obstacle {
    pub fn new(position: Vector3<f64>, radius: f64) -> Self {
        Self { position, radius }
    }
}

/// Everything an episode needs to start
#[derive(Clone, Debug)]
pub struct ScenarioSetup {
    pub waypoints: Vec<Vector3<f64>>,
    pub obstacles: Vec<Obstacle>,
    pub initial_position: Vector3<f64>,
    /// ZYX Euler angles `(roll, pitch, yaw)`
    pub initial_attitude: Vector3<f64>,
}

impl ScenarioSetup {
    /// Setup starting at the first waypoint, level and facing along the path
    /// # Errors
    /// * `InvalidPath` if the waypoints do not form a path
    pub fn new(waypoints: Vec<Vector3<f64>>, obstacles: Vec<Obstacle>) -> Result<Self, SimulationError> {
        let path = Path::new(&waypoints)?;
        let (course, _) = path.direction_angles_at(0.0);
        Ok(Self {
            initial_position: path.position_at(0.0),
            initial_attitude: Vector3::new(0.0, 0.0, course),
            waypoints,
            obstacles,
        })
    }

    pub fn with_initial_position(mut self, position: Vector3<f64>) -> Self {
        self.initial_position = position;
        self
    }
}

/// Trait defining the interface for scenario generators
pub trait ScenarioGenerator {
    /// Generates the path, obstacles and initial pose of an episode
    /// # Arguments
    /// * `rng` - Seeded random source owned by the episode
    /// * `n_waypoints` - Number of waypoints of randomly generated paths
    /// # Errors
    /// * Returns a SimulationError if the generated setup is invalid
    fn generate(
        &self,
        rng: &mut ChaCha8Rng,
        n_waypoints: usize,
    ) -> Result<ScenarioSetup, SimulationError>;
}

/// Shape of randomly generated paths
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaypointKind {
    /// Straight line with a random course
    Line,
    /// Planar path turning at every waypoint
    Horizontal,
    /// Path turning and climbing or descending at every waypoint
    ThreeD,
}

/// Generates `n_waypoints` waypoints starting at the origin
pub fn generate_random_waypoints(
    rng: &mut ChaCha8Rng,
    n_waypoints: usize,
    kind: WaypointKind,
) -> Vec<Vector3<f64>> {
    let mut waypoints = vec![Vector3::zeros()];
    let mut course = rng.gen_range(-PI..PI);
    for _ in 1..n_waypoints {
        let (length, elevation) = match kind {
            WaypointKind::Line => (rng.gen_range(30.0..50.0), 0.0),
            WaypointKind::Horizontal => {
                course += rng.gen_range(-FRAC_PI_4..FRAC_PI_4);
                (rng.gen_range(20.0..40.0), 0.0)
            }
            WaypointKind::ThreeD => {
                course += rng.gen_range(-FRAC_PI_4..FRAC_PI_4);
                (rng.gen_range(20.0..40.0), rng.gen_range(-FRAC_PI_8..FRAC_PI_8))
            }
        };
        let step = Vector3::new(
            length * course.cos() * elevation.cos(),
            length * course.sin() * elevation.cos(),
            length * elevation.sin(),
        );
        let next = waypoints[waypoints.len() - 1] + step;
        waypoints.push(next);
    }
    waypoints
}

/// True when `candidate` is too close to the endpoint or to an already placed obstacle
pub fn overlaps(candidate: &Obstacle, endpoint: &Vector3<f64>, placed: &[Obstacle]) -> bool {
    (endpoint - candidate.position).norm() < candidate.radius + OVERLAP_MARGIN
        || placed.iter().any(|obstacle| {
            (obstacle.position - candidate.position).norm()
                < obstacle.radius + candidate.radius + OVERLAP_MARGIN
        })
}

/// Places `n` obstacles beside the path with a normally distributed lateral offset
///
/// Obstacles that would touch the path point they were placed beside are redrawn.
pub fn generate_lateral_obstacles(
    rng: &mut ChaCha8Rng,
    path: &Path,
    n: usize,
    radius_range: (f64, f64),
    offset_std: f64,
) -> Result<Vec<Obstacle>, SimulationError> {
    let offset_distribution = Normal::new(0.0, offset_std)?;
    let mut obstacles = Vec::with_capacity(n);
    let mut attempts = 0;
    while obstacles.len() < n {
        if attempts == MAX_PLACEMENT_ATTEMPTS {
            warn!(
                "Placed {} of {} lateral obstacles after {} attempts",
                obstacles.len(),
                n,
                attempts
            );
            break;
        }
        attempts += 1;
        let u = rng.gen_range(0.2 * path.length()..0.9 * path.length());
        let (course, _) = path.direction_angles_at(u);
        let offset = offset_distribution.sample(rng);
        let radius = rng.gen_range(radius_range.0..radius_range.1);
        if offset.abs() <= radius + LATERAL_PATH_MARGIN {
            continue;
        }
        let normal = Vector3::new((course - FRAC_PI_2).cos(), (course - FRAC_PI_2).sin(), 0.0);
        obstacles.push(Obstacle::new(path.position_at(u) + normal * offset, radius));
    }
    Ok(obstacles)
}

/// Scenarios available by name in every environment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinScenario {
    Line,
    Horizontal,
    ThreeD,
    /// 3D path with one to four obstacles beside it
    Easy,
    /// 3D path with one obstacle on it
    Intermediate,
    Proficient,
    Expert,
    TestPath,
    Test,
    /// Wall of obstacles across a straight planar path
    HorizontalTest,
    /// Column of obstacles across a straight path
    VerticalTest,
    /// Hemispherical shell of obstacles opening towards the start
    Deadend,
    /// Three-waypoint line with a large obstacle on the middle waypoint
    Crash,
}

impl BuiltinScenario {
    pub const ALL: [BuiltinScenario; 13] = [
        BuiltinScenario::Line,
        BuiltinScenario::Horizontal,
        BuiltinScenario::ThreeD,
        BuiltinScenario::Easy,
        BuiltinScenario::Intermediate,
        BuiltinScenario::Proficient,
        BuiltinScenario::Expert,
        BuiltinScenario::TestPath,
        BuiltinScenario::Test,
        BuiltinScenario::HorizontalTest,
        BuiltinScenario::VerticalTest,
        BuiltinScenario::Deadend,
        BuiltinScenario::Crash,
    ];

    /// Name under which the scenario is registered
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinScenario::Line => "line",
            BuiltinScenario::Horizontal => "horizontal",
            BuiltinScenario::ThreeD => "3d",
            BuiltinScenario::Easy => "easy",
            BuiltinScenario::Intermediate => "intermediate",
            BuiltinScenario::Proficient => "proficient",
            BuiltinScenario::Expert => "expert",
            BuiltinScenario::TestPath => "test_path",
            BuiltinScenario::Test => "test",
            BuiltinScenario::HorizontalTest => "horizontal_test",
            BuiltinScenario::VerticalTest => "vertical_test",
            BuiltinScenario::Deadend => "deadend",
            BuiltinScenario::Crash => "crash",
        }
    }

    fn random_path(
        rng: &mut ChaCha8Rng,
        n_waypoints: usize,
        kind: WaypointKind,
    ) -> Result<(ScenarioSetup, Path), SimulationError> {
        let waypoints = generate_random_waypoints(rng, n_waypoints, kind);
        let path = Path::new(&waypoints)?;
        Ok((ScenarioSetup::new(waypoints, Vec::new())?, path))
    }

    /// Obstacle at mid-path plus `count` obstacles scattered around the path between
    /// `from` and `to`, as fractions of the path length
    fn scattered(
        rng: &mut ChaCha8Rng,
        n_waypoints: usize,
        count: usize,
        from: f64,
        to: f64,
    ) -> Result<ScenarioSetup, SimulationError> {
        let (mut setup, path) = Self::random_path(rng, n_waypoints, WaypointKind::ThreeD)?;
        setup.obstacles.push(Obstacle::new(
            path.position_at(path.length() / 2.0),
            rng.gen_range(4.0..10.0),
        ));
        let endpoint = path.endpoint();
        for k in 0..count {
            let fraction = if count == 1 {
                from
            } else {
                from + (to - from) * k as f64 / (count - 1) as f64
            };
            let radius: f64 = rng.gen_range(4.0..10.0);
            let spread = radius + 10.0;
            let jitter = Vector3::from_iterator((0..3).map(|_| rng.gen_range(-spread..spread)));
            let candidate = Obstacle::new(path.position_at(fraction * path.length()) + jitter, radius);
            if !overlaps(&candidate, &endpoint, &setup.obstacles) {
                setup.obstacles.push(candidate);
            }
        }
        Ok(setup)
    }

    fn jittered_start(rng: &mut ChaCha8Rng) -> Vector3<f64> {
        Vector3::from_iterator((0..3).map(|_| rng.gen_range(-5.0..5.0)))
    }
}

impl ScenarioGenerator for BuiltinScenario {
    fn generate(
        &self,
        rng: &mut ChaCha8Rng,
        n_waypoints: usize,
    ) -> Result<ScenarioSetup, SimulationError> {
        match self {
            BuiltinScenario::Line => Ok(Self::random_path(rng, n_waypoints, WaypointKind::Line)?.0),
            BuiltinScenario::Horizontal => {
                Ok(Self::random_path(rng, n_waypoints, WaypointKind::Horizontal)?.0)
            }
            BuiltinScenario::ThreeD => {
                Ok(Self::random_path(rng, n_waypoints, WaypointKind::ThreeD)?.0)
            }
            BuiltinScenario::Easy => {
                let (mut setup, path) = Self::random_path(rng, n_waypoints, WaypointKind::ThreeD)?;
                let n_obstacles = rng.gen_range(1..5);
                setup.obstacles = generate_lateral_obstacles(rng, &path, n_obstacles, (2.0, 6.0), 5.0)?;
                Ok(setup)
            }
            BuiltinScenario::Intermediate => Self::scattered(rng, n_waypoints, 0, 0.0, 0.0),
            BuiltinScenario::Proficient => {
                Self::scattered(rng, n_waypoints, 2, 1.0 / 6.0, 5.0 / 6.0)
            }
            BuiltinScenario::Expert => Self::scattered(rng, n_waypoints, 5, 1.5 / 6.0, 5.0 / 6.0),
            BuiltinScenario::TestPath => {
                let waypoints = vec![
                    Vector3::new(0.0, 0.0, 0.0),
                    Vector3::new(10.0, 1.0, 0.0),
                    Vector3::new(20.0, 0.0, 0.0),
                    Vector3::new(70.0, 0.0, 0.0),
                ];
                let path = Path::new(&waypoints)?;
                let obstacles = vec![Obstacle::new(path.position_at(20.0), 10.0)];
                ScenarioSetup::new(waypoints, obstacles)
            }
            BuiltinScenario::Test => {
                let mut setup = BuiltinScenario::TestPath.generate(rng, n_waypoints)?;
                let path = Path::new(&setup.waypoints)?;
                setup
                    .obstacles
                    .push(Obstacle::new(path.position_at(path.length() / 2.0), 10.0));
                Ok(setup)
            }
            BuiltinScenario::HorizontalTest => {
                let waypoints = vec![
                    Vector3::new(0.0, 0.0, 0.0),
                    Vector3::new(50.0, 0.1, 0.0),
                    Vector3::new(100.0, 0.0, 0.0),
                ];
                let obstacles = (0..7)
                    .map(|i| Obstacle::new(Vector3::new(50.0, -30.0 + 10.0 * i as f64, 0.0), 5.0))
                    .collect();
                Ok(ScenarioSetup::new(waypoints, obstacles)?
                    .with_initial_position(Self::jittered_start(rng)))
            }
            BuiltinScenario::VerticalTest => {
                let waypoints = vec![
                    Vector3::new(0.0, 0.0, 0.0),
                    Vector3::new(50.0, 0.0, 1.0),
                    Vector3::new(100.0, 0.0, 0.0),
                ];
                let obstacles = (0..7)
                    .map(|i| Obstacle::new(Vector3::new(50.0, 0.0, -30.0 + 10.0 * i as f64), 5.0))
                    .collect();
                Ok(ScenarioSetup::new(waypoints, obstacles)?
                    .with_initial_position(Self::jittered_start(rng)))
            }
            BuiltinScenario::Deadend => {
                let waypoints = vec![
                    Vector3::new(0.0, 0.0, 0.0),
                    Vector3::new(50.0, 0.5, 0.0),
                    Vector3::new(100.0, 0.0, 0.0),
                ];
                let shell_radius = 10.0;
                let angles: Vec<f64> = (0..10)
                    .map(|k| (-90.0 + 180.0 * k as f64 / 9.0_f64).to_radians())
                    .collect();
                let obstacle_radius = (angles[1] - angles[0]) * shell_radius / 2.0;
                let mut obstacles = Vec::with_capacity(angles.len() * angles.len());
                for a1 in &angles {
                    for a2 in &angles {
                        let position = Vector3::new(
                            45.0 + shell_radius * a1.cos() * a2.cos(),
                            shell_radius * a1.cos() * a2.sin(),
                            -shell_radius * a1.sin(),
                        );
                        obstacles.push(Obstacle::new(position, obstacle_radius));
                    }
                }
                Ok(ScenarioSetup::new(waypoints, obstacles)?
                    .with_initial_position(Self::jittered_start(rng)))
            }
            BuiltinScenario::Crash => {
                let (mut setup, _) = Self::random_path(rng, 3, WaypointKind::Line)?;
                setup.obstacles.push(Obstacle::new(setup.waypoints[1], 20.0));
                Ok(setup)
            }
        }
    }
}
