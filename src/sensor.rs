//! Proximity sensing and collision detection
//!
//! Two interchangeable strategies sit behind [`ProximitySensor`]: an analytic ray-marching
//! sensor over the sphere obstacles and a rendered sensor that delegates to an external
//! [`RangeRenderer`] and [`CollisionChecker`]. [`SensorType`] selects one at construction.
use crate::config::{CameraConfig, Config, SensorConfig, SensorKind};
use crate::environment::Obstacle;
use crate::quadrotor::QuadrotorState;
use crate::{rzyx, SimulationError};
use nalgebra::{Matrix3, Vector3};

/// Trait defining the interface of proximity sensors
pub trait ProximitySensor {
    /// Prepares the sensor for a new episode and senses the initial pose
    /// # Arguments
    /// * `obstacles` - Static obstacles of the episode
    /// * `state` - Initial vehicle state
    /// # Errors
    /// * Returns a SimulationError if an external collaborator fails
    fn reset(
        &mut self,
        obstacles: &[Obstacle],
        state: &QuadrotorState,
    ) -> Result<(), SimulationError>;

    /// Senses the current pose, called once per environment step
    /// # Arguments
    /// * `obstacles` - Static obstacles of the episode
    /// * `state` - Current vehicle state
    /// * `displacement` - Vehicle displacement since the previous call
    /// # Errors
    /// * Returns a SimulationError if an external collaborator fails
    fn update(
        &mut self,
        obstacles: &[Obstacle],
        state: &QuadrotorState,
        displacement: &Vector3<f64>,
    ) -> Result<(), SimulationError>;

    /// Distance to the nearest sensed obstacle, the sensor range when nothing is sensed
    fn nearest_obstacle_distance(&self) -> f64;

    fn in_collision(&self) -> bool;

    /// Perception input for the policy, if the strategy produces one
    fn perception(&self) -> Option<Vec<f64>>;
}

/// Enum representing the available sensing strategies
pub enum SensorType {
    /// Ray marching against the sphere obstacles
    Analytic(RaySensor),
    /// Externally rendered range image with an external collision checker
    Rendered(RenderedSensor),
}

impl SensorType {
    /// Builds the strategy named in the configuration
    ///
    /// The rendered strategy is built with the reference [`SphereDepthCamera`] and
    /// [`SphereCollisionVolume`]; use [`RenderedSensor::new`] to plug in other collaborators.
    pub fn from_config(config: &Config) -> Self {
        match config.sensor.kind {
            SensorKind::Analytic => SensorType::Analytic(RaySensor::new(
                &config.sensor,
                config.quadrotor.safety_radius,
            )),
            SensorKind::Rendered => SensorType::Rendered(RenderedSensor::with_reference(
                &config.sensor,
                config.quadrotor.safety_radius,
            )),
        }
    }
}

impl ProximitySensor for SensorType {
    fn reset(
        &mut self,
        obstacles: &[Obstacle],
        state: &QuadrotorState,
    ) -> Result<(), SimulationError> {
        match self {
            SensorType::Analytic(s) => s.reset(obstacles, state),
            SensorType::Rendered(s) => s.reset(obstacles, state),
        }
    }

    fn update(
        &mut self,
        obstacles: &[Obstacle],
        state: &QuadrotorState,
        displacement: &Vector3<f64>,
    ) -> Result<(), SimulationError> {
        match self {
            SensorType::Analytic(s) => s.update(obstacles, state, displacement),
            SensorType::Rendered(s) => s.update(obstacles, state, displacement),
        }
    }

    fn nearest_obstacle_distance(&self) -> f64 {
        match self {
            SensorType::Analytic(s) => s.nearest_obstacle_distance(),
            SensorType::Rendered(s) => s.nearest_obstacle_distance(),
        }
    }

    fn in_collision(&self) -> bool {
        match self {
            SensorType::Analytic(s) => s.in_collision(),
            SensorType::Rendered(s) => s.in_collision(),
        }
    }

    fn perception(&self) -> Option<Vec<f64>> {
        match self {
            SensorType::Analytic(s) => s.perception(),
            SensorType::Rendered(s) => s.perception(),
        }
    }
}

/// Sonar-like sensor marching a grid of rays around the vehicle heading
pub struct RaySensor {
    /// Rays per row and column
    pub sensor_suite: (usize, usize),
    pub sonar_range: f64,
    pub ray_step: f64,
    pub safety_radius: f64,
    /// Horizontal and vertical half-window of the obstacle pre-filter (rad)
    window: (f64, f64),
    sectors_horizontal: Vec<f64>,
    sectors_vertical: Vec<f64>,
    /// Closeness grid, row `j` vertical and column `i` horizontal
    readings: Vec<f64>,
    nearby_obstacles: Vec<usize>,
    nearest_distance: f64,
    collided: bool,
}

impl RaySensor {
    pub fn new(config: &SensorConfig, safety_radius: f64) -> Self {
        let (n_h, n_v) = config.sensor_suite;
        let (span_h, span_v) = config.sensor_span;
        Self {
            sensor_suite: config.sensor_suite,
            sonar_range: config.sonar_range,
            ray_step: config.ray_step,
            safety_radius,
            window: (span_h.to_radians(), span_v.to_radians()),
            sectors_horizontal: linspace(span_h.to_radians() / 2.0, n_h),
            sectors_vertical: linspace(span_v.to_radians() / 2.0, n_v),
            readings: vec![0.0; n_h * n_v],
            nearby_obstacles: Vec::new(),
            nearest_distance: config.sonar_range,
            collided: false,
        }
    }

    /// Closeness in `[0, 1]` of the ray at horizontal sector `i` and vertical sector `j`
    pub fn reading(&self, i: usize, j: usize) -> f64 {
        self.readings[j * self.sensor_suite.0 + i]
    }

    pub fn readings(&self) -> &[f64] {
        &self.readings
    }

    /// Indices of the obstacles inside the sensor window, nearest first
    pub fn nearby_obstacles(&self) -> &[usize] {
        &self.nearby_obstacles
    }

    fn update_nearby_obstacles(&mut self, obstacles: &[Obstacle], state: &QuadrotorState) {
        let world_to_body = state.rotation().transpose();
        let mut nearby: Vec<(usize, f64)> = obstacles
            .iter()
            .enumerate()
            .filter_map(|(index, obstacle)| {
                let offset = obstacle.position - state.position;
                let distance = offset.norm();
                let offset_body = world_to_body * offset;
                let bearing = offset_body.y.atan2(offset_body.x);
                let elevation = offset_body.z.atan2(offset_body.xy().norm());
                let in_window = distance - self.safety_radius - obstacle.radius <= self.sonar_range
                    && bearing.abs() <= self.window.0
                    && elevation.abs() <= self.window.1;
                let in_contact = distance <= obstacle.radius + self.safety_radius;
                (in_window || in_contact).then_some((index, distance))
            })
            .collect();
        nearby.sort_by(|a, b| a.1.total_cmp(&b.1));
        self.nearby_obstacles = nearby.into_iter().map(|(index, _)| index).collect();
    }

    /// Marches a ray until it enters `obstacle`
    /// # Returns
    /// * The distance along the ray of the first sample inside the obstacle, if any
    fn march(&self, origin: &Vector3<f64>, direction: &Vector3<f64>, obstacle: &Obstacle) -> Option<f64> {
        let mut s = 0.0;
        while s < self.sonar_range {
            if (obstacle.position - (origin + direction * s)).norm() <= obstacle.radius {
                return Some(s);
            }
            s += self.ray_step;
        }
        None
    }

    fn sense(&mut self, obstacles: &[Obstacle], state: &QuadrotorState) {
        self.update_nearby_obstacles(obstacles, state);
        self.readings.iter_mut().for_each(|r| *r = 0.0);
        self.nearest_distance = self.sonar_range;
        let n_h = self.sensor_suite.0;
        for &index in &self.nearby_obstacles {
            let obstacle = &obstacles[index];
            for (i, horizontal) in self.sectors_horizontal.iter().enumerate() {
                let alpha = state.heading() + horizontal;
                for (j, vertical) in self.sectors_vertical.iter().enumerate() {
                    let beta = -state.pitch() + vertical;
                    let direction = Vector3::new(
                        alpha.cos() * beta.cos(),
                        alpha.sin() * beta.cos(),
                        beta.sin(),
                    );
                    if let Some(s) = self.march(&state.position, &direction, obstacle) {
                        let closeness = (1.0 - s / self.sonar_range).clamp(0.0, 1.0);
                        let cell = &mut self.readings[j * n_h + i];
                        *cell = cell.max(closeness);
                        self.nearest_distance = self.nearest_distance.min(s);
                    }
                }
            }
        }
        self.collided = obstacles.iter().any(|obstacle| {
            (obstacle.position - state.position).norm() <= obstacle.radius + self.safety_radius
        });
    }
}

impl ProximitySensor for RaySensor {
    fn reset(
        &mut self,
        obstacles: &[Obstacle],
        state: &QuadrotorState,
    ) -> Result<(), SimulationError> {
        self.sense(obstacles, state);
        Ok(())
    }

    fn update(
        &mut self,
        obstacles: &[Obstacle],
        state: &QuadrotorState,
        _displacement: &Vector3<f64>,
    ) -> Result<(), SimulationError> {
        self.sense(obstacles, state);
        Ok(())
    }

    fn nearest_obstacle_distance(&self) -> f64 {
        self.nearest_distance
    }

    fn in_collision(&self) -> bool {
        self.collided
    }

    fn perception(&self) -> Option<Vec<f64>> {
        None
    }
}

/// `n` evenly spaced values over `[-half_span, half_span]`
fn linspace(half_span: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![0.0];
    }
    (0..n)
        .map(|k| -half_span + 2.0 * half_span * k as f64 / (n - 1) as f64)
        .collect()
}

/// Row-major range image
#[derive(Clone, Debug, PartialEq)]
pub struct DepthImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f64>,
}

impl DepthImage {
    pub fn filled(width: usize, height: usize, value: f64) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }

    /// Smallest pixel value, infinite for an empty image
    pub fn min(&self) -> f64 {
        self.data.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Box-filter resample to `width` x `height`
    pub fn resized(&self, width: usize, height: usize) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for oy in 0..height {
            let y0 = oy * self.height / height;
            let y1 = ((oy + 1) * self.height / height).max(y0 + 1);
            for ox in 0..width {
                let x0 = ox * self.width / width;
                let x1 = ((ox + 1) * self.width / width).max(x0 + 1);
                let sum: f64 = (y0..y1)
                    .flat_map(|y| (x0..x1).map(move |x| (x, y)))
                    .map(|(x, y)| self.get(x, y))
                    .sum();
                data.push(sum / ((y1 - y0) * (x1 - x0)) as f64);
            }
        }
        Self { width, height, data }
    }
}

/// External renderer of range images
pub trait RangeRenderer {
    /// Replaces the rendered scene
    fn set_scene(&mut self, obstacles: &[Obstacle]) -> Result<(), SimulationError>;

    /// Renders the range image seen from `position` with ZYX `attitude`
    fn render(
        &mut self,
        position: &Vector3<f64>,
        attitude: &Vector3<f64>,
    ) -> Result<DepthImage, SimulationError>;
}

/// External collision checker holding a bounding volume of the vehicle
pub trait CollisionChecker {
    /// Places the bounding volume at `position` among `obstacles`
    fn reset(&mut self, obstacles: &[Obstacle], position: &Vector3<f64>) -> Result<(), SimulationError>;

    /// Moves the bounding volume by `displacement`
    fn translate(&mut self, displacement: &Vector3<f64>);

    fn in_collision(&self) -> Result<bool, SimulationError>;
}

/// Sensor built on a rendered range image
pub struct RenderedSensor {
    renderer: Box<dyn RangeRenderer + Send>,
    collision_checker: Box<dyn CollisionChecker + Send>,
    pub resolution: (usize, usize),
    pub max_depth: f64,
    pub compressed_size: usize,
    has_obstacles: bool,
    nearest_distance: f64,
    collided: bool,
    compressed: Vec<f64>,
}

impl RenderedSensor {
    pub fn new(
        camera: &CameraConfig,
        renderer: Box<dyn RangeRenderer + Send>,
        collision_checker: Box<dyn CollisionChecker + Send>,
    ) -> Self {
        Self {
            renderer,
            collision_checker,
            resolution: camera.resolution,
            max_depth: camera.max_depth,
            compressed_size: camera.compressed_size,
            has_obstacles: false,
            nearest_distance: camera.max_depth,
            collided: false,
            compressed: vec![1.0; camera.compressed_size * camera.compressed_size],
        }
    }

    /// Rendered sensor over the sphere obstacles themselves
    pub fn with_reference(config: &SensorConfig, safety_radius: f64) -> Self {
        Self::new(
            &config.camera,
            Box::new(SphereDepthCamera::new(&config.camera)),
            Box::new(SphereCollisionVolume::new(safety_radius)),
        )
    }

    fn sense(&mut self, state: &QuadrotorState) -> Result<(), SimulationError> {
        let (width, height) = self.resolution;
        let image = if self.has_obstacles {
            let image = self.renderer.render(&state.position, &state.attitude)?;
            if image.width * image.height != image.data.len() || image.data.is_empty() {
                return Err(SimulationError::Renderer(format!(
                    "range image of {} pixels does not match {}x{}",
                    image.data.len(),
                    image.width,
                    image.height
                )));
            }
            self.collided = self.collision_checker.in_collision()?;
            image
        } else {
            self.collided = false;
            DepthImage::filled(width, height, self.max_depth)
        };
        self.nearest_distance = image.min();
        let size = self.compressed_size;
        self.compressed = image
            .resized(size, size)
            .data
            .into_iter()
            .map(|range| (range / self.max_depth).clamp(0.0, 1.0))
            .collect();
        Ok(())
    }
}

impl ProximitySensor for RenderedSensor {
    fn reset(
        &mut self,
        obstacles: &[Obstacle],
        state: &QuadrotorState,
    ) -> Result<(), SimulationError> {
        self.has_obstacles = !obstacles.is_empty();
        if self.has_obstacles {
            self.renderer.set_scene(obstacles)?;
            self.collision_checker.reset(obstacles, &state.position)?;
        }
        self.sense(state)
    }

    fn update(
        &mut self,
        _obstacles: &[Obstacle],
        state: &QuadrotorState,
        displacement: &Vector3<f64>,
    ) -> Result<(), SimulationError> {
        if self.has_obstacles {
            self.collision_checker.translate(displacement);
        }
        self.sense(state)
    }

    fn nearest_obstacle_distance(&self) -> f64 {
        self.nearest_distance
    }

    fn in_collision(&self) -> bool {
        self.collided
    }

    fn perception(&self) -> Option<Vec<f64>> {
        Some(self.compressed.clone())
    }
}

/// Pinhole range camera looking along the body x-axis at a scene of spheres
pub struct SphereDepthCamera {
    /// The resolution of the camera
    pub resolution: (usize, usize),
    /// Horizontal field of view of the camera
    pub fov: f64,
    /// The near clipping plane of the camera
    pub near: f64,
    /// The far clipping plane of the camera
    pub far: f64,
    /// Unit ray direction of each pixel in the body frame
    pub ray_directions: Vec<Vector3<f64>>,
    obstacles: Vec<Obstacle>,
}

impl SphereDepthCamera {
    pub fn new(config: &CameraConfig) -> Self {
        let (width, height) = config.resolution;
        let (aspect_ratio, tan_half_fov) =
            (width as f64 / height as f64, (config.fov / 2.0).tan());
        let mut ray_directions = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let x_ndc = (2.0 * (x as f64 + 0.5) / width as f64 - 1.0) * tan_half_fov;
                let y_ndc =
                    (1.0 - 2.0 * (y as f64 + 0.5) / height as f64) * tan_half_fov / aspect_ratio;
                // image right is body -y
                ray_directions.push(Vector3::new(1.0, -x_ndc, y_ndc).normalize());
            }
        }
        Self {
            resolution: config.resolution,
            fov: config.fov,
            near: config.near,
            far: config.max_depth,
            ray_directions,
            obstacles: Vec::new(),
        }
    }

    /// Range along a unit ray to the closest sphere, clamped to the far plane
    pub fn ray_cast(&self, origin: &Vector3<f64>, direction: &Vector3<f64>) -> f64 {
        let mut closest_hit = self.far;
        for obstacle in &self.obstacles {
            let oc = origin - obstacle.position;
            let b = oc.dot(direction);
            let c = oc.dot(&oc) - obstacle.radius * obstacle.radius;
            if c <= 0.0 {
                return self.near;
            }
            let discriminant = b * b - c;
            if discriminant >= 0.0 {
                let t = -b - discriminant.sqrt();
                if t > self.near && t < closest_hit {
                    closest_hit = t;
                }
            }
        }
        closest_hit
    }
}

impl RangeRenderer for SphereDepthCamera {
    fn set_scene(&mut self, obstacles: &[Obstacle]) -> Result<(), SimulationError> {
        self.obstacles = obstacles.to_vec();
        Ok(())
    }

    fn render(
        &mut self,
        position: &Vector3<f64>,
        attitude: &Vector3<f64>,
    ) -> Result<DepthImage, SimulationError> {
        let body_to_world: Matrix3<f64> = rzyx(attitude.x, attitude.y, attitude.z);
        let (width, height) = self.resolution;
        let data = self
            .ray_directions
            .iter()
            .map(|direction| self.ray_cast(position, &(body_to_world * direction)))
            .collect();
        Ok(DepthImage {
            width,
            height,
            data,
        })
    }
}

/// Bounding sphere of the vehicle moved along with it
pub struct SphereCollisionVolume {
    pub radius: f64,
    pub center: Vector3<f64>,
    obstacles: Vec<Obstacle>,
}

impl SphereCollisionVolume {
    pub fn new(radius: f64) -> Self {
        Self {
            radius,
            center: Vector3::zeros(),
            obstacles: Vec::new(),
        }
    }
}

impl CollisionChecker for SphereCollisionVolume {
    fn reset(&mut self, obstacles: &[Obstacle], position: &Vector3<f64>) -> Result<(), SimulationError> {
        self.obstacles = obstacles.to_vec();
        self.center = *position;
        Ok(())
    }

    fn translate(&mut self, displacement: &Vector3<f64>) {
        self.center += displacement;
    }

    fn in_collision(&self) -> Result<bool, SimulationError> {
        Ok(self.obstacles.iter().any(|obstacle| {
            (obstacle.position - self.center).norm() <= obstacle.radius + self.radius
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::reference_config;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn ray_sensor() -> RaySensor {
        let config = reference_config();
        RaySensor::new(&config.sensor, config.quadrotor.safety_radius)
    }

    fn at(position: Vector3<f64>, yaw: f64) -> QuadrotorState {
        QuadrotorState::new(position, Vector3::new(0.0, 0.0, yaw))
    }

    struct FixedRenderer {
        image: DepthImage,
    }

    impl RangeRenderer for FixedRenderer {
        fn set_scene(&mut self, _obstacles: &[Obstacle]) -> Result<(), SimulationError> {
            Ok(())
        }

        fn render(
            &mut self,
            _position: &Vector3<f64>,
            _attitude: &Vector3<f64>,
        ) -> Result<DepthImage, SimulationError> {
            Ok(self.image.clone())
        }
    }

    struct FailingRenderer;

    impl RangeRenderer for FailingRenderer {
        fn set_scene(&mut self, _obstacles: &[Obstacle]) -> Result<(), SimulationError> {
            Err(SimulationError::Renderer("no scene expected".to_string()))
        }

        fn render(
            &mut self,
            _position: &Vector3<f64>,
            _attitude: &Vector3<f64>,
        ) -> Result<DepthImage, SimulationError> {
            Err(SimulationError::Renderer("no render expected".to_string()))
        }
    }

    #[test]
    fn empty_scene_senses_nothing() {
        let mut sensor = ray_sensor();
        sensor.reset(&[], &at(Vector3::zeros(), 0.0)).unwrap();
        assert_eq!(sensor.nearest_obstacle_distance(), sensor.sonar_range);
        assert!(!sensor.in_collision());
        assert!(sensor.readings().iter().all(|r| *r == 0.0));
        assert!(sensor.perception().is_none());
    }

    #[test]
    fn obstacle_ahead_is_hit_by_center_ray() {
        let mut sensor = ray_sensor();
        let obstacles = [Obstacle::new(Vector3::new(10.0, 0.0, 0.0), 2.0)];
        sensor.reset(&obstacles, &at(Vector3::zeros(), 0.0)).unwrap();
        assert_relative_eq!(sensor.nearest_obstacle_distance(), 8.0, epsilon = 1e-12);
        assert_relative_eq!(sensor.reading(7, 7), 1.0 - 8.0 / 25.0, epsilon = 1e-12);
        assert_eq!(sensor.reading(0, 0), 0.0);
        assert!(!sensor.in_collision());
    }

    #[test]
    fn rays_follow_the_heading() {
        let mut sensor = ray_sensor();
        let obstacles = [Obstacle::new(Vector3::new(0.0, 10.0, 0.0), 2.0)];
        sensor.reset(&obstacles, &at(Vector3::zeros(), std::f64::consts::FRAC_PI_2)).unwrap();
        assert_relative_eq!(sensor.nearest_obstacle_distance(), 8.0, epsilon = 1e-9);
        assert_eq!(sensor.nearby_obstacles(), &[0]);
    }

    #[test]
    fn obstacle_behind_is_outside_the_window() {
        let mut sensor = ray_sensor();
        let obstacles = [Obstacle::new(Vector3::new(-10.0, 0.0, 0.0), 2.0)];
        sensor.reset(&obstacles, &at(Vector3::zeros(), 0.0)).unwrap();
        assert!(sensor.nearby_obstacles().is_empty());
        assert_eq!(sensor.nearest_obstacle_distance(), sensor.sonar_range);
    }

    #[test]
    fn collision_includes_the_boundary() {
        let mut sensor = ray_sensor();
        let obstacles = [Obstacle::new(Vector3::new(6.0, 0.0, 0.0), 5.0)];
        sensor.reset(&obstacles, &at(Vector3::zeros(), 0.0)).unwrap();
        assert!(sensor.in_collision());
        sensor
            .update(&obstacles, &at(Vector3::new(-0.01, 0.0, 0.0), 0.0), &Vector3::zeros())
            .unwrap();
        assert!(!sensor.in_collision());
    }

    #[test]
    fn rendered_sensor_skips_collaborators_without_obstacles() {
        let config = reference_config();
        let mut sensor = RenderedSensor::new(
            &config.sensor.camera,
            Box::new(FailingRenderer),
            Box::new(SphereCollisionVolume::new(1.0)),
        );
        let state = at(Vector3::zeros(), 0.0);
        sensor.reset(&[], &state).unwrap();
        sensor.update(&[], &state, &Vector3::new(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(sensor.nearest_obstacle_distance(), config.sensor.camera.max_depth);
        assert!(!sensor.in_collision());
        let perception = sensor.perception().unwrap();
        assert_eq!(perception.len(), 64 * 64);
        assert!(perception.iter().all(|p| *p == 1.0));
    }

    #[test]
    fn rendered_sensor_normalizes_and_compresses() {
        let mut config = reference_config().sensor.camera;
        config.resolution = (4, 4);
        config.compressed_size = 2;
        let mut image = DepthImage::filled(4, 4, 20.0);
        image.data[0] = 2.0;
        image.data[1] = 4.0;
        image.data[4] = 6.0;
        image.data[5] = 8.0;
        let mut sensor = RenderedSensor::new(
            &config,
            Box::new(FixedRenderer { image }),
            Box::new(SphereCollisionVolume::new(1.0)),
        );
        let obstacles = [Obstacle::new(Vector3::new(50.0, 0.0, 0.0), 1.0)];
        sensor.reset(&obstacles, &at(Vector3::zeros(), 0.0)).unwrap();
        assert_eq!(sensor.nearest_obstacle_distance(), 2.0);
        assert_eq!(sensor.perception().unwrap(), vec![0.5, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn renderer_errors_propagate() {
        let config = reference_config();
        let mut sensor = RenderedSensor::new(
            &config.sensor.camera,
            Box::new(FailingRenderer),
            Box::new(SphereCollisionVolume::new(1.0)),
        );
        let obstacles = [Obstacle::new(Vector3::new(50.0, 0.0, 0.0), 1.0)];
        assert!(matches!(
            sensor.reset(&obstacles, &at(Vector3::zeros(), 0.0)),
            Err(SimulationError::Renderer(_))
        ));
    }

    #[test]
    fn sphere_camera_sees_obstacle_ahead() {
        let config = reference_config();
        let mut camera = SphereDepthCamera::new(&config.sensor.camera);
        camera
            .set_scene(&[Obstacle::new(Vector3::new(5.0, 0.0, 0.0), 1.0)])
            .unwrap();
        let image = camera.render(&Vector3::zeros(), &Vector3::zeros()).unwrap();
        assert_abs_diff_eq!(image.min(), 4.0, epsilon = 0.01);
        assert_eq!(image.get(0, 0), config.sensor.camera.max_depth);

        let behind = camera
            .render(&Vector3::zeros(), &Vector3::new(0.0, 0.0, std::f64::consts::PI))
            .unwrap();
        assert_eq!(behind.min(), config.sensor.camera.max_depth);
    }

    #[test]
    fn collision_volume_follows_displacements() {
        let mut volume = SphereCollisionVolume::new(1.0);
        volume
            .reset(&[Obstacle::new(Vector3::new(10.0, 0.0, 0.0), 5.0)], &Vector3::zeros())
            .unwrap();
        assert!(!volume.in_collision().unwrap());
        volume.translate(&Vector3::new(4.0, 0.0, 0.0));
        assert!(volume.in_collision().unwrap());
    }

    #[test]
    fn resize_averages_boxes() {
        let image = DepthImage {
            width: 2,
            height: 2,
            data: vec![1.0, 3.0, 5.0, 7.0],
        };
        assert_eq!(image.resized(1, 1).data, vec![4.0]);
        assert_eq!(image.resized(4, 4).get(3, 3), 7.0);
    }
}
