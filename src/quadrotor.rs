use crate::config::{Config, ImuConfig, IntegratorKind, QuadrotorConfig};
use crate::{rzyx, ssa, tzyx, SimulationError};
use nalgebra::{Matrix3, Matrix4, SVector, Vector3, Vector4};
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Packed state `[position, attitude, body velocity, body angular velocity]`
pub type StateVector = SVector<f64, 12>;

/// Kinematic state of the quadrotor
#[derive(Clone, Debug, PartialEq)]
pub struct QuadrotorState {
    /// World position (ENU, z up)
    pub position: Vector3<f64>,
    /// ZYX Euler angles `(roll, pitch, yaw)`
    pub attitude: Vector3<f64>,
    /// Linear velocity in the body frame
    pub velocity: Vector3<f64>,
    /// Angular velocity in the body frame
    pub angular_velocity: Vector3<f64>,
}

impl QuadrotorState {
    /// State at rest with the given position and attitude
    pub fn new(position: Vector3<f64>, attitude: Vector3<f64>) -> Self {
        Self {
            position,
            attitude,
            velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
        }
    }

    pub fn to_vector(&self) -> StateVector {
        let mut x = StateVector::zeros();
        x.fixed_rows_mut::<3>(0).copy_from(&self.position);
        x.fixed_rows_mut::<3>(3).copy_from(&self.attitude);
        x.fixed_rows_mut::<3>(6).copy_from(&self.velocity);
        x.fixed_rows_mut::<3>(9).copy_from(&self.angular_velocity);
        x
    }

    pub fn from_vector(x: &StateVector) -> Self {
        Self {
            position: x.fixed_rows::<3>(0).into_owned(),
            attitude: x.fixed_rows::<3>(3).into_owned(),
            velocity: x.fixed_rows::<3>(6).into_owned(),
            angular_velocity: x.fixed_rows::<3>(9).into_owned(),
        }
    }

    pub fn roll(&self) -> f64 {
        self.attitude.x
    }

    pub fn pitch(&self) -> f64 {
        self.attitude.y
    }

    pub fn heading(&self) -> f64 {
        self.attitude.z
    }

    /// Body to world rotation
    pub fn rotation(&self) -> Matrix3<f64> {
        rzyx(self.attitude.x, self.attitude.y, self.attitude.z)
    }

    pub fn world_velocity(&self) -> Vector3<f64> {
        self.rotation() * self.velocity
    }

    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }

    /// Course angle of the world velocity in `(-pi, pi]`
    pub fn course(&self) -> f64 {
        let velocity = self.world_velocity();
        ssa(velocity.y.atan2(velocity.x))
    }

    /// Elevation angle of the world velocity, positive when climbing
    pub fn elevation(&self) -> f64 {
        let velocity = self.world_velocity();
        velocity.z.atan2(velocity.xy().norm())
    }

    pub fn is_finite(&self) -> bool {
        self.to_vector().iter().all(|v| v.is_finite())
    }
}

/// Rigid-body quadrotor driven by four rotor thrusts through an allocation matrix
pub struct Quadrotor {
    /// Current state, only mutated by [`Quadrotor::step`] and [`Quadrotor::reset`]
    pub state: QuadrotorState,
    /// Mass of the quadrotor in kg
    pub mass: f64,
    /// Gravitational acceleration in m/s^2
    pub gravity: f64,
    /// Quadratic drag coefficient
    pub drag_coefficient: f64,
    /// Inertia matrix of the quadrotor
    pub inertia_matrix: Matrix3<f64>,
    /// Inverse of the inertia matrix
    pub inertia_matrix_inv: Matrix3<f64>,
    /// Maps rotor thrusts to `[thrust, tau_x, tau_y, tau_z]`
    pub allocation_matrix: Matrix4<f64>,
    /// Simulation time step in seconds
    pub time_step: f64,
    pub integrator: IntegratorKind,
    last_acceleration: Vector3<f64>,
    last_thrusts: Vector4<f64>,
}

impl Quadrotor {
    /// Creates a new Quadrotor at rest at the origin
    /// # Arguments
    /// * `config` - Physical parameters of the quadrotor
    /// * `time_step` - The simulation time step in seconds
    /// * `integrator` - Fixed-step integration scheme
    /// # Returns
    /// * A new Quadrotor instance
    /// # Errors
    /// * Returns a SimulationError if the inertia matrix cannot be inverted
    pub fn new(
        config: &QuadrotorConfig,
        time_step: f64,
        integrator: IntegratorKind,
    ) -> Result<Self, SimulationError> {
        let inertia_matrix = Matrix3::from_row_slice(&config.inertia_matrix);
        let inertia_matrix_inv =
            inertia_matrix
                .try_inverse()
                .ok_or(SimulationError::NalgebraError(
                    "Failed to invert inertia matrix".to_string(),
                ))?;
        Ok(Self {
            state: QuadrotorState::new(Vector3::zeros(), Vector3::zeros()),
            mass: config.mass,
            gravity: config.gravity,
            drag_coefficient: config.drag_coefficient,
            inertia_matrix,
            inertia_matrix_inv,
            allocation_matrix: Matrix4::from_row_slice(&config.allocation_matrix),
            time_step,
            integrator,
            last_acceleration: Vector3::zeros(),
            last_thrusts: Vector4::zeros(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, SimulationError> {
        Self::new(
            &config.quadrotor,
            config.simulation.step_size,
            config.simulation.integrator,
        )
    }

    /// Places the quadrotor in `state` and clears the recorded inputs
    pub fn reset(&mut self, state: QuadrotorState) {
        self.state = state;
        self.last_acceleration = Vector3::zeros();
        self.last_thrusts = Vector4::zeros();
    }

    /// Collective thrust and body torques produced by the rotor thrusts
    pub fn wrench(&self, thrusts: &Vector4<f64>) -> Vector4<f64> {
        self.allocation_matrix * thrusts
    }

    /// Time derivative of the packed state under a constant wrench
    pub fn state_derivative(&self, x: &StateVector, wrench: &Vector4<f64>) -> StateVector {
        let attitude = x.fixed_rows::<3>(3).into_owned();
        let velocity = x.fixed_rows::<3>(6).into_owned();
        let angular_velocity = x.fixed_rows::<3>(9).into_owned();
        let rotation = rzyx(attitude.x, attitude.y, attitude.z);

        let gravity_force = rotation.transpose() * Vector3::new(0.0, 0.0, -self.mass * self.gravity);
        let thrust_force = Vector3::new(0.0, 0.0, wrench[0]);
        let drag_force = -self.drag_coefficient * velocity.norm() * velocity;
        let velocity_dot = (gravity_force + thrust_force + drag_force) / self.mass
            - angular_velocity.cross(&velocity);

        let torque = Vector3::new(wrench[1], wrench[2], wrench[3]);
        let gyroscopic_torque = angular_velocity.cross(&(self.inertia_matrix * angular_velocity));
        let angular_acceleration = self.inertia_matrix_inv * (torque - gyroscopic_torque);

        let mut x_dot = StateVector::zeros();
        x_dot
            .fixed_rows_mut::<3>(0)
            .copy_from(&(rotation * velocity));
        x_dot
            .fixed_rows_mut::<3>(3)
            .copy_from(&(tzyx(attitude.x, attitude.y) * angular_velocity));
        x_dot.fixed_rows_mut::<3>(6).copy_from(&velocity_dot);
        x_dot.fixed_rows_mut::<3>(9).copy_from(&angular_acceleration);
        x_dot
    }

    /// Advances the dynamics by one time step with constant rotor thrusts
    /// # Arguments
    /// * `thrusts` - Thrust of each rotor in N
    /// # Errors
    /// * `InvalidActuation` if a thrust is NaN or infinite, the state is not touched
    /// * `Numerical` if integration produced a non-finite state, the state is not touched
    pub fn step(&mut self, thrusts: &Vector4<f64>) -> Result<(), SimulationError> {
        if !thrusts.iter().all(|f| f.is_finite()) {
            return Err(SimulationError::InvalidActuation(format!(
                "rotor thrusts {:?}",
                thrusts.as_slice()
            )));
        }
        let wrench = self.wrench(thrusts);
        let x = self.state.to_vector();
        let x_dot = self.state_derivative(&x, &wrench);
        let f = |_t: f64, x: &StateVector| self.state_derivative(x, &wrench);
        let mut next = match self.integrator {
            IntegratorKind::Euler => euler(&x, 0.0, self.time_step, f),
            IntegratorKind::Rk4 => rk4(&x, 0.0, self.time_step, f),
        };
        if !next.iter().all(|v| v.is_finite()) {
            return Err(SimulationError::Numerical(format!(
                "non-finite state after integrating rotor thrusts {:?}",
                thrusts.as_slice()
            )));
        }
        next[3] = ssa(next[3]);
        next[5] = ssa(next[5]);

        let velocity_dot: Vector3<f64> = x_dot.fixed_rows::<3>(6).into_owned();
        self.last_acceleration = velocity_dot + self.state.angular_velocity.cross(&self.state.velocity);
        self.last_thrusts = *thrusts;
        self.state = QuadrotorState::from_vector(&next);
        Ok(())
    }

    /// Body-frame kinematic acceleration `v_dot + omega x v` of the last step
    pub fn body_acceleration(&self) -> Vector3<f64> {
        self.last_acceleration
    }

    pub fn last_thrusts(&self) -> Vector4<f64> {
        self.last_thrusts
    }

    /// True IMU readings
    /// # Returns
    /// * A tuple containing the body acceleration and angular velocity of the quadrotor
    pub fn read_imu(&self) -> (Vector3<f64>, Vector3<f64>) {
        (self.last_acceleration, self.state.angular_velocity)
    }
}

/// Classic fourth-order Runge-Kutta step of `dx/dt = f(t, x)`
pub fn rk4<const N: usize, F>(x: &SVector<f64, N>, t: f64, dt: f64, f: F) -> SVector<f64, N>
where
    F: Fn(f64, &SVector<f64, N>) -> SVector<f64, N>,
{
    let k1 = f(t, x);
    let k2 = f(t + dt / 2.0, &(x + k1 * (dt / 2.0)));
    let k3 = f(t + dt / 2.0, &(x + k2 * (dt / 2.0)));
    let k4 = f(t + dt, &(x + k3 * dt));
    x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0)
}

/// Explicit Euler step of `dx/dt = f(t, x)`
pub fn euler<const N: usize, F>(x: &SVector<f64, N>, t: f64, dt: f64, f: F) -> SVector<f64, N>
where
    F: Fn(f64, &SVector<f64, N>) -> SVector<f64, N>,
{
    x + f(t, x) * dt
}

/// Represents an Inertial Measurement Unit (IMU) with bias and noise characteristics
pub struct Imu {
    /// Accelerometer bias
    pub accel_bias: Vector3<f64>,
    /// Gyroscope bias
    pub gyro_bias: Vector3<f64>,
    /// Standard deviation of accelerometer noise
    pub accel_noise_std: f64,
    /// Standard deviation of gyroscope noise
    pub gyro_noise_std: f64,
    /// Standard deviation of accelerometer bias drift
    pub accel_bias_std: f64,
    /// Standard deviation of gyroscope bias drift
    pub gyro_bias_std: f64,
}

impl Imu {
    /// Creates a new IMU with zero bias
    pub fn new(config: &ImuConfig) -> Self {
        Self {
            accel_bias: Vector3::zeros(),
            gyro_bias: Vector3::zeros(),
            accel_noise_std: config.accel_noise_std,
            gyro_noise_std: config.gyro_noise_std,
            accel_bias_std: config.accel_bias_std,
            gyro_bias_std: config.gyro_bias_std,
        }
    }

    pub fn reset(&mut self) {
        self.accel_bias = Vector3::zeros();
        self.gyro_bias = Vector3::zeros();
    }

    /// Random walk of the IMU biases over `dt`
    /// # Errors
    /// * Returns a SimulationError if a standard deviation is invalid
    pub fn update<R: Rng + ?Sized>(&mut self, dt: f64, rng: &mut R) -> Result<(), SimulationError> {
        let accel_drift = Normal::new(0.0, self.accel_bias_std * dt.sqrt())?;
        let gyro_drift = Normal::new(0.0, self.gyro_bias_std * dt.sqrt())?;
        self.accel_bias += sample_vector(&accel_drift, rng);
        self.gyro_bias += sample_vector(&gyro_drift, rng);
        Ok(())
    }

    /// Simulates IMU readings with added bias and noise
    /// # Arguments
    /// * `true_acceleration` - The true acceleration vector
    /// * `true_angular_velocity` - The true angular velocity vector
    /// * `rng` - Source of the measurement noise
    /// # Returns
    /// * A tuple containing the measured acceleration and angular velocity
    /// # Errors
    /// * Returns a SimulationError if a standard deviation is invalid
    pub fn read<R: Rng + ?Sized>(
        &self,
        true_acceleration: Vector3<f64>,
        true_angular_velocity: Vector3<f64>,
        rng: &mut R,
    ) -> Result<(Vector3<f64>, Vector3<f64>), SimulationError> {
        let accel_noise = Normal::new(0.0, self.accel_noise_std)?;
        let gyro_noise = Normal::new(0.0, self.gyro_noise_std)?;
        let measured_acceleration =
            true_acceleration + self.accel_bias + sample_vector(&accel_noise, rng);
        let measured_ang_velocity =
            true_angular_velocity + self.gyro_bias + sample_vector(&gyro_noise, rng);
        Ok((measured_acceleration, measured_ang_velocity))
    }
}

fn sample_vector<R: Rng + ?Sized>(distribution: &Normal<f64>, rng: &mut R) -> Vector3<f64> {
    Vector3::from_iterator((0..3).map(|_| distribution.sample(rng)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::reference_config;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn quadrotor(integrator: IntegratorKind) -> Quadrotor {
        let config = reference_config();
        Quadrotor::new(&config.quadrotor, config.simulation.step_size, integrator).unwrap()
    }

    fn hover_thrusts(quad: &Quadrotor) -> Vector4<f64> {
        Vector4::repeat(quad.mass * quad.gravity / 4.0)
    }

    #[test]
    fn hover_thrust_keeps_the_state() {
        for integrator in [IntegratorKind::Euler, IntegratorKind::Rk4] {
            let mut quad = quadrotor(integrator);
            quad.reset(QuadrotorState::new(
                Vector3::new(1.0, 2.0, 3.0),
                Vector3::new(0.0, 0.0, 0.7),
            ));
            let before = quad.state.clone();
            let thrusts = hover_thrusts(&quad);
            for _ in 0..100 {
                quad.step(&thrusts).unwrap();
            }
            assert_relative_eq!(quad.state.to_vector(), before.to_vector(), epsilon = 1e-9);
            assert_abs_diff_eq!(quad.body_acceleration().norm(), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn zero_thrust_falls_freely() {
        let mut quad = quadrotor(IntegratorKind::Rk4);
        quad.step(&Vector4::zeros()).unwrap();
        let dt = quad.time_step;
        assert_relative_eq!(quad.state.velocity.z, -quad.gravity * dt, epsilon = 1e-12);
        assert_relative_eq!(
            quad.state.position.z,
            -0.5 * quad.gravity * dt * dt,
            epsilon = 1e-12
        );
        assert_relative_eq!(quad.body_acceleration().z, -quad.gravity, epsilon = 1e-12);
    }

    #[test]
    fn differential_thrust_rolls_the_vehicle() {
        let mut quad = quadrotor(IntegratorKind::Rk4);
        let hover = hover_thrusts(&quad);
        let thrusts = hover + Vector4::new(-0.1, 0.1, 0.1, -0.1);
        let wrench = quad.wrench(&thrusts);
        assert_relative_eq!(wrench[0], quad.mass * quad.gravity, epsilon = 1e-12);
        assert!(wrench[1] > 0.0);
        assert_abs_diff_eq!(wrench[2], 0.0, epsilon = 1e-12);
        quad.step(&thrusts).unwrap();
        assert!(quad.state.angular_velocity.x > 0.0);
        assert!(quad.state.roll() > 0.0);
    }

    #[test]
    fn non_finite_thrust_is_rejected_without_touching_state() {
        let mut quad = quadrotor(IntegratorKind::Euler);
        let before = quad.state.clone();
        let result = quad.step(&Vector4::new(1.0, f64::NAN, 1.0, 1.0));
        assert!(matches!(result, Err(SimulationError::InvalidActuation(_))));
        assert_eq!(quad.state, before);
        let result = quad.step(&Vector4::new(1.0, 1.0, f64::INFINITY, 1.0));
        assert!(matches!(result, Err(SimulationError::InvalidActuation(_))));
    }

    #[test]
    fn overflowing_state_is_rejected_without_touching_state() {
        for integrator in [IntegratorKind::Euler, IntegratorKind::Rk4] {
            let mut quad = quadrotor(integrator);
            quad.state.velocity = Vector3::new(1e308, 0.0, 0.0);
            let before = quad.state.clone();
            let thrusts = hover_thrusts(&quad);
            let result = quad.step(&thrusts);
            assert!(matches!(result, Err(SimulationError::Numerical(_))));
            assert_eq!(quad.state, before);
            assert_eq!(quad.last_thrusts(), Vector4::zeros());
        }
    }

    #[test]
    fn yaw_is_wrapped_after_each_step() {
        let mut quad = quadrotor(IntegratorKind::Euler);
        let mut state = QuadrotorState::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 3.14));
        state.angular_velocity = Vector3::new(0.0, 0.0, 2.0);
        quad.reset(state);
        quad.step(&hover_thrusts(&quad)).unwrap();
        let yaw = quad.state.heading();
        assert!(yaw < 0.0 && yaw > -std::f64::consts::PI);
    }

    #[test]
    fn velocity_angles_are_world_frame() {
        let mut state = QuadrotorState::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 0.5));
        state.velocity = Vector3::new(2.0, 0.0, 0.0);
        assert_relative_eq!(state.course(), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(state.elevation(), 0.0, epsilon = 1e-12);
        state.velocity = Vector3::new(1.0, 0.0, 1.0);
        assert_relative_eq!(state.elevation(), std::f64::consts::FRAC_PI_4, epsilon = 1e-12);
        assert_relative_eq!(state.speed(), 2.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn singular_inertia_is_rejected() {
        let mut config = reference_config();
        config.quadrotor.inertia_matrix = [0.0; 9];
        assert!(matches!(
            Quadrotor::from_config(&config),
            Err(SimulationError::NalgebraError(_))
        ));
    }

    #[test]
    fn rk4_is_more_accurate_than_euler() {
        let decay = |_t: f64, x: &SVector<f64, 1>| -x;
        let (mut x_rk4, mut x_euler) = (SVector::<f64, 1>::new(1.0), SVector::<f64, 1>::new(1.0));
        for _ in 0..10 {
            x_rk4 = rk4(&x_rk4, 0.0, 0.1, decay);
            x_euler = euler(&x_euler, 0.0, 0.1, decay);
        }
        let exact = (-1.0_f64).exp();
        assert!((x_rk4[0] - exact).abs() < (x_euler[0] - exact).abs() / 100.0);
    }

    #[test]
    fn noiseless_imu_reads_true_values() {
        let mut imu = Imu::new(&ImuConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        imu.update(0.01, &mut rng).unwrap();
        let (acc, gyro) = imu
            .read(Vector3::new(1.0, 2.0, 3.0), Vector3::new(0.1, 0.2, 0.3), &mut rng)
            .unwrap();
        assert_eq!(acc, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(gyro, Vector3::new(0.1, 0.2, 0.3));
    }

    #[test]
    fn imu_bias_drifts_and_resets() {
        let config = ImuConfig {
            accel_noise_std: 0.0,
            gyro_noise_std: 0.0,
            accel_bias_std: 0.5,
            gyro_bias_std: 0.5,
        };
        let mut imu = Imu::new(&config);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..10 {
            imu.update(0.01, &mut rng).unwrap();
        }
        assert!(imu.accel_bias.norm() > 0.0);
        assert!(imu.gyro_bias.norm() > 0.0);
        imu.reset();
        assert_eq!(imu.accel_bias, Vector3::zeros());
    }
}
