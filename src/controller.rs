use crate::config::{Config, ControllerConfig, QuadrotorConfig};
use crate::quadrotor::QuadrotorState;
use crate::{euler_rates_to_body, rzyx, vee, SimulationError};
use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};

/// Velocity and attitude controller on SO(3) mapping normalized actions to rotor thrusts
///
/// The action commands a speed, a velocity inclination and a yaw rate in the yaw-aligned
/// frame. A velocity loop produces the desired force, its direction fixes the desired roll
/// and pitch, and a geometric attitude loop produces the body torques.
pub struct GeometricController {
    /// Velocity error gain
    pub k_v: f64,
    /// Attitude error gain
    pub k_r: f64,
    /// Angular velocity error gain
    pub k_omega: f64,
    pub s_max: f64,
    pub i_max: f64,
    pub r_max: f64,
    pub mass: f64,
    pub gravity: f64,
    pub inertia_matrix: Matrix3<f64>,
    /// Inverse of the allocation matrix, maps `[thrust, tau]` to rotor thrusts
    pub allocation_matrix_inv: Matrix4<f64>,
    pub thrust_min: f64,
    pub thrust_max: f64,
}

/// Output of one controller evaluation
#[derive(Clone, Debug)]
pub struct ControlOutput {
    /// Rotor thrusts after saturation
    pub thrusts: Vector4<f64>,
    /// Commanded velocity in the yaw-aligned frame
    pub velocity_command: Vector3<f64>,
    pub yaw_rate_command: f64,
    pub collective_thrust: f64,
    pub torque: Vector3<f64>,
    /// Desired `(roll, pitch, yaw)`
    pub desired_attitude: Vector3<f64>,
}

impl GeometricController {
    /// Creates a new GeometricController
    /// # Errors
    /// * `Config` if the allocation matrix is singular
    /// * `NalgebraError` if the inertia matrix is malformed
    pub fn new(
        controller: &ControllerConfig,
        quadrotor: &QuadrotorConfig,
    ) -> Result<Self, SimulationError> {
        let allocation_matrix_inv = Matrix4::from_row_slice(&quadrotor.allocation_matrix)
            .try_inverse()
            .ok_or(SimulationError::Config(
                "quadrotor.allocation_matrix is singular".to_string(),
            ))?;
        Ok(Self {
            k_v: controller.k_v,
            k_r: controller.k_r,
            k_omega: controller.k_omega,
            s_max: controller.s_max,
            i_max: controller.i_max,
            r_max: controller.r_max,
            mass: quadrotor.mass,
            gravity: quadrotor.gravity,
            inertia_matrix: Matrix3::from_row_slice(&quadrotor.inertia_matrix),
            allocation_matrix_inv,
            thrust_min: quadrotor.thrust_min,
            thrust_max: quadrotor.thrust_max,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, SimulationError> {
        Self::new(&config.controller, &config.quadrotor)
    }

    /// Clips a policy action into `[-1, 1]`
    /// # Errors
    /// * `InvalidAction` if any component is NaN or infinite
    pub fn clip_action(action: &[f64; 3]) -> Result<[f64; 3], SimulationError> {
        if !action.iter().all(|a| a.is_finite()) {
            return Err(SimulationError::InvalidAction(format!("{:?}", action)));
        }
        Ok(action.map(|a| a.clamp(-1.0, 1.0)))
    }

    /// Velocity and yaw rate commanded by a clipped action
    pub fn commands(&self, action: &[f64; 3]) -> (Vector3<f64>, f64) {
        let speed = self.s_max * (action[0] + 1.0) / 2.0;
        let inclination = action[1] * self.i_max;
        let velocity_command = Vector3::new(speed * inclination.cos(), 0.0, speed * inclination.sin());
        (velocity_command, self.r_max * action[2])
    }

    /// Computes rotor thrusts for an action
    /// # Arguments
    /// * `action` - Normalized `[speed, inclination, yaw rate]`, clipped into `[-1, 1]`
    /// * `state` - Current vehicle state
    /// # Returns
    /// * The saturated rotor thrusts and the intermediate commands
    /// # Errors
    /// * `InvalidAction` if any action component is NaN or infinite
    pub fn compute(
        &self,
        action: &[f64; 3],
        state: &QuadrotorState,
    ) -> Result<ControlOutput, SimulationError> {
        let action = Self::clip_action(action)?;
        let (velocity_command, yaw_rate_command) = self.commands(&action);
        let (roll, pitch, yaw) = (state.roll(), state.pitch(), state.heading());

        let force = self.k_v * (velocity_command - state.velocity)
            + Vector3::new(0.0, 0.0, self.mass * self.gravity);
        // body z-axis in the yaw-aligned frame the force is expressed in
        let body_z = rzyx(roll, pitch, 0.0) * Vector3::z();
        let collective_thrust = force.dot(&body_z);

        let pitch_d = force.x.atan2(force.z);
        let roll_d = (-force.y).atan2((force.x * force.x + force.z * force.z).sqrt());
        let desired_rotation = rzyx(roll_d, pitch_d, yaw);
        let rotation = state.rotation();

        let angular_velocity_d =
            euler_rates_to_body(roll, pitch) * Vector3::new(0.0, 0.0, yaw_rate_command);
        let torque = self.attitude_torque(
            &rotation,
            &desired_rotation,
            &state.angular_velocity,
            &angular_velocity_d,
        );

        let wrench = Vector4::new(collective_thrust, torque.x, torque.y, torque.z);
        let thrusts = (self.allocation_matrix_inv * wrench)
            .map(|f| f.clamp(self.thrust_min, self.thrust_max));
        Ok(ControlOutput {
            thrusts,
            velocity_command,
            yaw_rate_command,
            collective_thrust,
            torque,
            desired_attitude: Vector3::new(roll_d, pitch_d, yaw),
        })
    }

    /// Geometric attitude law with gyroscopic compensation
    pub fn attitude_torque(
        &self,
        rotation: &Matrix3<f64>,
        desired_rotation: &Matrix3<f64>,
        angular_velocity: &Vector3<f64>,
        desired_angular_velocity: &Vector3<f64>,
    ) -> Vector3<f64> {
        let attitude_error = vee(
            &((desired_rotation.transpose() * rotation - rotation.transpose() * desired_rotation)
                * 0.5),
        );
        let angular_velocity_error = angular_velocity
            - rotation.transpose() * desired_rotation * desired_angular_velocity;
        -self.k_r * attitude_error - self.k_omega * angular_velocity_error
            + angular_velocity.cross(&(self.inertia_matrix * angular_velocity))
    }
}
