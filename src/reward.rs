use crate::config::RewardConfig;
use serde::Serialize;

/// Quantities of one step the reward is computed from
#[derive(Clone, Debug, Default)]
pub struct RewardInputs {
    /// Distance from the vehicle to its projection on the path
    pub path_distance: f64,
    pub course_error: f64,
    pub elevation_error: f64,
    pub speed: f64,
    pub nearest_obstacle_distance: f64,
    pub has_obstacles: bool,
    pub collided: bool,
    pub reached_end: bool,
}

/// Named reward terms of one step
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RewardBreakdown {
    pub reward: f64,
    /// Adherence term already weighted by `lambda_path_adherence`
    pub path_adherence: f64,
    pub path_progression: f64,
    /// Avoidance term already weighted by `lambda_collision_avoidance`
    pub collision_avoidance_reward: f64,
    pub collision_reward: f64,
    pub reach_end_reward: f64,
    pub existence_reward: f64,
    pub lambda_path_adherence: f64,
    pub lambda_collision_avoidance: f64,
}

/// Shaped reward trading path adherence against obstacle avoidance
pub struct RewardModel {
    pub config: RewardConfig,
}

impl RewardModel {
    pub fn new(config: &RewardConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// `scale` on the path, falling linearly to `-scale` at the band edge and beyond
    pub fn path_adherence(&self, path_distance: f64) -> f64 {
        let band = self.config.pa_band_edge;
        -(2.0 * path_distance.clamp(0.0, band) / band - 1.0) * self.config.pa_scale
    }

    pub fn path_progression(&self, course_error: f64, elevation_error: f64, speed: f64) -> f64 {
        let alignment = (course_error.cos() + elevation_error.cos()) / 2.0;
        (alignment * speed * self.config.pp_vel_scale)
            .clamp(self.config.pp_rew_min, self.config.pp_rew_max)
    }

    /// Inverse-distance penalty, zero at the danger range
    pub fn collision_avoidance(&self, obstacle_distance: f64) -> f64 {
        let danger = self.config.danger_range;
        let k = self.config.abs_inv_ca_min_rew;
        let penalty = -((danger + k * danger) / (obstacle_distance + k * danger) - 1.0);
        penalty.min(0.0)
    }

    /// Weights of the adherence and avoidance terms
    pub fn blend(&self, obstacle_distance: f64, has_obstacles: bool) -> (f64, f64) {
        let danger = self.config.danger_range;
        if has_obstacles && obstacle_distance < danger {
            let lambda_pa = (obstacle_distance / danger / 2.0).max(0.10);
            (lambda_pa, 1.0 - lambda_pa)
        } else {
            (1.0, 0.0)
        }
    }

    /// Evaluates every reward term of one step
    /// # Arguments
    /// * `inputs` - Path, guidance, sensing and termination quantities of the step
    /// # Returns
    /// * The breakdown of the step reward, `reward` holding the total
    pub fn evaluate(&self, inputs: &RewardInputs) -> RewardBreakdown {
        let (lambda_pa, lambda_ca) =
            self.blend(inputs.nearest_obstacle_distance, inputs.has_obstacles);
        let avoidance = if inputs.has_obstacles
            && inputs.nearest_obstacle_distance < self.config.danger_range
        {
            self.collision_avoidance(inputs.nearest_obstacle_distance)
        } else {
            0.0
        };
        let path_adherence = self.path_adherence(inputs.path_distance) * lambda_pa;
        let collision_avoidance_reward = avoidance * lambda_ca;
        let path_progression =
            self.path_progression(inputs.course_error, inputs.elevation_error, inputs.speed);
        let collision_reward = if inputs.collided {
            self.config.rew_collision
        } else {
            0.0
        };
        let reach_end_reward = if inputs.reached_end {
            self.config.rew_reach_end
        } else {
            0.0
        };
        let existence_reward = self.config.existence_reward;
        RewardBreakdown {
            reward: path_adherence
                + collision_avoidance_reward
                + collision_reward
                + path_progression
                + reach_end_reward
                + existence_reward,
            path_adherence,
            path_progression,
            collision_avoidance_reward,
            collision_reward,
            reach_end_reward,
            existence_reward,
            lambda_path_adherence: lambda_pa,
            lambda_collision_avoidance: lambda_ca,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::reference_config;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn model() -> RewardModel {
        RewardModel::new(&reference_config().reward)
    }

    #[test]
    fn adherence_is_bounded_by_the_scale() {
        let model = model();
        let scale = model.config.pa_scale;
        assert_relative_eq!(model.path_adherence(0.0), scale);
        assert_abs_diff_eq!(model.path_adherence(model.config.pa_band_edge / 2.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(model.path_adherence(model.config.pa_band_edge), -scale);
        assert_relative_eq!(model.path_adherence(1e6), -scale);
        for i in 0..100 {
            let value = model.path_adherence(i as f64 * 0.1);
            assert!(value <= scale && value >= -scale);
        }
    }

    #[test]
    fn avoidance_vanishes_outside_the_danger_range() {
        let model = model();
        let inputs = RewardInputs {
            nearest_obstacle_distance: model.config.danger_range + 1.0,
            has_obstacles: true,
            ..Default::default()
        };
        let breakdown = model.evaluate(&inputs);
        assert_eq!(breakdown.collision_avoidance_reward, 0.0);
        assert_eq!(breakdown.lambda_path_adherence, 1.0);
        assert_eq!(breakdown.lambda_collision_avoidance, 0.0);
        assert_abs_diff_eq!(model.collision_avoidance(model.config.danger_range), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn avoidance_dominates_close_to_obstacles() {
        let model = model();
        let danger = model.config.danger_range;
        let k = model.config.abs_inv_ca_min_rew;
        let inputs = RewardInputs {
            path_distance: 0.0,
            nearest_obstacle_distance: danger / 2.0,
            has_obstacles: true,
            ..Default::default()
        };
        let breakdown = model.evaluate(&inputs);
        assert_relative_eq!(breakdown.lambda_path_adherence, 0.25);
        assert_relative_eq!(breakdown.lambda_collision_avoidance, 0.75);
        let expected = -((danger + k * danger) / (danger / 2.0 + k * danger) - 1.0) * 0.75;
        assert_relative_eq!(breakdown.collision_avoidance_reward, expected, epsilon = 1e-12);
        assert_relative_eq!(breakdown.path_adherence, model.config.pa_scale * 0.25, epsilon = 1e-12);

        let touching = model.blend(0.0, true);
        assert_relative_eq!(touching.0, 0.10);
        assert_relative_eq!(model.collision_avoidance(0.0), -1.0 / k, epsilon = 1e-9);
    }

    #[test]
    fn no_obstacles_means_pure_path_following() {
        let model = model();
        let inputs = RewardInputs {
            nearest_obstacle_distance: 0.5,
            has_obstacles: false,
            ..Default::default()
        };
        let breakdown = model.evaluate(&inputs);
        assert_eq!(breakdown.collision_avoidance_reward, 0.0);
        assert_eq!(breakdown.lambda_path_adherence, 1.0);
    }

    #[test]
    fn progression_rewards_aligned_speed() {
        let model = model();
        assert_relative_eq!(
            model.path_progression(0.0, 0.0, 2.0),
            2.0 * model.config.pp_vel_scale
        );
        assert_relative_eq!(model.path_progression(0.0, 0.0, 100.0), model.config.pp_rew_max);
        assert_relative_eq!(
            model.path_progression(std::f64::consts::PI, std::f64::consts::PI, 100.0),
            model.config.pp_rew_min
        );
    }

    #[test]
    fn total_sums_the_terms() {
        let model = model();
        let inputs = RewardInputs {
            path_distance: 1.0,
            course_error: 0.2,
            elevation_error: -0.1,
            speed: 1.5,
            nearest_obstacle_distance: 4.0,
            has_obstacles: true,
            collided: true,
            reached_end: false,
        };
        let b = model.evaluate(&inputs);
        assert_eq!(b.collision_reward, model.config.rew_collision);
        assert_eq!(b.reach_end_reward, 0.0);
        assert_eq!(b.existence_reward, model.config.existence_reward);
        assert_relative_eq!(
            b.reward,
            b.path_adherence
                + b.collision_avoidance_reward
                + b.collision_reward
                + b.path_progression
                + b.reach_end_reward
                + b.existence_reward,
            epsilon = 1e-12
        );
    }
}
