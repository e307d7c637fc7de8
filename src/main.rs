use log::{error, info};
use quad_pathfollow::{ssa, Config, QuadEnv, SimulationError, TerminationReason};
use rayon::prelude::*;

const EPISODES: u64 = 8;
const YAW_GAIN: f64 = 2.0;

/// Outcome of one scripted episode
struct EpisodeSummary {
    seed: u64,
    steps: usize,
    cumulative_reward: f64,
    termination: Option<TerminationReason>,
}

/// Flies towards the lookahead point at full speed, turning and climbing onto it
fn pursuit_action(env: &mut QuadEnv) -> [f64; 3] {
    let i_max = env.config().controller.i_max;
    let r_max = env.config().controller.r_max;
    let position = env.state().position;
    let heading = env.state().heading();
    let Some(target) = env.lookahead_point() else {
        return [-1.0, 0.0, 0.0];
    };
    let delta = target - position;
    let inclination = delta.z.atan2(delta.xy().norm());
    let yaw_error = ssa(delta.y.atan2(delta.x) - heading);
    [
        1.0,
        (inclination / i_max).clamp(-1.0, 1.0),
        (YAW_GAIN * yaw_error / r_max).clamp(-1.0, 1.0),
    ]
}

fn run_episode(config: Config, scenario: &str, seed: u64) -> Result<EpisodeSummary, SimulationError> {
    let mut env = QuadEnv::new(config)?;
    env.reset(Some(seed), scenario)?;
    loop {
        let action = pursuit_action(&mut env);
        let result = env.step(action)?;
        if result.terminated {
            return Ok(EpisodeSummary {
                seed,
                steps: result.info.env_steps,
                cumulative_reward: result.info.cumulative_reward,
                termination: result.info.termination,
            });
        }
    }
}

fn main() -> Result<(), SimulationError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "config/quad.yaml".to_string());
    let scenario = args.next().unwrap_or_else(|| "3d".to_string());
    let config = Config::from_yaml(&config_path)?;
    info!(
        "Running {} episodes of scenario {} with {}",
        EPISODES, scenario, config_path
    );
    let summaries: Vec<Result<EpisodeSummary, SimulationError>> = (0..EPISODES)
        .into_par_iter()
        .map(|seed| run_episode(config.clone(), &scenario, seed))
        .collect();
    let mut successes = 0;
    for summary in summaries {
        match summary {
            Ok(summary) => {
                if summary.termination == Some(TerminationReason::Success) {
                    successes += 1;
                }
                info!(
                    "Seed {}: {} after {} steps, reward {:.2}",
                    summary.seed,
                    summary
                        .termination
                        .map_or("running".to_string(), |reason| reason.to_string()),
                    summary.steps,
                    summary.cumulative_reward
                );
            }
            Err(e) => error!("Episode failed: {}", e),
        }
    }
    info!("{} of {} episodes reached the end of the path", successes, EPISODES);
    Ok(())
}
