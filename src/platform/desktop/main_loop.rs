use std::{collections::HashMap, str::FromStr, time::Instant};

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
    equation_of_state::{EquationOfStateTrait, EQUATION_OF_STATE_NAMES},
    errors::{ConfigurationError, SceneError},
    floating_type_mod::FT,
    scene::{build_scene, SceneConfig},
    simulation_parameters::SimulationConfig,
    sph_kernels::{DimensionUtils, DimensionUtils2d, DimensionUtils3d, KernelTrait, KERNEL_NAMES},
    FluidSimulation,
};

use super::logging::init_tracing;

const CARGO_PKG_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
const CARGO_PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

#[derive(Error, Debug)]
pub enum RunError {
    #[error("missing argument {0}")]
    MissingArgument(&'static str),
    #[error("invalid value `{value}` for {name}")]
    InvalidArgument { name: &'static str, value: String },
    #[error("failed reading `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed parsing `{path}`: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("simulation config `{0}` is not a mapping")]
    ConfigNotAMapping(String),
    #[error("not able to find attribute `{0}` in the simulation config")]
    UnknownOverride(String),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error("failed to set up worker threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("simulation state became non-finite in step {step} (time {time})")]
    NonFiniteState { step: usize, time: f64 },
    #[error("failed formatting statistics")]
    Statistics(#[from] std::fmt::Error),
    #[error("failed writing statistics to `{path}`: {source}")]
    WriteStatistics {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default)]
struct RunOptions {
    steps: Option<usize>,
    max_seconds: Option<FT>,
    log_every: usize,
    statistics_enabled: bool,
    statistics_path: Option<String>,
}

pub fn start() {
    let matches = App::new("Leap-frog SPH Simulation")
        .version(CARGO_PKG_VERSION)
        .author(CARGO_PKG_AUTHORS)
        .about(CARGO_PKG_DESCRIPTION)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Run simulation with given config")
                .arg(
                    Arg::with_name("SIMULATION_CONFIG")
                        .help("Sets the simulation paramaters")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("SCENE_CONFIG")
                        .help("Scene setup")
                        .required(true)
                        .index(2),
                )
                .arg(
                    Arg::with_name("STEPS")
                        .long("steps")
                        .short("n")
                        .required(false)
                        .takes_value(true)
                        .help("Stop simulation after the given number of steps"),
                )
                .arg(
                    Arg::with_name("MAX_SECONDS")
                        .long("max-seconds")
                        .short("s")
                        .required(false)
                        .takes_value(true)
                        .help("Stop simulation after the given amount of simulated seconds"),
                )
                .arg(
                    Arg::with_name("OVERWRITE_CONFIG_FILE")
                        .long("overwrite-config-file")
                        .short("c")
                        .required(false)
                        .takes_value(true)
                        .help("Overwrite config"),
                )
                .arg(
                    Arg::with_name("THREADS")
                        .long("threads")
                        .short("t")
                        .required(false)
                        .takes_value(true)
                        .help("Number of worker threads (default: one per core)"),
                )
                .arg(
                    Arg::with_name("LOG_EVERY")
                        .long("log-every")
                        .short("l")
                        .required(false)
                        .takes_value(true)
                        .default_value("100")
                        .help("Log progress every N steps (0 disables progress logging)"),
                )
                .arg(
                    Arg::with_name("STATISTICS_ENABLED")
                        .help("Track performance of individual steps")
                        .short("p")
                        .long("statistics-enabled")
                        .takes_value(false),
                )
                .arg(
                    Arg::with_name("STATISTICS_PATH")
                        .long("statistics-path")
                        .short("w")
                        .required(false)
                        .takes_value(true)
                        .help("Where to write statistics to"),
                ),
        )
        .subcommand(SubCommand::with_name("strategies").about("List the available kernels and equations of state"))
        .get_matches();

    init_tracing(matches.occurrences_of("v"));

    if let Some(run_matches) = matches.subcommand_matches("run") {
        if let Err(err) = run(run_matches) {
            error!(%err, "simulation failed");
            std::process::exit(1);
        }
    } else if matches.subcommand_matches("strategies").is_some() {
        println!("kernels: {}", KERNEL_NAMES.join(", "));
        println!("equations of state: {}", EQUATION_OF_STATE_NAMES.join(", "));
    } else {
        unreachable!()
    }
}

fn required_arg<'a>(matches: &'a ArgMatches, name: &'static str) -> Result<&'a str, RunError> {
    matches.value_of(name).ok_or(RunError::MissingArgument(name))
}

fn parse_arg<T: FromStr>(matches: &ArgMatches, name: &'static str) -> Result<Option<T>, RunError> {
    matches
        .value_of(name)
        .map(|value| {
            value.parse::<T>().map_err(|_| RunError::InvalidArgument {
                name,
                value: value.to_string(),
            })
        })
        .transpose()
}

fn read_file(path: &str) -> Result<String, RunError> {
    std::fs::read_to_string(path).map_err(|source| RunError::Read {
        path: path.to_string(),
        source,
    })
}

fn parse_yaml<T: serde::de::DeserializeOwned>(path: &str, yaml: &str) -> Result<T, RunError> {
    serde_yaml::from_str(yaml).map_err(|source| RunError::Parse {
        path: path.to_string(),
        source,
    })
}

/// Replaces top-level attributes of `config`. Every overridden attribute has to exist already.
fn apply_overrides(
    config: &mut serde_yaml::Value,
    overrides: HashMap<String, serde_yaml::Value>,
    config_path: &str,
) -> Result<(), RunError> {
    let mapping = config
        .as_mapping_mut()
        .ok_or_else(|| RunError::ConfigNotAMapping(config_path.to_string()))?;
    for (k, v) in overrides.into_iter() {
        match mapping.get_mut(&serde_yaml::Value::String(k.clone())) {
            Some(entry) => *entry = v,
            None => return Err(RunError::UnknownOverride(k)),
        }
    }
    Ok(())
}

fn load_simulation_config(parameter_file: &str, overwrite_file: Option<&str>) -> Result<SimulationConfig, RunError> {
    let mut simulation_config_serde: serde_yaml::Value = parse_yaml(parameter_file, &read_file(parameter_file)?)?;

    if let Some(overwrite_file) = overwrite_file {
        let overwrite_config: HashMap<String, serde_yaml::Value> =
            parse_yaml(overwrite_file, &read_file(overwrite_file)?)?;
        apply_overrides(&mut simulation_config_serde, overwrite_config, parameter_file)?;
    }

    serde_yaml::from_value(simulation_config_serde).map_err(|source| RunError::Parse {
        path: parameter_file.to_string(),
        source,
    })
}

fn run(run_matches: &ArgMatches) -> Result<(), RunError> {
    let parameter_file = required_arg(run_matches, "SIMULATION_CONFIG")?;
    let simulation_config = load_simulation_config(parameter_file, run_matches.value_of("OVERWRITE_CONFIG_FILE"))?;
    debug!(?simulation_config, "loaded simulation config");

    let scene_config = SceneConfig::load(required_arg(run_matches, "SCENE_CONFIG")?)?;
    debug!(?scene_config, "loaded scene config");

    let options = RunOptions {
        steps: parse_arg(run_matches, "STEPS")?,
        max_seconds: parse_arg(run_matches, "MAX_SECONDS")?,
        log_every: parse_arg(run_matches, "LOG_EVERY")?.unwrap_or(0),
        statistics_enabled: run_matches.is_present("STATISTICS_ENABLED"),
        statistics_path: run_matches.value_of("STATISTICS_PATH").map(String::from),
    };

    if let Some(num_threads) = parse_arg::<usize>(run_matches, "THREADS")? {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()?;
    }
    info!(threads = rayon::current_num_threads(), "worker threads");

    match simulation_config.params.dimension {
        2 => run_simulation::<DimensionUtils2d, 2>(&simulation_config, &scene_config, &options).map(|_| ()),
        3 => run_simulation::<DimensionUtils3d, 3>(&simulation_config, &scene_config, &options).map(|_| ()),
        dimension => Err(ConfigurationError::UnsupportedDimension(dimension).into()),
    }
}

/// Absorbs rounding in `max_seconds / time_step` when the limit is a multiple of the time step.
const STEP_ROUNDING_TOLERANCE: FT = 1e-3;

/// Number of steps until the simulated time reaches `max_seconds`.
fn steps_for_simulated_time(max_seconds: FT, time_step: FT) -> usize {
    (max_seconds / time_step - STEP_ROUNDING_TOLERANCE).ceil().max(0.) as usize
}

fn run_simulation<DU: DimensionUtils<D>, const D: usize>(
    simulation_config: &SimulationConfig,
    scene_config: &SceneConfig,
    options: &RunOptions,
) -> Result<FluidSimulation<DU, D>, RunError> {
    let scene = build_scene::<D>(scene_config, &simulation_config.params)?;

    let mut fluid_simulation = FluidSimulation::<DU, D>::initialize(
        &simulation_config.kernel,
        &simulation_config.equation_of_state,
        simulation_config.params,
        scene.particles,
        scene.boundary_positions,
    )?;
    if options.statistics_enabled {
        fluid_simulation.enable_statistics();
    }

    info!(
        dimension = D,
        kernel = fluid_simulation.kernel().name(),
        equation_of_state = fluid_simulation.equation_of_state().name(),
        fluid_particles = fluid_simulation.num_fluid_particles(),
        boundary_particles = fluid_simulation.num_boundary_particles(),
        "starting simulation"
    );

    let time_step = simulation_config.params.time_step;
    let max_steps = [
        options.steps,
        options
            .max_seconds
            .map(|max_seconds| steps_for_simulated_time(max_seconds, time_step)),
    ]
    .into_iter()
    .flatten()
    .min();

    let started = Instant::now();
    loop {
        if let Some(max_steps) = max_steps {
            if fluid_simulation.step_number() >= max_steps {
                break;
            }
        }

        fluid_simulation.single_step();

        if fluid_simulation.has_non_finite_state() {
            return Err(RunError::NonFiniteState {
                step: fluid_simulation.step_number(),
                time: fluid_simulation.time() as f64,
            });
        }

        let step = fluid_simulation.step_number();
        if options.log_every > 0 && step % options.log_every == 0 {
            info!(
                step,
                time = fluid_simulation.time() as f64,
                max_speed = fluid_simulation.max_speed() as f64,
                msec_per_step = started.elapsed().as_secs_f64() * 1000. / step as f64,
                "progress"
            );
        }
    }

    info!(
        steps = fluid_simulation.step_number(),
        time = fluid_simulation.time() as f64,
        msecs = started.elapsed().as_secs_f64() * 1000.,
        "simulation finished"
    );

    if options.statistics_enabled {
        let s = fluid_simulation.write_statistics()?;
        print!("{}", s);
        if let Some(statistics_path) = &options.statistics_path {
            std::fs::write(statistics_path, s).map_err(|source| RunError::WriteStatistics {
                path: statistics_path.clone(),
                source,
            })?;
        }
    }

    Ok(fluid_simulation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{CloudConfig, ObstacleConfig};
    use crate::simulation_parameters::test_params;

    fn scene_file(name: &str) -> String {
        format!("{}/scenes/{}", env!("CARGO_MANIFEST_DIR"), name)
    }

    fn steps(steps: usize) -> RunOptions {
        RunOptions {
            steps: Some(steps),
            ..RunOptions::default()
        }
    }

    #[test]
    fn overrides_replace_existing_attributes() {
        let mut config: serde_yaml::Value = serde_yaml::from_str("time_step: 0.1\nkernel: SPLINE\n").unwrap();
        let overrides: HashMap<String, serde_yaml::Value> = serde_yaml::from_str("kernel: SPIKY").unwrap();
        apply_overrides(&mut config, overrides, "config.yaml").unwrap();
        assert_eq!(config["kernel"], serde_yaml::Value::from("SPIKY"));
        assert_eq!(config["time_step"], serde_yaml::Value::from(0.1));

        let overrides: HashMap<String, serde_yaml::Value> = serde_yaml::from_str("time_stepp: 0.2").unwrap();
        assert!(matches!(
            apply_overrides(&mut config, overrides, "config.yaml"),
            Err(RunError::UnknownOverride(k)) if k == "time_stepp"
        ));
    }

    #[test]
    fn override_file_is_merged() {
        let config = load_simulation_config(
            &scene_file("simulation_2d.yaml"),
            Some(&scene_file("stiff_fluid_override.yaml")),
        )
        .unwrap();
        assert_eq!(config.kernel, "SPLINE");
        assert_eq!(config.params.speed_of_sound, 3.0);
        assert_eq!(config.params.time_step, 0.0025);
        assert_eq!(config.params.smoothing_length, 0.06);
    }

    #[test]
    fn missing_config_file_is_reported() {
        let err = load_simulation_config("/nonexistent/simulation.yaml", None).unwrap_err();
        assert!(matches!(err, RunError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/simulation.yaml"));
    }

    #[test]
    fn sample_scene_2d_runs() {
        let config = load_simulation_config(&scene_file("simulation_2d.yaml"), None).unwrap();
        assert_eq!(config.params.dimension, 2);
        let scene_config = SceneConfig::load(scene_file("dam_break_2d.yaml")).unwrap();

        let simulation = run_simulation::<DimensionUtils2d, 2>(&config, &scene_config, &steps(5)).unwrap();
        assert_eq!(simulation.step_number(), 5);
        assert!(simulation.num_fluid_particles() > 0);
        assert!(simulation.num_boundary_particles() > 0);
    }

    #[test]
    fn sample_scene_3d_runs() {
        let config = load_simulation_config(&scene_file("simulation_3d.yaml"), None).unwrap();
        assert_eq!(config.params.dimension, 3);
        let scene_config = SceneConfig::load(scene_file("dam_break_3d.yaml")).unwrap();

        let simulation = run_simulation::<DimensionUtils3d, 3>(&config, &scene_config, &steps(2)).unwrap();
        assert_eq!(simulation.step_number(), 2);
        assert!(simulation.num_boundary_particles() > 0);
    }

    fn single_particle_config() -> (SimulationConfig, SceneConfig) {
        let simulation_config = SimulationConfig {
            kernel: "SPLINE".to_string(),
            equation_of_state: "BATCHELOR".to_string(),
            params: test_params(2),
        };
        // one fluid particle at (0.025, 0.025)
        let scene_config = SceneConfig {
            boundary_spacing: 0.05,
            clouds: vec![CloudConfig {
                origin: vec![0., 0.],
                edges: vec![vec![0.05, 0.], vec![0., 0.05]],
                velocity: None,
            }],
            obstacles: vec![],
        };
        (simulation_config, scene_config)
    }

    #[test]
    fn max_seconds_limits_simulated_time() {
        let (simulation_config, scene_config) = single_particle_config();
        let options = RunOptions {
            max_seconds: Some(2.5 * simulation_config.params.time_step),
            ..RunOptions::default()
        };
        let simulation = run_simulation::<DimensionUtils2d, 2>(&simulation_config, &scene_config, &options).unwrap();
        assert_eq!(simulation.num_fluid_particles(), 1);
        assert_eq!(simulation.step_number(), 3);
    }

    #[test]
    fn max_seconds_at_multiple_of_time_step() {
        let (simulation_config, scene_config) = single_particle_config();
        let time_step = simulation_config.params.time_step;
        for (max_seconds, expected_steps) in [(100. * time_step, 100), (1.0, 100), (0.3, 30), (0., 0)] {
            let options = RunOptions {
                max_seconds: Some(max_seconds),
                steps: Some(1000),
                ..RunOptions::default()
            };
            let simulation =
                run_simulation::<DimensionUtils2d, 2>(&simulation_config, &scene_config, &options).unwrap();
            assert_eq!(simulation.step_number(), expected_steps, "max_seconds={}", max_seconds);
        }

        assert_eq!(steps_for_simulated_time(0.3, 0.001), 300);
        assert_eq!(steps_for_simulated_time(0.0305, 0.01), 4);
    }

    #[test]
    fn non_finite_state_stops_the_run() {
        let (simulation_config, mut scene_config) = single_particle_config();
        // boundary sample at exactly the fluid particle position
        scene_config.obstacles.push(ObstacleConfig {
            vertices: vec![vec![0.025, 0.], vec![0.025, 0.05]],
        });

        let result = run_simulation::<DimensionUtils2d, 2>(&simulation_config, &scene_config, &steps(10));
        assert!(matches!(result, Err(RunError::NonFiniteState { step: 1, .. })));
    }

    #[test]
    fn unknown_strategy_fails_before_stepping() {
        let (mut simulation_config, scene_config) = single_particle_config();
        simulation_config.kernel = "POLY6".to_string();
        let result = run_simulation::<DimensionUtils2d, 2>(&simulation_config, &scene_config, &steps(1));
        assert!(matches!(
            result,
            Err(RunError::Configuration(ConfigurationError::UnknownKernel { .. }))
        ));
    }
}
