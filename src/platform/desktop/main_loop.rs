use std::{error::Error, path::Path};

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::{error, info, LevelFilter};

use crate::{
    error::{ConfigError, ConfigResult},
    parameters::{ParameterAssignments, ParameterTable},
    scene::{init_fluid_model, SceneConfig},
    simulation_parameters::{read_yaml_file, SimulationParams},
    sph_kernels::{CubicKernel, KernelType, SphKernel, WendlandQuinticC2Kernel},
    FluidModel, NonPressureForce, TimeManager, ViscosityWeiler2018,
};

const CARGO_PKG_AUTHORS: &'static str = env!("CARGO_PKG_AUTHORS");
const CARGO_PKG_VERSION: &'static str = env!("CARGO_PKG_VERSION");
const CARGO_PKG_DESCRIPTION: &'static str = env!("CARGO_PKG_DESCRIPTION");

const DEFAULT_STEPS: usize = 100;

fn init_logger(verbosity: u64) {
    let level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.as_str())).init();
}

pub fn start() {
    let matches = App::new("Implicit SPH Viscosity")
        .version(CARGO_PKG_VERSION)
        .author(CARGO_PKG_AUTHORS)
        .about(CARGO_PKG_DESCRIPTION)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .global(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Run viscosity steps for the given simulation and scene config")
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
                        .takes_value(true)
                        .help("Number of time steps"),
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
                    Arg::with_name("SET")
                        .long("set")
                        .takes_value(true)
                        .multiple(true)
                        .number_of_values(1)
                        .help("Sets a solver parameter, e.g. --set viscoMaxIter=50"),
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
        .subcommand(
            SubCommand::with_name("parameters")
                .about("List the parameters of the viscosity solver")
                .arg(
                    Arg::with_name("SIMULATION_CONFIG")
                        .help("Show the values of this simulation config instead of the defaults")
                        .index(1),
                ),
        )
        .get_matches();

    init_logger(matches.occurrences_of("v"));

    let result = if let Some(run_matches) = matches.subcommand_matches("run") {
        run(run_matches)
    } else if let Some(parameters_matches) = matches.subcommand_matches("parameters") {
        list_parameters(parameters_matches)
    } else {
        Ok(())
    };

    if let Err(err) = result {
        error!("{}", err);
        let mut source = err.source();
        while let Some(cause) = source {
            error!("  caused by: {}", cause);
            source = cause.source();
        }
        std::process::exit(1);
    }
}

fn run(run_matches: &ArgMatches) -> ConfigResult<()> {
    let parameter_file = Path::new(run_matches.value_of("SIMULATION_CONFIG").unwrap_or_default());
    let overwrite_file = run_matches.value_of("OVERWRITE_CONFIG_FILE").map(Path::new);

    let mut simulation_params = SimulationParams::load(parameter_file, overwrite_file)?;
    simulation_params.counters_enabled |= run_matches.is_present("STATISTICS_ENABLED");
    info!("{:?}", simulation_params);

    let scene_file = Path::new(run_matches.value_of("SCENE_CONFIG").unwrap_or_default());
    let scene_config: SceneConfig = read_yaml_file(scene_file)?;
    info!("{:?}", scene_config);

    let steps = match run_matches.value_of("STEPS") {
        Some(s) => s.parse::<usize>().map_err(|e| ConfigError::InvalidValue {
            name: "steps",
            reason: e.to_string(),
        })?,
        None => DEFAULT_STEPS,
    };

    let assignments = ParameterAssignments::parse(run_matches.values_of("SET").into_iter().flatten())?;
    let statistics_path = run_matches.value_of("STATISTICS_PATH").map(Path::new);

    match simulation_params.kernel {
        KernelType::Cubic => simulate::<CubicKernel>(
            &simulation_params,
            &scene_config,
            assignments,
            steps,
            statistics_path,
        ),
        KernelType::WendlandQuinticC2 => simulate::<WendlandQuinticC2Kernel>(
            &simulation_params,
            &scene_config,
            assignments,
            steps,
            statistics_path,
        ),
    }
}

fn simulate<K: SphKernel>(
    simulation_params: &SimulationParams,
    scene_config: &SceneConfig,
    assignments: ParameterAssignments,
    steps: usize,
    statistics_path: Option<&Path>,
) -> ConfigResult<()> {
    let mut model = init_fluid_model::<K>(simulation_params, scene_config)?;

    let mut viscosity = ViscosityWeiler2018::new(
        simulation_params.viscosity_settings(),
        model.num_particles(),
        simulation_params.counters_enabled,
    )?;
    assignments.apply(&mut viscosity)?;

    let mut time = TimeManager::new(simulation_params.time_step_size);

    for step in 0..steps {
        model.update_neighborhoods();
        model.compute_densities();
        model.clear_accelerations();

        viscosity.step(&mut model, &time);
        model.integrate_velocities(time.time_step_size());
        time.advance();

        info!(
            "step {}: t={:.4}s viscosity iterations={} residual={:e} kinetic energy={:.6}",
            step,
            time.time(),
            viscosity.iterations(),
            viscosity.solver_error(),
            model.kinetic_energy()
        );
    }

    if simulation_params.counters_enabled {
        let s = viscosity.statistics();
        print!("{}", s);
        if let Some(statistics_path) = statistics_path {
            std::fs::write(statistics_path, s).map_err(|source| ConfigError::Io {
                path: statistics_path.to_path_buf(),
                source,
            })?;
        }
    }

    Ok(())
}

fn list_parameters(matches: &ArgMatches) -> ConfigResult<()> {
    let simulation_params = match matches.value_of("SIMULATION_CONFIG") {
        Some(path) => SimulationParams::load(Path::new(path), None)?,
        None => SimulationParams::default(),
    };

    let mut viscosity = ViscosityWeiler2018::new(simulation_params.viscosity_settings(), 0, false)?;
    print!("{}", ParameterTable::collect(&mut viscosity));
    Ok(())
}
