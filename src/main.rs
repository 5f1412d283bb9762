mod sim;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use highrise::{BuildingConfig, ConfigError, Error, logging};

#[derive(Parser, Debug)]
#[command(name = "highrise", version, about = "Floor-by-floor construction scheduler")]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug). HIGHRISE_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run with live output and a summary (the default).
    Demo(Overrides),
    /// Run once, streaming events as text or JSON lines.
    Run {
        #[command(flatten)]
        overrides: Overrides,
        /// Emit one JSON object per event instead of text.
        #[arg(long)]
        json: bool,
        /// Suppress the event stream; print only the summary.
        #[arg(long, conflicts_with = "json")]
        quiet: bool,
    },
    /// Time a single run and print a CSV row.
    Bench(Overrides),
    /// Sweep floor, unit, and electricity-capacity sets; one CSV row each.
    Stress {
        #[command(flatten)]
        overrides: Overrides,
        #[arg(long = "floor-sets", value_delimiter = ',', default_value = "1,2")]
        floor_sets: Vec<u64>,
        #[arg(long = "unit-sets", value_delimiter = ',', default_value = "1,4,8")]
        unit_sets: Vec<u64>,
        #[arg(long = "electricity-sets", value_delimiter = ',', default_value = "1,2,3")]
        electricity_sets: Vec<usize>,
    },
}

/// CLI layer of the config hierarchy: defaults, then `--config`, then flags.
#[derive(Args, Debug, Default, Clone)]
struct Overrides {
    /// TOML building description.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    floors: Option<u64>,
    /// Units (apartments) per floor.
    #[arg(long)]
    units: Option<u64>,
    /// Comma-separated final task names.
    #[arg(long, value_delimiter = ',')]
    tasks: Option<Vec<String>>,
    /// Simulated work per stage in milliseconds.
    #[arg(long)]
    stage_ms: Option<u64>,
    #[arg(long)]
    foundation_ms: Option<u64>,
    #[arg(long)]
    crane: Option<usize>,
    #[arg(long)]
    electricity: Option<usize>,
    #[arg(long)]
    water: Option<usize>,
}

impl Overrides {
    fn resolve(&self) -> Result<BuildingConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => BuildingConfig::load(path)?,
            None => BuildingConfig::default(),
        };
        if let Some(floors) = self.floors {
            config.floors = floors;
        }
        if let Some(units) = self.units {
            config.units_per_floor = units;
        }
        if let Some(tasks) = &self.tasks {
            config.tasks = tasks.clone();
        }
        if let Some(stage_ms) = self.stage_ms {
            config.stage_ms = stage_ms;
        }
        if let Some(foundation_ms) = self.foundation_ms {
            config.foundation_ms = foundation_ms;
        }
        if let Some(crane) = self.crane {
            config.capacity.crane = crane;
        }
        if let Some(electricity) = self.electricity {
            config.capacity.electricity = electricity;
        }
        if let Some(water) = self.water {
            config.capacity.water = water;
        }
        Ok(config)
    }
}

fn dispatch(command: Command) -> highrise::Result<()> {
    match command {
        Command::Demo(overrides) => sim::run_demo(&overrides.resolve()?),
        Command::Run {
            overrides,
            json,
            quiet,
        } => sim::run_once(&overrides.resolve()?, json, quiet),
        Command::Bench(overrides) => sim::run_benchmark(&overrides.resolve()?),
        Command::Stress {
            overrides,
            floor_sets,
            unit_sets,
            electricity_sets,
        } => sim::run_stress(
            &overrides.resolve()?,
            &floor_sets,
            &unit_sets,
            &electricity_sets,
        ),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let command = cli
        .command
        .unwrap_or_else(|| Command::Demo(Overrides::default()));
    match dispatch(command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err @ Error::Config(_)) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "highrise",
            "run",
            "--floors",
            "3",
            "--electricity",
            "4",
            "--tasks",
            "A,B",
        ]);
        let Some(Command::Run { overrides, .. }) = cli.command else {
            panic!("expected run command");
        };
        let config = overrides.resolve().expect("resolve");
        assert_eq!(config.floors, 3);
        assert_eq!(config.capacity.electricity, 4);
        assert_eq!(config.tasks, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(config.units_per_floor, highrise::config::DEFAULT_UNITS_PER_FLOOR);
    }

    #[test]
    fn stress_sets_parse_as_lists() {
        let cli = Cli::parse_from(["highrise", "stress", "--unit-sets", "2,5"]);
        let Some(Command::Stress {
            unit_sets,
            floor_sets,
            ..
        }) = cli.command
        else {
            panic!("expected stress command");
        };
        assert_eq!(unit_sets, vec![2, 5]);
        assert_eq!(floor_sets, vec![1, 2]);
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
