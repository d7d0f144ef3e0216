use stackprobe::cli::commands::{CliArgs, Commands, DetectArgs, RulesArgs};
use stackprobe::cli::output::{OutputFormat, OutputFormatter};
use stackprobe::registry::LoadOptions;
use stackprobe::util::logging::{self, parse_level};
use stackprobe::{DetectorConfig, Detector, RegistrySource, RuleSet, VERSION};

use clap::Parser;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, Level};

const EXIT_SUCCESS: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_OUTPUT_ERROR: i32 = 2;

fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("stackprobe v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Detect(detect_args) => handle_detect(detect_args),
        Commands::Rules(rules_args) => handle_rules(rules_args),
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let mut config = logging::config_from_env();
    if let Some(level_str) = &args.log_level {
        config.level = parse_level(level_str);
    } else if args.verbose {
        config.level = Level::DEBUG;
    } else if args.quiet {
        config.level = Level::ERROR;
    }
    logging::init_logging(config);
}

fn handle_detect(args: &DetectArgs) -> i32 {
    let config = match build_config(args) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            eprintln!("Error: {}", e);
            return EXIT_FAILURE;
        }
    };
    debug!("{}", config);

    let root = match &args.path {
        Some(path) => path.clone(),
        None => match env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!("Error: cannot determine current directory: {}", e);
                return EXIT_FAILURE;
            }
        },
    };

    let detector = match Detector::new(config) {
        Ok(detector) => detector,
        Err(e) => {
            error!("Failed to initialize detector: {}", e);
            eprintln!("Error: {}", e);
            return EXIT_FAILURE;
        }
    };

    let result = match detector.detect(&root) {
        Ok(result) => result,
        Err(e) => {
            error!("Detection failed: {}", e);
            eprintln!("Error: {}", e);
            return EXIT_FAILURE;
        }
    };
    info!(
        categories = result.categories.len(),
        files = result.stats.files_scanned,
        "Detection finished"
    );

    let formatter = OutputFormatter::new(OutputFormat::from(args.format));
    let output = match formatter.format(&result) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return EXIT_OUTPUT_ERROR;
        }
    };

    match write_output(&output, args.output.as_deref()) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: failed to write output: {}", e);
            EXIT_OUTPUT_ERROR
        }
    }
}

fn handle_rules(args: &RulesArgs) -> i32 {
    let mut config = match DetectorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            eprintln!("Error: {}", e);
            return EXIT_FAILURE;
        }
    };
    if let Some(rules) = &args.rules {
        config.registry = RegistrySource::Path(rules.clone());
    }

    let options = LoadOptions {
        case_sensitive: config.case_sensitive,
    };
    let rules = match RuleSet::load(&config.registry, &options) {
        Ok(rules) => rules,
        Err(e) => {
            error!("Failed to load rules from {}: {}", config.registry, e);
            eprintln!("Error: {}", e);
            return EXIT_FAILURE;
        }
    };

    let formatter = OutputFormatter::new(OutputFormat::from(args.format));
    match formatter.format_rules(&rules, args.category) {
        Ok(output) => match write_output(&output, None) {
            Ok(()) => EXIT_SUCCESS,
            Err(e) => {
                eprintln!("Error: failed to write output: {}", e);
                EXIT_OUTPUT_ERROR
            }
        },
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_OUTPUT_ERROR
        }
    }
}

/// Environment first, then command-line flags on top
fn build_config(args: &DetectArgs) -> Result<DetectorConfig, stackprobe::ConfigError> {
    let mut config = DetectorConfig::from_env()?;

    if let Some(threshold) = args.threshold {
        config.minimum_confidence_threshold = threshold;
    }
    if let Some(cap) = args.cap {
        config.maximum_confidence_cap = cap;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(max_depth) = args.max_depth {
        config.max_depth = max_depth;
    }
    if let Some(max_files) = args.max_files {
        config.max_files = max_files;
    }
    if let Some(rules) = &args.rules {
        config.registry = RegistrySource::Path(PathBuf::from(rules));
    }
    if args.case_sensitive {
        config.case_sensitive = true;
    }
    if args.no_gitignore {
        config.respect_gitignore = false;
    }
    config.exclusions.extend(args.exclude.iter().cloned());

    config.validate()?;
    Ok(config)
}

fn write_output(output: &str, path: Option<&Path>) -> io::Result<()> {
    match path {
        Some(path) => {
            fs::write(path, output)?;
            info!("Output written to {}", path.display());
            Ok(())
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(output.as_bytes())?;
            handle.flush()
        }
    }
}
