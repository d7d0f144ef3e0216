use crate::registry::Category;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Heuristic technology-stack detection
#[derive(Parser, Debug)]
#[command(
    name = "stackprobe",
    about = "Detect the technology stack of a project directory",
    version,
    author,
    long_about = "stackprobe scans a project tree and infers languages, frameworks, databases, \
                  build systems, container tooling, test frameworks and platforms, each with \
                  a confidence score, using a declarative rule registry."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Verbose logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - only log errors"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Detect the technology stack of a project",
        long_about = "Scans the project tree, matches files against the rule registry and \
                      reports ranked candidates per category.\n\n\
                      Examples:\n  \
                      stackprobe detect\n  \
                      stackprobe detect /path/to/project --format json\n  \
                      stackprobe detect --threshold 0.5 --exclude 'fixtures/**'\n  \
                      stackprobe detect --rules my-rules.yaml -o stack.yaml --format yaml"
    )]
    Detect(DetectArgs),

    #[command(
        about = "List the loaded detection rules",
        long_about = "Loads and validates a rule registry and lists its rules.\n\n\
                      Examples:\n  \
                      stackprobe rules\n  \
                      stackprobe rules --category framework\n  \
                      stackprobe rules --rules my-rules.yaml --format json"
    )]
    Rules(RulesArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct DetectArgs {
    #[arg(
        value_name = "PATH",
        help = "Path to project (defaults to current directory)"
    )]
    pub path: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(long, value_name = "SCORE", help = "Minimum confidence to report (0-1)")]
    pub threshold: Option<f64>,

    #[arg(long, value_name = "SCORE", help = "Maximum confidence (0-1)")]
    pub cap: Option<f64>,

    #[arg(
        short = 'j',
        long,
        value_name = "N",
        help = "Matcher threads (0 = one per core)"
    )]
    pub workers: Option<usize>,

    #[arg(long, value_name = "FILE", help = "Use a custom rule registry")]
    pub rules: Option<PathBuf>,

    #[arg(
        short = 'e',
        long = "exclude",
        value_name = "GLOB",
        help = "Additional exclusion glob (repeatable)"
    )]
    pub exclude: Vec<String>,

    #[arg(long, help = "Match globs, patterns and dependency names case-sensitively")]
    pub case_sensitive: bool,

    #[arg(long, help = "Do not honor .gitignore files")]
    pub no_gitignore: bool,

    #[arg(long, value_name = "N", help = "Maximum directory depth")]
    pub max_depth: Option<usize>,

    #[arg(long, value_name = "N", help = "Maximum number of files to visit")]
    pub max_files: Option<usize>,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct RulesArgs {
    #[arg(long, value_name = "FILE", help = "Rule registry to load (defaults to built-in)")]
    pub rules: Option<PathBuf>,

    #[arg(
        short = 'c',
        long,
        value_parser = parse_category,
        help = "Only list rules of this category"
    )]
    pub category: Option<Category>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

fn parse_category(s: &str) -> Result<Category, String> {
    Category::from_name(s).ok_or_else(|| {
        let valid: Vec<&str> = Category::all().iter().map(|c| c.name()).collect();
        format!("Invalid category: {}. Valid options: {}", s, valid.join(", "))
    })
}
