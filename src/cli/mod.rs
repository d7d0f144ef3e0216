//! Command-line interface: argument parsing and output rendering

pub mod commands;
pub mod output;

pub use commands::{CliArgs, Commands, DetectArgs, OutputFormatArg, RulesArgs};
pub use output::{OutputFormat, OutputFormatter, RuleSummary};
