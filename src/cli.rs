use anyhow::{anyhow, Result};
use clap::ArgMatches;
use num_rational::BigRational;

use crate::algebra::rational_to_f64;
use crate::analyzer::View;
use crate::parser::parse_number;

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub input_file: String,
    pub output_file: Option<String>,
    pub output_format: OutputFormat,
    pub verbose_level: u8,
    pub nodes: Vec<String>,
    pub view: View,
    pub transient: Option<TransientGrid>,
    pub substitutions: Vec<(String, BigRational)>,
    pub state_space: Option<String>,
    pub sequential: bool,
}

/// Numeric time grid `[0, tstop]` with `points` samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransientGrid {
    pub tstop: f64,
    pub points: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

impl CliArgs {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let input_file = matches
            .get_one::<String>("input")
            .ok_or_else(|| anyhow!("Input file is required"))?
            .clone();

        let output_file = matches.get_one::<String>("output").cloned();

        let verbose_level = matches.get_count("verbose");

        let output_format = match matches.get_one::<String>("format").map(String::as_str) {
            Some("json") => OutputFormat::Json,
            Some("csv") | None => OutputFormat::Csv,
            Some(other) => return Err(anyhow!("Invalid output format '{}'", other)),
        };

        let nodes = matches
            .get_many::<String>("node")
            .map(|values| values.cloned().collect())
            .unwrap_or_default();

        let view = match matches.get_one::<String>("domain") {
            Some(name) => View::from_name(name).ok_or_else(|| anyhow!("Unknown domain '{}'", name))?,
            None => View::All,
        };

        let transient = if let Some(tran_values) = matches.get_many::<String>("tran") {
            let values: Vec<&String> = tran_values.collect();
            if values.len() != 2 {
                return Err(anyhow!("Transient export requires exactly 2 parameters: tstop and points"));
            }
            let tstop = parse_time_value(values[0])?;
            let points = values[1]
                .parse::<usize>()
                .map_err(|_| anyhow!("Invalid number of points '{}'", values[1]))?;
            if tstop <= 0.0 || points < 2 {
                return Err(anyhow!("Invalid time grid: tstop must be positive and points at least 2"));
            }
            Some(TransientGrid { tstop, points })
        } else {
            None
        };

        let substitutions = matches
            .get_many::<String>("subs")
            .map(|values| values.map(|v| parse_substitution(v)).collect::<Result<Vec<_>>>())
            .transpose()?
            .unwrap_or_default();

        Ok(CliArgs {
            input_file,
            output_file,
            output_format,
            verbose_level,
            nodes,
            view,
            transient,
            substitutions,
            state_space: matches.get_one::<String>("state-space").cloned(),
            sequential: matches.get_flag("sequential"),
        })
    }
}

/// Time in seconds with an optional SI prefix and unit (e.g. "1ns", "1.5ms", "10u").
fn parse_time_value(value: &str) -> Result<f64> {
    parse_number(value)
        .map(|t| rational_to_f64(&t))
        .ok_or_else(|| anyhow!("Invalid time value '{}'", value))
}

/// `NAME=VALUE` with an exact, possibly suffixed, value (e.g. `R1=4.7k`).
fn parse_substitution(text: &str) -> Result<(String, BigRational)> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected NAME=VALUE, got '{}'", text))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("Missing symbol name in '{}'", text));
    }
    let value = parse_number(value).ok_or_else(|| anyhow!("Invalid value for {}: '{}'", name, value))?;
    Ok((name.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_value() {
        assert_eq!(parse_time_value("1ns").unwrap(), 1e-9);
        assert_eq!(parse_time_value("1.5us").unwrap(), 1.5e-6);
        assert_eq!(parse_time_value("10ms").unwrap(), 10e-3);
        assert_eq!(parse_time_value("1").unwrap(), 1.0);
        assert_eq!(parse_time_value("2s").unwrap(), 2.0);
        assert!(parse_time_value("soon").is_err());
    }

    #[test]
    fn test_parse_substitution() {
        let (name, value) = parse_substitution("R1=4.7k").unwrap();
        assert_eq!(name, "R1");
        assert_eq!(value, BigRational::from_integer(4700.into()));
        assert!(parse_substitution("R1").is_err());
        assert!(parse_substitution("=5").is_err());
        assert!(parse_substitution("C=abc").is_err());
    }
}
