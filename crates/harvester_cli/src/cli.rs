use std::path::PathBuf;

use crate::config::{parse_boundary, parse_number, parse_pages, ConfigError, HarvestConfig};

pub const USAGE: &str = "\
usage: harvester <reviews|restaurants> [TARGET...] [options]

  reviews        harvest new visitor reviews for each place id
  restaurants    harvest search-result listings for each query, enrich them,
                 persist them and dispatch a work item per new place

options:
  -c, --config FILE      RON config file
  -o, --store DIR        store directory
  -p, --pages LIST       result pages, e.g. 1-3,5 (restaurants)
      --concurrency N    sessions run at once
      --max-records N    ceiling per target
      --budget-secs N    wall-clock budget per session
      --boundary POLICY  trust | require-ordering | ignore
      --dispatch URL     endpoint receiving work items
      --no-geocode       skip coordinate lookup
      --log-level LEVEL  off | error | warn | info | debug | trace
      --log-file FILE    log file (default harvest.log)
  -h, --help           show this text";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reviews,
    Restaurants,
}

/// Parsed command line. Flags are kept as raw overrides so they can be
/// applied after the config file and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub command: Command,
    pub config_path: Option<PathBuf>,
    pub targets: Vec<String>,
    pub flags: Vec<(String, String)>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Parsed {
    Run(CliArgs),
    Help,
}

pub fn parse_args<I>(args: I) -> Result<Parsed, ConfigError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let command = match args.next().as_deref() {
        Some("reviews") => Command::Reviews,
        Some("restaurants") => Command::Restaurants,
        Some("-h") | Some("--help") | None => return Ok(Parsed::Help),
        Some(other) => return Err(unknown("command", other)),
    };

    let mut parsed = CliArgs {
        command,
        config_path: None,
        targets: Vec::new(),
        flags: Vec::new(),
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Parsed::Help),
            "-c" | "--config" => parsed.config_path = Some(PathBuf::from(value(&mut args, &arg)?)),
            "--no-geocode" => parsed.flags.push(("geocode".into(), "false".into())),
            "-o" | "--store" | "-p" | "--pages" | "--concurrency" | "--max-records"
            | "--budget-secs" | "--boundary" | "--dispatch" | "--log-level" | "--log-file" => {
                let name = canonical(&arg);
                let value = value(&mut args, &arg)?;
                parsed.flags.push((name.to_string(), value));
            }
            flag if flag.starts_with('-') => return Err(unknown("option", flag)),
            target => parsed.targets.push(target.to_string()),
        }
    }
    Ok(Parsed::Run(parsed))
}

impl CliArgs {
    /// Apply positional targets and flags on top of `config`.
    pub fn apply(&self, config: &mut HarvestConfig) -> Result<(), ConfigError> {
        if !self.targets.is_empty() {
            config.targets = self.targets.clone();
        }
        for (name, value) in &self.flags {
            match name.as_str() {
                "store" => config.store_dir = Some(PathBuf::from(value)),
                "pages" => config.pages = parse_pages(value)?,
                "concurrency" => config.concurrency = parse_number("--concurrency", value)?,
                "max-records" => config.max_records = parse_number("--max-records", value)?,
                "budget-secs" => {
                    config.session_budget_secs = Some(parse_number("--budget-secs", value)?)
                }
                "boundary" => config.boundary = Some(parse_boundary(value)?),
                "dispatch" => config.dispatch_url = Some(value.clone()),
                "geocode" => config.geocode = value == "true",
                "log-level" => config.log_level = value.clone(),
                "log-file" => config.log_file = Some(PathBuf::from(value)),
                other => return Err(unknown("option", other)),
            }
        }
        Ok(())
    }
}

fn canonical(flag: &str) -> &str {
    match flag {
        "-o" => "store",
        "-p" => "pages",
        long => long.trim_start_matches("--"),
    }
}

fn value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, ConfigError> {
    args.next().ok_or_else(|| ConfigError::Value {
        name: flag.to_string(),
        value: String::new(),
    })
}

fn unknown(what: &str, value: &str) -> ConfigError {
    ConfigError::Value {
        name: what.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvester_core::BoundaryPolicy;
    use pretty_assertions::assert_eq;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn targets_and_flags_are_collected() {
        let parsed = parse_args(args(&[
            "restaurants",
            "공덕역 식당",
            "-p",
            "1-2",
            "--boundary",
            "require-ordering",
            "--no-geocode",
        ]))
        .unwrap();
        let Parsed::Run(cli) = parsed else {
            panic!("expected run");
        };
        assert_eq!(cli.command, Command::Restaurants);

        let mut config = HarvestConfig::default();
        cli.apply(&mut config).unwrap();
        assert_eq!(config.targets, vec!["공덕역 식당"]);
        assert_eq!(config.pages, vec![1, 2]);
        assert_eq!(config.boundary, Some(BoundaryPolicy::RequireOrdering));
        assert!(!config.geocode);
    }

    #[test]
    fn missing_value_and_unknown_flag_fail() {
        assert!(parse_args(args(&["reviews", "--store"])).is_err());
        assert!(parse_args(args(&["reviews", "--frobnicate"])).is_err());
        assert!(parse_args(args(&["crawl"])).is_err());
    }

    #[test]
    fn help_is_recognized() {
        assert_eq!(parse_args(args(&[])).unwrap(), Parsed::Help);
        assert_eq!(parse_args(args(&["reviews", "-h"])).unwrap(), Parsed::Help);
    }

    #[test]
    fn flags_win_over_config() {
        let Parsed::Run(cli) =
            parse_args(args(&["reviews", "11", "--max-records", "5", "-o", "out"])).unwrap()
        else {
            panic!("expected run");
        };
        let mut config = HarvestConfig {
            targets: vec!["99".into()],
            max_records: 50,
            ..HarvestConfig::default()
        };
        cli.apply(&mut config).unwrap();
        assert_eq!(config.targets, vec!["11"]);
        assert_eq!(config.max_records, 5);
        assert_eq!(config.store_dir, Some(PathBuf::from("out")));
    }
}
