//! Command-line interface.
//!
//! parsync only owns a few options; everything else is passed to rsync as-is.
//! Help and version are long-only so rsync's `-h` and `-V` pass through.

use crate::{Result, SyncError};
use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Parallelize one rsync run across several rsync processes",
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct Args {
    /// Number of parallel rsync jobs
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    pub jobs: Option<usize>,

    /// Path to configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,

    /// Print version
    #[arg(long, action = ArgAction::Version)]
    version: Option<bool>,

    /// rsync options, sources and destination
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "RSYNC_ARGS")]
    pub rsync_args: Vec<String>,
}

/// parsync options found among the forwarded rsync arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrailingOptions {
    pub jobs: Option<usize>,
    pub config: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Pull parsync's own options out of the forwarded arguments.
///
/// clap stops looking for its options at the first rsync argument, so
/// `-j`/`--jobs`, `--config` and `--log-level` given after e.g. `-av` end up
/// here. Each is accepted as `--opt VALUE` or `--opt=VALUE`, and `-j` also as
/// `-jN`.
pub fn extract_options(args: Vec<String>) -> Result<(TrailingOptions, Vec<String>)> {
    let mut options = TrailingOptions::default();
    let mut rest = Vec::with_capacity(args.len());
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag, Some(value.to_string())),
            _ => (arg.as_str(), None),
        };

        let name = match flag {
            "-j" | "--jobs" => "--jobs",
            "--config" => "--config",
            "--log-level" => "--log-level",
            _ => {
                if inline.is_none() && arg.starts_with("-j") && arg.len() > 2 {
                    options.jobs = Some(parse_jobs(&arg[2..])?);
                } else {
                    rest.push(arg);
                }
                continue;
            }
        };

        let value = match inline {
            Some(value) => value,
            None => iter.next().ok_or_else(|| {
                SyncError::InvalidArguments(format!("{name} requires a value"))
            })?,
        };

        match name {
            "--jobs" => options.jobs = Some(parse_jobs(&value)?),
            "--config" => options.config = Some(PathBuf::from(value)),
            _ => options.log_level = Some(value),
        }
    }

    Ok((options, rest))
}

fn parse_jobs(value: &str) -> Result<usize> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(SyncError::InvalidArguments(format!(
            "invalid number of jobs: {value:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extract_jobs_forms() {
        for args in [
            &["-av", "-j", "4", "src", "dst"][..],
            &["-av", "-j4", "src", "dst"][..],
            &["-av", "--jobs", "4", "src", "dst"][..],
            &["-av", "--jobs=4", "src", "dst"][..],
        ] {
            let (options, rest) = extract_options(strings(args)).unwrap();
            assert_eq!(options.jobs, Some(4), "{args:?}");
            assert_eq!(rest, strings(&["-av", "src", "dst"]));
        }
    }

    #[test]
    fn test_extract_config_and_log_level() {
        let (options, rest) =
            extract_options(strings(&["-avz", "--config", "x.toml", "--log-level=debug", "src", "dst"]))
                .unwrap();
        assert_eq!(options.config, Some(PathBuf::from("x.toml")));
        assert_eq!(options.log_level.as_deref(), Some("debug"));
        assert_eq!(options.jobs, None);
        assert_eq!(rest, strings(&["-avz", "src", "dst"]));

        let (options, rest) =
            extract_options(strings(&["-a", "--config=p.toml", "--log-level", "info", "src", "dst"]))
                .unwrap();
        assert_eq!(options.config, Some(PathBuf::from("p.toml")));
        assert_eq!(options.log_level.as_deref(), Some("info"));
        assert_eq!(rest, strings(&["-a", "src", "dst"]));
    }

    #[test]
    fn test_extract_leaves_rsync_options() {
        let args = strings(&["-a", "--delete", "--exclude=*.tmp", "--log-file=x.log", "src", "dst"]);
        let (options, rest) = extract_options(args.clone()).unwrap();
        assert_eq!(options, TrailingOptions::default());
        assert_eq!(rest, args);
    }

    #[test]
    fn test_extract_invalid() {
        assert!(extract_options(strings(&["-j"])).is_err());
        assert!(extract_options(strings(&["-jx", "src", "dst"])).is_err());
        assert!(extract_options(strings(&["--jobs=0", "src", "dst"])).is_err());
        assert!(extract_options(strings(&["src", "dst", "--config"])).is_err());
    }

    #[test]
    fn test_parse_leading_options() {
        let args = Args::try_parse_from(["parsync", "-j", "3", "--log-level", "debug", "-av", "src", "dst"])
            .unwrap();
        assert_eq!(args.jobs, Some(3));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert_eq!(args.rsync_args, strings(&["-av", "src", "dst"]));
    }

    #[test]
    fn test_rsync_flags_pass_through() {
        let args = Args::try_parse_from(["parsync", "-h", "--delete", "src", "-j", "2", "dst"]).unwrap();
        assert_eq!(args.jobs, None);
        assert_eq!(args.rsync_args, strings(&["-h", "--delete", "src", "-j", "2", "dst"]));

        let (options, rest) = extract_options(args.rsync_args).unwrap();
        assert_eq!(options.jobs, Some(2));
        assert_eq!(rest, strings(&["-h", "--delete", "src", "dst"]));
    }
}
