//! CLI argument definitions using clap derive macros.

use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use docutray::http::DEFAULT_BASE_URL;
use docutray::JobKind;

/// Default for `--max-retries`; must match the library default.
const DEFAULT_CLI_MAX_RETRIES: u8 = 2;

/// Inspect DocuTray jobs and listings.
///
/// Fetches async job status (optionally waiting for completion) and walks
/// paginated endpoints, printing JSON to stdout.
#[derive(Parser, Debug)]
#[command(name = "docutray")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// API key sent as a bearer token
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// API base URL
    #[arg(long, global = true, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Maximum retry attempts for transient failures (0-10)
    #[arg(short = 'r', long, global = true, default_value_t = DEFAULT_CLI_MAX_RETRIES, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: u8,

    /// Log every retry at WARN level
    #[arg(long, global = true)]
    pub log_retries: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch the status of an async job
    Status {
        /// Kind of job
        #[arg(value_enum)]
        kind: KindArg,

        /// Job id
        id: String,

        /// Poll until the job succeeds or fails
        #[arg(long)]
        wait: bool,

        /// Seconds between polls when waiting
        #[arg(long, default_value = "2", value_parser = parse_seconds)]
        poll_interval: Duration,

        /// Seconds to wait before giving up
        #[arg(long, default_value = "300", value_parser = parse_seconds)]
        timeout: Duration,
    },

    /// List items of a paginated endpoint
    List {
        /// Endpoint path, e.g. /api/document-types
        path: String,

        /// Filter parameter as key=value (repeatable)
        #[arg(short, long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,

        /// Items per page
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        limit: Option<u32>,

        /// Follow every page instead of printing only the first
        #[arg(long)]
        all: bool,
    },
}

/// Job kinds accepted on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindArg {
    /// Document conversion
    Conversion,
    /// Document type identification
    Identification,
    /// Workflow step execution
    Step,
}

impl From<KindArg> for JobKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Conversion => Self::Conversion,
            KindArg::Identification => Self::Identification,
            KindArg::Step => Self::StepExecution,
        }
    }
}

fn parse_seconds(raw: &str) -> Result<Duration, String> {
    let seconds: f64 = raw
        .parse()
        .map_err(|_| format!("`{raw}` is not a number of seconds"))?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(format!("`{raw}` must be a positive number of seconds"));
    }
    Duration::try_from_secs_f64(seconds).map_err(|_| format!("`{raw}` seconds is out of range"))
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("`{raw}` is not in key=value form")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docutray::DEFAULT_MAX_RETRIES;

    #[test]
    fn test_cli_status_defaults() {
        let args = Args::try_parse_from(["docutray", "status", "conversion", "conv_1"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert_eq!(args.max_retries, 2); // DEFAULT_MAX_RETRIES
        assert_eq!(args.base_url, "https://api.docutray.com");
        assert!(args.api_key.is_none());
        match args.command {
            Command::Status {
                kind,
                id,
                wait,
                poll_interval,
                timeout,
            } => {
                assert_eq!(kind, KindArg::Conversion);
                assert_eq!(id, "conv_1");
                assert!(!wait);
                assert_eq!(poll_interval, Duration::from_secs(2));
                assert_eq!(timeout, Duration::from_secs(300));
            }
            Command::List { .. } => panic!("expected status command"),
        }
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["docutray", "-vv", "status", "step", "e1"]).unwrap();
        assert_eq!(args.verbose, 2);

        let args = Args::try_parse_from(["docutray", "status", "step", "e1", "--verbose"]).unwrap();
        assert_eq!(args.verbose, 1);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["docutray", "-q", "list", "/api/document-types"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        // --help causes early exit, so we check it returns an error with Help kind
        let result = Args::try_parse_from(["docutray", "--help"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_missing_subcommand_returns_error() {
        let result = Args::try_parse_from(["docutray"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Args::try_parse_from(["docutray", "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    // ==================== Max Retries Tests ====================

    #[test]
    fn test_cli_max_retries_range() {
        let args =
            Args::try_parse_from(["docutray", "-r", "0", "status", "conversion", "c"]).unwrap();
        assert_eq!(args.max_retries, 0);

        let args = Args::try_parse_from(["docutray", "--max-retries", "10", "status", "conversion", "c"])
            .unwrap();
        assert_eq!(args.max_retries, 10);

        let err = Args::try_parse_from(["docutray", "-r", "11", "status", "conversion", "c"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_max_retries_default_matches_library() {
        assert_eq!(u32::from(DEFAULT_CLI_MAX_RETRIES), DEFAULT_MAX_RETRIES);
    }

    // ==================== Status Command Tests ====================

    #[test]
    fn test_cli_status_rejects_out_of_range_timeout() {
        let err = Args::try_parse_from(["docutray", "status", "step", "x", "--timeout", "1e30"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_status_wait_options() {
        let args = Args::try_parse_from([
            "docutray",
            "status",
            "identification",
            "id_1",
            "--wait",
            "--poll-interval",
            "0.5",
            "--timeout",
            "60",
        ])
        .unwrap();
        let Command::Status {
            kind,
            wait,
            poll_interval,
            timeout,
            ..
        } = args.command
        else {
            panic!("expected status command");
        };
        assert_eq!(JobKind::from(kind), JobKind::Identification);
        assert!(wait);
        assert_eq!(poll_interval, Duration::from_millis(500));
        assert_eq!(timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_cli_status_rejects_bad_kind_and_zero_interval() {
        assert!(Args::try_parse_from(["docutray", "status", "upload", "x"]).is_err());
        assert!(
            Args::try_parse_from(["docutray", "status", "step", "x", "--poll-interval", "0"]).is_err()
        );
    }

    // ==================== List Command Tests ====================

    #[test]
    fn test_cli_list_params() {
        let args = Args::try_parse_from([
            "docutray",
            "list",
            "/api/document-types",
            "--param",
            "search=invoice",
            "-p",
            "status=active",
            "--limit",
            "20",
            "--all",
        ])
        .unwrap();
        let Command::List {
            path,
            params,
            limit,
            all,
        } = args.command
        else {
            panic!("expected list command");
        };
        assert_eq!(path, "/api/document-types");
        assert_eq!(
            params,
            vec![
                ("search".to_string(), "invoice".to_string()),
                ("status".to_string(), "active".to_string()),
            ]
        );
        assert_eq!(limit, Some(20));
        assert!(all);
    }

    #[test]
    fn test_cli_list_rejects_malformed_param() {
        let err = Args::try_parse_from(["docutray", "list", "/x", "--param", "novalue"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
