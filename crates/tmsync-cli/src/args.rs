//! Command-line arguments and how they override the loaded configuration.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use tmsync_core::parsers::{resolve_fields, ParseError};
use tmsync_core::{Config, MatcherKind};

#[derive(Parser)]
#[command(name = "tmsync", version)]
#[command(about = "Upload test reports to a test-management service", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload a JUnit XML report
    #[command(name = "parse_junit")]
    ParseJunit(ParseArgs),

    /// Upload a Robot Framework output.xml report
    #[command(name = "parse_robot")]
    ParseRobot(ParseArgs),

    /// Create cases from the responses of an OpenAPI specification
    #[command(name = "parse_openapi")]
    ParseOpenapi(ParseArgs),

    /// Upload a Cucumber JSON report
    #[command(name = "parse_cucumber")]
    ParseCucumber(ParseArgs),

    /// Create or update a run without uploading results
    #[command(name = "add_run")]
    AddRun(RunArgs),
}

/// Connection and behaviour flags shared by every command.
#[derive(Args)]
pub struct GlobalArgs {
    /// Config file to use instead of the default locations
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Hostname of the service, e.g. https://example.testrail.io
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Name of the project
    #[arg(long, global = true)]
    pub project: Option<String>,

    /// ID of the project, takes precedence over the name
    #[arg(long, global = true)]
    pub project_id: Option<i64>,

    #[arg(short = 'u', long, global = true)]
    pub username: Option<String>,

    #[arg(short = 'p', long, global = true)]
    pub password: Option<String>,

    /// API key, used instead of the password
    #[arg(short = 'k', long, global = true)]
    pub key: Option<String>,

    /// Accept invalid TLS certificates
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Proxy URL for all requests
    #[arg(long, global = true)]
    pub proxy: Option<String>,

    /// Proxy credentials as user:password
    #[arg(long, global = true)]
    pub proxy_user: Option<String>,

    /// Comma-separated hosts that bypass the proxy
    #[arg(long, global = true)]
    pub noproxy: Option<String>,

    /// Results submitted per request
    #[arg(short = 'b', long, global = true)]
    pub batch_size: Option<usize>,

    /// Answer yes to every confirmation
    #[arg(short = 'y', long = "yes", global = true, conflicts_with = "no")]
    pub yes: bool,

    /// Answer no to every confirmation
    #[arg(short = 'n', long = "no", global = true)]
    pub no: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Which run results go to.
#[derive(Args, Default)]
pub struct RunArgs {
    /// Title of the run
    #[arg(long)]
    pub title: Option<String>,

    /// Existing suite to use
    #[arg(long)]
    pub suite_id: Option<i64>,

    /// Suite name, overriding the one from the report
    #[arg(long)]
    pub suite_name: Option<String>,

    /// Existing run to add results to
    #[arg(long)]
    pub run_id: Option<i64>,

    /// Plan to add the run to
    #[arg(long)]
    pub plan_id: Option<i64>,

    /// Comma-separated configuration IDs for a run added to a plan
    #[arg(long, value_delimiter = ',')]
    pub config_ids: Vec<i64>,

    #[arg(long)]
    pub milestone_id: Option<i64>,

    #[arg(long)]
    pub run_description: Option<String>,

    /// Comma-separated references of the run
    #[arg(long)]
    pub run_refs: Option<String>,

    #[arg(long)]
    pub run_assigned_to_id: Option<i64>,

    /// Include every case of the suite in the run
    #[arg(long)]
    pub run_include_all: bool,

    /// Comma-separated case IDs to include in the run
    #[arg(long, value_delimiter = ',')]
    pub run_case_ids: Vec<i64>,

    /// Start date as MM/DD/YYYY
    #[arg(long)]
    pub run_start_date: Option<String>,

    /// End date as MM/DD/YYYY
    #[arg(long)]
    pub run_end_date: Option<String>,
}

/// Report upload flags.
#[derive(Args)]
pub struct ParseArgs {
    /// Report file, or a glob matching several report files
    #[arg(short = 'f', long)]
    pub file: String,

    #[command(flatten)]
    pub run: RunArgs,

    /// How report cases are matched to existing cases
    #[arg(long)]
    pub case_matcher: Option<MatcherKind>,

    /// Parent section for the report's top-level sections
    #[arg(long)]
    pub section_id: Option<i64>,

    /// Case field added to every case, as name:value (repeatable)
    #[arg(long = "case-fields")]
    pub case_fields: Vec<String>,

    /// Result field added to every result, as name:value (repeatable)
    #[arg(long = "result-fields")]
    pub result_fields: Vec<String>,

    /// Update existing cases with the report's data
    #[arg(long)]
    pub update_cases: bool,

    /// Only create suites, sections and cases
    #[arg(long)]
    pub skip_run: bool,

    /// Compare created entities with what the service returns
    #[arg(long)]
    pub verify: bool,

    /// Keep millisecond precision in elapsed times
    #[arg(long)]
    pub allow_ms: bool,

    /// Close the run once results are uploaded
    #[arg(long)]
    pub close_run: bool,
}

impl GlobalArgs {
    /// Load the configuration and apply the flags on top of it.
    pub fn load_config(&self) -> Result<Config, tmsync_core::ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::load()?,
        };
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(&self, config: &mut Config) {
        let server = &mut config.server;
        override_with(&mut server.host, &self.host);
        override_with(&mut server.username, &self.username);
        override_with(&mut server.password, &self.password);
        override_with(&mut server.key, &self.key);
        override_with(&mut server.proxy, &self.proxy);
        override_with(&mut server.proxy_user, &self.proxy_user);
        override_with(&mut server.noproxy, &self.noproxy);
        server.insecure |= self.insecure;
        if let Some(timeout) = self.timeout {
            server.timeout_secs = timeout;
        }

        let upload = &mut config.upload;
        override_with(&mut upload.project, &self.project);
        if self.project_id.is_some() {
            upload.project_id = self.project_id;
        }
        if let Some(size) = self.batch_size {
            upload.batch_size = size;
        }
        if self.yes {
            upload.auto_response = Some(true);
        } else if self.no {
            upload.auto_response = Some(false);
        }
    }
}

impl RunArgs {
    pub fn apply(&self, config: &mut Config) {
        let upload = &mut config.upload;
        override_with(&mut upload.title, &self.title);
        override_with(&mut upload.suite_name, &self.suite_name);
        override_with(&mut upload.run_description, &self.run_description);
        override_with(&mut upload.run_refs, &self.run_refs);
        override_with(&mut upload.run_start_date, &self.run_start_date);
        override_with(&mut upload.run_end_date, &self.run_end_date);
        for (target, value) in [
            (&mut upload.suite_id, self.suite_id),
            (&mut upload.run_id, self.run_id),
            (&mut upload.plan_id, self.plan_id),
            (&mut upload.milestone_id, self.milestone_id),
            (&mut upload.run_assigned_to_id, self.run_assigned_to_id),
        ] {
            if value.is_some() {
                *target = value;
            }
        }
        if !self.config_ids.is_empty() {
            upload.config_ids = self.config_ids.clone();
        }
        if !self.run_case_ids.is_empty() {
            upload.run_case_ids = self.run_case_ids.clone();
        }
        upload.run_include_all |= self.run_include_all;
    }
}

impl ParseArgs {
    pub fn apply(&self, config: &mut Config) -> Result<(), ParseError> {
        self.run.apply(config);
        let upload = &mut config.upload;
        if let Some(matcher) = self.case_matcher {
            upload.case_matcher = matcher;
        }
        if self.section_id.is_some() {
            upload.section_id = self.section_id;
        }
        upload.case_fields.extend(resolve_fields(&self.case_fields)?);
        upload.result_fields.extend(resolve_fields(&self.result_fields)?);
        upload.update_cases |= self.update_cases;
        upload.skip_run |= self.skip_run;
        upload.verify |= self.verify;
        upload.allow_ms |= self.allow_ms;
        upload.close_run |= self.close_run;
        Ok(())
    }
}

fn override_with(target: &mut Option<String>, value: &Option<String>) {
    if value.is_some() {
        target.clone_from(value);
    }
}
