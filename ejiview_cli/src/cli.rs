use std::fs::File;
use std::path::Path;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use ejiview::{
    config::Config,
    error::EjiResult,
    formatters::{CsvFormatter, JsonFormatter, OutputFormatter, OutputGenerator},
    metric::MetricId,
    snapshot::Geography,
    view::{concern_scale, Report},
    Ejiview,
};
use enum_dispatch::enum_dispatch;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use spinners::{Spinner, Spinners};
use strum_macros::EnumString;

use crate::display::{display_association, display_names, display_scale, display_view};
use crate::error::EjiCliResult;

const DEFAULT_PROGRESS_SPINNER: Spinners = Spinners::Dots;
const COMPLETE_PROGRESS_STRING: &str = "✔";
const RUNNING_TAIL_STRING: &str = "...";
const LOADING_STRING: &str = "Loading EJI tables";

/// Defines the output formats we are able to produce results in.
#[derive(Clone, Debug, Deserialize, Serialize, EnumString, PartialEq, Eq, Default)]
#[strum(ascii_case_insensitive)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

impl OutputFormat {
    fn formatter(&self) -> Option<OutputFormatter> {
        match self {
            OutputFormat::Table => None,
            OutputFormat::Json => Some(OutputFormatter::Json(JsonFormatter)),
            OutputFormat::Csv => Some(OutputFormatter::Csv(CsvFormatter)),
        }
    }
}

fn write_output<T, U>(output_generator: T, report: &Report, output_file: Option<U>) -> EjiCliResult<()>
where
    T: OutputGenerator,
    U: AsRef<Path>,
{
    if let Some(output_file) = output_file {
        let mut f = File::create(output_file).context("Failed to write output")?;
        output_generator.save(&mut f, report)?;
    } else {
        let mut stdout_lock = std::io::stdout().lock();
        output_generator.save(&mut stdout_lock, report)?;
    };
    Ok(())
}

#[derive(Args, Debug, Clone)]
struct OutputArgs {
    #[arg(
        short = 'f',
        long,
        value_name = "table|json|csv",
        default_value = "table",
        help = "Output format for the results"
    )]
    output_format: OutputFormat,
    #[arg(
        short = 'o',
        long,
        help = "Output file to place the results (json and csv only)"
    )]
    output_file: Option<String>,
}

impl OutputArgs {
    /// Print the report as a terminal table, or write it with the selected formatter.
    fn emit(&self, report: Report) -> EjiCliResult<()> {
        let Some(formatter) = self.output_format.formatter() else {
            match &report {
                Report::View(view) => display_view(view)?,
                Report::Association(association) => display_association(association)?,
                Report::Scale(entries) => display_scale(entries)?,
                Report::Names(names) => display_names("Name", names)?,
            }
            return Ok(());
        };
        write_output(formatter, &report, self.output_file.as_deref())
    }
}

/// Selects either a county or a state, the configured home state when neither is given.
#[derive(Args, Debug, Clone)]
struct GeographyArgs {
    #[arg(long, help = "County name, e.g. \"Bernalillo\" or \"Bernalillo County\"")]
    county: Option<String>,
    #[arg(long, conflicts_with = "county", help = "State name")]
    state: Option<String>,
}

impl GeographyArgs {
    fn geography(&self, config: &Config) -> Geography {
        match (&self.county, &self.state) {
            (Some(county), _) => Geography::county(county),
            (None, Some(state)) => Geography::state(state),
            (None, None) => Geography::state(&config.state),
        }
    }
}

/// The geography a comparison is made against.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
struct OtherGeographyArgs {
    #[arg(id = "vs_county", long = "vs-county", help = "County to compare against")]
    county: Option<String>,
    #[arg(id = "vs_state", long = "vs-state", help = "State to compare against")]
    state: Option<String>,
}

impl OtherGeographyArgs {
    fn geography(&self, config: &Config) -> Geography {
        GeographyArgs {
            county: self.county.clone(),
            state: self.state.clone(),
        }
        .geography(config)
    }
}

fn start_spinner(quiet: bool, message: &str) -> Option<Spinner> {
    (!quiet).then(|| {
        Spinner::with_timer(
            DEFAULT_PROGRESS_SPINNER,
            message.to_string() + RUNNING_TAIL_STRING,
        )
    })
}

fn stop_spinner(spinner: Option<Spinner>) {
    if let Some(mut s) = spinner {
        s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
    }
}

/// A selection that matched no row is reported and ends the command without failing it.
fn selected<T>(result: EjiResult<T>) -> EjiCliResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_empty_selection() => {
            println!("{e}");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// The most recent configured year.
fn default_year(config: &Config) -> EjiCliResult<String> {
    let year = config.years.last().context("No years configured")?;
    Ok(year.clone())
}

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    async fn run(&self, config: Config) -> EjiCliResult<()>;
}

/// The `years` command lists the years with published data.
#[derive(Args, Debug)]
pub struct YearsCommand;

impl RunCommand for YearsCommand {
    async fn run(&self, config: Config) -> EjiCliResult<()> {
        info!("Running `years` subcommand");
        display_names("Year", &config.years)?;
        Ok(())
    }
}

/// The `places` command lists the counties, or the states, of a year.
#[derive(Args, Debug)]
pub struct PlacesCommand {
    #[arg(short = 'y', long, help = "Year of the data, the latest configured year by default")]
    year: Option<String>,
    #[arg(long, help = "List states instead of counties")]
    states: bool,
    #[command(flatten)]
    output: OutputArgs,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for PlacesCommand {
    async fn run(&self, config: Config) -> EjiCliResult<()> {
        info!("Running `places` subcommand");
        let year = match &self.year {
            Some(year) => year.clone(),
            None => default_year(&config)?,
        };
        let sp = start_spinner(self.quiet, LOADING_STRING);
        let ejiview = Ejiview::new_with_config(config);
        let names = if self.states {
            ejiview.states(&year).await
        } else {
            ejiview.counties(&year).await
        };
        stop_spinner(sp);
        let names = names?;
        if self.output.output_format == OutputFormat::Table {
            let title = if self.states { "State" } else { "County" };
            display_names(title, &names)?;
            return Ok(());
        }
        self.output.emit(Report::Names(names))
    }
}

/// The `view` command shows the metric values of one geography in one year.
#[derive(Args, Debug)]
pub struct ViewCommand {
    #[arg(short = 'y', long, help = "Year of the data, the latest configured year by default")]
    year: Option<String>,
    #[command(flatten)]
    geography: GeographyArgs,
    #[command(flatten)]
    output: OutputArgs,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for ViewCommand {
    async fn run(&self, config: Config) -> EjiCliResult<()> {
        info!("Running `view` subcommand");
        debug!("{:#?}", self);
        let year = match &self.year {
            Some(year) => year.clone(),
            None => default_year(&config)?,
        };
        let geography = self.geography.geography(&config);
        let sp = start_spinner(self.quiet, LOADING_STRING);
        let view = Ejiview::new_with_config(config)
            .view(&year, &geography)
            .await;
        stop_spinner(sp);
        match selected(view)? {
            Some(view) => self.output.emit(Report::View(view)),
            None => Ok(()),
        }
    }
}

/// The `compare` command compares two geographies in the same year.
#[derive(Args, Debug)]
pub struct CompareCommand {
    #[arg(short = 'y', long, help = "Year of the data, the latest configured year by default")]
    year: Option<String>,
    #[command(flatten)]
    geography: GeographyArgs,
    #[command(flatten)]
    other: OtherGeographyArgs,
    #[command(flatten)]
    output: OutputArgs,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for CompareCommand {
    async fn run(&self, config: Config) -> EjiCliResult<()> {
        info!("Running `compare` subcommand");
        debug!("{:#?}", self);
        let year = match &self.year {
            Some(year) => year.clone(),
            None => default_year(&config)?,
        };
        let baseline = self.geography.geography(&config);
        let comparison = self.other.geography(&config);
        let sp = start_spinner(self.quiet, LOADING_STRING);
        let view = Ejiview::new_with_config(config)
            .compare_geographies(&year, &baseline, &comparison)
            .await;
        stop_spinner(sp);
        match selected(view)? {
            Some(view) => self.output.emit(Report::View(view)),
            None => Ok(()),
        }
    }
}

/// The `change` command compares one geography across two years.
#[derive(Args, Debug)]
pub struct ChangeCommand {
    #[arg(long, help = "Baseline year")]
    from: String,
    #[arg(long, help = "Comparison year")]
    to: String,
    #[command(flatten)]
    geography: GeographyArgs,
    #[command(flatten)]
    output: OutputArgs,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for ChangeCommand {
    async fn run(&self, config: Config) -> EjiCliResult<()> {
        info!("Running `change` subcommand");
        debug!("{:#?}", self);
        let geography = self.geography.geography(&config);
        let sp = start_spinner(self.quiet, LOADING_STRING);
        let view = Ejiview::new_with_config(config)
            .compare_years(&geography, &self.from, &self.to)
            .await;
        stop_spinner(sp);
        match selected(view)? {
            Some(view) => self.output.emit(Report::View(view)),
            None => Ok(()),
        }
    }
}

/// The `test` command runs the vulnerability association test on one year.
#[derive(Args, Debug)]
pub struct TestCommand {
    #[arg(short = 'y', long, help = "Year of the data, the latest configured year by default")]
    year: Option<String>,
    #[arg(
        long,
        default_value = "svm",
        help = "Metric splitting the geographies into high burden and other"
    )]
    vulnerability: MetricId,
    #[arg(long, default_value = "hvm", help = "Metric whose means are compared")]
    outcome: MetricId,
    #[arg(
        short = 't',
        long,
        help = "Vulnerability value at or above which a geography is high burden"
    )]
    threshold: Option<f64>,
    #[command(flatten)]
    output: OutputArgs,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for TestCommand {
    async fn run(&self, config: Config) -> EjiCliResult<()> {
        info!("Running `test` subcommand");
        debug!("{:#?}", self);
        let year = match &self.year {
            Some(year) => year.clone(),
            None => default_year(&config)?,
        };
        let sp = start_spinner(self.quiet, LOADING_STRING);
        let report = Ejiview::new_with_config(config)
            .test_association(&year, self.vulnerability, self.outcome, self.threshold)
            .await;
        stop_spinner(sp);
        self.output.emit(Report::Association(report?))
    }
}

/// The `scale` command explains the concern categories.
#[derive(Args, Debug)]
pub struct ScaleCommand {
    #[command(flatten)]
    output: OutputArgs,
}

impl RunCommand for ScaleCommand {
    async fn run(&self, _config: Config) -> EjiCliResult<()> {
        info!("Running `scale` subcommand");
        self.output.emit(Report::Scale(concern_scale()))
    }
}

/// The entrypoint for the CLI.
#[derive(Parser, Debug)]
#[command(version, about="Explore the Environmental Justice Index of a state and its counties", long_about = None, name="ejiview")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[arg(
        short = 'q',
        long = "quiet",
        help = "\
            Do not print progress bar to stdout. Results and logs (when `RUST_LOG`\n\
            is set) will still be printed.",
        global = true
    )]
    quiet: bool,
}

/// Subcommands of the CLI, each implementing `RunCommand`.
#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// List the years for which data are published
    Years(YearsCommand),
    /// List the counties, or states, of a year
    Places(PlacesCommand),
    /// Show the metrics of the state or of one county
    View(ViewCommand),
    /// Compare two geographies in the same year
    Compare(CompareCommand),
    /// Compare one geography across two years
    Change(ChangeCommand),
    /// Test whether high-vulnerability geographies differ in another metric
    Test(TestCommand),
    /// Explain the concern categories of the index
    Scale(ScaleCommand),
}
