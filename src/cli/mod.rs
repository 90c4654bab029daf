pub mod demo;
pub mod init;
pub mod report;
pub mod status;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::chart::ChartKind;
use crate::window::WindowKind;

#[derive(Parser)]
#[command(name = "lybunt", about = "Donor reports over a local contributions database.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for lybunt data (default: ~/Documents/lybunt)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// First day of the fiscal year, MM-DD
        #[arg(long = "fiscal-year-start")]
        fiscal_year_start: Option<String>,
        /// Currency code used for amounts, e.g. USD
        #[arg(long)]
        currency: Option<String>,
    },
    /// Load sample donors and contributions.
    Demo,
    /// Show settings and database counts.
    Status,
    /// Build donor reports.
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Donors who gave last year but not this year.
    Lapsed {
        #[command(flatten)]
        args: ReportArgs,
    },
    /// Everyone who gave in a year.
    Donors {
        #[command(flatten)]
        args: ReportArgs,
        /// Which year must have a gift
        #[arg(long, value_enum, default_value = "current")]
        window: WindowArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum WindowArg {
    Current,
    Prior,
}

impl From<WindowArg> for WindowKind {
    fn from(arg: WindowArg) -> Self {
        match arg {
            WindowArg::Current => WindowKind::Current,
            WindowArg::Prior => WindowKind::Prior,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    /// Reference year (default: this year)
    #[arg(long)]
    pub year: Option<i32>,
    /// `calendar` or `fiscal` (fiscal start comes from settings); anything
    /// else means calendar
    #[arg(long, default_value = "calendar")]
    pub mode: String,
    /// Column to show, `table.key` or a unique key. Repeatable.
    #[arg(long = "column", short = 'c')]
    pub columns: Vec<String>,
    /// Filter as name=value, name=a,b for several values, name=FROM..TO for
    /// date ranges, or name= to clear a default. Repeatable.
    #[arg(long = "filter", short = 'f')]
    pub filters: Vec<String>,
    /// Sort key, optionally with :asc or :desc. Repeatable.
    #[arg(long = "sort", short = 's')]
    pub sorts: Vec<String>,
    /// Rows per page (ignored when a chart is drawn)
    #[arg(long)]
    pub limit: Option<u32>,
    /// Rows to skip before the page starts
    #[arg(long, default_value_t = 0)]
    pub offset: u32,
    /// Omit the totals row
    #[arg(long = "no-rollup")]
    pub no_rollup: bool,
    /// Skip the temporary entity table and join in one pass
    #[arg(long)]
    pub direct: bool,
    #[arg(long, value_enum, default_value = "none")]
    pub chart: ChartKind,
    /// Also write the rows to this CSV file
    #[arg(long)]
    pub csv: Option<String>,
    /// Load field and filter metadata from a JSON file
    #[arg(long)]
    pub registry: Option<String>,
    /// Print the generated SQL
    #[arg(long = "show-sql")]
    pub show_sql: bool,
}
