use clap::{ArgAction, Parser, Subcommand};
use sheetfill::cli;
use sheetfill::config::{RunOverrides, RunSettings, DEFAULT_STORE_FILE};
use sheetfill::error::SheetfillResult;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sheetfill")]
#[command(about = "Fill an Excel template once per data row and zip the results.")]
#[command(long_about = "Sheetfill - Excel template batch filler

Maps the columns of a data workbook onto cells of an Excel template, writes
one filled copy of the template per data row and bundles every copy into a
single zip archive.

COMMANDS:
  inspect   - Show the headers and row count of a data workbook
  grid      - Show the cell grid of a template (values, merges, styles)
  suggest   - Propose column → cell mappings from template labels
  run       - Fill the template for every row and write the archive

EXAMPLES:
  sheetfill inspect customers.xlsx
  sheetfill grid invoice.xlsx --sheet Invoice
  sheetfill suggest customers.xlsx invoice.xlsx > job.yaml
  sheetfill run -i customers.xlsx -t invoice.xlsx --map Name=B4 --map Code=F2
  sheetfill run --job job.yaml -o out/invoices.zip")]
#[command(version)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the headers and row count of a data workbook
    Inspect {
        /// Data workbook (.xlsx, .xlsm, .xls, .ods)
        input: PathBuf,

        /// Print headers and rows as JSON
        #[arg(long)]
        json: bool,
    },

    #[command(long_about = "Show the cell grid of a template worksheet.

Merged regions are shown once, at their top-left cell, with their span.
Use --json for the full grid model including styles.")]
    /// Show the cell grid of a template worksheet
    Grid {
        /// Template workbook (.xlsx, .xlsm; .xls and .ods are read without styles)
        template: PathBuf,

        /// Worksheet name (default: first worksheet)
        #[arg(short, long)]
        sheet: Option<String>,

        /// Print the grid model as JSON
        #[arg(long)]
        json: bool,
    },

    #[command(long_about = "Propose column → cell mappings.

Each input header is matched to the first template cell (row by row) whose
text contains the header or is contained in it, ignoring case. The result is
printed as a YAML 'mappings:' block ready for a job file.")]
    /// Propose column → cell mappings from template labels
    Suggest {
        /// Data workbook
        input: PathBuf,

        /// Template workbook
        template: PathBuf,

        /// Worksheet name (default: first worksheet)
        #[arg(short, long)]
        sheet: Option<String>,
    },

    #[command(long_about = "Fill the template once per data row and write a zip archive.

JOB FILE (YAML):
  input: customers.xlsx
  template: invoice.xlsx
  sheet: Invoice            # optional
  output: invoices.zip      # optional
  mappings:
    - source: Name
      target: B4

Command-line options override the job file; --map entries are added to (or
replace) the job's mappings. Without any mapping, the mappings remembered for
the same headers and template are reused.

Archive entries are named after the first identifier-like column of each row
(id, code, name, ...), or output_<n> when there is none.")]
    /// Fill the template for every row and write the archive
    Run {
        /// YAML job file
        #[arg(long)]
        job: Option<PathBuf>,

        /// Data workbook
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Template workbook (.xlsx or .xlsm)
        #[arg(short, long)]
        template: Option<PathBuf>,

        /// Mapping SOURCE=CELL (repeatable)
        #[arg(short, long = "map", value_name = "SOURCE=CELL")]
        map: Vec<String>,

        /// Add suggested mappings for unmapped columns
        #[arg(long)]
        suggest: bool,

        /// Worksheet to fill (default: first worksheet)
        #[arg(short, long)]
        sheet: Option<String>,

        /// Archive path (default: output_files.zip)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fill .xlsm templates even though macros may be lost
        #[arg(long)]
        accept_macro_loss: bool,

        /// Mapping memory file
        #[arg(long, env = "SHEETFILL_STORE", default_value = DEFAULT_STORE_FILE)]
        store: PathBuf,

        /// Do not recall or remember mappings
        #[arg(long)]
        no_store: bool,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "sheetfill=warn",
        1 => "sheetfill=info",
        _ => "sheetfill=debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn dispatch(command: Commands, verbose: u8) -> SheetfillResult<()> {
    match command {
        Commands::Inspect { input, json } => cli::inspect(&input, json),

        Commands::Grid {
            template,
            sheet,
            json,
        } => cli::grid(&template, sheet.as_deref(), json),

        Commands::Suggest {
            input,
            template,
            sheet,
        } => cli::suggest(&input, &template, sheet.as_deref()),

        Commands::Run {
            job,
            input,
            template,
            map,
            suggest,
            sheet,
            output,
            accept_macro_loss,
            store,
            no_store,
        } => {
            let settings = RunSettings::resolve(RunOverrides {
                job,
                input,
                template,
                sheet,
                output,
                maps: map,
                suggest,
                accept_macro_loss,
                store: (!no_store).then_some(store),
                verbose: verbose > 0,
            })?;
            cli::run(settings)
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    dispatch(cli.command, cli.verbose).map_err(|err| {
        tracing::info!(error = %err, "command failed");
        anyhow::anyhow!(err.user_message())
    })
}
