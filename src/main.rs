//! Table Tidier CLI
//!
//! Usage:
//!   table-tidier [OPTIONS] <TEMPLATE> [GRID]
//!
//! Options:
//!   -f, --format <FORMAT>     Output format: json, csv, areas, geometry
//!   --max-tiles <N>           Tile ceiling per traversal
//!   --max-depth <N>           Maximum template nesting depth
//!   --max-areas <N>           Maximum number of matched areas
//!   --skip-failed-branches    Drop failing branches instead of aborting
//!   -d, --debug               Print the area tree to stderr
//!   --expressions             Show the rule expression reference
//!   -h, --help                Print help

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use table_tidier::{
    tidy_document, BranchErrorPolicy, Grid, MatchConfig, OutputError, RuleRegistry,
    TemplateDocument, TemplateError, TidyConfig, TidyError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Csv,
    Areas,
    Geometry,
}

#[derive(Parser)]
#[command(name = "table-tidier")]
#[command(about = "Reshape spreadsheet grids into tidy tables using templates")]
struct Cli {
    /// Template document (.toml or .json); required unless --expressions is given
    #[arg(required_unless_present = "expressions")]
    template: Option<PathBuf>,

    /// Grid file as a JSON array of rows (reads from stdin if not provided)
    grid: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: Format,

    /// Maximum number of tiles produced by one traversal
    #[arg(long)]
    max_tiles: Option<usize>,

    /// Maximum template nesting depth
    #[arg(long)]
    max_depth: Option<usize>,

    /// Maximum number of matched areas in one run
    #[arg(long)]
    max_areas: Option<usize>,

    /// Drop branches whose rules fail instead of aborting the run
    #[arg(long)]
    skip_failed_branches: bool,

    /// Debug mode: print the area tree to stderr
    #[arg(short, long)]
    debug: bool,

    /// Show the rule expression reference
    #[arg(long)]
    expressions: bool,
}

fn main() {
    let cli = Cli::parse();

    if cli.expressions {
        print_expressions();
        return;
    }

    let Some(template_path) = &cli.template else {
        eprintln!("Error: a template document is required");
        std::process::exit(2);
    };

    // Load templates
    let document = match TemplateDocument::from_file(template_path) {
        Ok(doc) => doc,
        Err(e) => {
            report_template_error(&e);
            std::process::exit(1);
        }
    };

    // Read grid
    let source = match &cli.grid {
        Some(path) => match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("Error reading grid '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => {
            if io::stdin().is_terminal() {
                eprintln!("Error: no grid file given and stdin is a terminal");
                std::process::exit(2);
            }
            let mut buffer = String::new();
            match io::stdin().read_to_string(&mut buffer) {
                Ok(_) => buffer,
                Err(e) => {
                    eprintln!("Error reading from stdin: {}", e);
                    std::process::exit(1);
                }
            }
        }
    };
    let grid = match Grid::from_json_str(&source) {
        Ok(grid) => grid,
        Err(e) => {
            eprintln!("Error parsing grid: {}", e);
            std::process::exit(1);
        }
    };

    let config = TidyConfig::new()
        .with_matching(match_config(&cli))
        .with_debug(cli.debug);
    let output = match tidy_document(&grid, &document, &RuleRegistry::new(), &config) {
        Ok(output) => output,
        Err(TidyError::Template(e)) => {
            report_template_error(&e);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    for skipped in &output.diagnostics {
        eprintln!("Warning: skipped branch: {}", skipped);
    }

    let rendered = match cli.format {
        Format::Csv => output.table.to_csv(),
        Format::Json => output.table.to_json(),
        Format::Areas => serde_json::to_string_pretty(&output.areas).map_err(OutputError::from),
        Format::Geometry => serde_json::to_string_pretty(&output.geometry).map_err(OutputError::from),
    };
    match rendered {
        Ok(text) => println!("{}", text.trim_end()),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn match_config(cli: &Cli) -> MatchConfig {
    let mut config = MatchConfig::new();
    if let Some(n) = cli.max_tiles {
        config = config.with_max_tiles(n);
    }
    if let Some(n) = cli.max_depth {
        config = config.with_max_depth(n);
    }
    if let Some(n) = cli.max_areas {
        config = config.with_max_areas(n);
    }
    if cli.skip_failed_branches {
        config = config.with_branch_errors(BranchErrorPolicy::Skip);
    }
    config
}

fn report_template_error(error: &TemplateError) {
    match error {
        TemplateError::Expression { .. } => eprint!("{}", error.report()),
        _ => eprintln!("Error: {}", error),
    }
}

fn print_expressions() {
    println!(
        r#"TABLE TIDIER RULE EXPRESSIONS
=============================

Computed template fields (offsets, layer frames, value checks, context
target columns and column maps) are written as expressions.

LITERALS
--------
1, 2.5, "text", true, false, null, [1, "a"]

VARIABLES
---------
value      Cell value (checks), invoking cell (maps),
           first context value (context target rules)
cell       x, y, x_offset, y_offset, value
context    List of context values
current    x, y, width, height, right, bottom, x_index, y_index, layer
parent     Same fields, enclosing area
root       Same fields, whole grid

OPERATORS
---------
+ - * / %                 Arithmetic ("+" joins strings)
== != < <= > >=           Comparison
and or not  (&& || !)     Logic
x in [a, b]               Membership
a.b  a[0]                 Field access and indexing
if c then a else b        Conditional

FUNCTIONS
---------
is_empty is_number is_string len lower upper trim contains
starts_with ends_with str num min max coalesce

EXAMPLES
--------
x_offset = "current.width - 1"
check = "value in [\"Height\", \"H\"]"
map = "if is_empty(value) then null else \"col_\" + str(cell.x_offset)""#
    );
}
