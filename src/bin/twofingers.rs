//! twofingers CLI: fixture lookups and response checks from the shell
//!
//! # Usage
//!
//! ```bash
//! # Show the SQL of a random-entity lookup
//! twofingers pick --entity review --flag is_hidden=false --dry-run
//!
//! # Fetch users without comments
//! twofingers rows --table users --anti-join comments:id:user_id --limit 10
//!
//! # Check a saved response against a template
//! twofingers verify expected.json response.json
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use twofingers::prelude::*;
use twofingers::report;

#[derive(Parser)]
#[command(name = "twofingers")]
#[command(version)]
#[command(about = "✌ Random never-reused fixtures and structural response checks for API tests", long_about = None)]
#[command(after_help = "EXAMPLES:
    twofingers pick --entity photo --flag is_hidden=false
    twofingers pick --table users --join tokens:id:user_id --dry-run
    twofingers rows --table tags --order 'type DESC'
    twofingers verify expected.json response.json
    twofingers config roles.user")]
struct Cli {
    /// Config file (default: ./twofingers.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database connection URL, overrides [db] in the config
    #[arg(long, env = "TWOFINGERS_DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// API host, overrides [server] host in the config
    #[arg(long, global = true)]
    host: Option<String>,

    /// Echo SQL and print full failure reports
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one random, not yet used entity
    Pick {
        #[command(flatten)]
        chain: ChainArgs,

        /// Don't execute, just show the generated SQL
        #[arg(short, long)]
        dry_run: bool,
    },
    /// Fetch every matching row
    Rows {
        #[command(flatten)]
        chain: ChainArgs,

        /// Maximum number of rows
        #[arg(short, long)]
        limit: Option<u64>,

        /// Sort expression, e.g. 'id' or 'type DESC'
        #[arg(short, long)]
        order: Option<String>,

        #[arg(short, long)]
        dry_run: bool,
    },
    /// Tell whether any row matches
    Exists {
        #[command(flatten)]
        chain: ChainArgs,

        #[arg(short, long)]
        dry_run: bool,
    },
    /// Compare a JSON response with an expected template
    Verify {
        /// Expected template (JSON)
        expected: PathBuf,
        /// Actual response body (JSON)
        actual: PathBuf,
    },
    /// Print a config value by dotted path
    Config {
        /// e.g. roles.user or api.version
        key: String,
    },
    /// Show the sentinel reference
    Checks,
}

/// Filters shared by the chain-building commands.
#[derive(Args)]
struct ChainArgs {
    /// Root table
    #[arg(long, conflicts_with_all = ["entity", "meta"])]
    table: Option<String>,

    /// Root entity noun (table name is its plural)
    #[arg(long, conflicts_with = "meta")]
    entity: Option<String>,

    /// Meta entity from the config
    #[arg(long)]
    meta: Option<String>,

    /// Main-table id
    #[arg(long)]
    id: Option<i64>,

    /// Boolean filter on the main table: column=true|false
    #[arg(long = "flag", value_parser = parse_flag)]
    flags: Vec<(String, bool)>,

    /// Join onto the main table: table:main_field:joined_field
    #[arg(long = "join", value_parser = parse_join)]
    joins: Vec<JoinArg>,

    /// Like --join, but keep only rows without a match
    #[arg(long = "anti-join", value_parser = parse_join)]
    anti_joins: Vec<JoinArg>,

    /// Select list instead of *
    #[arg(long)]
    fields: Option<String>,
}

#[derive(Clone)]
struct JoinArg {
    table: String,
    main_field: String,
    joined_field: String,
}

fn parse_flag(s: &str) -> Result<(String, bool), String> {
    let (column, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected column=true|false, got '{}'", s))?;
    let flag = value
        .parse::<bool>()
        .map_err(|_| format!("'{}' is not true or false", value))?;
    Ok((column.to_string(), flag))
}

fn parse_join(s: &str) -> Result<JoinArg, String> {
    match s.split(':').collect::<Vec<_>>().as_slice() {
        [table, main_field, joined_field] => Ok(JoinArg {
            table: table.to_string(),
            main_field: main_field.to_string(),
            joined_field: joined_field.to_string(),
        }),
        _ => Err(format!("expected table:main_field:joined_field, got '{}'", s)),
    }
}

/// Stand-in gateway for dry runs.
struct Offline;

impl Gateway for Offline {
    fn fetch_one(&self, _sql: &str) -> DbResult<Option<Row>> {
        Err(DbError::Connection("dry run".to_string()))
    }

    fn fetch_all(&self, _sql: &str) -> DbResult<Vec<Row>> {
        Err(DbError::Connection("dry run".to_string()))
    }

    fn execute(&self, _sql: &str) -> DbResult<u64> {
        Err(DbError::Connection("dry run".to_string()))
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "twofingers=info" } else { "twofingers=warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => match Config::discover() {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => Config::default(),
            Err(e) => return Err(e.into()),
        },
    };
    config.apply_overrides(cli.database_url.clone(), cli.host.clone(), cli.verbose);
    Ok(config)
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Verify { expected, actual } => verify(expected, actual, cli.verbose),
        Commands::Checks => {
            show_checks();
            Ok(())
        }
        Commands::Config { key } => {
            let config = load_config(cli)?;
            let value = config.lookup(key)?;
            match value {
                toml::Value::String(s) => println!("{}", s),
                other => println!("{}", other),
            }
            Ok(())
        }
        Commands::Pick { chain, dry_run }
        | Commands::Exists { chain, dry_run }
        | Commands::Rows { chain, dry_run, .. } => {
            let config = load_config(cli)?;
            if *dry_run {
                let fixtures = Fixtures::new(Offline).with_meta(config.meta.clone());
                let query = build_chain(&fixtures, chain)?;
                println!("{}", "Generated SQL:".green().bold());
                println!("{}", statement_for(&cli.command, &query).white());
                return Ok(());
            }

            if config.db.database_url().is_none() {
                bail!("No database URL. Use --database-url, set TWOFINGERS_DATABASE_URL or add [db] to the config");
            }
            let fixtures = twofingers::connect(&config)?;
            let query = build_chain(&fixtures, chain)?;
            execute(&cli.command, &query, &cli.format)
        }
    }
}

fn build_chain<'a, G: Gateway>(fixtures: &'a Fixtures<G>, args: &ChainArgs) -> anyhow::Result<EntityQuery<'a, G>> {
    let mut query = match (&args.table, &args.entity, &args.meta) {
        (Some(table), _, _) => fixtures.table(table),
        (_, Some(entity), _) => fixtures.entity(entity),
        (_, _, Some(meta)) => fixtures.meta(meta)?,
        _ => bail!("one of --table, --entity or --meta is required"),
    };

    if let Some(id) = args.id {
        query = query.with_id(id);
    }
    for (column, flag) in &args.flags {
        query = query.is(column, *flag);
    }
    for join in &args.joins {
        query = query.join(&join.table, &join.main_field, &join.joined_field);
    }
    for join in &args.anti_joins {
        query = query.join_matching(&join.table, &join.main_field, &join.joined_field, false);
    }
    if let Some(fields) = &args.fields {
        query = query.fields(fields);
    }
    Ok(query)
}

fn statement_for<G: Gateway>(command: &Commands, query: &EntityQuery<'_, G>) -> String {
    match command {
        Commands::Pick { .. } => query.random_sql(),
        Commands::Exists { .. } => query.exist_sql(),
        Commands::Rows { limit, order, .. } => match order {
            Some(order) => query.sorted_sql(order),
            None => query.rows_sql(limit.map(Limit::Count).unwrap_or(Limit::All)),
        },
        _ => String::new(),
    }
}

fn execute<G: Gateway>(command: &Commands, query: &EntityQuery<'_, G>, format: &OutputFormat) -> anyhow::Result<()> {
    match command {
        Commands::Pick { .. } => {
            let row = query.get_random_entity()?;
            format_output(&[row], format);
        }
        Commands::Exists { .. } => {
            if query.check_if_exist()? {
                println!("{} rows exist", "✓".green());
            } else {
                println!("{} no matching rows", "✗".red());
            }
        }
        Commands::Rows { limit, order, .. } => {
            let rows = match order {
                Some(order) => query.get_sorted_list(order)?,
                None => query.get_rows(limit.map(Limit::Count).unwrap_or(Limit::All))?,
            };
            format_output(&rows, format);
        }
        _ => {}
    }
    Ok(())
}

fn verify(expected: &Path, actual: &Path, verbose: bool) -> anyhow::Result<()> {
    let expected_text = std::fs::read_to_string(expected)
        .with_context(|| format!("Failed to read {}", expected.display()))?;
    let actual_text = std::fs::read_to_string(actual)
        .with_context(|| format!("Failed to read {}", actual.display()))?;

    let expected_json: serde_json::Value = serde_json::from_str(&expected_text)
        .with_context(|| format!("{} is not valid JSON", expected.display()))?;
    let actual_json: serde_json::Value = serde_json::from_str(&actual_text)
        .with_context(|| format!("{} is not valid JSON", actual.display()))?;

    let context = ResponseContext {
        method: "FILE".to_string(),
        url: actual.display().to_string(),
        body: actual_text,
        ..Default::default()
    };

    match Assertion::new()
        .with_context(context)
        .verbose(verbose)
        .check(&expected_json, &actual_json)
    {
        Ok(()) => {
            println!("{} response matches {}", "✓".green(), expected.display().to_string().cyan());
            Ok(())
        }
        Err(failure) => {
            eprintln!("{}", report::render_failure(&failure.error, failure.context.as_ref(), failure.verbose));
            std::process::exit(1);
        }
    }
}

fn format_output(results: &[Row], format: &OutputFormat) {
    if results.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(results).unwrap_or_default());
        }
        OutputFormat::Table => {
            let columns = ordered_columns(&results[0]);
            let widths = column_widths(&columns, results);

            let header: Vec<String> = columns
                .iter()
                .zip(&widths)
                .map(|(c, w)| pad(c, *w))
                .collect();
            println!("{}", header.join(" │ ").white().bold());

            let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
            println!("{}", sep.join("─┼─").dimmed());

            for row in results {
                let cells: Vec<String> = columns
                    .iter()
                    .zip(&widths)
                    .map(|(c, w)| pad(&cell(row, c), *w))
                    .collect();
                println!("{}", cells.join(" │ "));
            }

            println!();
            println!("{} row(s) returned", results.len().to_string().cyan());
        }
    }
}

/// Column names with `id` first, the rest alphabetical.
fn ordered_columns(row: &Row) -> Vec<&str> {
    let mut columns: Vec<&str> = row.keys().map(String::as_str).collect();
    columns.sort_by_key(|c| (*c != "id", *c));
    columns
}

/// Display width of every column, in characters.
fn column_widths(columns: &[&str], results: &[Row]) -> Vec<usize> {
    columns
        .iter()
        .map(|c| {
            results
                .iter()
                .map(|row| cell(row, c).chars().count())
                .chain(std::iter::once(c.chars().count()))
                .max()
                .unwrap_or_default()
        })
        .collect()
}

fn cell(row: &Row, column: &str) -> String {
    row.get(column).map(val_to_string).unwrap_or_default()
}

fn pad(text: &str, width: usize) -> String {
    format!("{:width$}", text, width = width)
}

fn val_to_string(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.clone(),
        _ => val.to_string(),
    }
}

fn show_checks() {
    println!("{}", "✌ Sentinel Reference".cyan().bold());
    println!();

    let rows = [
        (Check::Exist, "key is present, any value"),
        (Check::NotNull, "value is not null"),
        (Check::Positive, "number > 0"),
        (Check::NotNegative, "number >= 0"),
        (Check::NotZero, "number != 0"),
        (Check::StringNotEmpty, "string is not empty"),
        (Check::ArrayEmpty, "collection has no elements"),
        (Check::ArrayNotEmpty, "collection has elements"),
        (Check::DatetimeFormat, "YYYY-MM-DDTHH:MM:SS±HH:MM"),
        (Check::DateFormat, "YYYY-MM-DD"),
    ];

    println!("{:26} {}", "Token".white().bold(), "Requirement".white().bold());
    println!("{}", "─".repeat(60).dimmed());
    for (check, meaning) in rows {
        println!("{:26} {}", check.as_str().cyan().bold(), meaning.dimmed());
    }
}
