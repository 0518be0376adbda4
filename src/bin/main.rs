//! criteria-sql CLI - Compile JSON criteria to SQL
//!
//! Usage:
//!   criteria-sql compile --metadata <entities.toml> --entity <name> [--where <json>]
//!                        [--order-by <json>] [--limit n] [--offset n]
//!                        [--dialect <dialect>] [--format sql|json]
//!
//! Examples:
//!   criteria-sql compile --metadata entities.toml --entity Author --where '{"books": {"title": "Dune"}}'
//!   criteria-sql compile --metadata entities.toml --entity Author --limit 10 --dialect tsql --format json

use clap::{Parser, Subcommand, ValueEnum};
use criteria_sql::config::Settings;
use criteria_sql::metadata::MetadataRegistry;
use criteria_sql::query::{CompilerOptions, QueryBuilder};
use criteria_sql::sql::Dialect;
use criteria_sql::QueryResult;
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "criteria-sql")]
#[command(about = "Compile ORM-style JSON criteria into multi-dialect SQL")]
#[command(version)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a select query for an entity
    Compile {
        /// Entity metadata file; defaults to `[metadata] path` of criteria.toml
        #[arg(short, long)]
        metadata: Option<PathBuf>,

        /// Root entity name
        #[arg(short, long)]
        entity: String,

        /// Criteria as JSON
        #[arg(short, long = "where")]
        criteria: Option<String>,

        /// Ordering as JSON, e.g. '{"name": "desc"}'
        #[arg(long)]
        order_by: Option<String>,

        #[arg(long)]
        limit: Option<u64>,

        #[arg(long)]
        offset: Option<u64>,

        /// SQL dialect to generate; defaults to the configured one
        #[arg(short, long)]
        dialect: Option<DialectArg>,

        /// Output format
        #[arg(short, long, default_value = "sql")]
        format: OutputFormat,
    },
}

#[derive(Clone, ValueEnum)]
enum DialectArg {
    Postgres,
    Mysql,
    Tsql,
    Duckdb,
    Snowflake,
    Redshift,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Postgres => Dialect::Postgres,
            DialectArg::Mysql => Dialect::MySql,
            DialectArg::Tsql => Dialect::TSql,
            DialectArg::Duckdb => Dialect::DuckDb,
            DialectArg::Snowflake => Dialect::Snowflake,
            DialectArg::Redshift => Dialect::Redshift,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// SQL with parameters inlined
    Sql,
    /// `{"sql": ..., "params": [...]}`
    Json,
}

struct CompileArgs {
    metadata: Option<PathBuf>,
    entity: String,
    criteria: Option<String>,
    order_by: Option<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    dialect: Option<DialectArg>,
    format: OutputFormat,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Compile {
            metadata,
            entity,
            criteria,
            order_by,
            limit,
            offset,
            dialect,
            format,
        } => cmd_compile(CompileArgs {
            metadata,
            entity,
            criteria,
            order_by,
            limit,
            offset,
            dialect,
            format,
        }),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_compile(args: CompileArgs) -> ExitCode {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let metadata_path = match args.metadata {
        Some(path) => path,
        None => match settings.metadata.resolved_path() {
            Ok(Some(path)) => path,
            Ok(None) => {
                eprintln!("No metadata file given, pass --metadata or set [metadata] path");
                return ExitCode::FAILURE;
            }
            Err(e) => {
                eprintln!("Error resolving metadata path: {}", e);
                return ExitCode::FAILURE;
            }
        },
    };

    let registry = match MetadataRegistry::from_file(&metadata_path) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Error reading metadata '{}': {}", metadata_path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let mut options: CompilerOptions = settings.compiler_options();
    if let Some(dialect) = args.dialect {
        options.dialect = dialect.into();
    }

    let criteria = match parse_json("--where", args.criteria.as_deref()) {
        Ok(value) => value,
        Err(code) => return code,
    };
    let order_by = match parse_json("--order-by", args.order_by.as_deref()) {
        Ok(value) => value,
        Err(code) => return code,
    };

    let result = (|| -> QueryResult<String> {
        let mut qb = QueryBuilder::with_options(&registry, &args.entity, None, options)?;
        qb.select(["*"])?;
        if let Some(criteria) = criteria {
            qb.filter(criteria)?;
        }
        if let Some(order_by) = order_by {
            qb.order_by(order_by)?;
        }
        if let Some(limit) = args.limit {
            qb.limit(limit)?;
        }
        if let Some(offset) = args.offset {
            qb.offset(offset)?;
        }

        match args.format {
            OutputFormat::Sql => qb.get_formatted_query(),
            OutputFormat::Json => {
                let compiled = qb.compile()?;
                let output = serde_json::json!({ "sql": compiled.sql, "params": compiled.params });
                Ok(serde_json::to_string_pretty(&output).unwrap_or_default())
            }
        }
    })();

    match result {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Compilation error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn parse_json(flag: &str, input: Option<&str>) -> Result<Option<Value>, ExitCode> {
    let Some(input) = input else {
        return Ok(None);
    };
    serde_json::from_str(input).map(Some).map_err(|e| {
        eprintln!("Invalid JSON for {}: {}", flag, e);
        ExitCode::FAILURE
    })
}
