use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::net::TcpListener;
use uuid::Uuid;

use crate::application::{CalculatorService, RecordQuery};
use crate::config::{
    ConcurrencyMode, DEFAULT_RANDOM_ORG_URL, DEV_JWT_SECRET, ProviderConfig, ServiceConfig,
};
use crate::domain::{Operands, format_cents, parse_cents};
use crate::io::{Exporter, provider_from_config};

/// Tallycalc - Metered Calculator
#[derive(Parser)]
#[command(name = "tallycalc")]
#[command(about = "A calculator service that charges each operation to a user balance")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(
        short,
        long,
        global = true,
        env = "TALLYCALC_DATABASE",
        default_value = "tallycalc.db"
    )]
    pub database: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub service: ServiceArgs,

    #[command(flatten)]
    pub provider: ProviderArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct ServiceArgs {
    /// Balance granted to new users (e.g., "50.00")
    #[arg(long, global = true, env = "TALLYCALC_OPENING_BALANCE", default_value = "50.00")]
    pub opening_balance: String,

    /// How concurrent charges for one user are serialized
    #[arg(
        long,
        global = true,
        env = "TALLYCALC_CONCURRENCY",
        value_enum,
        default_value_t = ConcurrencyMode::Pessimistic
    )]
    pub concurrency: ConcurrencyMode,

    /// Commit attempts before a contended charge gives up
    #[arg(long, global = true, default_value_t = 64)]
    pub max_commit_attempts: u32,

    /// Random string length used when a request does not give one
    #[arg(long, global = true, default_value_t = 10)]
    pub default_random_length: u32,

    /// Secret used to sign login tokens
    #[arg(long, global = true, env = "TALLYCALC_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Lifetime of login tokens in hours
    #[arg(long, global = true, default_value_t = 24)]
    pub token_ttl_hours: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ProviderArgs {
    /// random.org compatible endpoint for random strings
    #[arg(
        long,
        global = true,
        env = "TALLYCALC_RANDOM_ORG_URL",
        default_value = DEFAULT_RANDOM_ORG_URL
    )]
    pub random_org_url: String,

    /// Timeout for random string requests in seconds
    #[arg(long, global = true, default_value_t = 5)]
    pub provider_timeout_secs: u64,

    /// Answer random_string with this fixed value instead of calling out
    #[arg(long, global = true, env = "TALLYCALC_FIXED_RANDOM_STRING")]
    pub fixed_random_string: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database and seed the operation catalog
    Init,

    /// Run the HTTP API
    Serve {
        /// Address to listen on
        #[arg(long, env = "TALLYCALC_BIND", default_value = "127.0.0.1:8080")]
        bind: String,
    },

    /// User management commands
    #[command(subcommand)]
    User(UserCommands),

    /// Show the operation catalog and prices
    Catalog,

    /// Run a priced operation for a user
    Calc {
        /// Username to charge
        #[arg(short, long)]
        user: String,

        /// Operation: addition, subtraction, multiplication, division, square_root, random_string
        operation: String,

        /// Operands (two for arithmetic, one for square_root)
        #[arg(allow_negative_numbers = true, num_args = 0..=2)]
        numbers: Vec<f64>,

        /// Length for random_string
        #[arg(short, long)]
        length: Option<i64>,
    },

    /// List a user's records
    Records {
        /// Username
        #[arg(short, long)]
        user: String,

        /// Page number (starting at 1)
        #[arg(long, default_value_t = 1)]
        page: i64,

        /// Records per page
        #[arg(short, long, default_value_t = 10)]
        limit: i64,

        /// Only show records whose result contains this text
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Delete (hide) one of a user's records
    Delete {
        /// Username
        #[arg(short, long)]
        user: String,

        /// Record ID
        id: String,
    },

    /// Export a user's records
    Export {
        /// Username
        #[arg(short, long)]
        user: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Reconcile balances against charge history
    Check {
        /// Only check this user
        user: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register a new user
    Register {
        /// Username (3-64 characters)
        username: String,

        /// Password (at least 8 characters)
        #[arg(long, env = "TALLYCALC_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Show user details
    Show {
        /// Username
        username: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        crate::logging::init(self.verbose);

        let config = self.service_config()?;
        let provider_config = self.provider_config();
        let provider = provider_from_config(&provider_config)?;

        match self.command {
            Commands::Init => {
                CalculatorService::init(&self.database, provider, config).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::Serve { bind } => {
                if config.uses_dev_secret() {
                    tracing::warn!(
                        "no JWT secret configured, using the insecure development secret"
                    );
                }
                let service = CalculatorService::init(&self.database, provider, config).await?;
                let listener = TcpListener::bind(&bind)
                    .await
                    .with_context(|| format!("Failed to bind {}", bind))?;
                crate::http::serve(listener, Arc::new(service)).await?;
            }

            Commands::User(user_cmd) => {
                let service = CalculatorService::connect(&self.database, provider, config).await?;
                run_user_command(&service, user_cmd).await?;
            }

            Commands::Catalog => {
                let service = CalculatorService::connect(&self.database, provider, config).await?;
                let operations = service.list_operations().await?;
                if operations.is_empty() {
                    println!("No operations found. Run 'tallycalc init' first.");
                } else {
                    println!("{:<16} {:>10}", "OPERATION", "COST");
                    println!("{}", "-".repeat(27));
                    for op in operations {
                        println!(
                            "{:<16} {:>10}",
                            op.operation_type.as_str(),
                            format_cents(op.cost_cents)
                        );
                    }
                }
            }

            Commands::Calc {
                user,
                operation,
                numbers,
                length,
            } => {
                let service = CalculatorService::connect(&self.database, provider, config).await?;
                let account = service.find_user(&user).await?;
                let operands = Operands {
                    number1: numbers.first().copied(),
                    number2: numbers.get(1).copied(),
                    length,
                };

                let outcome = service
                    .charge_and_record(account.id, &operation, operands)
                    .await?;

                println!("Result: {}", outcome.result);
                println!(
                    "Charged {} to {}, balance {} ({})",
                    format_cents(outcome.record.amount_cents),
                    account.username,
                    format_cents(outcome.record.user_balance_cents),
                    outcome.record.id
                );
            }

            Commands::Records {
                user,
                page,
                limit,
                search,
            } => {
                let service = CalculatorService::connect(&self.database, provider, config).await?;
                run_records_command(&service, &user, page, limit, search).await?;
            }

            Commands::Delete { user, id } => {
                let service = CalculatorService::connect(&self.database, provider, config).await?;
                let account = service.find_user(&user).await?;
                let record_id =
                    Uuid::parse_str(&id).context("Invalid record ID format (expected UUID)")?;
                service.delete_record(account.id, record_id).await?;
                println!("Deleted record: {}", record_id);
            }

            Commands::Export {
                user,
                format,
                output,
            } => {
                let service = CalculatorService::connect(&self.database, provider, config).await?;
                run_export_command(&service, &user, format, output.as_deref()).await?;
            }

            Commands::Check { user } => {
                let service = CalculatorService::connect(&self.database, provider, config).await?;
                run_check_command(&service, user.as_deref()).await?;
            }
        }

        Ok(())
    }

    fn service_config(&self) -> Result<ServiceConfig> {
        let args = &self.service;
        let opening_balance_cents = parse_cents(&args.opening_balance)
            .context("Invalid opening balance. Use '50.00' or '50'")?;

        Ok(ServiceConfig {
            opening_balance_cents,
            concurrency: args.concurrency,
            max_commit_attempts: args.max_commit_attempts,
            default_random_length: args.default_random_length,
            jwt_secret: args
                .jwt_secret
                .clone()
                .unwrap_or_else(|| DEV_JWT_SECRET.to_string()),
            token_ttl: Duration::from_secs(args.token_ttl_hours.saturating_mul(3600)),
        })
    }

    fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            base_url: self.provider.random_org_url.clone(),
            timeout: Duration::from_secs(self.provider.provider_timeout_secs),
            fixed: self.provider.fixed_random_string.clone(),
        }
    }
}

async fn run_user_command(service: &CalculatorService, cmd: UserCommands) -> Result<()> {
    match cmd {
        UserCommands::Register { username, password } => {
            let user = service.register(&username, &password).await?;
            println!(
                "Registered user: {} (balance {})",
                user.username,
                format_cents(user.balance_cents)
            );
        }

        UserCommands::Show { username } => {
            let user = service.find_user(&username).await?;
            let report = service.reconcile(user.id).await?;

            println!("User: {}", user.username);
            println!("  ID:             {}", user.id);
            println!("  Status:         {}", user.status);
            println!("  Balance:        {}", format_cents(user.balance_cents));
            println!(
                "  Opening:        {}",
                format_cents(user.opening_balance_cents)
            );
            println!(
                "  Created:        {}",
                user.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!();
            println!(
                "  Records:        {} ({} deleted)",
                report.record_count, report.deleted_record_count
            );
            println!(
                "  Total charged:  {}",
                format_cents(report.charged_total_cents)
            );
        }
    }
    Ok(())
}

async fn run_records_command(
    service: &CalculatorService,
    username: &str,
    page: i64,
    limit: i64,
    search: Option<String>,
) -> Result<()> {
    let user = service.find_user(username).await?;
    let page = service
        .list_records(
            user.id,
            RecordQuery {
                page,
                page_size: limit,
                search,
            },
        )
        .await?;

    if page.records.is_empty() {
        println!("No records found.");
        return Ok(());
    }

    println!(
        "{:<20} {:<15} {:>8} {:>10}  {}",
        "DATE", "OPERATION", "AMOUNT", "BALANCE", "RESULT"
    );
    println!("{}", "-".repeat(80));

    for record in &page.records {
        println!(
            "{:<20} {:<15} {:>8} {:>10}  {}",
            record.date.format("%Y-%m-%d %H:%M:%S"),
            record.operation_type.as_str(),
            format_cents(record.amount_cents),
            format_cents(record.user_balance_cents),
            record.result
        );
    }

    println!();
    println!(
        "Page {} of {} ({} records)",
        page.page, page.total_pages, page.total_count
    );
    Ok(())
}

async fn run_export_command(
    service: &CalculatorService,
    username: &str,
    format: ExportFormat,
    output: Option<&str>,
) -> Result<()> {
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(service);

    // Determine output writer
    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match format {
        ExportFormat::Csv => {
            let count = exporter.export_records_csv(username, writer).await?;
            if output.is_some() {
                eprintln!("Exported {} records", count);
            }
        }
        ExportFormat::Json => {
            let snapshot = exporter.export_records_json(username, writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported {} records for {}",
                    snapshot.records.len(),
                    snapshot.user.username
                );
            }
        }
    }

    Ok(())
}

async fn run_check_command(service: &CalculatorService, username: Option<&str>) -> Result<()> {
    let users = match username {
        Some(name) => vec![service.find_user(name).await?],
        None => service.list_users().await?,
    };

    let mut inconsistent = 0;
    for user in &users {
        let report = service.reconcile(user.id).await?;
        if report.is_consistent() {
            println!(
                "  ok    {:<20} balance {:>10} ({} charges)",
                user.username,
                format_cents(report.actual_balance_cents),
                report.record_count
            );
        } else {
            inconsistent += 1;
            println!(
                "  FAIL  {:<20} balance {:>10}, expected {} (off by {})",
                user.username,
                format_cents(report.actual_balance_cents),
                format_cents(report.expected_balance_cents),
                format_cents(report.discrepancy_cents())
            );
        }
    }

    println!();
    if inconsistent > 0 {
        bail!(
            "{} of {} accounts do not reconcile",
            inconsistent,
            users.len()
        );
    }
    println!("All {} accounts reconcile", users.len());
    Ok(())
}
