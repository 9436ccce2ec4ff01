use std::path::PathBuf;
use std::process;
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use planscrape::config::{DEFAULT_BASE_URL, DEFAULT_COOKIE_FILE, SessionBacking};
use planscrape::months::{self, Direction};
use planscrape::sink::{CsvFileSink, MemorySink, ScrapeReport};
use planscrape::{Crawler, PlanningPortal, ScrapeConfig, ScrapeRequest};

#[derive(Parser)]
#[command(name = "planscrape")]
#[command(about = "A planning applications portal scraper for agent contact details", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[arg(
        long,
        default_value = DEFAULT_BASE_URL,
        global = true,
        help = "Base URL of the online-applications portal"
    )]
    base_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum ReportFormat {
    Csv,
    Json,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk monthly lists for each ward and collect agent names and emails
    Scrape {
        #[arg(
            long,
            value_name = "MON YY",
            value_parser = parse_month_token,
            help = "First month to search (defaults to last month)"
        )]
        start_month: Option<String>,

        #[arg(
            long,
            value_name = "MON YY",
            value_parser = parse_month_token,
            help = "Last month to search (defaults to the current month)"
        )]
        end_month: Option<String>,

        #[arg(
            long = "ward",
            value_name = "TOKEN",
            help = "Ward token to search, repeatable (defaults to every ward)"
        )]
        wards: Vec<String>,

        #[arg(
            short = 'o',
            long,
            help = "Append rows to this CSV file as they are found instead of printing at the end"
        )]
        output: Option<PathBuf>,

        #[arg(
            short = 'f',
            long,
            value_enum,
            default_value = "csv",
            help = "Format printed to stdout when no output file is given"
        )]
        format: ReportFormat,

        #[arg(long, default_value = DEFAULT_COOKIE_FILE, help = "File holding the session cookies")]
        cookie_file: PathBuf,

        #[arg(long, help = "Attempts per request before giving up")]
        retries: Option<u32>,

        #[arg(long, value_name = "SECS", help = "Pause between retries")]
        retry_delay: Option<u64>,

        #[arg(long, value_name = "SECS", help = "Pause before each contact page fetch")]
        delay: Option<u64>,

        #[arg(
            long,
            value_parser = parse_direction,
            default_value = "descending",
            help = "Month order: ascending or descending"
        )]
        direction: Direction,
    },
    /// List the wards offered by the portal's monthly-list search
    Wards {
        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
    /// Print the months a scrape would walk, without touching the network
    Months {
        #[arg(long, value_name = "MON YY", value_parser = parse_month_token)]
        start_month: Option<String>,

        #[arg(long, value_name = "MON YY", value_parser = parse_month_token)]
        end_month: Option<String>,

        #[arg(long, value_parser = parse_direction, default_value = "descending")]
        direction: Direction,
    },
}

fn parse_month_token(s: &str) -> Result<String, String> {
    months::parse_month(s)
        .map(|_| s.trim().to_string())
        .map_err(|e| e.to_string())
}

fn parse_direction(s: &str) -> Result<Direction, String> {
    Direction::from_str(s).map_err(|e| e.to_string())
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

fn build_crawler(config: &ScrapeConfig) -> Crawler<PlanningPortal> {
    let portal = PlanningPortal::new(config).unwrap_or_else(|e| {
        log::error!("Error creating portal client: {}", e);
        process::exit(1);
    });
    Crawler::new(portal, config)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    match cli.command {
        Commands::Scrape {
            start_month,
            end_month,
            wards,
            output,
            format,
            cookie_file,
            retries,
            retry_delay,
            delay,
            direction,
        } => {
            let mut config = ScrapeConfig::batch();
            config.base_url = cli.base_url;
            config.direction = direction;
            config.session = SessionBacking::File(cookie_file);
            if let Some(attempts) = retries {
                config.retry.attempts = attempts;
            }
            if let Some(secs) = retry_delay {
                config.retry.delay = Duration::from_secs(secs);
            }
            if let Some(secs) = delay {
                config.delay = Duration::from_secs(secs);
            }

            let crawler = build_crawler(&config);
            let request = ScrapeRequest {
                start_month,
                end_month,
                wards,
            };

            match output {
                Some(path) => {
                    let mut sink = CsvFileSink::open(&path).unwrap_or_else(|e| {
                        log::error!("Error opening {}: {}", path.display(), e);
                        process::exit(1);
                    });
                    let summary = crawler.run(&request, &mut sink).await.unwrap_or_else(|e| {
                        log::error!("Scrape failed: {}", e);
                        process::exit(1);
                    });
                    log::info!("Wrote {} row(s) to {}", sink.written(), path.display());
                    print!("{}", summary);
                }
                None => {
                    let mut sink = MemorySink::new();
                    let summary = crawler.run(&request, &mut sink).await.unwrap_or_else(|e| {
                        log::error!("Scrape failed: {}", e);
                        process::exit(1);
                    });
                    match format {
                        ReportFormat::Csv => match sink.to_csv() {
                            Ok(csv) => print!("{}", csv),
                            Err(e) => {
                                log::error!("Error rendering CSV: {}", e);
                                process::exit(1);
                            }
                        },
                        ReportFormat::Json => {
                            let wards = summary.ward_values();
                            serialize_json(&ScrapeReport::new(
                                sink.into_rows(),
                                summary.months,
                                wards,
                            ))
                        }
                    }
                }
            }
        }

        Commands::Wards { format } => {
            let config = ScrapeConfig {
                base_url: cli.base_url,
                ..ScrapeConfig::batch()
            };
            let crawler = build_crawler(&config);

            let wards = crawler.wards().await.unwrap_or_else(|e| {
                log::error!("Error fetching ward list: {}", e);
                process::exit(1);
            });

            match format {
                OutputFormat::Json => serialize_json(&wards),
                OutputFormat::Text => {
                    if wards.is_empty() {
                        println!("No wards to display.");
                    } else {
                        for (i, ward) in wards.iter().enumerate() {
                            println!("{:>3}. {}", i + 1, ward);
                        }
                    }
                }
            }
        }

        Commands::Months {
            start_month,
            end_month,
            direction,
        } => {
            let months = months::month_range(
                start_month.as_deref(),
                end_month.as_deref(),
                direction,
                months::today(),
            )
            .unwrap_or_else(|e| {
                log::error!("Invalid month range: {}", e);
                process::exit(1);
            });

            for month in months {
                println!("{}", month);
            }
        }
    }
}
