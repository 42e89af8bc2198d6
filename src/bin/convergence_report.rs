//! Convergence Report Generator
//!
//! Replays a recorded order stream through the weight estimators and reports how quickly
//! each one learns every product's weight. Can also train the Bayesian estimator and
//! classify a single order as complete or missing an item.
//!
//! Usage:
//!   convergence_report evaluate --orders <FILE> --products <FILE> [OPTIONS]
//!   convergence_report classify --orders <FILE> --products <FILE> --order <FILE>
//!   convergence_report generate-config [--output <FILE>]
//!
//! Example:
//!   convergence_report evaluate --orders orders.json --products products.json \
//!       --estimator kalman --estimator bayesian --format both --output report.json

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use order_weight_estimator::config::LogFormat;
use order_weight_estimator::evaluation::ground_truth;
use order_weight_estimator::{
    build_estimator, AppConfig, BayesianRegressionEstimator, CompletenessReport,
    ConvergenceEvaluator, ConvergenceReport, EstimatorKind, Order, PriorTable, Product,
    WeightEstimator,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser)]
#[command(name = "convergence_report")]
#[command(version, about = "Evaluate per-item weight estimators on recorded orders")]
struct Cli {
    /// Path to TOML config file
    #[arg(short, long, default_value = "weights.toml", global = true)]
    config: PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format override
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the convergence evaluation and print ranked reports
    Evaluate {
        /// JSON array of orders with measured weights
        #[arg(long)]
        orders: PathBuf,

        /// JSON array of products with expected ranges
        #[arg(long)]
        products: PathBuf,

        /// Estimators to evaluate (repeatable; default: all)
        #[arg(short, long = "estimator")]
        estimators: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Ascii)]
        format: ReportFormat,

        /// Output file for JSON report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Train the Bayesian estimator, then classify one order
    Classify {
        /// Training orders
        #[arg(long)]
        orders: PathBuf,

        #[arg(long)]
        products: PathBuf,

        /// JSON order (expected items plus measuredWeight) to classify
        #[arg(long)]
        order: PathBuf,
    },
    /// Write the default configuration
    GenerateConfig {
        /// Output file path
        #[arg(short, long, default_value = "weights.toml")]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    /// Ranked table on stdout
    Ascii,
    /// Pretty-printed JSON on stdout
    Json,
    /// Table followed by JSON
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
            LogFormatArg::Compact => LogFormat::Compact,
        }
    }
}

// ============================================================================
// Report Data Structures
// ============================================================================

/// Complete evaluation report.
#[derive(Debug, Serialize, Deserialize)]
struct EvaluationReport {
    /// Number of orders in the input stream
    total_orders: usize,
    /// Number of products with ground truth
    total_products: usize,
    /// Convergence tolerance used (g)
    error_threshold: f64,
    /// Reports, best first
    rankings: Vec<ConvergenceReport>,
}

// ============================================================================
// Setup
// ============================================================================

fn load_config(cli: &Cli) -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load(&cli.config)?)
}

fn setup_logging(config: &AppConfig, cli: &Cli) {
    let level = cli.log_level.as_ref().unwrap_or(&config.logging.level);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let format = cli.log_format.map_or(config.logging.format, LogFormat::from);

    // Logs go to stderr so stdout stays machine-readable
    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        LogFormat::Compact => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .compact()
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .pretty()
                .init();
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<T, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    let value = serde_json::from_str(&content)
        .map_err(|e| format!("failed to parse {}: {e}", path.display()))?;
    Ok(value)
}

fn parse_kinds(names: &[String]) -> Result<Vec<EstimatorKind>, order_weight_estimator::Error> {
    if names.is_empty() {
        return Ok(EstimatorKind::ALL.to_vec());
    }
    names.iter().map(|name| name.parse()).collect()
}

// ============================================================================
// Report Generation
// ============================================================================

fn generate_report(
    config: &AppConfig,
    kinds: &[EstimatorKind],
    products: &[Product],
    orders: &[Order],
) -> EvaluationReport {
    let priors = PriorTable::from_catalog(products, config.estimators.default_prior_mean);
    let truth = ground_truth(products);

    let mut estimators: Vec<Box<dyn WeightEstimator>> = kinds
        .iter()
        .map(|&kind| build_estimator(kind, &config.estimators, priors.clone()))
        .collect();

    let evaluator = ConvergenceEvaluator::new(config.evaluation.clone());
    let rankings = evaluator.evaluate_all(&mut estimators, orders, &truth);

    EvaluationReport {
        total_orders: orders.len(),
        total_products: truth.len(),
        error_threshold: config.evaluation.error_threshold,
        rankings,
    }
}

fn classify_order(
    config: &AppConfig,
    products: &[Product],
    training: &[Order],
    order: &Order,
) -> order_weight_estimator::Result<CompletenessReport> {
    let priors = PriorTable::from_catalog(products, config.estimators.default_prior_mean);
    let mut bayes = BayesianRegressionEstimator::new(config.estimators.bayesian.clone(), priors);

    for sample in training {
        if let Err(e) = bayes.update(sample, sample.measured_weight) {
            tracing::warn!(error = %e, "Skipping training order");
        }
    }
    bayes.classify(order, order.measured_weight)
}

// ============================================================================
// Output Formatting
// ============================================================================

fn format_order(order: Option<f64>) -> String {
    order.map_or_else(|| "-".to_string(), |n| format!("{n:.1}"))
}

fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Print ASCII formatted report to stdout.
fn print_ascii(report: &EvaluationReport) {
    let border = "=".repeat(78);
    let separator = "-".repeat(78);

    println!("{border}");
    println!("{:^78}", "ESTIMATOR CONVERGENCE REPORT");
    println!("{border}");
    println!(
        " Orders: {}   Products: {}   Tolerance: {} g",
        report.total_orders, report.total_products, report.error_threshold
    );
    println!("{separator}");
    println!(
        " {:4} {:40} {:>10} {:>8} {:>10}",
        "Rank", "Estimator", "Converged", "Mean", "Processed"
    );
    println!("{separator}");

    for (rank, r) in report.rankings.iter().enumerate() {
        println!(
            " {:4} {:40} {:>4}/{:<5} {:>8} {:>10}",
            rank + 1,
            truncate_str(&r.estimator_name, 40),
            r.converged_count,
            r.product_count(),
            format_order(r.mean_convergence_order),
            r.orders_processed,
        );
        if r.ignored_updates > 0 || r.degenerate_updates > 0 {
            println!(
                "      ignored: {}  numeric failures: {}",
                r.ignored_updates, r.degenerate_updates
            );
        }
    }
    println!("{border}");
}

fn print_classification(report: &CompletenessReport) {
    println!(
        "Measured {:.1} g, predicted {:.1} ± {:.1} g",
        report.measured_weight,
        report.predicted_weight,
        report.predicted_variance.max(0.0).sqrt()
    );
    println!(
        "P(complete) = {:.4}  P(missing) = {:.4}",
        report.prob_complete, report.prob_missing
    );
    if report.is_complete() {
        println!("Order is complete");
    }
    for candidate in &report.top_missing_candidates {
        println!(
            "  missing {:30} p = {:.4}  (expected {:.1} g)",
            candidate.product_id.as_str(),
            candidate.probability,
            candidate.predicted_weight_if_missing
        );
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Commands::GenerateConfig { output } = &cli.command {
        let text = AppConfig::default().to_toml_string()?;
        std::fs::write(output, text)?;
        println!("Wrote default configuration to {}", output.display());
        return Ok(());
    }

    let config = load_config(&cli)?;
    setup_logging(&config, &cli);

    match &cli.command {
        Commands::Evaluate {
            orders,
            products,
            estimators,
            format,
            output,
        } => {
            let kinds = parse_kinds(estimators)?;
            let products: Vec<Product> = read_json(products)?;
            let orders: Vec<Order> = read_json(orders)?;
            tracing::info!(
                orders = orders.len(),
                products = products.len(),
                estimators = kinds.len(),
                "Starting convergence evaluation"
            );

            let report = generate_report(&config, &kinds, &products, &orders);

            match format {
                ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                ReportFormat::Both => {
                    print_ascii(&report);
                    println!();
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                ReportFormat::Ascii => print_ascii(&report),
            }

            if let Some(path) = output {
                std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
                tracing::info!(path = %path.display(), "Report written");
            }
        }
        Commands::Classify {
            orders,
            products,
            order,
        } => {
            let products: Vec<Product> = read_json(products)?;
            let training: Vec<Order> = read_json(orders)?;
            let order: Order = read_json(order)?;
            let report = classify_order(&config, &products, &training, &order)?;
            print_classification(&report);
        }
        Commands::GenerateConfig { .. } => {}
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
