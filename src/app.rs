//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - initialises logging
//! - reads the input table(s)
//! - runs the fit or the prediction
//! - writes the output table and optional exports

use clap::Parser;
use log::LevelFilter;

use crate::cli::{Command, FitArgs, FormatArgs, PredictArgs};
use crate::domain::{ErrorConfig, ErrorMethod, RegressionConfig};
use crate::error::AppError;
use crate::io::{OutputFormat, TableFormat, read_table, write_fit_table, write_matrix_table, write_summary_json};

pub mod pipeline;

use pipeline::{FitJob, PredictJob};

/// Entry point for the `leavitt` binary.
pub fn run() -> Result<(), AppError> {
    // A missing .env is fine; only the process-level knobs live there.
    let _ = dotenvy::dotenv();

    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);
    init_logging(cli.debug);

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Predict(args) => handle_predict(args),
    }
}

fn init_logging(debug: bool) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(LevelFilter::Warn);
    if debug {
        builder.filter_module("leavitt", LevelFilter::Debug);
    }
    // RUST_LOG wins over both defaults.
    builder.parse_default_env();
    let _ = builder.try_init();
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let job = fit_job_from_args(&args)?;
    let table = read_table(args.input.as_deref(), &table_format(&args.format)?)?;
    let run = pipeline::run_fit(&table, &job)?;

    if args.summary {
        eprintln!("{}", crate::report::format_summary(&run.summary));
    }

    let stdout = std::io::stdout();
    write_fit_table(
        stdout.lock(),
        &table,
        &run.coefficient_names,
        &run.columns,
        &output_format(&args.format)?,
    )?;

    if let Some(path) = &args.export_json {
        write_summary_json(path, &run.summary)?;
    }

    Ok(())
}

fn handle_predict(args: PredictArgs) -> Result<(), AppError> {
    let format = table_format(&args.format)?;
    let table = read_table(args.input.as_deref(), &format)?;
    let fitted = read_table(Some(args.coefficients.as_path()), &format)?;

    let job = PredictJob {
        dependent_vars: args.dependent_vars.clone(),
        independent_vars: args.independent_vars.clone(),
        add_const: args.add_const,
        value_label: args.distance_label.clone(),
        modulus_column: args.modulus_column.clone(),
        mean_modulus: args.mean_modulus,
    };
    let magnitudes = pipeline::run_predict(&table, &fitted, &job)?;

    let stdout = std::io::stdout();
    write_matrix_table(
        stdout.lock(),
        &table.index_name,
        &table.index,
        &args.dependent_vars,
        &magnitudes,
        &output_format(&args.format)?,
    )
}

/// Resolve and validate the fit configuration.
pub fn fit_job_from_args(args: &FitArgs) -> Result<FitJob, AppError> {
    let regression = RegressionConfig {
        add_const: args.add_const,
        fit_modulus: !args.fixed_modulus,
        sigma: args.sigma,
        sigma_method: args.sigma_method,
        sigma_max_iter: args.sigma_max_iter,
        mean_modulus: args.mean_modulus,
        units: args.units,
        rcond: args.rcond,
    };
    regression.validate()?;

    let errors = ErrorConfig {
        method: args.error_method,
        iterations: args.error_iterations,
        workers: args.error_processes,
        seed: args.seed,
    };
    errors.validate()?;

    let (error_vars, error_label) = match errors.method {
        ErrorMethod::None => (None, None),
        ErrorMethod::MonteCarlo => {
            if args.error_prefix.is_empty() && args.error_suffix.is_empty() {
                return Err(AppError::new(
                    2,
                    "Monte Carlo errors need --error-prefix or --error-suffix to locate error columns.",
                ));
            }
            let wrap = |name: &str| format!("{}{name}{}", args.error_prefix, args.error_suffix);
            let vars = args.dependent_vars.iter().map(|v| wrap(v)).collect();
            (Some(vars), Some(wrap(&args.distance_label)))
        }
    };

    Ok(FitJob {
        dependent_vars: args.dependent_vars.clone(),
        independent_vars: args.independent_vars.clone(),
        error_vars,
        regression,
        errors,
        distance_label: args.distance_label.clone(),
        error_label,
    })
}

fn table_format(args: &FormatArgs) -> Result<TableFormat, AppError> {
    Ok(TableFormat {
        sep: args.sep.as_deref().map(single_byte).transpose()?,
        na_values: args.na_values.clone(),
    })
}

fn output_format(args: &FormatArgs) -> Result<OutputFormat, AppError> {
    Ok(OutputFormat {
        sep: single_byte(&args.output_sep)?,
        precision: args.precision,
        na_value: args.output_na_value.clone(),
    })
}

fn single_byte(sep: &str) -> Result<u8, AppError> {
    match sep.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(AppError::new(
            2,
            format!("Separator '{sep}' must be a single ASCII character."),
        )),
    }
}

/// Rewrite argv so `leavitt` defaults to `leavitt fit`.
///
/// Rules:
/// - `leavitt -i t.txt ...`          -> `leavitt fit -i t.txt ...`
/// - `leavitt --help/--version/-h`   -> unchanged (show top-level help/version)
/// - `leavitt fit|predict ...`       -> unchanged
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    // `--debug` is global and may precede the subcommand.
    let Some(pos) = argv.iter().skip(1).position(|a| a != "--debug").map(|p| p + 1) else {
        return argv;
    };
    let arg1 = argv[pos].clone();

    let is_top_level_help_or_version = matches!(
        arg1.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg1.as_str(), "fit" | "predict");
    if is_subcommand {
        return argv;
    }

    // A leading flag means "fit flags".
    if arg1.starts_with('-') {
        argv.insert(pos, "fit".to_string());
    }
    argv
}
