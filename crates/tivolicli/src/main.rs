use anyhow::{Context, Result};
use clap::Parser;
use tivoli_images::config::Config;
use tivoli_images::layout::{WaterfallLayout, column_width};
use tivoli_images::{logging, metrics};

use settings::{Cli, Commands, LayoutArgs, OutputFormat, WarmArgs};

mod output;
mod settings;
mod warm;

fn layout(args: LayoutArgs) -> Result<()> {
    let images = settings::read_search(&args.search)?;
    let layout = WaterfallLayout::new(
        args.columns,
        column_width(args.width, args.columns, args.spacing),
        args.spacing,
    )
    .layout_images(&images);

    match args.format {
        OutputFormat::Json => output::print_json(&images, &layout)?,
        OutputFormat::Compact => output::print_compact(&images, &layout),
    }
    Ok(())
}

fn warm(args: WarmArgs) -> Result<()> {
    let config = Config::get(args.config.as_deref()).context("failed loading config")?;

    let _sentry = sentry::init(sentry::ClientOptions {
        dsn: config.sentry_dsn.clone(),
        release: sentry::release_name!(),
        ..Default::default()
    });

    // SAFETY: The runtime is not started yet, this is still single-threaded.
    unsafe { logging::init_logging(&config) };

    if let Some(ref statsd) = config.metrics.statsd {
        metrics::configure_statsd(
            &config.metrics.prefix,
            statsd.as_str(),
            config.metrics.custom_tags.clone(),
        )
        .context("failed to configure statsd")?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("tivoli-worker")
        .enable_all()
        .build()?;
    let result = runtime.block_on(warm::warm(config, args));
    if let Err(ref error) = result {
        logging::ensure_log_error(error);
    }
    result
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Layout(args) => {
            tracing_subscriber::fmt::init();
            layout(args)
        }
        Commands::Warm(args) => warm(args),
    }
}
