use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mediasync_core::routines::{
    FlagDuplicates, PurgeDeleted, RecoverOriginals, SetOriginalFilenames, ValidateRoutine,
};
use mediasync_core::{
    CancellationToken, HttpMediaService, SyncApplication, SyncConfig, SyncContext, SyncRoutine,
};

#[derive(Parser)]
#[command(name = "mediasync", version, about = "Keep a hosted media library in sync with its local source tree")]
struct Cli {
    /// Config file (JSON)
    #[arg(short, long, default_value = "mediasync.json")]
    config: PathBuf,

    /// Run against one tenant's section of the config
    #[arg(short, long)]
    instance: Option<String>,

    /// Clear the routine's status tags before it runs
    #[arg(long)]
    reset_tags: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compare remote sizes with local source files
    ValidateSizes,
    /// Compare remote md5 digests with local source files
    ValidateHashes,
    /// Download originals of imported media missing locally
    RecoverOriginals,
    /// Tag repeated uploads of the same content
    FlagDuplicates,
    /// Delete local sources of media marked for deletion
    PurgeDeleted {
        /// Only log what would be deleted
        #[arg(long)]
        dry_run: bool,
    },
    /// Record titles as original filenames where none is set
    SetOriginalFilenames,
}

impl Command {
    fn routine(&self) -> Box<dyn SyncRoutine> {
        match self {
            Command::ValidateSizes => Box::new(ValidateRoutine::sizes()),
            Command::ValidateHashes => Box::new(ValidateRoutine::hashes()),
            Command::RecoverOriginals => Box::new(RecoverOriginals),
            Command::FlagDuplicates => Box::new(FlagDuplicates),
            Command::PurgeDeleted { dry_run } => Box::new(PurgeDeleted::new(*dry_run)),
            Command::SetOriginalFilenames => Box::new(SetOriginalFilenames),
        }
    }
}

fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "mediasync=debug" } else { "mediasync=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let t_total = std::time::Instant::now();
    init_logging(cli.verbose, cli.log_json);

    let mut config = SyncConfig::load(&cli.config)?;
    if let Some(instance) = &cli.instance {
        config.select_instance(instance)?;
    }
    config.validate()?;

    let service = HttpMediaService::new(&config.api_base_url, &config.api_key, &config.api_secret)
        .context("Unable to create media API client")?;

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupt received, stopping after the current media file");
        handler_token.cancel();
    })?;

    let ctx = SyncContext::new(config, Box::new(service.clone()), Box::new(service))
        .with_cancel_token(cancel);
    let mut app = SyncApplication::new(ctx).with_reset_tags(cli.reset_tags);

    let mut routine = cli.command.routine();
    let run = app.run(routine.as_mut())?;
    info!(reset = run.reset, "Finished {}", run.routine);

    eprintln!(
        "Done! {}: {} ({:.2}s)",
        run.routine,
        run.report,
        t_total.elapsed().as_secs_f64()
    );

    Ok(())
}
