use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use engine::regression::{
    TraceGolden, assert_or_update_golden_json, assert_replay_deterministic, state_digest,
    update_goldens_enabled,
};
use trainer::catalog::LevelCatalog;
use trainer::driver::{Driver, ScriptStep};
use trainer::feedback::{FeedbackSink, TracingSink};
use trainer::recorder::{CompletionSink, CompletionStore, MemoryStore};
use trainer::remote::{RemoteServer, drain_remote_commands};
use trainer::settings::{ConfigStore, TrainerConfig};

#[derive(Debug, Parser)]
#[command(name = "trainer")]
#[command(about = "Driving-awareness level evaluation engine")]
struct Cli {
    /// Level catalog JSON; the built-in levels are used when omitted.
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
    /// Config file; defaults to TRAINER_CONFIG_PATH or the per-user config dir.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the levels in the catalog.
    Levels,
    /// Play a level from a JSON script and print the final view.
    Play {
        level: String,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        script: PathBuf,
        /// Persist completions to the progress store instead of memory.
        #[arg(long, default_value_t = false)]
        record: bool,
    },
    /// Run a level in real time behind the HTTP control API.
    Serve {
        level: String,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Stop after this many seconds; runs until killed when omitted.
        #[arg(long)]
        for_secs: Option<u64>,
    },
    /// Show the completion entries stored for a user.
    Progress {
        #[arg(long)]
        user: String,
    },
    /// Print the effective config; `--write` stores it, filling in every default.
    Config {
        #[arg(long, default_value_t = false)]
        write: bool,
    },
    /// Replay a script twice and check the state digests, optionally against a golden.
    Verify {
        level: String,
        #[arg(long)]
        script: PathBuf,
        #[arg(long)]
        golden: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    trainer::logging::init_tracing("info");
    let cli = Cli::parse();

    let catalog = load_catalog(cli.catalog.as_deref())?;
    let store = match &cli.config {
        Some(path) => ConfigStore::new(path),
        None => ConfigStore::from_env(),
    };
    let config = store.load();

    match cli.command {
        Commands::Levels => cmd_levels(&catalog),
        Commands::Play {
            level,
            user,
            script,
            record,
        } => cmd_play(&catalog, config, &level, user.as_deref(), &script, record),
        Commands::Serve {
            level,
            user,
            port,
            for_secs,
        } => cmd_serve(&catalog, config, &level, user.as_deref(), port, for_secs),
        Commands::Progress { user } => cmd_progress(&user),
        Commands::Config { write } => cmd_config(&store, &config, write),
        Commands::Verify {
            level,
            script,
            golden,
        } => cmd_verify(&catalog, config, &level, &script, golden.as_deref()),
    }
}

fn load_catalog(path: Option<&Path>) -> Result<LevelCatalog> {
    match path {
        Some(path) => LevelCatalog::load(path)
            .with_context(|| format!("loading level catalog {}", path.display())),
        None => Ok(LevelCatalog::builtin()),
    }
}

fn load_script(path: &Path) -> Result<Vec<ScriptStep>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading script {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing script {}", path.display()))
}

fn feedback_sink() -> Box<dyn FeedbackSink> {
    #[cfg(feature = "audio")]
    {
        match trainer::feedback::AudioSink::try_new(TracingSink) {
            Ok(sink) => return Box::new(sink),
            Err(err) => tracing::warn!(%err, "audio output unavailable, tones will be logged"),
        }
    }
    Box::new(TracingSink)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_levels(catalog: &LevelCatalog) -> Result<()> {
    for level in catalog.iter() {
        println!(
            "{:<8} {:<10} {:<12} {}",
            level.id,
            level.label,
            level.kind().label(),
            level.clip
        );
    }
    Ok(())
}

fn cmd_play(
    catalog: &LevelCatalog,
    config: TrainerConfig,
    level: &str,
    user: Option<&str>,
    script: &Path,
    record: bool,
) -> Result<()> {
    let steps = load_script(script)?;
    if record {
        let mut driver = Driver::start(
            catalog,
            level,
            user,
            config,
            feedback_sink(),
            CompletionStore::from_env(),
        )?;
        driver.run_script(&steps);
        print_json(&driver.view())
    } else {
        let mut driver = Driver::start(
            catalog,
            level,
            user,
            config,
            feedback_sink(),
            MemoryStore::default(),
        )?;
        driver.run_script(&steps);
        print_json(&driver.view())
    }
}

fn cmd_serve(
    catalog: &LevelCatalog,
    config: TrainerConfig,
    level: &str,
    user: Option<&str>,
    port: Option<u16>,
    for_secs: Option<u64>,
) -> Result<()> {
    let port = port.unwrap_or(config.server.port);
    let frame = config.server.poll_interval;
    let mut driver = Driver::start(
        catalog,
        level,
        user,
        config,
        feedback_sink(),
        CompletionStore::from_env(),
    )?;
    let mut server = RemoteServer::start(port)
        .with_context(|| format!("starting remote api on port {port}"))?;

    let deadline = for_secs.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut last = Instant::now();
    loop {
        drain_remote_commands(&mut server.rx, &mut driver);

        let now = Instant::now();
        driver.advance(now.duration_since(last));
        last = now;

        if deadline.is_some_and(|deadline| now >= deadline) {
            break;
        }
        thread::sleep(frame);
    }

    server.shutdown();
    print_json(&driver.view())
}

fn cmd_progress(user: &str) -> Result<()> {
    let store = CompletionStore::from_env();
    tracing::debug!(path = %store.path_for(user).display(), "reading progress");
    print_json(&store.entries(user))
}

fn cmd_config(store: &ConfigStore, config: &TrainerConfig, write: bool) -> Result<()> {
    if write {
        store
            .save(config)
            .with_context(|| format!("writing config {}", store.path().display()))?;
        tracing::info!(path = %store.path().display(), "config written");
    }
    print_json(config)
}

fn cmd_verify(
    catalog: &LevelCatalog,
    config: TrainerConfig,
    level: &str,
    script: &Path,
    golden: Option<&Path>,
) -> Result<()> {
    let steps = load_script(script)?;
    let mut driver = Driver::start(
        catalog,
        level,
        Some("verify"),
        config,
        TracingSink,
        MemoryStore::default(),
    )?;
    driver.run_script(&steps);

    let runner = driver.runner();
    let journal = runner.journal().to_vec();
    let trace = assert_replay_deterministic(runner.logic().clone(), &journal)
        .context("replay diverged")?;

    let live = state_digest(runner.state())?;
    if trace.final_digest() != Some(live.as_str()) {
        bail!("replayed state differs from the live run");
    }

    if let Some(path) = golden {
        let golden = TraceGolden::new(level, trace.clone());
        assert_or_update_golden_json(path, &golden, update_goldens_enabled())
            .with_context(|| format!("checking golden {}", path.display()))?;
    }

    println!(
        "{} inputs replayed, outcome {:?}, final digest {}",
        journal.len(),
        driver.state().outcome(),
        trace.final_digest().unwrap_or("-")
    );
    Ok(())
}
