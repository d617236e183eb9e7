//! autohunt - perception-driven hunt automation
//!
//! Repeatedly samples a game window, classifies what is on screen and
//! issues synthetic input in response, until a resource budget runs out or
//! a special encounter pauses the session for operator review.

mod capture;
mod config;
mod error;
mod hunt;
mod input;
mod macros;
mod vision;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::capture::WindowFrameSource;
use crate::config::HuntConfig;
use crate::hunt::events::StatusEvent;
use crate::hunt::{Collaborators, HuntOrchestrator};
use crate::input::{EnigoActuator, InputActuator};
use crate::macros::MacroStore;
use crate::vision::classifier::ReadRegion;
use crate::vision::ocr::OcrsRecognizer;
use crate::vision::{CompositeStateDetector, TemplateDetector, TextClassifier};

/// autohunt - screen-state detection and input orchestration
#[derive(Parser, Debug)]
#[command(name = "autohunt")]
#[command(about = "Perception-driven hunt automation for a game window")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of reference images
    #[arg(short, long, default_value = "templates")]
    templates: PathBuf,

    /// Directory of stored macros
    #[arg(short, long, default_value = "macros")]
    macros: PathBuf,

    /// Roster labels, overriding the configuration file
    #[arg(short, long, value_delimiter = ',')]
    roster: Option<Vec<String>>,

    /// Start hunting from the current position instead of repositioning
    #[arg(long)]
    from_current: bool,

    /// Target window title substring, overriding the configuration file
    #[arg(short, long)]
    window: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = load_configuration(&args);
    if let Some(roster) = args.roster.clone() {
        config.roster = roster;
        config.clamp();
    }
    if let Some(window) = args.window.clone() {
        config.movement.window_title = window;
    }
    info!(
        "roster: [{}], window: '{}'",
        config.roster.join(", "),
        config.movement.window_title
    );

    let mut orchestrator = build_orchestrator(&args, config)?;
    orchestrator.on_status(Arc::new(|event| match event {
        StatusEvent::Warning(msg) => warn!("{msg}"),
        StatusEvent::Error(msg) => tracing::error!("{msg}"),
        other => info!("{other:?}"),
    }));
    orchestrator.on_special_encounter(Arc::new(|c| {
        warn!(
            "SPECIAL ENCOUNTER ({:?}): {} - session paused, review and resume",
            c.kind,
            c.subjects.join(", ")
        );
    }));

    if args.from_current {
        orchestrator.start_from_current_position()?;
    } else {
        orchestrator.start()?;
    }
    info!("hunting; press Enter to stop");

    wait_for_operator();

    orchestrator.stop();
    let stats = orchestrator.statistics();
    info!(
        "session over: {} moves, {} encounters, {} heal cycles in {:?}",
        stats.moves, stats.total_encounters, stats.heal_cycles, stats.elapsed
    );
    Ok(())
}

fn load_configuration(args: &Args) -> HuntConfig {
    let path = args
        .config
        .clone()
        .or_else(config::default_config_path);
    match path {
        Some(path) => {
            let config = config::load_or_default(&path);
            if !path.exists() {
                if let Err(e) = config::save_config(&config, &path) {
                    warn!("could not write default config to {path:?}: {e:#}");
                }
            }
            config
        }
        None => HuntConfig::default(),
    }
}

fn build_orchestrator(args: &Args, config: HuntConfig) -> Result<HuntOrchestrator> {
    let mut templates = TemplateDetector::new();
    match templates.load_directory(&args.templates) {
        Ok(count) => info!("{count} reference image(s) from {:?}", args.templates),
        Err(e) => warn!("no reference images loaded: {e:#}"),
    }

    let recognizer = OcrsRecognizer::from_default_models()
        .context("OCR models unavailable; see ~/.cache/ocrs")?;
    let mut classifier = TextClassifier::new(Box::new(recognizer))
        .with_max_retries(config.detection.ocr_max_retries);
    if let Some([fx, fy, fw, fh]) = config.detection.read_region {
        classifier = classifier.with_region(ReadRegion { fx, fy, fw, fh });
    }

    let actuator = EnigoActuator::new()?;
    let collaborators = Collaborators {
        source: Box::new(WindowFrameSource::new(config.movement.window_title.clone())),
        actuator: Arc::new(Mutex::new(Box::new(actuator) as Box<dyn InputActuator>)),
        detector: CompositeStateDetector::new(templates),
        classifier,
        store: MacroStore::new(&args.macros)?,
    };
    Ok(HuntOrchestrator::new(config, collaborators))
}

/// Block until the operator presses Enter.
fn wait_for_operator() {
    let (tx, rx) = crossbeam_channel::bounded::<()>(1);
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        let _ = tx.send(());
    });
    let _ = rx.recv();
}
