//! sensor-qc: open the QC page, optionally preloading data files.
//!
//! ```text
//! sensor-qc --sampling-type CTD --settings ctd data/*.txt
//! RUST_LOG=sensor_qc=debug sensor-qc --page time-series ferrybox.txt
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};

use sensor_qc::panels::files_ui::select_by_label;
use sensor_qc::{
    run_qc_app, JsonPreferences, LoadRequest, MemoryPreferences, MemorySession, PageKind,
    PageMessage, QcConfig, SessionHandle, UserPreferences,
};

#[derive(Parser, Debug)]
#[command(name = "sensor-qc")]
#[command(about = "Interactive quality control of ferrybox, fixed-platform and CTD data")]
#[command(version)]
struct Args {
    /// Data files to load at startup
    files: Vec<PathBuf>,

    /// Sampling type of the preloaded files
    #[arg(short = 't', long, default_value = "CTD")]
    sampling_type: String,

    /// Settings profile name or YAML path for the preloaded files
    #[arg(short, long, default_value = "")]
    settings: String,

    /// Which page to open
    #[arg(short, long, value_enum, default_value_t = PageKind::Profile)]
    page: PageKind,

    /// User whose preferences are loaded
    #[arg(short, long, env = "SENSOR_QC_USER", default_value = "default")]
    user: String,

    /// Preference file (defaults to the user's file in the config dir)
    #[arg(long)]
    prefs: Option<PathBuf>,

    /// Keep preferences in memory only
    #[arg(long)]
    no_prefs: bool,

    /// Platform depth used for fixed-platform files that lack one
    #[arg(long)]
    depth: Option<String>,

    /// File to select after loading, as "<sampling type>: <id>" or "<id>"
    #[arg(long)]
    select: Option<String>,
}

fn open_preferences(args: &Args) -> Box<dyn UserPreferences> {
    if args.no_prefs {
        return Box::new(MemoryPreferences::new());
    }
    let path = args
        .prefs
        .clone()
        .unwrap_or_else(|| JsonPreferences::default_path(&args.user));
    match JsonPreferences::open(&path) {
        Ok(p) => {
            info!("preferences: {}", path.display());
            Box::new(p)
        }
        Err(e) => {
            warn!("cannot read preferences {}: {e}; using in-memory store", path.display());
            Box::new(MemoryPreferences::new())
        }
    }
}

fn initial_messages(args: &Args) -> Vec<PageMessage> {
    let mut msgs = Vec::new();
    if let Some(depth) = &args.depth {
        msgs.push(PageMessage::SetPlatformDepth(depth.clone()));
    }
    for path in &args.files {
        let mut request = LoadRequest {
            sampling_type: args.sampling_type.clone(),
            data_file_path: path.clone(),
            settings_file: args.settings.clone(),
            ..Default::default()
        };
        if let Some(depth) = &args.depth {
            request.options.insert("depth".to_string(), depth.clone());
        }
        msgs.push(PageMessage::LoadFile(request));
    }
    if let Some(label) = &args.select {
        msgs.push(select_by_label(label));
    }
    msgs
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sensor_qc=info")),
        )
        .init();

    let args = Args::parse();
    info!(
        "starting sensor-qc v{} ({:?} page, {} file(s))",
        env!("CARGO_PKG_VERSION"),
        args.page,
        args.files.len()
    );

    let prefs = open_preferences(&args);
    let initial = initial_messages(&args);
    let session = SessionHandle::new(MemorySession::new());
    let config = QcConfig {
        title: format!("Sensor QC ({})", args.page.key()),
        ..QcConfig::for_page(args.page)
    };

    match run_qc_app(config, session, prefs, initial) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("window terminated: {e}");
            ExitCode::FAILURE
        }
    }
}
