//! Campus Scan
//!
//! Point a camera at a campus sign, tap the text, and find out which
//! facility it names.

mod camera;
mod config;
mod facility;
mod gui;
mod logging;
mod ocr;
mod paths;
mod scan;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::thread;

use camera::TapPayload;
use config::get_config;
use facility::geo::{sorted_by_distance, to_geojson, GeoBounds, LatLng};
use facility::search::FacilitySearch;
use facility::{FacilityDirectory, FacilityMatcher};
use ocr::{PreprocessPipeline, Recognizer, TesseractRecognizer};
use scan::{RecognizerSlot, ScanContext, ScanOutcome};

#[derive(Parser)]
#[command(name = "campus-scan", version, about = "Tap campus signs to identify facilities")]
struct Cli {
    /// Path to config.json (defaults to the one next to the executable)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug messages
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Open the camera window (default)
    Gui {
        /// Show this image instead of a live camera
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Scan a still image as if it had been tapped at (x, y)
    Scan {
        image: PathBuf,
        #[arg(long)]
        x: u32,
        #[arg(long)]
        y: u32,
    },
    /// Resolve recognized text against the facility directory
    Match { text: String },
    /// Load the facility directory and report unusable patterns
    CheckDirectory,
    /// Search facilities by name, description, tags and aliases
    Search { query: String },
    /// List facilities ordered by distance from a point
    Nearby {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Print the directory as a GeoJSON feature collection
    ExportGeojson {
        /// Only facilities inside SOUTH WEST NORTH EAST
        #[arg(
            long,
            num_args = 4,
            value_names = ["SOUTH", "WEST", "NORTH", "EAST"],
            allow_hyphen_values = true
        )]
        bounds: Option<Vec<f64>>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::install_panic_hook();
    paths::ensure_directories()?;
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    if let Err(e) = logging::init_with_level(level) {
        eprintln!("Failed to install logger: {}", e);
    }

    config::init_config(cli.config.as_deref());
    let config = get_config();

    let directory = load_directory(&config.directory_path())?;

    match cli.command.unwrap_or(Command::Gui { image: None }) {
        Command::Gui { image } => run_gui_mode(directory, image),
        Command::Scan { image, x, y } => run_scan(directory, &image, x, y),
        Command::Match { text } => run_match(&directory, &text),
        Command::CheckDirectory => run_check_directory(&directory),
        Command::Search { query } => run_search(&directory, &query),
        Command::Nearby { lat, lng, limit } => run_nearby(&directory, LatLng::new(lat, lng), limit),
        Command::ExportGeojson { bounds } => run_export_geojson(&directory, bounds.as_deref()),
    }
}

fn load_directory(path: &Path) -> Result<FacilityDirectory> {
    let directory = FacilityDirectory::load(path)
        .with_context(|| format!("Failed to load facility directory {}", path.display()))?;
    log::info!(
        "Loaded {} facilities from {}",
        directory.len(),
        path.display()
    );
    Ok(directory)
}

fn build_matcher(directory: &FacilityDirectory) -> Arc<FacilityMatcher> {
    let matcher = FacilityMatcher::new(directory, get_config().match_cache_capacity);
    if !matcher.rejected().is_empty() {
        log::warn!(
            "{} ocrName patterns were rejected; run check-directory for details",
            matcher.rejected().len()
        );
    }
    Arc::new(matcher)
}

fn scan_context(directory: &FacilityDirectory, recognizer: RecognizerSlot) -> ScanContext {
    let config = get_config();
    let snapshot_dir = config.developer_mode.then(paths::get_snapshots_dir);
    ScanContext::new(
        recognizer,
        Arc::new(PreprocessPipeline::new(config.ocr.preprocess.clone())),
        build_matcher(directory),
    )
    .with_deepest_box(config.ocr.prefer_deepest_box)
    .with_snapshot_dir(snapshot_dir)
}

/// Makes the recognizer usable once its language data is in place.
fn prepare_recognizer(slot: &RecognizerSlot) -> Result<()> {
    let config = get_config();
    ocr::setup::find_tesseract_executable()?;
    ocr::setup::ensure_traineddata(&config.ocr.language)?;
    let tesseract = TesseractRecognizer::from_config(&config.ocr);
    log::info!("Tesseract recognizer ready for {}", tesseract.language());
    let recognizer: Arc<dyn Recognizer> = Arc::new(tesseract);
    if slot.set(recognizer).is_err() {
        log::warn!("Recognizer was already prepared");
    }
    Ok(())
}

fn run_gui_mode(directory: FacilityDirectory, still_image: Option<PathBuf>) -> Result<()> {
    let recognizer: RecognizerSlot = Arc::new(OnceLock::new());

    let setup_slot = Arc::clone(&recognizer);
    thread::Builder::new()
        .name("ocr-setup".to_string())
        .spawn(move || match prepare_recognizer(&setup_slot) {
            Ok(()) => log::info!("OCR ready"),
            Err(e) => log::warn!("OCR setup failed: {:#}. Scans will report not ready.", e),
        })?;

    let (taps, tap_receiver) = scan::create_scan_queue();
    let (report_sender, reports) = scan::create_report_channel();
    let ctx = scan_context(&directory, Arc::clone(&recognizer));
    let worker = thread::Builder::new()
        .name("scan-worker".to_string())
        .spawn(move || scan::run_scan_worker(tap_receiver, ctx, report_sender))?;

    log::info!("Starting GUI application...");
    let result = gui::run_gui(gui::GuiLaunch {
        still_image,
        taps,
        reports,
        recognizer,
    });

    // The GUI owned the tap sender; the worker exits once it is dropped.
    if worker.join().is_err() {
        log::warn!("Scan worker panicked");
    }

    match result {
        Ok(()) => {
            log::info!("GUI application exited normally");
            Ok(())
        }
        Err(e) => {
            log::error!("GUI error: {}", e);
            Err(anyhow!("GUI error: {}", e))
        }
    }
}

fn run_scan(directory: FacilityDirectory, path: &Path, x: u32, y: u32) -> Result<()> {
    let image = image::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?
        .to_rgba8();
    if x >= image.width() || y >= image.height() {
        return Err(anyhow!(
            "Tap ({}, {}) lies outside the {}x{} image",
            x,
            y,
            image.width(),
            image.height()
        ));
    }

    let recognizer: RecognizerSlot = Arc::new(OnceLock::new());
    prepare_recognizer(&recognizer)?;
    let ctx = scan_context(&directory, recognizer);

    let payload = TapPayload {
        x,
        y,
        image,
        captured_at: Local::now(),
    };
    if let Some(dir) = &ctx.snapshot_dir {
        scan::worker::save_snapshot(dir, &payload)?;
    }

    match scan::process_payload(&ctx, &payload) {
        ScanOutcome::FoundFacility { facility, text } => {
            println!("{} -> {} ({})", text, facility.name, facility.id);
        }
        ScanOutcome::TextOnly { text } => println!("{} -> no matching facility", text),
        ScanOutcome::NoText => println!("No text near ({}, {})", x, y),
        ScanOutcome::NotReady => println!("OCR is not ready"),
        ScanOutcome::Error(e) => return Err(anyhow!("Scan failed: {}", e)),
    }
    Ok(())
}

fn run_match(directory: &FacilityDirectory, text: &str) -> Result<()> {
    let matcher = build_matcher(directory);
    match matcher.find_building_with_debug(text) {
        Some(hit) => println!(
            "{} -> {} ({}) via {} [{}]",
            text, hit.facility.name, hit.facility.id, hit.matched_by, hit.regex
        ),
        None => println!("{} -> no matching facility", text),
    }
    Ok(())
}

fn run_check_directory(directory: &FacilityDirectory) -> Result<()> {
    let matcher = FacilityMatcher::new(directory, get_config().match_cache_capacity);
    println!(
        "{} facilities, {} usable patterns",
        directory.len(),
        matcher.patterns().len()
    );
    for rejected in matcher.rejected() {
        println!(
            "  {}: {:?} rejected ({:?})",
            rejected.facility_id, rejected.source, rejected.reason
        );
    }
    if matcher.rejected().is_empty() {
        println!("All patterns OK");
    }
    Ok(())
}

fn run_search(directory: &FacilityDirectory, query: &str) -> Result<()> {
    let hits = FacilitySearch::new().filter(directory.facilities(), query);
    if hits.is_empty() {
        println!("No facilities match {:?}", query);
    }
    for facility in hits {
        println!("{}\t{}\t{}", facility.id, facility.name, facility.kind.label());
    }
    Ok(())
}

fn run_nearby(directory: &FacilityDirectory, center: LatLng, limit: usize) -> Result<()> {
    for (id, metres) in sorted_by_distance(directory.facilities().iter().map(|f| f.as_ref()), center)
        .into_iter()
        .take(limit)
    {
        let name = directory.get(&id).map(|f| f.name.as_str()).unwrap_or("");
        println!("{:>6} m\t{}\t{}", metres, id, name);
    }
    Ok(())
}

fn run_export_geojson(directory: &FacilityDirectory, bounds: Option<&[f64]>) -> Result<()> {
    let bounds = match bounds {
        Some(&[south, west, north, east]) => Some(GeoBounds {
            south,
            west,
            north,
            east,
        }),
        Some(other) => return Err(anyhow!("Expected 4 bounds values, got {}", other.len())),
        None => None,
    };
    let geojson = to_geojson(
        directory
            .facilities()
            .iter()
            .map(|f| f.as_ref())
            .filter(|f| bounds.is_none_or(|b| b.contains(f.position()))),
    );
    println!("{}", serde_json::to_string_pretty(&geojson)?);
    Ok(())
}
