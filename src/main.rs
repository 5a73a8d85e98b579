use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

use eidos::calibration::{
    compute_filter_parameters, compute_from_raw, Archetype, FilterParameters,
};
use eidos::capture::{CaptureFormat, CapturedImage, Mirror};
use eidos::config::Config;
use eidos::state::{PhotoDraft, PhotoId, SettingsPatch, SqliteStorage, Store};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "eidos")]
#[command(about = "Calibrate the Eidos portrait filter and manage the local photo archive")]
#[command(version)]
struct Cli {
    /// Database file (defaults to $EIDOS_DB, then the platform data dir)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the filter parameters for an archetype and iteration count.
    Filter {
        archetype: String,
        #[arg(allow_hyphen_values = true)]
        iterations: i64,
    },

    #[command(flatten)]
    Store(StoreCommand),
}

/// Commands that read or change the local store
#[derive(Subcommand)]
enum StoreCommand {
    /// Show the current settings and the live preview filter.
    Settings,

    /// Update settings (fields not given are left untouched).
    Set {
        #[arg(long)]
        archetype: Option<Archetype>,
        #[arg(long)]
        iterations: Option<u32>,
    },

    /// Run one calibration refinement step.
    Calibrate {
        /// Start a new session at iteration 0 instead.
        #[arg(long)]
        restart: bool,
    },

    /// Mark onboarding as complete.
    Onboard,

    /// Store a captured image with the current settings snapshot.
    Add {
        image: PathBuf,
        /// Mirror the image horizontally (front camera).
        #[arg(long)]
        mirror: bool,
        /// Store the photo with the filter disabled.
        #[arg(long)]
        no_filter: bool,
    },

    /// List stored photos (newest first).
    List {
        #[arg(long)]
        oldest_first: bool,
    },

    /// Delete a photo by id.
    Delete { id: String },

    /// Delete every photo and restore default settings.
    Reset,
}

fn main() {
    init_logger();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Compact log lines: level, file:line, message. `RUST_LOG` picks the level.
fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format(|buf, record| {
            let style = buf.default_level_style(record.level());
            writeln!(
                buf,
                "[{style}{}{style:#} {}:{}] {}",
                record.level(),
                record
                    .file()
                    .unwrap_or("None")
                    .split('/')
                    .next_back()
                    .unwrap_or("None"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .init();
}

fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Filter {
            archetype,
            iterations,
        } => {
            print_parameters(&compute_from_raw(&archetype, iterations)?);
            Ok(())
        }
        Commands::Store(command) => {
            let config = Config::resolve(cli.db.as_deref());
            let mut store = Store::load(SqliteStorage::open(&config.db_path)?);
            run_store_command(&mut store, command)
        }
    }
}

fn run_store_command(store: &mut Store<SqliteStorage>, command: StoreCommand) -> CliResult<()> {
    match command {
        StoreCommand::Settings => {
            let settings = store.settings();
            println!("{}", serde_json::to_string_pretty(settings)?);
            print_parameters(&compute_filter_parameters(
                settings.archetype,
                settings.iteration_count,
            ));
        }
        StoreCommand::Set {
            archetype,
            iterations,
        } => {
            let patch = SettingsPatch {
                archetype,
                iteration_count: iterations,
            };
            if patch.is_empty() {
                return Err("nothing to update: pass --archetype and/or --iterations".into());
            }
            store.update_settings(patch)?;
            println!("{}", serde_json::to_string_pretty(store.settings())?);
        }
        StoreCommand::Calibrate { restart } => {
            if restart {
                store.begin_calibration()?;
                println!("Calibration restarted");
            } else {
                let settings = store.advance_calibration()?;
                println!("Iteration #{}", settings.iteration_count);
                print_parameters(&compute_filter_parameters(
                    settings.archetype,
                    settings.iteration_count,
                ));
            }
        }
        StoreCommand::Onboard => {
            store.complete_onboarding()?;
            println!("Onboarding complete");
        }
        StoreCommand::Add {
            image,
            mirror,
            no_filter,
        } => {
            let format = image
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(CaptureFormat::from_extension)
                .ok_or_else(|| format!("unsupported image type: {}", image.display()))?;
            let bytes = std::fs::read(&image)?;
            let mirror = if mirror { Mirror::Horizontal } else { Mirror::None };

            let settings = *store.settings();
            let photo = store.add_photo(PhotoDraft {
                image_data: CapturedImage::new(format, bytes).into_payload(mirror)?,
                archetype: settings.archetype,
                iteration_count: settings.iteration_count,
                filter_enabled: !no_filter,
            })?;
            println!("{}", photo.id());
        }
        StoreCommand::List { oldest_first } => {
            let photos = if oldest_first {
                store.photos_by_capture_time()
            } else {
                store.photos().iter().collect()
            };

            for photo in photos {
                let filter = photo
                    .filter_parameters()
                    .map(|params| filter_expression(&params))
                    .unwrap_or_else(|| "none".to_string());
                println!(
                    "{}  {}  {:<9}  #{:<3}  {}",
                    photo.id(),
                    photo.captured_at().format("%Y-%m-%d %H:%M:%S"),
                    photo.archetype(),
                    photo.iteration_count(),
                    filter
                );
            }
        }
        StoreCommand::Delete { id } => {
            if store.delete_photo(&PhotoId::from(id.as_str()))? {
                println!("Deleted {id}");
            } else {
                println!("No photo with id {id}");
            }
        }
        StoreCommand::Reset => {
            store.reset_all()?;
            println!("All photos deleted, settings restored to defaults");
        }
    }

    Ok(())
}

fn print_parameters(params: &FilterParameters) {
    println!(
        "brightness={:.2} contrast={:.2} saturation={:.2} sepia={:.2}",
        params.brightness,
        params.contrast,
        params.saturation,
        params.sepia_amount()
    );
    println!("filter: {}", filter_expression(params));
}

/// Render parameters as a CSS-style filter expression
fn filter_expression(params: &FilterParameters) -> String {
    let mut expression = format!(
        "brightness({:.2}) contrast({:.2}) saturate({:.2})",
        params.brightness, params.contrast, params.saturation
    );
    if let Some(sepia) = params.sepia {
        expression.push_str(&format!(" sepia({sepia:.2})"));
    }
    expression
}
