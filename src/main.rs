use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use thumbcache::config::{self, ThumbcacheConfig};
use thumbcache::coordinator::Coordinator;
use thumbcache::imaging::RustBackend;
use thumbcache::options::RawOptions;
use thumbcache::{output, warm};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Transform options shared by `resolve` and `warm`.
///
/// Taken as strings and validated the same way request query parameters are.
#[derive(clap::Args, Clone)]
struct OptionArgs {
    /// Box width in pixels
    #[arg(long)]
    width: Option<String>,
    /// Box height in pixels
    #[arg(long)]
    height: Option<String>,
    /// Encode quality (1-100)
    #[arg(long)]
    quality: Option<String>,
    /// inside | outside | cover | fill
    #[arg(long)]
    fit: Option<String>,
    /// Allow output larger than the source
    #[arg(long)]
    upscale: Option<String>,
    /// Force sharpening on or off
    #[arg(long)]
    sharpen: Option<String>,
}

impl From<OptionArgs> for RawOptions {
    fn from(args: OptionArgs) -> Self {
        Self {
            width: args.width,
            height: args.height,
            quality: args.quality,
            fit: args.fit,
            upscale: args.upscale,
            sharpen: args.sharpen,
        }
    }
}

#[derive(Parser)]
#[command(name = "thumbcache")]
#[command(about = "On-demand thumbnail generation with a content-addressed disk cache")]
#[command(long_about = "\
On-demand thumbnail generation with a content-addressed disk cache

Every request names a source image and a bounding box. The first request
generates the thumbnail and stores it under the cache directory; later
requests for the same source and options are served from disk. Sources
that already fit, are too small, or fail to decode are served as-is.

Cache layout:

  .thumbcache/
  ├── 00/
  │   └── 00a1…9f.jpg      # sha256(source identity + options).ext
  ├── …
  └── ff/

Run 'thumbcache gen-config' to generate a documented thumbcache.toml.")]
#[command(version)]
struct Cli {
    /// Config file (missing file = stock defaults)
    #[arg(long, default_value = config::CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve one source to the path that would be served
    Resolve {
        /// Source image; relative to the root when --root is given
        source: PathBuf,
        /// Resolve SOURCE against this configured root id
        #[arg(long)]
        root: Option<u32>,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Pre-generate thumbnails for every image under a directory
    Warm {
        dir: PathBuf,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Delete cache entries older than the configured age
    Sweep {
        /// Override cache.max_age_days
        #[arg(long)]
        max_age_days: Option<u64>,
    },
    /// Show entry count and size of the cache
    Stats,
    /// List configured storage roots
    Roots,
    /// Print a stock thumbcache.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("thumbcache=warn"),
        1 => EnvFilter::new("thumbcache=info"),
        _ => EnvFilter::new("thumbcache=debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    match cli.command {
        Command::Resolve {
            source,
            root,
            options,
        } => {
            let config = load_config(&cli.config)?;
            let options = RawOptions::from(options).parse()?;
            let source = match root {
                Some(id) => config.root_table()?.resolve(id, &source.to_string_lossy())?,
                None => source,
            };
            let coordinator = Coordinator::new(RustBackend::new(), config);
            let resolved = coordinator.resolve(&source, &options);
            output::print_resolved(&source, &resolved);
        }
        Command::Warm { dir, options } => {
            let config = load_config(&cli.config)?;
            let options = RawOptions::from(options).parse()?;
            let dir = std::path::absolute(&dir)?;
            init_thread_pool(&config.processing);
            let coordinator = Coordinator::new(RustBackend::new(), config);

            let (tx, rx) = std::sync::mpsc::channel();
            let printer_root = dir.clone();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_warm_event(&event, &printer_root) {
                        println!("{}", line);
                    }
                }
            });
            let report = warm::warm(&coordinator, &dir, &options, Some(tx));
            printer
                .join()
                .map_err(|_| "output thread panicked")?;
            println!("Warm: {}", report);
        }
        Command::Sweep { max_age_days } => {
            let config = load_config(&cli.config)?;
            let coordinator = Coordinator::new(RustBackend::new(), config);
            let report = match max_age_days {
                Some(days) => coordinator.sweep(days)?,
                None => coordinator.sweep_default()?,
            };
            output::print_sweep(&report, coordinator.store().root());
        }
        Command::Stats => {
            let config = load_config(&cli.config)?;
            let coordinator = Coordinator::new(RustBackend::new(), config);
            let stats = coordinator.stats()?;
            output::print_stats(&stats, coordinator.store().root());
        }
        Command::Roots => {
            let config = load_config(&cli.config)?;
            output::print_roots(&config.root_table()?);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load and validate the config, anchoring the cache dir to the working
/// directory so later path comparisons see absolute paths.
fn load_config(path: &Path) -> Result<ThumbcacheConfig, Box<dyn std::error::Error>> {
    let mut config = config::load_config(path)?;
    config.cache.dir = std::path::absolute(&config.cache.dir)?;
    debug!(config = %path.display(), cache = %config.cache.dir.display(), "config loaded");
    Ok(config)
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
