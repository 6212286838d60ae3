use clap::{Parser, Subcommand};
use pixfit::config::{self, PixfitConfig};
use pixfit::preview::{
    GenerationCounter, PreviewController, PreviewEvent, TranscodeRenderer, run_until_settled,
};
use pixfit::transcode::{
    Anchor, CapabilityCache, Color, FitMode, OutputFormat, Quality, RenderOptions, RustCodec,
    SourceImage, Transcoder,
};
use pixfit::{batch, output};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Per-request flags shared by every command that renders.
///
/// Anything left unset falls back to `pixfit.toml`, then to the stock defaults.
#[derive(clap::Args, Clone)]
struct RenderArgs {
    /// Output format (png, jpeg, webp, avif). Inferred from the output extension when omitted
    #[arg(long)]
    format: Option<OutputFormat>,
    /// Encoding quality, 1-100
    #[arg(long, short)]
    quality: Option<u32>,
    /// Target width in pixels
    #[arg(long, short = 'W')]
    width: Option<u32>,
    /// Target height in pixels
    #[arg(long, short = 'H')]
    height: Option<u32>,
    /// contain (letterbox) or cover (fill and crop)
    #[arg(long)]
    fit: Option<FitMode>,
    /// Part of the image kept by a cover crop (center, top-left, bottom, ...)
    #[arg(long)]
    anchor: Option<Anchor>,
    /// Fill behind transparent pixels (#rgb, #rrggbb, #rrggbbaa, white, black)
    #[arg(long)]
    background: Option<Color>,
    /// Byte budget; lossy formats search for the highest quality that fits
    #[arg(long)]
    max_bytes: Option<u64>,
    /// Brightness multiplier (1.0 = unchanged)
    #[arg(long)]
    brightness: Option<f32>,
    /// Contrast multiplier (1.0 = unchanged)
    #[arg(long)]
    contrast: Option<f32>,
    /// Saturation multiplier (0.0 = grayscale, 1.0 = unchanged)
    #[arg(long)]
    saturation: Option<f32>,
}

impl RenderArgs {
    fn apply(&self, options: &mut RenderOptions) {
        if let Some(format) = self.format {
            options.format = format;
        }
        if let Some(q) = self.quality {
            options.quality = Quality::new(q);
        }
        options.width = self.width.or(options.width);
        options.height = self.height.or(options.height);
        if let Some(fit) = self.fit {
            options.fit = fit;
        }
        if let Some(anchor) = self.anchor {
            options.anchor = anchor;
        }
        options.background = self.background.or(options.background);
        options.max_bytes = self.max_bytes.or(options.max_bytes);

        if self.brightness.is_some() || self.contrast.is_some() || self.saturation.is_some() {
            let filters = options.filters.get_or_insert_with(Default::default);
            if let Some(v) = self.brightness {
                filters.brightness = v;
            }
            if let Some(v) = self.contrast {
                filters.contrast = v;
            }
            if let Some(v) = self.saturation {
                filters.saturation = v;
            }
        }
    }

    /// Options for a single output file: config, then flags, then the
    /// output extension when no format was given anywhere explicit.
    fn resolve(&self, config: &PixfitConfig, output: Option<&Path>) -> RenderOptions {
        let mut options = config.render_options();
        if let Some(format) = output.and_then(OutputFormat::from_path) {
            options.format = format;
        }
        self.apply(&mut options);
        options
    }
}

#[derive(Parser)]
#[command(name = "pixfit")]
#[command(about = "Fit images to a box and a byte budget")]
#[command(long_about = "\
Fit images to a box and a byte budget

Resizes with contain (letterbox) or cover (crop) geometry, fills transparent
areas for formats that can't store them, applies brightness / contrast /
saturation, and encodes as PNG, JPEG, WebP or AVIF. With --max-bytes, lossy
formats search for the highest quality that fits the budget.

If this build can't encode the requested format, the fallback format from
pixfit.toml (JPEG by default) is written instead and the substitution is
reported.

Settings resolve in order: command-line flags → pixfit.toml → stock defaults.
Run 'pixfit gen-config' to generate a documented pixfit.toml.

Set RUST_LOG=pixfit=debug to trace size-search probes and preview state.")]
#[command(version)]
struct Cli {
    /// Config file (default: ./pixfit.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert one image
    Convert {
        input: PathBuf,
        /// Output file; its extension picks the format unless --format is given
        #[arg(long, short)]
        output: PathBuf,
        #[command(flatten)]
        render: RenderArgs,
    },
    /// Convert every image under a directory, in parallel
    Batch {
        input: PathBuf,
        /// Output directory; the input tree is mirrored inside it
        #[arg(long, short)]
        output: PathBuf,
        #[command(flatten)]
        render: RenderArgs,
    },
    /// Live preview: read `key=value` edits from stdin, write the latest result
    Preview {
        input: PathBuf,
        /// Preview file, rewritten each time a new result is displayed
        #[arg(long, short)]
        output: PathBuf,
        /// Quiet period before a render starts (overrides preview.debounce_ms)
        #[arg(long)]
        debounce_ms: Option<u64>,
        #[command(flatten)]
        render: RenderArgs,
    },
    /// List which output formats this build can encode
    Probe {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a stock pixfit.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Convert {
            input,
            output: target,
            render,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let options = render.resolve(&config, Some(&target));
            let transcoder = build_transcoder(&config);
            let source = SourceImage::from_path(&input)?;

            let transcoded = match transcoder.transcode(&source, &options) {
                Ok(t) => t,
                Err(e) => {
                    eprintln!("{}", output::error_line(&e));
                    std::process::exit(1);
                }
            };
            let written = output_path_for(&target, transcoded.result.format);
            std::fs::write(&written, &transcoded.result.bytes)?;
            output::print_transcoded(&display_name(&written), &transcoded);
        }
        Command::Batch {
            input,
            output: out_dir,
            render,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let options = render.resolve(&config, None);
            init_thread_pool(&config.processing);
            let transcoder = build_transcoder(&config);

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_batch_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let summary = batch::convert_dir(&transcoder, &input, &out_dir, &options, Some(tx))?;
            if printer.join().is_err() {
                log::warn!("batch output thread panicked");
            }
            println!("{}", output::format_batch_summary(&summary));
            if summary.failed > 0 {
                std::process::exit(1);
            }
        }
        Command::Preview {
            input,
            output: target,
            debounce_ms,
            render,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let options = render.resolve(&config, Some(&target));
            let debounce = debounce_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.preview.debounce());
            let transcoder = Arc::new(build_transcoder(&config));
            let source = Arc::new(SourceImage::from_path(&input)?);

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()?;
            runtime.block_on(run_preview(transcoder, source, options, debounce, target))?;
        }
        Command::Probe { json } => {
            let table = CapabilityCache::global().table(&RustCodec::new());
            if json {
                let formats: Vec<serde_json::Value> = table
                    .iter()
                    .map(|(format, supported)| {
                        serde_json::json!({
                            "format": format,
                            "mime": format.mime(),
                            "supported": supported,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&formats)?);
            } else {
                output::print_capability_table(&table);
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Drive the preview controller from stdin until input closes and the last
/// request has settled.
async fn run_preview(
    transcoder: Arc<Transcoder<RustCodec>>,
    source: Arc<SourceImage>,
    options: RenderOptions,
    debounce: Duration,
    target: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let renderer = Arc::new(TranscodeRenderer::new(transcoder, source));
    let (controller, mut events) =
        PreviewController::new(renderer, Arc::new(GenerationCounter::new()), debounce);
    controller.submit(options.clone());

    // Blocking stdin reads stay off the runtime thread
    let (params_tx, params) = tokio::sync::mpsc::unbounded_channel::<RenderOptions>();
    std::thread::spawn(move || {
        let mut options = options;
        for line in std::io::stdin().lock().lines().map_while(Result::ok) {
            if line.trim().is_empty() {
                continue;
            }
            match options.apply_overrides(&line) {
                Ok(()) => {
                    if params_tx.send(options.clone()).is_err() {
                        break;
                    }
                }
                Err(e) => println!("Error: {e}"),
            }
        }
    });

    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "preview".to_string());
    let dir = target.parent().map(Path::to_path_buf).unwrap_or_default();

    run_until_settled(&controller, params, &mut events, |event| {
        if let PreviewEvent::Displayed { result, .. } = event {
            std::fs::write(dir.join(result.file_name(&stem)), &result.bytes)?;
        }
        if let Some(line) = output::format_preview_event(&stem, event) {
            println!("{}", line);
        }
        Ok::<_, std::io::Error>(())
    })
    .await?;
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PixfitConfig, config::ConfigError> {
    match path {
        Some(path) => config::load_config_file(path),
        None => config::load_config(Path::new(".")),
    }
}

fn build_transcoder(config: &PixfitConfig) -> Transcoder<RustCodec> {
    Transcoder::with_settings(
        RustCodec::with_avif_speed(config.output.avif_speed),
        config.transcode_settings(),
    )
}

/// `requested` with the extension of the format actually written.
fn output_path_for(requested: &Path, format: OutputFormat) -> PathBuf {
    match OutputFormat::from_path(requested) {
        Some(ext_format) if ext_format == format => requested.to_path_buf(),
        _ => requested.with_extension(format.extension()),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the config can only lower it.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
