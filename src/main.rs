//! # niimbot CLI
//!
//! Command-line interface for NIIMBOT label printers.
//!
//! ## Usage
//!
//! ```bash
//! # List supported printers and label sizes
//! niimbot models
//! niimbot labels --model D11
//!
//! # Print an image over USB serial
//! niimbot print label.png --model D11 --serial /dev/ttyACM0
//!
//! # Run the whole job against an in-memory printer
//! niimbot print label.png --model B1 --dry-run --dither
//!
//! # See what the printer will receive
//! niimbot preview label.png --model D11 --png rows.png
//!
//! # Ask the printer about itself and the loaded roll
//! niimbot info --serial /dev/ttyACM0
//! niimbot detect --serial /dev/ttyACM0 --model B1
//! ```
//!
//! Logging goes to stderr and follows `RUST_LOG`.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use niimbot::{
    NiimbotError,
    printer::{DeviceProfile, LabelProfile, ProfileDetector, RfidReading, Rotation},
    protocol::commands::InfoKey,
    render::{
        dither::Binarize,
        encoder::{self, EncodeOptions},
    },
    session::{Link, PrintSession, SessionConfig, TokioClock},
    transport::{MockTransport, SerialTransport, Transport},
};
use tracing_subscriber::{EnvFilter, prelude::*};

/// niimbot - NIIMBOT label printer utility
#[derive(Parser, Debug)]
#[command(name = "niimbot")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List supported printer models
    Models,

    /// List known label sizes
    Labels {
        /// Only labels for this model
        #[arg(long)]
        model: Option<String>,
    },

    /// Print an image
    Print {
        /// Image file (PNG, JPEG, BMP, ...)
        image: PathBuf,

        /// Printer model (see `niimbot models`)
        #[arg(long)]
        model: String,

        /// Serial port of the printer
        #[arg(long, required_unless_present = "dry_run", conflicts_with = "dry_run")]
        serial: Option<String>,

        /// Run the job against an in-memory printer
        #[arg(long)]
        dry_run: bool,

        /// Session config file (JSON); flags override it
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Print density, clamped to the model's range
        #[arg(long)]
        density: Option<u8>,

        /// Number of copies
        #[arg(long)]
        quantity: Option<u16>,

        /// 1 = gap, 2 = black mark, 3 = continuous
        #[arg(long)]
        label_type: Option<u8>,

        #[command(flatten)]
        encode: EncodeArgs,

        /// Send blank rows as empty-row commands
        #[arg(long)]
        compact: bool,
    },

    /// Write the encoded page back out as a PNG
    Preview {
        image: PathBuf,

        #[arg(long)]
        model: String,

        /// Output PNG
        #[arg(long, value_name = "FILE")]
        png: PathBuf,

        #[command(flatten)]
        encode: EncodeArgs,
    },

    /// Show device information and heartbeat
    Info {
        #[arg(long)]
        serial: String,
    },

    /// Read the roll's RFID tag and match it to a label profile
    Detect {
        #[arg(long)]
        serial: String,

        /// Only match labels for this model
        #[arg(long)]
        model: Option<String>,

        /// Session config file providing the roll catalog
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct EncodeArgs {
    /// Luminance cutoff below which a dot prints
    #[arg(long, conflicts_with = "dither")]
    threshold: Option<u8>,

    /// Bayer dithering instead of a hard threshold
    #[arg(long)]
    dither: bool,

    /// Turn Left-feeding images counter-clockwise instead of clockwise
    #[arg(long)]
    ccw: bool,
}

impl EncodeArgs {
    fn apply(&self, config: &mut SessionConfig) {
        if self.dither {
            config.binarize = Binarize::Bayer;
        } else if let Some(cutoff) = self.threshold {
            config.binarize = Binarize::Threshold { cutoff };
        }
        if self.ccw {
            config.rotation = Some(Rotation::CounterClockwise);
        }
    }
}

fn main() {
    init_tracing();
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("info,niimbot=debug")
        } else {
            EnvFilter::new("warn,niimbot=info")
        }
    });
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    tracing_subscriber::registry()
        .with(stderr_layer.with_filter(filter))
        .init();
}

fn run() -> Result<(), NiimbotError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Models => {
            println!(
                "{:<6} {:>5} {:>9} {:>5} {:>9} {:>8}",
                "MODEL", "DPI", "HEAD", "FEED", "DENSITY", "MAX LEN"
            );
            for p in DeviceProfile::all() {
                println!(
                    "{:<6} {:>5} {:>6} px {:>5} {:>5}-{}/{} {:>5} mm",
                    p.model,
                    p.dpi,
                    p.printhead_pixels,
                    format!("{:?}", p.print_direction).to_lowercase(),
                    p.density_min,
                    p.density_max,
                    p.density_default,
                    p.max_label_length_mm
                );
            }
        }

        Commands::Labels { model } => {
            let labels: Vec<&LabelProfile> = match &model {
                Some(m) => {
                    let device = device(m)?;
                    LabelProfile::for_model(device.model).collect()
                }
                None => LabelProfile::all().iter().collect(),
            };
            for label in labels {
                println!(
                    "{:<12} {:>5}x{:<5} mm  {:>4}x{:<4} px",
                    label.name, label.width_mm, label.height_mm, label.width_px, label.height_px
                );
            }
        }

        Commands::Print {
            image,
            model,
            serial,
            dry_run,
            config,
            density,
            quantity,
            label_type,
            encode,
            compact,
        } => {
            let device = device(&model)?;
            let mut config = match config {
                Some(path) => SessionConfig::load(path)?,
                None => SessionConfig::default(),
            };
            config.density = density.or(config.density);
            config.quantity = quantity.unwrap_or(config.quantity);
            config.label_type = label_type.or(config.label_type);
            config.compact_empty_rows |= compact;
            encode.apply(&mut config);
            config.validate()?;

            let raster = load_image(&image)?;
            println!(
                "Printing {} ({}x{}) on {}...",
                image.display(),
                raster.width(),
                raster.height(),
                device.model
            );

            let transport: Box<dyn Transport> = match serial {
                Some(path) if !dry_run => Box::new(SerialTransport::new(path)),
                _ => Box::new(MockTransport::printer()),
            };
            print_with(transport, device, config, &raster)?;
        }

        Commands::Preview {
            image,
            model,
            png,
            encode,
        } => {
            let device = device(&model)?;
            let mut config = SessionConfig::default();
            encode.apply(&mut config);

            let raster = load_image(&image)?;
            let options: EncodeOptions = config.encode_options();
            let page = encoder::encode(&raster, device, &options)?;
            page.to_image()
                .save(&png)
                .map_err(|e| NiimbotError::Image(format!("Failed to save PNG: {}", e)))?;
            println!(
                "Saved {} rows x {} dots to {}",
                page.rows(),
                page.cols(),
                png.display()
            );
        }

        Commands::Info { serial } => {
            block_on(async {
                let mut link = open_link(&serial).await?;
                let result = async {
                    let info = link.device_info(&InfoKey::ALL).await?;
                    for (key, value) in &info {
                        println!("{:<18} {}", format!("{:?}", key), value);
                    }
                    let heartbeat = link.heartbeat().await?;
                    println!("{:<18} {:?}", "Heartbeat", heartbeat);
                    Ok::<(), NiimbotError>(())
                }
                .await;
                close_link(&mut link).await;
                result
            })?;
        }

        Commands::Detect {
            serial,
            model,
            config,
        } => {
            let catalog = match config {
                Some(path) => SessionConfig::load(path)?.roll_catalog,
                None => Default::default(),
            };
            let model = model.map(|m| device(&m).map(|d| d.model)).transpose()?;

            let tag = block_on(async {
                let mut link = open_link(&serial).await?;
                let tag = link.read_rfid().await;
                close_link(&mut link).await;
                tag
            })?;

            let reading = tag.as_ref().map(|t| RfidReading::from_tag(t, &catalog));
            let detector = match model {
                Some(m) => ProfileDetector::default().for_model(m),
                None => ProfileDetector::default(),
            };
            let result = detector.detect_result(reading.as_ref());
            let json = serde_json::to_string_pretty(&result)
                .map_err(|e| NiimbotError::Config(format!("Failed to encode result: {}", e)))?;
            println!("{}", json);
        }
    }

    Ok(())
}

fn device(model: &str) -> Result<&'static DeviceProfile, NiimbotError> {
    DeviceProfile::get(model).ok_or_else(|| {
        NiimbotError::Config(format!(
            "Unknown model '{}'. Run `niimbot models` to see supported printers.",
            model
        ))
    })
}

fn load_image(path: &Path) -> Result<image::GrayImage, NiimbotError> {
    let img = image::open(path)
        .map_err(|e| NiimbotError::Image(format!("Failed to open {}: {}", path.display(), e)))?;
    Ok(img.to_luma8())
}

fn block_on<T>(
    fut: impl std::future::Future<Output = Result<T, NiimbotError>>,
) -> Result<T, NiimbotError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(fut)
}

fn print_with(
    transport: Box<dyn Transport>,
    device: &'static DeviceProfile,
    config: SessionConfig,
    raster: &image::GrayImage,
) -> Result<(), NiimbotError> {
    let session = PrintSession::new(transport, device, config);
    let cancel = session.cancel_token();

    let report = block_on(async move {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Cancelling...");
                cancel.cancel();
            }
        });
        Ok(session.print(raster).await)
    })?;

    if let Some(detection) = &report.detection {
        match &detection.detected_profile {
            Some(label) => println!(
                "Detected label: {} ({:.0}% confidence)",
                label.name,
                detection.confidence * 100.0
            ),
            None => println!("Label not detected"),
        }
    }
    let report = report.into_result()?;
    if let Some((rows, cols)) = report.page {
        println!(
            "Printed {} rows x {} dots in {:.1}s",
            rows,
            cols,
            report.elapsed.as_secs_f32()
        );
    }
    Ok(())
}

async fn open_link(serial: &str) -> Result<Link<SerialTransport, TokioClock>, NiimbotError> {
    let mut link = Link::new(
        SerialTransport::new(serial),
        TokioClock::default(),
        SessionConfig::default().request_timeout(),
    );
    if let Err(e) = link.connect().await {
        close_link(&mut link).await;
        return Err(e);
    }
    if let Err(e) = link.handshake().await {
        close_link(&mut link).await;
        return Err(e);
    }
    Ok(link)
}

async fn close_link(link: &mut Link<SerialTransport, TokioClock>) {
    if let Err(e) = link.disconnect().await {
        tracing::warn!(error = %e, "disconnect failed");
    }
}
