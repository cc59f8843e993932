use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use image2pdf::objects::Object;
use image2pdf::{decode_text_string, Background, ConvertOptions, Converter, PdfReader, Upload};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "image2pdf",
    about = "Combine PNG and JPEG images into one PDF",
    version,
    author
)]
struct Cli {
    /// Log pipeline progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert images into a PDF, one page per image in the given order
    Convert {
        /// Input image files (.png, .jpg, .jpeg)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output file path
        #[arg(short, long, default_value = "output.pdf")]
        output: PathBuf,

        /// Color transparent pixels are composited over (white, black, #rrggbb)
        #[arg(short, long, default_value = "white")]
        background: Background,

        /// Document title
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Get information about a PDF file
    Info {
        /// Input PDF file
        input: PathBuf,

        /// Show each page's size and images
        #[arg(short, long)]
        detailed: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Convert {
            files,
            output,
            background,
            title,
        } => convert(files, output, background, title),
        Commands::Info { input, detailed } => info(input, detailed),
    }
}

fn convert(
    files: Vec<PathBuf>,
    output: PathBuf,
    background: Background,
    title: Option<String>,
) -> Result<()> {
    let uploads = files
        .iter()
        .map(|path| {
            Upload::from_path(path).with_context(|| format!("failed to read {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    debug!(files = uploads.len(), "read input files");

    let mut options = ConvertOptions::new().with_background(background);
    if let Some(title) = title {
        options = options.with_title(title);
    }

    let document = Converter::new(options)
        .convert(&uploads)
        .context("conversion failed")?;
    document
        .save(&output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!(
        "PDF created successfully: {} ({} pages, {} bytes)",
        output.display(),
        document.page_count(),
        document.len()
    );
    Ok(())
}

fn info(input: PathBuf, detailed: bool) -> Result<()> {
    let data = std::fs::read(&input).with_context(|| format!("failed to read {}", input.display()))?;
    let reader = PdfReader::new(&data)
        .with_context(|| format!("failed to parse {}", input.display()))?;

    println!("PDF Information for: {}", input.display());
    println!("==========================================");
    println!("PDF Version: {}", reader.version());

    if let Some(info) = reader.trailer().get("Info") {
        match reader.resolve(info) {
            Ok(Object::Dictionary(info)) => {
                for key in ["Title", "Producer", "CreationDate"] {
                    if let Some(Object::String(value)) = info.get(key) {
                        println!("{key}: {}", decode_text_string(value));
                    }
                }
            }
            Ok(_) => eprintln!("Warning: Info entry is not a dictionary"),
            Err(e) => eprintln!("Warning: Could not read metadata: {e}"),
        }
    }

    let pages = reader.pages().context("failed to read page tree")?;
    println!("Pages: {}", pages.len());
    if pages.is_empty() {
        bail!("{} has no pages", input.display());
    }

    if detailed {
        println!("\nPage Information:");
        println!("-----------------");
        for (i, page) in pages.iter().enumerate() {
            println!("Page {}: {:.0}x{:.0} pts", i + 1, page.width(), page.height());
            match page.images(&reader) {
                Ok(images) => {
                    for image in images {
                        println!(
                            "  /{}: {}x{} {} {}-bit",
                            image.name,
                            image.width,
                            image.height,
                            image.color_space,
                            image.bits_per_component
                        );
                    }
                }
                Err(e) => println!("  [Could not read images: {e}]"),
            }
        }
    }

    Ok(())
}
