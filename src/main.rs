use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "manga-translator-rust",
    version,
    about = "Replace speech bubble text in a comic page with its translation"
)]
struct Cli {
    /// Page image to translate (png, jpeg, webp, bmp, gif, tiff)
    #[arg(short = 'i', long = "input")]
    input: Option<PathBuf>,

    /// Detector output: JSON list of [x1, y1, x2, y2] boxes
    #[arg(short = 'b', long = "regions")]
    regions: Option<PathBuf>,

    /// Where to write the translated page (same format as the input)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Write the per-bubble text and layout as JSON
    #[arg(long = "report")]
    report: Option<PathBuf>,

    /// Target language (overrides settings)
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// Source language. Use "auto" to let the model detect it.
    #[arg(short = 'L', long = "source-lang")]
    source_lang: Option<String>,

    /// Chat model name (overrides settings)
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// API key (overrides OPENAI_API_KEY)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Show installed tesseract languages and exit
    #[arg(long = "show-ocr-languages")]
    show_ocr_languages: bool,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    manga_translator_rust::logging::init(cli.verbose)?;

    if cli.show_ocr_languages {
        for lang in manga_translator_rust::ocr::list_tesseract_languages()? {
            println!("{}", lang);
        }
        return Ok(());
    }

    let config = manga_translator_rust::Config {
        input: required(cli.input, "--input")?,
        output: required(cli.output, "--output")?,
        regions: required(cli.regions, "--regions")?,
        report: cli.report,
        lang: cli.lang,
        source_lang: cli.source_lang,
        model: cli.model,
        key: cli.key,
        settings_path: cli.read_settings,
    };

    let output = manga_translator_rust::run(config).await?;
    let degraded = output
        .bubbles
        .iter()
        .filter(|bubble| bubble.degraded.is_some())
        .count();
    eprintln!(
        "{} bubble(s) translated, {} left blank, {} region(s) skipped",
        output.bubbles.len() - degraded,
        degraded,
        output.skipped.len()
    );
    Ok(())
}

fn required(value: Option<PathBuf>, flag: &str) -> Result<PathBuf> {
    value.ok_or_else(|| anyhow!("{} is required", flag))
}
