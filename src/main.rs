use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use docxide_html::{ConvertOptions, Error, convert, repair_hyperlink_uris};

#[derive(Parser, Debug)]
#[command(author, version, about = "Convert a DOCX file to standalone HTML")]
struct Args {
    /// Input .docx file
    input: PathBuf,

    /// Output .html file (default: input with .html extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Leave images out instead of inlining them as data URIs
    #[arg(long)]
    no_images: bool,

    /// Put CSS in style attributes instead of generated classes
    #[arg(long)]
    inline_styles: bool,

    /// Prefix of generated CSS class names
    #[arg(long, default_value = "pt-")]
    css_prefix: String,

    /// Page title (default: document title, else the input file name)
    #[arg(long)]
    title: Option<String>,

    /// File whose contents are appended to the generated style sheet
    #[arg(long)]
    css: Option<PathBuf>,

    /// Fail on invalid hyperlink URIs instead of repairing them and retrying
    #[arg(long)]
    no_repair: bool,
}

fn run(args: &Args) -> Result<(), String> {
    let bytes = std::fs::read(&args.input)
        .map_err(|e| format!("cannot read {}: {e}", args.input.display()))?;

    let mut options = ConvertOptions {
        include_images: !args.no_images,
        css_class_prefix: args.css_prefix.clone(),
        fabricate_css_classes: !args.inline_styles,
        page_title_override: args.title.clone(),
        source_name: args
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned()),
        ..ConvertOptions::default()
    };
    if let Some(css_path) = &args.css {
        options.additional_css = std::fs::read_to_string(css_path)
            .map_err(|e| format!("cannot read {}: {e}", css_path.display()))?;
    }

    let result = match convert(&bytes, &options) {
        Err(e) if e.is_repairable() && !args.no_repair => {
            log::warn!("{e}; repairing hyperlink URIs and retrying");
            let repaired = repair_hyperlink_uris(&bytes).map_err(|e| e.to_string())?;
            convert(&repaired, &options)
        }
        other => other,
    };
    let conversion = result.map_err(|e: Error| e.to_string())?;

    for warning in &conversion.warnings {
        log::warn!("{warning}");
    }

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("html"));
    std::fs::write(&output, &conversion.html)
        .map_err(|e| format!("cannot write {}: {e}", output.display()))?;
    log::info!("Wrote {}", output.display());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
