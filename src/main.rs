//! Classify documents from the command line.
//!
//! ```bash
//! doctriage facture.pdf scan.jpg
//! doctriage --model ./classifier.json --json *.pdf
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;

use doctriage_lib::{DoctriageConfig, DocumentProcessor, ProcessedDocument};

/// Extract text from PDFs and images and assign a document category.
#[derive(Parser, Debug)]
#[command(name = "doctriage")]
#[command(version, about, long_about = None)]
struct Args {
    /// Documents to classify (PDF, PNG, JPEG, TIFF, GIF, BMP)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// JSON config file (default: ~/.doctriage/config.json when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Classifier artifact, overrides the config
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Keyword table JSON, overrides the config
    #[arg(short, long)]
    keywords: Option<PathBuf>,

    /// One JSON object per line instead of tab-separated text
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct FailedDocument<'a> {
    filename: &'a str,
    error: String,
}

fn main() -> ExitCode {
    doctriage_lib::init_tracing();
    let args = Args::parse();

    let mut config = match DoctriageConfig::resolve(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("doctriage: {e}");
            return ExitCode::from(2);
        }
    };
    if let Some(model) = args.model {
        config.model_path = Some(model);
    }
    if let Some(keywords) = args.keywords {
        config.keywords_path = Some(keywords);
    }

    let processor = match DocumentProcessor::from_config(&config) {
        Ok(processor) => processor,
        Err(e) => {
            eprintln!("doctriage: {e}");
            return ExitCode::from(2);
        }
    };

    let mut failed = 0usize;
    for path in &args.files {
        let name = display_name(path);
        let outcome = std::fs::read(path)
            .map_err(|e| format!("cannot read file: {e}"))
            .and_then(|bytes| {
                processor
                    .process(&bytes, Some(name.as_str()))
                    .map_err(|e| e.to_string())
            });

        match outcome {
            Ok(doc) => print_document(&doc, &name, args.json),
            Err(error) => {
                failed += 1;
                print_failure(&name, error, args.json);
            }
        }
    }

    if failed > 0 {
        tracing::warn!(failed, total = args.files.len(), "Some documents could not be classified");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_document(doc: &ProcessedDocument, name: &str, json: bool) {
    if json {
        match serde_json::to_string(doc) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("{name}\terror: {e}"),
        }
        return;
    }

    let review = if doc.needs_review { "\treview" } else { "" };
    println!(
        "{name}\t{}\t{:.2}\t{}\t{}{review}",
        doc.category, doc.confidence, doc.source, doc.method
    );
}

fn print_failure(name: &str, error: String, json: bool) {
    if json {
        let failure = FailedDocument {
            filename: name,
            error,
        };
        if let Ok(line) = serde_json::to_string(&failure) {
            println!("{line}");
        }
    } else {
        eprintln!("{name}\terror: {error}");
    }
}
