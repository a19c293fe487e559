//! carcino-rs CLI: explain lesion predictions and manage model directories.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use carcino::core::{InputGeometry, MetadataCatalog};
use carcino::explain::decode_payload;
use carcino::models::{ArchitectureConfig, LesionNetConfig, ModelManifest};
use carcino::transforms::check_extension;
use carcino::{ClassifierHandle, ClassifierSlot, DefaultBackend, ExplainConfig, Explainer};

#[derive(Parser)]
#[command(name = "carcino")]
#[command(author, version)]
#[command(about = "Lesion classification with Grad-CAM visual explanations")]
#[command(long_about = "carcino-rs: classify a lesion image and explain the prediction.

EXAMPLES:
  # Create a model directory with untrained weights
  carcino init --output ./models/demo

  # Explain a prediction
  carcino predict --image lesion.jpg --model ./models/demo --overlay-out overlay.png

  # Show the layers and the Grad-CAM target
  carcino layers --model ./models/demo")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify an image and print the JSON explanation
    Predict {
        /// Image file (.jpg, .jpeg or .png)
        #[arg(long, value_name = "PATH")]
        image: PathBuf,

        /// Model directory (manifest.json + weights)
        #[arg(long, value_name = "DIR", conflicts_with = "placeholder")]
        model: Option<PathBuf>,

        /// Use an untrained placeholder model
        #[arg(long, default_value = "false")]
        placeholder: bool,

        /// Explanation config (JSON)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Class metadata catalog (JSON)
        #[arg(long, value_name = "FILE")]
        metadata: Option<PathBuf>,

        /// Write the overlay PNG here
        #[arg(long, value_name = "PNG")]
        overlay_out: Option<PathBuf>,
    },
    /// List a model's layers and the Grad-CAM target layer
    Layers {
        /// Model directory
        #[arg(long, value_name = "DIR")]
        model: PathBuf,
    },
    /// Write a model directory with freshly initialized weights
    Init {
        /// Output directory
        #[arg(long, value_name = "DIR")]
        output: PathBuf,

        /// Class labels in output order
        #[arg(long, num_args = 1.., default_values_t = default_labels())]
        labels: Vec<String>,

        /// Square input size in pixels
        #[arg(long, default_value = "224", value_name = "N")]
        size: usize,

        /// Output channels of each conv block
        #[arg(long, num_args = 1.., default_values_t = vec![16usize, 32, 64])]
        filters: Vec<usize>,
    },
}

fn default_labels() -> Vec<String> {
    vec!["Normal".to_string(), "Carcinoma".to_string()]
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    match cli.command {
        Commands::Predict {
            image,
            model,
            placeholder,
            config,
            metadata,
            overlay_out,
        } => handle_predict(image, model, placeholder, config, metadata, overlay_out),
        Commands::Layers { model } => handle_layers(&model),
        Commands::Init {
            output,
            labels,
            size,
            filters,
        } => handle_init(&output, labels, size, filters),
    }
}

fn lesion_net_manifest(labels: Vec<String>, size: usize, filters: Vec<usize>) -> ModelManifest {
    ModelManifest::new(
        ArchitectureConfig::LesionNet(LesionNetConfig::new(labels.len()).with_filters(filters)),
        labels,
        InputGeometry::new(size, size),
    )
}

fn handle_predict(
    image: PathBuf,
    model: Option<PathBuf>,
    placeholder: bool,
    config: Option<PathBuf>,
    metadata: Option<PathBuf>,
    overlay_out: Option<PathBuf>,
) -> Result<()> {
    let file_name = image
        .file_name()
        .and_then(|n| n.to_str())
        .context("Image path has no file name")?
        .to_string();
    check_extension(&file_name)?;

    let bytes =
        std::fs::read(&image).with_context(|| format!("Failed to read {}", image.display()))?;

    let config = match config {
        Some(path) => ExplainConfig::load(&path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ExplainConfig::default(),
    };

    let handle = match (model, placeholder) {
        (Some(dir), _) => ClassifierHandle::<DefaultBackend>::from_dir(&dir, Default::default())
            .with_context(|| format!("Failed to load model from {}", dir.display()))?,
        (None, true) => ClassifierHandle::placeholder(
            &lesion_net_manifest(default_labels(), 224, vec![16, 32, 64]),
            Default::default(),
        )?,
        (None, false) => bail!("Either --model DIR or --placeholder is required"),
    };

    let mut explainer = Explainer::new(Arc::new(ClassifierSlot::with_handle(handle)), config);
    if let Some(path) = metadata {
        let catalog = MetadataCatalog::load(&path)
            .with_context(|| format!("Failed to load metadata {}", path.display()))?;
        explainer = explainer.with_metadata(catalog);
    }

    let result = explainer.explain_upload(&file_name, &bytes)?;
    println!("{}", result.to_json_pretty()?);

    if let Some(path) = overlay_out {
        let overlay = decode_payload(&result.heatmap_image).context("Failed to decode overlay")?;
        overlay
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "wrote overlay");
    }

    Ok(())
}

fn handle_layers(model: &Path) -> Result<()> {
    let handle = ClassifierHandle::<DefaultBackend>::from_dir(model, Default::default())
        .with_context(|| format!("Failed to load model from {}", model.display()))?;

    println!("Model: {}", model.display());
    println!("Input: {}", handle.geometry());
    println!("Labels: {}", handle.labels().join(", "));
    println!();

    let target = handle.target_layer().map(|l| l.name);
    for (i, layer) in handle.layers().iter().enumerate() {
        let marker = if target.as_deref() == Some(layer.name.as_str()) {
            "  <- grad-cam target"
        } else {
            ""
        };
        println!("{:>3}  {:<10} {:?}{}", i, layer.name, layer.kind, marker);
    }
    if target.is_none() {
        println!("\nNo convolutional layer: explanations will use the fallback heatmap.");
    }

    Ok(())
}

fn handle_init(output: &Path, labels: Vec<String>, size: usize, filters: Vec<usize>) -> Result<()> {
    if filters.is_empty() {
        bail!("At least one conv block is required");
    }
    let manifest = lesion_net_manifest(labels, size, filters);
    manifest
        .init_and_save::<DefaultBackend>(output, &Default::default())
        .with_context(|| format!("Failed to write model to {}", output.display()))?;

    println!("Wrote {} ({} classes, {})", output.display(), manifest.labels.len(), manifest.geometry);
    println!(
        "{}",
        serde_json::to_string_pretty(&manifest).context("Failed to serialize manifest")?
    );
    Ok(())
}
