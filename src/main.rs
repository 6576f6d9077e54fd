//! AgroDetect CLI
//!
//! Command line front end for the plant disease analyzer: run Grad-CAM analysis
//! on a leaf image, inspect a classifier's layers, or write a fresh model
//! artifact for smoke testing.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::config::Config;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use agrodetect::backend::{backend_name, default_device, AnalysisBackend, DefaultBackend};
use agrodetect::inference::{Analysis, Analyzer, SeverityBand, Vocabulary};
use agrodetect::model::{
    load_classifier, locate_last_conv, save_classifier, LayerStack, PlantClassifier,
    PlantClassifierConfig,
};
use agrodetect::utils::logging::{init_logging, LogConfig};

/// AgroDetect plant disease analysis
///
/// Classifies leaf photos and explains the prediction with a Grad-CAM heatmap.
#[derive(Parser, Debug)]
#[command(name = "agrodetect")]
#[command(version)]
#[command(about = "Plant disease detection with Grad-CAM explanations", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a leaf image
    Analyze {
        /// Path to the input image
        #[arg(short, long)]
        image: PathBuf,

        /// Path to the trained model weights (.mpk)
        #[arg(short, long, env = "AGRODETECT_MODEL", default_value = "model/model.mpk")]
        model: PathBuf,

        /// Path to the model config JSON
        #[arg(short, long, env = "AGRODETECT_CONFIG", default_value = "model/config.json")]
        config: PathBuf,

        /// Path to the class label JSON array
        #[arg(short, long, env = "AGRODETECT_LABELS", default_value = "model/class_names.json")]
        labels: PathBuf,

        /// Write the heatmap overlay JPEG here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the analysis as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Show the layers of a classifier and the Grad-CAM target layer
    Layers {
        /// Path to the model config JSON
        #[arg(short, long, env = "AGRODETECT_CONFIG", default_value = "model/config.json")]
        config: PathBuf,
    },

    /// Write a randomly initialized model, config and label list
    InitModel {
        /// Output directory for the model artifacts
        #[arg(short, long, default_value = "model")]
        output_dir: PathBuf,

        /// Number of output classes
        #[arg(short, long, default_value = "38")]
        num_classes: usize,

        /// Number of convolution blocks
        #[arg(long, default_value = "4")]
        num_blocks: usize,

        /// Number of trailing blocks that use separable convolutions
        #[arg(long, default_value = "0")]
        separable_blocks: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Analyze {
            image,
            model,
            config,
            labels,
            output,
            json,
        } => {
            cmd_analyze(&image, &model, &config, &labels, output.as_deref(), json)?;
        }
        Commands::Layers { config } => {
            cmd_layers(&config)?;
        }
        Commands::InitModel {
            output_dir,
            num_classes,
            num_blocks,
            separable_blocks,
        } => {
            cmd_init_model(&output_dir, num_classes, num_blocks, separable_blocks)?;
        }
    }

    Ok(())
}

fn cmd_analyze(
    image: &Path,
    model: &Path,
    config: &Path,
    labels: &Path,
    output: Option<&Path>,
    json: bool,
) -> Result<()> {
    info!("Running analysis");
    info!("  Image: {:?}", image);
    info!("  Model: {:?}", model);

    if !json {
        println!("{}", "Analysis Configuration:".cyan().bold());
        println!("  Image:   {}", image.display());
        println!("  Model:   {}", model.display());
        println!("  Backend: {}", backend_name());
        println!();
    }

    let device = default_device();
    let (classifier, classifier_config) =
        load_classifier::<AnalysisBackend>(config, model, &device)?;
    let vocabulary = Vocabulary::load(labels)?;
    let analyzer = Analyzer::new(classifier, vocabulary, classifier_config.normalization, device)?;

    let bytes =
        std::fs::read(image).with_context(|| format!("Failed to read image {:?}", image))?;
    let analysis = analyzer.analyze(&bytes)?;

    if let Some(path) = output {
        std::fs::write(path, &analysis.overlay_jpeg)
            .with_context(|| format!("Failed to write overlay {:?}", path))?;
        info!("Overlay written to {:?}", path);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        print_analysis(&analysis, analyzer.layer().name.as_str(), output);
    }

    Ok(())
}

fn print_analysis(analysis: &Analysis, layer: &str, output: Option<&Path>) {
    println!("{}", "Result:".green().bold());
    println!("{}", analysis.prediction.display());

    let severity = format!("{} ({})", analysis.severity, analysis.band.level());
    let severity = match analysis.band {
        SeverityBand::Low => severity.green(),
        SeverityBand::Moderate => severity.yellow(),
        SeverityBand::High => severity.red(),
    };
    println!("  Severity:       {}", severity);
    println!("  Grad-CAM layer: {}", layer);
    println!("  Time:           {:.1} ms", analysis.inference_time_ms);
    if let Some(path) = output {
        println!("  Overlay:        {}", path.display());
    }
    println!("{}", analysis.explanation);
}

fn cmd_layers(config: &Path) -> Result<()> {
    let classifier_config = PlantClassifierConfig::load(config)
        .map_err(|e| anyhow::anyhow!("Failed to load config {:?}: {:?}", config, e))?;
    classifier_config.validate()?;

    let device = Default::default();
    let classifier = PlantClassifier::<DefaultBackend>::new(&classifier_config, &device);
    let layers = classifier.layers();

    println!("{}", "Classifier Layers:".cyan().bold());
    for (index, layer) in layers.iter().enumerate() {
        println!("  {:>3}  {:<20} {}", index, layer.name, layer.kind);
    }
    println!();

    let located = locate_last_conv(&layers)?;
    println!(
        "{} {} (index {}, {})",
        "Grad-CAM layer:".green().bold(),
        located.name,
        located.index,
        located.kind
    );

    Ok(())
}

fn cmd_init_model(
    output_dir: &Path,
    num_classes: usize,
    num_blocks: usize,
    separable_blocks: usize,
) -> Result<()> {
    let config = PlantClassifierConfig::new()
        .with_num_classes(num_classes)
        .with_num_blocks(num_blocks)
        .with_separable_blocks(separable_blocks);
    config.validate()?;

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {:?}", output_dir))?;

    let device = Default::default();
    let classifier = PlantClassifier::<DefaultBackend>::new(&config, &device);

    let config_path = output_dir.join("config.json");
    let weights_path = output_dir.join("model.mpk");
    let labels_path = output_dir.join("class_names.json");

    save_classifier(&classifier, &config, &config_path, &weights_path)?;
    let vocabulary: Vocabulary = (0..num_classes).map(|i| format!("Class_{}", i)).collect();
    vocabulary.save(&labels_path)?;

    println!("{}", "Model initialized:".green().bold());
    println!("  Config:  {}", config_path.display());
    println!("  Weights: {}", weights_path.display());
    println!("  Labels:  {}", labels_path.display());
    println!();
    println!("{}", "Weights are random; use for smoke tests only.".yellow());

    Ok(())
}
