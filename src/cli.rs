use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::config::ServiceConfig;

#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "Count eggs in photographs with an ONNX detector", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Serve `POST /count_eggs` over HTTP
    Serve(ServeArgs),
    /// Count eggs in a single image and print the JSON report
    Detect(DetectArgs),
}

#[derive(ClapArgs, Clone, Debug, Default)]
pub struct Overrides {
    /// ONNX model path
    #[arg(long, env = "DETECTION_ONNX_MODEL")]
    pub model: Option<PathBuf>,

    /// Minimum confidence for a detection to be counted
    #[arg(long, env = "DETECTION_THRESHOLD")]
    pub threshold: Option<f32>,

    /// Side of the square model input
    #[arg(long)]
    pub input_side: Option<u32>,
}

#[derive(ClapArgs, Clone, Debug)]
pub struct ServeArgs {
    /// YAML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    /// Verbose logging
    #[arg(long, env = "DEBUG", action = clap::ArgAction::SetTrue, value_parser = clap::builder::FalseyValueParser::new())]
    pub debug: bool,
}

#[derive(ClapArgs, Clone, Debug)]
pub struct DetectArgs {
    #[command(flatten)]
    pub overrides: Overrides,

    /// image path or URL
    #[arg(long, required = true)]
    pub source: String,

    /// Write the image with detections outlined here
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// YAML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Overrides {
    pub fn apply(&self, config: &mut ServiceConfig) {
        if let Some(model) = &self.model {
            config.model_path = model.clone();
        }
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(side) = self.input_side {
            config.input_side = side;
        }
    }
}

impl ServeArgs {
    pub fn apply(&self, config: &mut ServiceConfig) {
        self.overrides.apply(config);
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config.debug |= self.debug;
    }
}
