use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// easel - submit, watch and cancel remote image generation jobs
#[derive(Parser, Debug)]
#[command(name = "easel")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Submit, watch and cancel remote image generation jobs", long_about = None)]
pub struct Cli {
    /// RON config file
    #[arg(global = true, long = "config", short = 'c', default_value = "easel.ron")]
    pub config: PathBuf,

    /// Backend base URL, overrides the config file
    #[arg(global = true, long = "base-url")]
    pub base_url: Option<String>,

    /// Credential, overrides the config file and EASEL_CREDENTIAL
    #[arg(global = true, long = "credential")]
    pub credential: Option<String>,

    /// File holding the active job slot, overrides the config file
    #[arg(global = true, long = "slot")]
    pub slot: Option<PathBuf>,

    /// Print results as JSON
    #[arg(global = true, long = "json")]
    pub json: bool,

    /// Enable debug logging
    #[arg(global = true, long = "verbose", short = 'v')]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Submit a job and poll it until it finishes; Ctrl-C cancels it
    Generate(GenerateArgs),
    /// Cancel the active job, including one started by another process
    Cancel,
    /// Show the job the slot currently tracks
    Status,
    /// Show used and total stamina for the credential
    Stamina,
    /// Check the credential against the backend without generating
    Probe(GenerateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Positive prompt
    #[arg(value_name = "PROMPT")]
    pub prompt: String,

    /// Model id
    #[arg(long = "model", short = 'm')]
    pub model: Option<String>,

    #[arg(long = "negative", default_value = "")]
    pub negative_prompt: String,

    /// Extra text appended to the prompt
    #[arg(long = "extra", default_value = "")]
    pub extra: String,

    #[arg(long = "width")]
    pub width: Option<u32>,

    #[arg(long = "height")]
    pub height: Option<u32>,

    #[arg(long = "count")]
    pub count: Option<u32>,

    #[arg(long = "steps")]
    pub steps: Option<u32>,

    #[arg(long = "cfg-scale")]
    pub cfg_scale: Option<f32>,

    /// -1 picks a random seed
    #[arg(long = "seed", allow_hyphen_values = true)]
    pub seed: Option<i64>,

    #[arg(long = "sampler")]
    pub sampler: Option<String>,

    #[arg(long = "vae")]
    pub vae: Option<String>,

    #[arg(long = "clip-skip")]
    pub clip_skip: Option<u32>,

    /// Lora as `MODEL[:WEIGHT]`; MODEL is an id or a tensor.art link
    #[arg(long = "lora", value_name = "MODEL[:WEIGHT]")]
    pub loras: Vec<String>,

    /// Enable the high-resolution upscale pass
    #[arg(long = "upscale")]
    pub upscale: bool,
}
