use std::sync::{mpsc, Arc};

use anyhow::{bail, Context, Result};
use easel_core::payload::DEFAULT_LORA_WEIGHT;
use easel_core::{GenerateOutcome, GenerationRequest, LoraEntry, UpscaleSettings};
use easel_engine::{CancelOutcome, ChannelEventSink, FileSlotStore, GenerationEngine};
use easel_logging::{easel_info, easel_warn};
use serde::Serialize;
use serde_json::json;

use crate::cli::{Cli, Command, GenerateArgs};
use crate::config::AppConfig;
use crate::terminal::{spawn_event_logger, ProgressPrinter, TerminalNotifier};

pub async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    spawn_event_logger(rx);
    let engine = build_engine(&config, tx)?;

    match cli.command {
        Command::Generate(args) => generate(&engine, &args, &config, cli.json).await,
        Command::Cancel => cancel(&engine, cli.json).await,
        Command::Status => status(&engine, cli.json),
        Command::Stamina => stamina(&engine, cli.json).await,
        Command::Probe(args) => probe(&engine, &args, &config, cli.json).await,
    }
}

fn build_engine(
    config: &AppConfig,
    events: mpsc::Sender<easel_engine::EngineEvent>,
) -> Result<GenerationEngine> {
    let mut builder = GenerationEngine::builder(config.engine.clone())
        .slot_store(Arc::new(FileSlotStore::new(&config.slot_path)))
        .notifier(Arc::new(TerminalNotifier))
        .events(Arc::new(ChannelEventSink::new(events)));
    if let Some(credential) = config.credential() {
        builder = builder.credential(credential);
    }
    builder
        .build()
        .with_context(|| format!("failed to set up backend at {}", config.engine.base_url))
}

async fn generate(
    engine: &GenerationEngine,
    args: &GenerateArgs,
    config: &AppConfig,
    json: bool,
) -> Result<()> {
    let request = build_request(args, config);
    let run = engine.generate(&request, &args.extra, &ProgressPrinter);
    tokio::pin!(run);

    let mut interrupted = false;
    let outcome = loop {
        tokio::select! {
            outcome = &mut run => break outcome,
            _ = tokio::signal::ctrl_c() => {
                if interrupted {
                    bail!("interrupted; the job may still be running remotely");
                }
                interrupted = true;
                eprintln!();
                easel_info!("interrupt received, canceling active job");
                let cancel = engine.cancel_active().await;
                if !cancel.is_canceled() {
                    easel_warn!("cancel did not go through: {}", cancel.message());
                }
            }
        }
    };

    let outcome = outcome.context("image generation failed")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }
    match &outcome {
        GenerateOutcome::Completed(result) => {
            for image in &result.images {
                println!("{image}");
            }
            eprintln!(
                "job {}: {} image(s), stamina used {} (this job {})",
                result.job_id,
                result.images.len(),
                result.usage.used,
                result.usage.consumed
            );
        }
        GenerateOutcome::Canceled { job_id, message } => {
            println!("job {job_id}: {message}");
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct CancelReport<'a> {
    #[serde(flatten)]
    outcome: &'a CancelOutcome,
    message: String,
}

async fn cancel(engine: &GenerationEngine, json: bool) -> Result<()> {
    let outcome = engine.cancel_active().await;
    if json {
        let report = CancelReport {
            outcome: &outcome,
            message: outcome.message(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", outcome.message());
    }
    match outcome {
        CancelOutcome::Canceled { .. }
        | CancelOutcome::NothingToCancel
        | CancelOutcome::AlreadyInProgress => Ok(()),
        other => bail!(other.message()),
    }
}

fn status(engine: &GenerationEngine, json: bool) -> Result<()> {
    let job = engine.channel().current_job();
    if json {
        println!("{}", json!({ "job_id": job }));
        return Ok(());
    }
    match job {
        Some(job_id) => println!("active job: {job_id}"),
        None => println!("no active job"),
    }
    Ok(())
}

async fn stamina(engine: &GenerationEngine, json: bool) -> Result<()> {
    let info = engine
        .check_stamina()
        .await
        .context("failed to fetch stamina")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!(
            "stamina: {} / {} (updated {})",
            info.used,
            info.total,
            info.last_update.as_deref().unwrap_or("unknown")
        );
    }
    Ok(())
}

async fn probe(
    engine: &GenerationEngine,
    args: &GenerateArgs,
    config: &AppConfig,
    json: bool,
) -> Result<()> {
    let request = build_request(args, config);
    let probe = engine.probe_credential(&request).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&probe)?);
    } else {
        println!("{}", probe.message);
    }
    if !probe.valid {
        bail!("credential probe failed: {}", probe.message);
    }
    Ok(())
}

/// Flags over config defaults over request defaults. The engine validates
/// the result, including a missing model.
fn build_request(args: &GenerateArgs, config: &AppConfig) -> GenerationRequest {
    let defaults = GenerationRequest::default();
    GenerationRequest {
        model: args
            .model
            .clone()
            .or_else(|| config.default_model.clone())
            .unwrap_or_default(),
        prompt: args.prompt.clone(),
        negative_prompt: args.negative_prompt.clone(),
        width: args.width.unwrap_or(defaults.width),
        height: args.height.unwrap_or(defaults.height),
        count: args.count.unwrap_or(defaults.count),
        steps: args.steps.unwrap_or(defaults.steps),
        cfg_scale: args.cfg_scale.unwrap_or(defaults.cfg_scale),
        seed: args.seed.unwrap_or(defaults.seed),
        sampler: args.sampler.clone().unwrap_or(defaults.sampler),
        vae: args.vae.clone().unwrap_or(defaults.vae),
        clip_skip: args.clip_skip.unwrap_or(defaults.clip_skip),
        loras: args.loras.iter().map(|raw| parse_lora(raw)).collect(),
        upscale: args.upscale.then(UpscaleSettings::default),
        credential: config.credential(),
    }
}

/// `MODEL[:WEIGHT]`. Links contain colons, so only a trailing number counts
/// as the weight.
fn parse_lora(raw: &str) -> LoraEntry {
    match raw.rsplit_once(':') {
        Some((model, weight)) => match weight.trim().parse::<f32>() {
            Ok(weight) => LoraEntry::new(model, weight),
            Err(_) => LoraEntry::new(raw, DEFAULT_LORA_WEIGHT),
        },
        None => LoraEntry::new(raw, DEFAULT_LORA_WEIGHT),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn generate_args(argv: &[&str]) -> GenerateArgs {
        let mut full = vec!["easel", "generate"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Command::Generate(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn lora_weight_is_optional_and_links_keep_their_colons() {
        assert_eq!(parse_lora("123:0.5"), LoraEntry::new("123", 0.5));
        assert_eq!(parse_lora("123"), LoraEntry::new("123", DEFAULT_LORA_WEIGHT));
        assert_eq!(
            parse_lora("https://tensor.art/models/789"),
            LoraEntry::new("https://tensor.art/models/789", DEFAULT_LORA_WEIGHT)
        );
        assert_eq!(
            parse_lora("https://tensor.art/models/789:1.2"),
            LoraEntry::new("https://tensor.art/models/789", 1.2)
        );
    }

    #[test]
    fn request_falls_back_to_config_model_and_defaults() {
        let config = AppConfig {
            default_model: Some("600423432991350804".to_string()),
            credential: Some("jjdd-from-config".to_string()),
            ..AppConfig::default()
        };
        let args = generate_args(&["a red fox", "--steps", "30", "--upscale"]);
        let request = build_request(&args, &config);

        assert_eq!(request.model, "600423432991350804");
        assert_eq!(request.steps, 30);
        assert_eq!(request.width, 512);
        assert_eq!(request.upscale, Some(UpscaleSettings::default()));
        assert_eq!(
            request.credential.as_ref().map(|credential| credential.expose()),
            Some("jjdd-from-config")
        );
    }
}
