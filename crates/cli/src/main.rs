use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use crossbeam_channel::Receiver;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use studio_backends::{BackendConfig, BackendFactory, BackendType, KeyPrompter, KeyStoreAuthority};
use studio_core::{
    normalize_image, registry, AspectRatio, CredentialAuthority, Engine, GenerationMode,
    RawFile, Readiness, Resolution, Studio, StudioEvent, SubmitOutcome,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Times the user is asked for a key before a generation gives up.
const MAX_KEY_PROMPTS: u32 = 3;

#[derive(Parser)]
#[command(name = "veo-studio")]
#[command(about = "Veo Studio CLI - Headless video generation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a clip, optionally extending it
    Generate(GenerateArgs),

    /// List generation modes and their inputs
    Modes,

    /// Write a default backend configuration
    InitConfig {
        /// Config file path
        path: PathBuf,

        /// Backend to configure (gemini, mock)
        #[arg(long, default_value = "gemini")]
        backend: BackendType,
    },
}

#[derive(clap::Args)]
struct GenerateArgs {
    /// Generation mode (text, frames, references)
    #[arg(short, long, default_value = "text")]
    mode: GenerationMode,

    /// Prompt describing the clip
    #[arg(short, long, default_value = "")]
    prompt: String,

    /// Engine (fast, standard)
    #[arg(long)]
    engine: Option<Engine>,

    /// Aspect ratio (16:9, 9:16)
    #[arg(long)]
    aspect: Option<AspectRatio>,

    /// Resolution (720p, 1080p)
    #[arg(long)]
    resolution: Option<Resolution>,

    /// Start frame image (frames mode)
    #[arg(long)]
    start_frame: Option<PathBuf>,

    /// End frame image (frames mode)
    #[arg(long)]
    end_frame: Option<PathBuf>,

    /// Loop back to the start frame (frames mode)
    #[arg(long = "loop")]
    looping: bool,

    /// Reference image, up to three (references mode)
    #[arg(long = "reference")]
    references: Vec<PathBuf>,

    /// Style image (references mode)
    #[arg(long)]
    style: Option<PathBuf>,

    /// Retries after a failed generation
    #[arg(long, default_value = "0")]
    retries: u32,

    /// Extend the result with another prompt; repeat to chain
    #[arg(long = "extend")]
    extend: Vec<String>,

    /// Directory finished clips are copied to
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Backend override (gemini, mock)
    #[arg(long)]
    backend: Option<BackendType>,

    /// Backend config file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Generate(args) => generate_command(args).await,
        Commands::Modes => modes_command(),
        Commands::InitConfig { path, backend } => init_config_command(path, backend),
    }
}

async fn generate_command(args: GenerateArgs) -> Result<()> {
    if !args.mode.is_selectable() {
        bail!("{} is reached with --extend after a generation", args.mode);
    }

    let mut config = match &args.config {
        Some(path) => BackendConfig::load(path)?,
        None => BackendConfig::default(),
    };
    if let Some(backend) = args.backend {
        config.backend_type = backend;
    }

    let keys = BackendFactory::key_store(&config);
    let service = BackendFactory::create(&config, keys.clone())?;
    let authority: Option<Arc<dyn CredentialAuthority>> = match config.backend_type {
        BackendType::Gemini => Some(Arc::new(KeyStoreAuthority::new(
            keys,
            Arc::new(StdinKeyPrompter),
        ))),
        BackendType::Mock => None,
    };

    let mut studio = Studio::new(service, authority);
    let events = studio.events();

    if !studio.mount().await {
        drain_events(&events);
        studio.complete_credential_selection().await?;
    }

    run_generation(&mut studio, &events, &args).await?;
    Ok(())
}

/// Fill the form, generate and extend. Whatever happens, the studio is
/// reset before returning so the last displayable result is released;
/// the copies under `--output` are all that remain.
async fn run_generation(
    studio: &mut Studio,
    events: &Receiver<StudioEvent>,
    args: &GenerateArgs,
) -> Result<Vec<PathBuf>> {
    let produced = produce_clips(studio, events, args).await;
    if let Err(err) = studio.new_video() {
        warn!("could not release the last clip: {err}");
    }
    drain_events(events);
    produced
}

async fn produce_clips(
    studio: &mut Studio,
    events: &Receiver<StudioEvent>,
    args: &GenerateArgs,
) -> Result<Vec<PathBuf>> {
    fill_form(studio, args).await?;
    if let Readiness::Blocked { hint } = studio.readiness() {
        bail!("{hint}");
    }

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;

    let mut clips = Vec::with_capacity(1 + args.extend.len());
    settle(studio, events, args.retries).await?;
    clips.push(save_result(studio, &args.output, 1).await?);

    for prompt in &args.extend {
        studio.extend()?;
        studio.form_mut().set_prompt(prompt.as_str());
        settle(studio, events, args.retries).await?;
        let clip = clips.len() + 1;
        clips.push(save_result(studio, &args.output, clip).await?);
    }
    Ok(clips)
}

async fn fill_form(studio: &mut Studio, args: &GenerateArgs) -> Result<()> {
    let form = studio.form_mut();
    form.set_mode(args.mode);
    form.set_prompt(args.prompt.as_str());
    if let Some(engine) = args.engine {
        form.set_engine(engine);
    }
    if let Some(aspect) = args.aspect {
        form.set_aspect_ratio(aspect);
    }
    if let Some(resolution) = args.resolution {
        form.set_resolution(resolution);
    }

    if let Some(path) = &args.start_frame {
        form.set_start_frame(load_image(path).await?)?;
    }
    if let Some(path) = &args.end_frame {
        form.set_end_frame(load_image(path).await?)?;
    }
    if args.looping {
        form.set_looping(true)?;
    }
    for path in &args.references {
        if !form.add_reference_image(load_image(path).await?)? {
            warn!(path = %path.display(), "reference limit reached, image skipped");
        }
    }
    if let Some(path) = &args.style {
        form.set_style_image(load_image(path).await?)?;
    }

    let settings = form.effective_settings();
    info!(
        mode = %form.mode(),
        engine = %settings.engine,
        aspect = %settings.aspect_ratio,
        resolution = %settings.resolution,
        "form ready"
    );
    Ok(())
}

async fn load_image(path: &Path) -> Result<studio_core::MediaAsset> {
    let asset = normalize_image(&RawFile::from_path(path)).await?;
    debug!(file = asset.file_name(), mime = asset.mime_type(), size = asset.len(), "loaded image");
    Ok(asset)
}

/// Submit the form and follow up until the generation succeeds, the
/// retry budget runs out, or the user stops supplying keys.
async fn settle(studio: &mut Studio, events: &Receiver<StudioEvent>, retries: u32) -> Result<()> {
    let mut retries_left = retries;
    let mut key_prompts_left = MAX_KEY_PROMPTS;
    let mut outcome = studio.submit().await?;

    loop {
        drain_events(events);
        outcome = match outcome {
            SubmitOutcome::Succeeded => return Ok(()),
            SubmitOutcome::NothingToRetry => bail!("nothing to retry"),
            SubmitOutcome::Unauthorized | SubmitOutcome::Failed {
                authorization_failure: true,
            } if key_prompts_left > 0 => {
                key_prompts_left -= 1;
                match studio.complete_credential_selection().await? {
                    Some(retried) => retried,
                    // Refused before anything was sent: submit the form again.
                    None => studio.submit().await?,
                }
            }
            SubmitOutcome::Failed { .. } if retries_left > 0 => {
                retries_left -= 1;
                warn!(
                    retries_left,
                    "{}",
                    studio.state().error_message().unwrap_or("generation failed")
                );
                studio.retry().await?
            }
            SubmitOutcome::Unauthorized => bail!("no API key selected"),
            SubmitOutcome::Failed { .. } => bail!(
                "{}",
                studio.state().error_message().unwrap_or("generation failed")
            ),
        };
    }
}

async fn save_result(studio: &Studio, output: &Path, clip: usize) -> Result<PathBuf> {
    let result = studio
        .state()
        .result()
        .context("generation finished without a result")?;
    let path = output.join(format!("veo-{clip:02}.mp4"));
    tokio::fs::write(&path, &result.blob[..])
        .await
        .with_context(|| format!("writing {}", path.display()))?;

    info!(url = %result.displayable_url, handle = %result.handle, "clip ready");
    println!("{}", path.display());
    if studio.can_extend() {
        debug!("clip can be extended");
    }
    Ok(path)
}

fn drain_events(events: &Receiver<StudioEvent>) {
    for event in events.try_iter() {
        match event {
            StudioEvent::StateChanged(phase) => debug!(%phase, "state changed"),
            StudioEvent::CredentialPromptRaised => warn!("an API key is required"),
            StudioEvent::CredentialPromptClosed => debug!("credential prompt closed"),
            StudioEvent::ResultReleased { url } => debug!(%url, "released previous clip"),
            StudioEvent::SeedLoaded => info!("extending previous clip"),
        }
    }
}

fn modes_command() -> Result<()> {
    for spec in registry() {
        let mode = spec.mode;
        println!(
            "{} ({}){}",
            mode.display_name(),
            mode.as_str(),
            if mode.is_selectable() { "" } else { " [via --extend]" }
        );

        let slots: Vec<String> = spec.slots.iter().map(ToString::to_string).collect();
        if !slots.is_empty() {
            println!("  inputs:   {}", slots.join(", "));
        }

        let mut locked = Vec::new();
        if spec.locks.engine {
            locked.push(format!("engine={}", mode_value(spec.forced.engine)));
        }
        if spec.locks.aspect_ratio {
            locked.push(format!("aspect={}", mode_value(spec.forced.aspect_ratio)));
        }
        if spec.locks.resolution {
            locked.push(format!("resolution={}", mode_value(spec.forced.resolution)));
        }
        if !locked.is_empty() {
            println!("  locked:   {}", locked.join(", "));
        }

        println!("  requires: {}", spec.readiness_hint);
    }
    Ok(())
}

fn mode_value<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "inherited".to_string(), |v| v.to_string())
}

fn init_config_command(path: PathBuf, backend: BackendType) -> Result<()> {
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    let config = BackendConfig::new(backend);
    config.save(&path)?;
    info!(path = %path.display(), backend = %backend, "config written");
    println!("{}", path.display());
    Ok(())
}

/// Reads a replacement API key from the terminal.
struct StdinKeyPrompter;

#[async_trait]
impl KeyPrompter for StdinKeyPrompter {
    async fn prompt_for_key(&self) -> Result<Option<String>> {
        tokio::task::spawn_blocking(|| -> Result<Option<String>> {
            eprint!("Gemini API key (leave blank to cancel): ");
            std::io::stderr().flush()?;
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            let key = line.trim();
            Ok((!key.is_empty()).then(|| key.to_string()))
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studio_core::mock::{MockGenerationService, ScriptedOutcome};
    use studio_core::{GenerationFailure, Phase};

    fn generate_args(extra: &[&str]) -> GenerateArgs {
        let mut argv = vec!["veo-studio", "generate", "--backend", "mock"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Generate(args) => args,
            _ => unreachable!("parsed a generate command"),
        }
    }

    #[test]
    fn test_modes_listing() {
        assert!(modes_command().is_ok());
    }

    #[test]
    fn test_generate_flags_parse() {
        let args = generate_args(&[
            "--mode",
            "references",
            "--aspect",
            "9:16",
            "--reference",
            "a.png",
            "--reference",
            "b.png",
            "--loop",
            "--retries",
            "2",
        ]);
        assert_eq!(args.mode, GenerationMode::ReferencesToVideo);
        assert_eq!(args.aspect, Some(AspectRatio::Portrait));
        assert_eq!(args.references.len(), 2);
        assert!(args.looping);
        assert_eq!(args.retries, 2);
        assert_eq!(args.backend, Some(BackendType::Mock));
    }

    #[tokio::test]
    async fn test_generation_releases_every_clip() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().to_string_lossy().into_owned();
        let args = generate_args(&[
            "--prompt",
            "a drone shot of a warehouse",
            "--extend",
            "the drone lands",
            "--output",
            output.as_str(),
        ]);

        let service = Arc::new(MockGenerationService::new());
        let mut studio = Studio::new(service.clone(), None);
        let events = studio.events();

        let clips = run_generation(&mut studio, &events, &args).await.unwrap();
        assert_eq!(clips.len(), 2);
        assert!(clips.iter().all(|clip| clip.exists()));
        assert_eq!(service.requests().len(), 2);
        assert!(service.live_urls().is_empty());
        assert_eq!(service.released_urls().len(), 2);
        assert_eq!(studio.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_failed_extension_still_releases() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().to_string_lossy().into_owned();
        let args = generate_args(&[
            "--prompt",
            "a drone shot of a warehouse",
            "--extend",
            "the drone lands",
            "--output",
            output.as_str(),
        ]);

        let service = Arc::new(MockGenerationService::with_outcomes([
            ScriptedOutcome::Succeed,
            ScriptedOutcome::Fail(GenerationFailure::rejected("quota exceeded")),
        ]));
        let mut studio = Studio::new(service.clone(), None);
        let events = studio.events();

        let err = run_generation(&mut studio, &events, &args)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
        assert!(service.live_urls().is_empty());
        assert!(studio.last_request().is_none());
    }
}
