use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use slide_common::file_utils::{generate_deck_filename, save_markdown};
use slide_common::{GenerationRequest, Language, SlideConfig, VisualStyle};
use slide_core::{
    ChartRegistry, Collaborators, DeckError, EditableDeck, GenerationPipeline,
    GenerationStateMachine, InMemoryChartRegistry, JsonDeckStore, Phase, SlideEdit,
};
use slide_protocol::Event;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "slide")]
#[command(about = "Generate Marp slide decks from a short topic")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,

    /// Override the text model (e.g., gpt-4o, gpt-4o-mini)
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Use canned collaborators instead of calling the API
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a deck and write it as markdown
    Generate {
        /// What the deck is about
        topic: String,
        /// Number of slides to generate
        #[arg(short = 'n', long, default_value = "6")]
        count: usize,
        /// Output language code (en, ja, ...)
        #[arg(short, long, default_value = "en")]
        language: String,
        /// Image style descriptor passed to the image model
        #[arg(long)]
        style: Option<String>,
        /// How stylized the visuals should be (0-100)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        stylization: Option<u8>,
        /// JSON file with chart references
        #[arg(long)]
        charts: Option<PathBuf>,
        /// Seed for layouts picked when the model gives none
        #[arg(long)]
        seed: Option<u64>,
        /// Directory for the markdown file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List archived decks
    History,
    /// Print the markdown of an archived deck
    Show {
        id: String,
    },
    /// Edit one slide of an archived deck
    Edit {
        id: String,
        /// 1-based slide number
        #[arg(long)]
        slide: usize,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        /// New highlight; an empty string clears it
        #[arg(long)]
        highlight: Option<String>,
        /// image-right, image-left, full-bleed, chart-focus, chart-large, chart-split
        #[arg(long)]
        layout: Option<String>,
        /// Move the slide to this 1-based position
        #[arg(long)]
        move_to: Option<usize>,
        /// Remove the slide
        #[arg(long)]
        remove: bool,
    },
    /// Delete an archived deck
    Delete {
        id: String,
    },
    /// Print the effective configuration
    Config,
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let mut config = SlideConfig::load()?;
    if let Some(model) = cli.model {
        config.text_model = model;
    }
    tracing::debug!(
        "Using text model {} and archive {}",
        config.text_model,
        config.archive_path().display()
    );

    match cli.command {
        Commands::Generate {
            topic,
            count,
            language,
            style,
            stylization,
            charts,
            seed,
            output,
        } => {
            let mut request =
                GenerationRequest::new(topic, count).with_language(Language::from_code(&language));
            if let Some(style) = style {
                request = request.with_image_style(style);
            }
            if let Some(level) = stylization {
                request = request.with_stylization_level(level);
            }
            let charts: Arc<dyn ChartRegistry> = match charts {
                Some(path) => Arc::new(InMemoryChartRegistry::from_json_file(&path)?),
                None => Arc::new(InMemoryChartRegistry::default()),
            };
            let output = output.unwrap_or_else(|| config.output_dir.clone());
            generate(&config, request, charts, seed, cli.offline, output).await?;
        }
        Commands::History => history(&config).await?,
        Commands::Show { id } => {
            let deck = JsonDeckStore::new(config.archive_path()).get(&id).await?;
            println!("{}", deck.markdown);
        }
        Commands::Edit {
            id,
            slide,
            title,
            content,
            highlight,
            layout,
            move_to,
            remove,
        } => {
            let edit = SlideEdit {
                title,
                content,
                highlight: highlight.map(|h| Some(h).filter(|h| !h.trim().is_empty())),
            };
            let layout = layout
                .map(|l| l.parse::<VisualStyle>())
                .transpose()
                .map_err(anyhow::Error::msg)?;
            edit_deck(&config, &id, slide, edit, layout, move_to, remove).await?;
        }
        Commands::Delete { id } => {
            JsonDeckStore::new(config.archive_path()).delete(&id).await?;
            println!("Deleted {id}");
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        }
    }

    Ok(())
}

fn init_tracing(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn generate(
    config: &SlideConfig,
    request: GenerationRequest,
    charts: Arc<dyn ChartRegistry>,
    seed: Option<u64>,
    offline: bool,
    output: PathBuf,
) -> Result<()> {
    let collaborators = if offline {
        Collaborators::offline(config, &request, charts)
    } else {
        Collaborators::openai(config, charts)?
    };
    let pipeline = GenerationPipeline::new(
        &collaborators,
        config.text_model.clone(),
        seed.or(config.layout_seed),
    );
    let mut machine = GenerationStateMachine::new(&collaborators, pipeline)
        .with_stuck_timeout(Duration::from_secs(config.stuck_timeout_secs));

    println!(
        "Generating {} slides in {} for: {}",
        request.slide_count, request.language.display_name, request.topic
    );
    machine.submit(request)?;
    machine.run_until_settled(print_event).await;

    let deck = match machine.phase() {
        Phase::Editing(deck) => deck,
        _ => match machine.last_error() {
            Some(error) => bail!("generation failed: {}", error.message),
            None => bail!("generation ended without a deck"),
        },
    };

    let filename = generate_deck_filename(deck.topic(), Utc::now());
    let path = save_markdown(&output, &filename, deck.markdown()).await?;
    println!("Slides saved to: {}", path.display());
    if let Some(id) = deck.archive_id() {
        println!("Archived as {id}");
    }
    Ok(())
}

fn print_event(event: &Event) {
    match event {
        Event::Progress { progress, step, .. } => {
            eprintln!("[{:>3.0}%] {step}", progress * 100.0);
        }
        Event::SlideImageFailed { index, message, .. } => {
            eprintln!("       slide {} has no image: {message}", index + 1);
        }
        _ => {}
    }
}

async fn history(config: &SlideConfig) -> Result<()> {
    let decks = JsonDeckStore::new(config.archive_path()).list().await?;
    if decks.is_empty() {
        println!("No decks yet.");
        return Ok(());
    }
    for deck in decks.iter().rev() {
        println!(
            "{}  {}  {} ({} slides)",
            deck.id,
            deck.created_at.format("%Y-%m-%d %H:%M"),
            deck.title,
            deck.slides.len()
        );
    }
    Ok(())
}

async fn edit_deck(
    config: &SlideConfig,
    id: &str,
    slide: usize,
    edit: SlideEdit,
    layout: Option<VisualStyle>,
    move_to: Option<usize>,
    remove: bool,
) -> Result<()> {
    let index = slide.checked_sub(1).context("slides are numbered from 1")?;
    let store = JsonDeckStore::new(config.archive_path());
    let archived = store.get(id).await?;
    let mut deck = EditableDeck::from_archived(&archived);

    apply_edit(&mut deck, index, edit, layout, move_to, remove)?;
    store.update(id, deck.markdown(), deck.records()).await?;
    println!("Updated {id} ({} slides)", deck.slides().len());
    Ok(())
}

fn apply_edit(
    deck: &mut EditableDeck,
    index: usize,
    edit: SlideEdit,
    layout: Option<VisualStyle>,
    move_to: Option<usize>,
    remove: bool,
) -> Result<(), DeckError> {
    if remove {
        deck.remove_slide(index)?;
        return Ok(());
    }
    deck.update_slide(index, edit)?;
    if let Some(style) = layout {
        deck.set_layout(index, style)?;
    }
    if let Some(to) = move_to {
        let len = deck.slides().len();
        let to = to.checked_sub(1).ok_or(DeckError::IndexOutOfRange { index: 0, len })?;
        deck.move_slide(index, to)?;
    }
    Ok(())
}
