use std::error::Error;
use std::net::SocketAddr;
use std::time::Duration;

use atty::Stream;
use clap::{Args, Parser, Subcommand};
use termimad::{FmtText, MadSkin, terminal_size};
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;
use veritas_radix::config::{
    DEFAULT_GEMINI_BASE_URL, DEFAULT_IMAGE_MODEL, DEFAULT_OPENAI_BASE_URL, DEFAULT_TEXT_MODEL,
    DEFAULT_UNSPLASH_BASE_URL, IMAGE_API_KEY_VAR, RetryPolicy, STOCK_PHOTO_KEY_VAR,
    ServiceConfig, TEXT_API_KEY_VAR, non_blank,
};
use veritas_radix::model::{EtymologyAnalysis, GeneratedImage, ImageResult};
use veritas_radix::normalize::normalize;
use veritas_radix::service::EtymologyService;
use veritas_radix::web::{self, WebConfig};

#[derive(Parser, Debug)]
#[command(
    name = "veritas-radix",
    about = "Explore the etymological roots of words",
    version
)]
pub struct Cli {
    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API and the browser screens.
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
        #[command(flatten)]
        upstream: UpstreamArgs,
    },
    /// Ask the text model for a word's etymology.
    Etymology {
        word: String,
        #[command(flatten)]
        upstream: UpstreamArgs,
    },
    /// Generate an illustration for a word.
    Illustrate {
        word: String,
        /// Etymology text used as extra context for the prompt.
        #[arg(long)]
        etymology: Option<String>,
        #[command(flatten)]
        upstream: UpstreamArgs,
    },
    /// Resolve a stock photo for a word, falling back to the built-in table.
    ImageSearch {
        /// Word to illustrate.
        #[arg(long)]
        word: Option<String>,
        /// Explicit search query; overrides the word's curated query.
        #[arg(long)]
        query: Option<String>,
        #[command(flatten)]
        upstream: UpstreamArgs,
    },
    /// Normalize raw model output read from a file, or stdin when omitted.
    Normalize {
        word: String,
        file: Option<std::path::PathBuf>,
    },
}

#[derive(Args, Debug)]
struct UpstreamArgs {
    /// Gemini API key.
    #[arg(long, env = TEXT_API_KEY_VAR, hide_env_values = true)]
    google_api_key: Option<String>,
    /// OpenAI API key.
    #[arg(long, env = IMAGE_API_KEY_VAR, hide_env_values = true)]
    openai_api_key: Option<String>,
    /// Unsplash access key.
    #[arg(long, env = STOCK_PHOTO_KEY_VAR, hide_env_values = true)]
    unsplash_access_key: Option<String>,
    #[arg(long, default_value = DEFAULT_TEXT_MODEL)]
    text_model: String,
    #[arg(long, default_value = DEFAULT_IMAGE_MODEL)]
    image_model: String,
    #[arg(long, default_value = DEFAULT_GEMINI_BASE_URL, hide = true)]
    gemini_base_url: String,
    #[arg(long, default_value = DEFAULT_OPENAI_BASE_URL, hide = true)]
    openai_base_url: String,
    #[arg(long, default_value = DEFAULT_UNSPLASH_BASE_URL, hide = true)]
    unsplash_base_url: String,
    /// Per-attempt timeout for text and image generation, in seconds.
    #[arg(long, default_value_t = 30)]
    generation_timeout_secs: u64,
    /// Timeout for stock photo search, in seconds.
    #[arg(long, default_value_t = 5)]
    search_timeout_secs: u64,
    /// Retries for transient generation failures.
    #[arg(long, default_value_t = RetryPolicy::default().max_retries)]
    retries: u32,
}

impl UpstreamArgs {
    fn into_config(self) -> ServiceConfig {
        ServiceConfig {
            text_api_key: non_blank(self.google_api_key),
            image_api_key: non_blank(self.openai_api_key),
            stock_photo_key: non_blank(self.unsplash_access_key),
            text_model: self.text_model,
            image_model: self.image_model,
            gemini_base_url: self.gemini_base_url,
            openai_base_url: self.openai_base_url,
            unsplash_base_url: self.unsplash_base_url,
            generation_timeout: Duration::from_secs(self.generation_timeout_secs.max(1)),
            search_timeout: Duration::from_secs(self.search_timeout_secs.max(1)),
            retry: RetryPolicy {
                max_retries: self.retries,
                ..RetryPolicy::default()
            },
        }
    }
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing();
    match cli.command {
        Command::Serve { addr, upstream } => handle_serve(addr, upstream),
        Command::Etymology { word, upstream } => handle_etymology(word, upstream, cli.json),
        Command::Illustrate {
            word,
            etymology,
            upstream,
        } => handle_illustrate(word, etymology, upstream, cli.json),
        Command::ImageSearch {
            word,
            query,
            upstream,
        } => handle_image_search(word, query, upstream, cli.json),
        Command::Normalize { word, file } => handle_normalize(word, file, cli.json),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_service(upstream: UpstreamArgs) -> Result<EtymologyService, Box<dyn Error>> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("veritas-radix/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(EtymologyService::from_config(&upstream.into_config(), http))
}

fn handle_serve(addr: SocketAddr, upstream: UpstreamArgs) -> Result<(), Box<dyn Error>> {
    let config = WebConfig {
        addr,
        service: upstream.into_config(),
    };
    Runtime::new()?.block_on(web::serve(config))?;
    Ok(())
}

fn handle_etymology(word: String, upstream: UpstreamArgs, as_json: bool) -> Result<(), Box<dyn Error>> {
    let service = build_service(upstream)?;
    let analysis = Runtime::new()?.block_on(service.analyze(&word))?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        print_analysis(&analysis);
    }
    Ok(())
}

fn handle_illustrate(
    word: String,
    etymology: Option<String>,
    upstream: UpstreamArgs,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let service = build_service(upstream)?;
    let image = Runtime::new()?.block_on(service.illustrate(&word, etymology.as_deref()))?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&image)?);
    } else {
        print_generated(&image);
    }
    Ok(())
}

fn handle_image_search(
    word: Option<String>,
    query: Option<String>,
    upstream: UpstreamArgs,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let service = build_service(upstream)?;
    let image = Runtime::new()?.block_on(service.search_image(word.as_deref(), query.as_deref()));
    if as_json {
        println!("{}", serde_json::to_string_pretty(&image)?);
    } else {
        print_image(&image);
    }
    Ok(())
}

fn handle_normalize(
    word: String,
    file: Option<std::path::PathBuf>,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(&path)
            .map_err(|err| format!("Failed to read {}: {err}", path.display()))?,
        None => std::io::read_to_string(std::io::stdin())?,
    };
    let analysis = EtymologyAnalysis {
        data: normalize(&word, &raw),
        raw_response: raw,
    };
    if as_json {
        println!("{}", serde_json::to_string_pretty(&analysis.data)?);
    } else {
        print_analysis(&analysis);
    }
    Ok(())
}

fn print_analysis(analysis: &EtymologyAnalysis) {
    let data = &analysis.data;
    println!("Word: {}", data.word);
    let origin = &data.etymology;
    if !origin.origin_language.is_empty() {
        println!("Origin: {}", origin.origin_language);
    }
    if !origin.original_form.is_empty() {
        println!("Original form: {}", origin.original_form);
    }
    if !origin.original_meaning.is_empty() {
        println!("Original meaning: {}", origin.original_meaning);
    }
    let morphology = &data.morphology;
    if !morphology.root.is_empty() {
        let parts: Vec<&str> = [morphology.prefix(), Some(morphology.root.as_str()), morphology.suffix()]
            .into_iter()
            .flatten()
            .collect();
        println!("Morphology: {}", parts.join(" + "));
        if !morphology.explanation.is_empty() {
            println!("    {}", morphology.explanation);
        }
    }
    if data.has_structure() {
        render_markdown_block("Evolution", &origin.evolution_narrative);
    }
    if !data.related_words.is_empty() {
        println!("\nRelated words:");
        for related in &data.related_words {
            if related.relationship.is_empty() {
                println!("- {} {}", related.word, related.explanation);
            } else {
                println!("- {} ({}) {}", related.word, related.relationship, related.explanation);
            }
        }
    }
    render_markdown_block("Historical context", &data.historical_context);
    if !data.curiosities.is_empty() {
        println!("\nCuriosities:");
        for curiosity in &data.curiosities {
            println!("- {curiosity}");
        }
    }
}

fn print_generated(image: &GeneratedImage) {
    println!("Image: {}", image.image_url);
    render_markdown_block("Prompt", &image.prompt);
}

fn print_image(image: &ImageResult) {
    println!("Image: {}", image.image_url);
    if let Some(thumbnail) = &image.thumbnail_url {
        println!("Thumbnail: {thumbnail}");
    }
    println!("Description: {}", image.description);
    if let Some(attribution) = &image.attribution {
        println!(
            "Photo by {} (@{}) {}",
            attribution.photographer, attribution.username, attribution.profile_url
        );
    }
    if image.using_fallback {
        let reason = image
            .reason
            .map(|reason| format!(" ({})", reason.as_str()))
            .unwrap_or_default();
        println!("Fallback image{reason}");
    }
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn render_markdown_block(title: &str, body: &str) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return;
    }
    println!("\n{title}:");
    if stdout_is_tty() {
        let skin = MadSkin::default();
        let formatted = FmtText::from(&skin, trimmed, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{trimmed}");
    }
}
