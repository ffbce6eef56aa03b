use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use protocolist::llm::estimate_tokens;
use protocolist::{
    parse_transcript_file, read_meeting_info, split_segments, write_outputs, AnthropicClient, AnthropicConfig,
    ChunkingStats, FileCache, LlmClient, MeetingInfo, Pipeline, PipelineConfig,
};

#[derive(Parser)]
#[command(name = "protocolist")]
#[command(author, version, about = "Meeting protocol generation from diarized transcripts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a meeting protocol from a transcript
    Process {
        /// Input transcript file (JSON segments or plain text)
        #[arg(short, long)]
        input: PathBuf,

        /// Directory for the protocol document and JSON exports
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Meeting info JSON (title, date, location, participants, agenda)
        #[arg(long)]
        meeting: Option<PathBuf>,

        /// Meeting title
        #[arg(long)]
        title: Option<String>,

        /// Meeting date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,

        /// Protocol language
        #[arg(short, long)]
        language: Option<String>,

        /// Token budget per chunk
        #[arg(long)]
        chunk_tokens: Option<usize>,

        /// Tokens of context carried into the next chunk
        #[arg(long)]
        overlap_tokens: Option<usize>,

        /// Maximum concurrent chunk analyses
        #[arg(long, default_value = "5")]
        max_workers: usize,

        /// Seconds to wait for a single LLM call
        #[arg(long, default_value = "120")]
        task_timeout_secs: u64,

        /// Directory with prompt template overrides
        #[arg(long)]
        prompts_dir: Option<PathBuf>,

        /// Protocol JSON schema replacing the built-in one
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Directory for cached LLM responses
        #[arg(long, default_value = ".protocolist-cache")]
        cache_dir: PathBuf,

        /// Disable the response cache
        #[arg(long)]
        no_cache: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show how a transcript would be chunked, without calling the LLM
    Analyze {
        /// Input transcript file (JSON segments or plain text)
        #[arg(short, long)]
        input: PathBuf,

        /// Token budget per chunk
        #[arg(long)]
        chunk_tokens: Option<usize>,

        /// Tokens of context carried into the next chunk
        #[arg(long)]
        overlap_tokens: Option<usize>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

struct ProcessArgs {
    input: PathBuf,
    output_dir: PathBuf,
    meeting: Option<PathBuf>,
    title: Option<String>,
    date: Option<String>,
    language: Option<String>,
    cache_dir: Option<PathBuf>,
    config: PipelineConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            input,
            output_dir,
            meeting,
            title,
            date,
            language,
            chunk_tokens,
            overlap_tokens,
            max_workers,
            task_timeout_secs,
            prompts_dir,
            schema,
            cache_dir,
            no_cache,
            verbose,
        } => {
            setup_logging(verbose);
            let mut config = PipelineConfig::default().with_env_overrides();
            apply_chunk_overrides(&mut config, chunk_tokens, overlap_tokens);
            config.max_workers = max_workers;
            config.task_timeout = Duration::from_secs(task_timeout_secs);
            config.prompts_dir = prompts_dir;
            config.schema_path = schema;

            process_transcript(ProcessArgs {
                input,
                output_dir,
                meeting,
                title,
                date,
                language,
                cache_dir: (!no_cache).then_some(cache_dir),
                config,
            })
            .await
        }
        Commands::Analyze {
            input,
            chunk_tokens,
            overlap_tokens,
            verbose,
        } => {
            setup_logging(verbose);
            let mut config = PipelineConfig::default().with_env_overrides();
            apply_chunk_overrides(&mut config, chunk_tokens, overlap_tokens);
            analyze_transcript(input, &config)
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn apply_chunk_overrides(config: &mut PipelineConfig, chunk_tokens: Option<usize>, overlap_tokens: Option<usize>) {
    if let Some(tokens) = chunk_tokens {
        config.chunk.token_budget = tokens;
    }
    if let Some(tokens) = overlap_tokens {
        config.chunk.overlap_tokens = tokens;
    }
}

async fn process_transcript(args: ProcessArgs) -> Result<()> {
    info!("Loading transcript from {:?}", args.input);
    let transcript = parse_transcript_file(&args.input).context("Failed to parse input transcript")?;

    // File meeting info overrides what came with the transcript; flags override both
    let mut meeting = transcript.meeting;
    if let Some(path) = &args.meeting {
        meeting = meeting.merge(read_meeting_info(path)?);
    }
    let mut overrides = MeetingInfo::default();
    if let Some(title) = args.title {
        overrides = overrides.with_title(title);
    }
    if let Some(date) = args.date {
        overrides = overrides.with_date(date);
    }
    let meeting = meeting.merge(overrides);

    let language = args
        .language
        .or(transcript.language)
        .unwrap_or_else(|| args.config.language.clone());

    let api_config = AnthropicConfig::from_env()?;
    let client: Arc<dyn LlmClient> = Arc::new(AnthropicClient::new(api_config));
    let pipeline = match args.cache_dir {
        Some(dir) => {
            info!("Caching LLM responses in {:?}", dir);
            Pipeline::with_cache(client, Arc::new(FileCache::new(dir)), args.config)
        }
        None => Pipeline::new(client, args.config),
    };

    let progress = |stage: &str, fraction: f64| info!("[{:>3.0}%] {}", fraction * 100.0, stage);
    let output = pipeline
        .process(&transcript.segments, &meeting, Some(language.as_str()), Some(&progress))
        .await?;

    let written = write_outputs(&output.protocol, &output.document, &args.output_dir, &language)?;
    info!("Protocol written to {:?}", written.document);
    info!("Protocol JSON written to {:?}", written.protocol_json);
    if let Some(egl) = written.egl_json {
        info!("EGL export written to {:?}", egl);
    }

    if let Some(error) = &output.protocol.metadata.error {
        warn!("Protocol is incomplete: {}", error);
    }
    info!(
        "Complete: {} chunks ({} degraded) in {:.1}s",
        output.stats.chunks, output.stats.degraded_chunks, output.stats.elapsed_secs
    );

    Ok(())
}

fn analyze_transcript(input: PathBuf, config: &PipelineConfig) -> Result<()> {
    info!("Analyzing transcript from {:?}", input);
    let transcript = parse_transcript_file(&input).context("Failed to parse input transcript")?;
    let segments = &transcript.segments;
    let chunks = split_segments(segments, &config.chunk, estimate_tokens);
    let stats = ChunkingStats::from_chunks(segments, &chunks, config.chunk.token_budget);

    println!("Transcript Analysis");
    println!("==================");
    println!("Segments: {}", stats.segment_count);
    if let Some(language) = &transcript.language {
        println!("Language: {}", language);
    }
    let duration = segments.last().map(|s| s.end).unwrap_or(0.0) - segments.first().map(|s| s.start).unwrap_or(0.0);
    println!("Duration: {:.1}s", duration.max(0.0));
    println!();

    println!("Chunks");
    println!("------");
    println!(
        "Budget: {} tokens, overlap: {} tokens",
        config.chunk.token_budget, config.chunk.overlap_tokens
    );
    println!("Total chunks: {}", stats.chunk_count);
    println!("Total tokens: {}", stats.total_tokens);
    println!("Largest chunk: {} tokens", stats.max_chunk_tokens);
    println!("Oversized chunks: {}", stats.oversized_chunks);
    println!("Overlap segments: {}", stats.overlap_segments);
    println!();

    for chunk in &chunks {
        println!(
            "Chunk {}: {} segments, {} tokens, {:.1}s-{:.1}s, speakers {}",
            chunk.index,
            chunk.len(),
            chunk.token_count,
            chunk.start_secs(),
            chunk.end_secs(),
            chunk.speakers().join(", ")
        );
    }

    // Speaker stats
    println!();
    println!("Speaker Statistics");
    println!("------------------");
    let mut speakers: Vec<&str> = Vec::new();
    for segment in segments {
        if !speakers.contains(&segment.speaker.as_str()) {
            speakers.push(&segment.speaker);
        }
    }
    for speaker in speakers {
        let spoken: Vec<_> = segments.iter().filter(|s| s.speaker == speaker).collect();
        let words: usize = spoken.iter().map(|s| s.text.split_whitespace().count()).sum();
        let seconds: f64 = spoken.iter().map(|s| s.duration()).sum();
        println!(
            "{}: {} segments, {} words, {:.1}s",
            speaker,
            spoken.len(),
            words,
            seconds
        );
    }

    Ok(())
}
