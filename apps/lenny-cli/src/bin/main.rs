use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use lenny_core::config::{Config, Settings};
use lenny_core::data_processor::DataProcessor;
use lenny_core::traits::SegmentWriter;
use lenny_core::types::{Citation, Partition, Segment};
use lenny_embed::{get_default_embedder, EmbeddingCache};
use lenny_llm::ChatCompletionClient;
use lenny_rag::{default_frameworks, AnswerEvent, LennyRag, PersonaEvaluator, PersonaPolicy, StratifiedRetriever};
use lenny_vector::MemoryIndex;

const EMBED_BATCH: usize = 32;

struct AskOptions {
    top_k: usize,
    temperature: f32,
}

fn usage(prog: &str) -> ! {
    eprintln!("Usage: {} <ingest|ask|chat> [args...]", prog);
    eprintln!("  ingest [<corpus dir>]             embed writing/ and transcripts/ into the index");
    eprintln!("  ask [--top-k N] [--temperature T] \"<question>\"");
    eprintln!("  chat [--top-k N] [--temperature T]");
    std::process::exit(1);
}

fn parse_args() -> (String, String, Vec<String>) {
    let mut args: Vec<String> = env::args().collect();
    let prog = args.remove(0);
    if args.is_empty() { usage(&prog); }
    let cmd = args.remove(0);
    (prog, cmd, args)
}

/// Pulls `--top-k`/`--temperature` out of `args`, leaving the positional words.
fn parse_ask_options(prog: &str, args: &[String], settings: &Settings) -> (AskOptions, Vec<String>) {
    let mut opts = AskOptions { top_k: settings.retrieval.top_k_per_partition, temperature: settings.generation.temperature };
    let mut rest = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--top-k" | "-k" => match args.get(i + 1).and_then(|v| v.parse::<usize>().ok()) {
                Some(k) => { opts.top_k = k; i += 1; }
                None => { eprintln!("Error: --top-k requires a number"); usage(prog) }
            },
            "--temperature" | "-t" => match args.get(i + 1).and_then(|v| v.parse::<f32>().ok()) {
                Some(t) => { opts.temperature = t; i += 1; }
                None => { eprintln!("Error: --temperature requires a number"); usage(prog) }
            },
            other => rest.push(other.to_string()),
        }
        i += 1;
    }
    (opts, rest)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).with_target(false).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;
    let (prog, cmd, args) = parse_args();
    match cmd.as_str() {
        "ingest" => {
            let data_dir = args.first().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("./data/corpus"));
            ingest(&settings, data_dir).await?;
        }
        "ask" => {
            let (opts, words) = parse_ask_options(&prog, &args, &settings);
            let question = words.join(" ");
            if question.trim().is_empty() { usage(&prog); }
            let rag = build_rag(&settings)?;
            let evaluator = PersonaEvaluator::new()?;
            if !answer_once(&rag, &evaluator, &question, &opts).await? { std::process::exit(2); }
        }
        "chat" => {
            let (opts, _) = parse_ask_options(&prog, &args, &settings);
            let rag = build_rag(&settings)?;
            let evaluator = PersonaEvaluator::new()?;
            chat(&rag, &evaluator, &opts).await?;
        }
        _ => { eprintln!("Unknown command: {}", cmd); usage(&prog) }
    }
    Ok(())
}

async fn ingest(settings: &Settings, data_dir: PathBuf) -> anyhow::Result<()> {
    println!("Ingesting from {}", data_dir.display());
    let segments = DataProcessor::new().process_directory(&data_dir)?;
    if segments.is_empty() {
        println!("Nothing to ingest: expected .txt files under writing/ or transcripts/");
        return Ok(());
    }

    let embedder = get_default_embedder(&settings.embedding)?;
    let index_path = settings.retrieval.index_path();
    let index = MemoryIndex::open(&index_path)?;

    let pb = ProgressBar::new(segments.len() as u64);
    pb.set_style(ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} segments ({percent}%) {msg}")?.progress_chars("#>-"));
    let mut embedded: Vec<Segment> = Vec::with_capacity(segments.len());
    for batch in segments.chunks(EMBED_BATCH) {
        let texts: Vec<String> = batch.iter().map(|s| s.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;
        embedded.extend(batch.iter().cloned().zip(vectors).map(|(s, v)| s.with_embedding(v)));
        pb.inc(batch.len() as u64);
    }
    pb.finish_with_message("embedded");
    // One insert, so no document is split across replacement batches.
    index.insert(&embedded).await?;
    index.save()?;

    println!(
        "✅ Ingest complete ({} segments: {} subject, {} other) -> {}",
        index.len(),
        index.count_partition(Partition::Subject),
        index.count_partition(Partition::Other),
        index_path.display()
    );
    Ok(())
}

fn build_rag(settings: &Settings) -> anyhow::Result<LennyRag> {
    let index = Arc::new(MemoryIndex::open(&settings.retrieval.index_path())?);
    let cache = Arc::new(EmbeddingCache::new(get_default_embedder(&settings.embedding)?));
    let frameworks = settings.persona.frameworks.clone().unwrap_or_else(default_frameworks);
    let completion = Arc::new(ChatCompletionClient::from_settings(&settings.generation)?);
    Ok(LennyRag::new(StratifiedRetriever::new(index, cache), PersonaPolicy::new(frameworks), completion)
        .with_max_tokens(settings.generation.max_tokens))
}

/// Streams one answer to stdout. Returns `false` when it failed or was cut off.
async fn answer_once(rag: &LennyRag, evaluator: &PersonaEvaluator, question: &str, opts: &AskOptions) -> anyhow::Result<bool> {
    let mut stream = match rag.answer(question, opts.top_k, opts.temperature).await {
        Ok(stream) => stream,
        Err(e) => {
            debug!(error = %e, stage = ?e.stage(), "question failed");
            println!("{}", e.user_notice());
            return Ok(false);
        }
    };

    let mut stdout = io::stdout();
    let mut answer = String::new();
    let mut complete = false;
    while let Some(event) = stream.next().await {
        match event {
            AnswerEvent::Fragment(text) => {
                print!("{}", text);
                stdout.flush()?;
                answer.push_str(&text);
            }
            AnswerEvent::Done { citations } => {
                println!();
                print_citations(&citations);
                complete = true;
            }
            AnswerEvent::Interrupted { error, citations } => {
                debug!(error = %error, "answer interrupted");
                println!("\n\n⚠️  {}", error.user_notice());
                print_citations(&citations);
            }
        }
    }

    let score = evaluator.consistency(&answer);
    let grounding = evaluator.grounding(&answer, stream.context().evidence_texts());
    debug!(overall = score.overall, markers = score.markers, structure = score.structure, grounding, "persona score");
    Ok(complete)
}

fn print_citations(citations: &[Citation]) {
    if citations.is_empty() { return; }
    println!("\nSources:");
    for (i, c) in citations.iter().enumerate() {
        match &c.source_url {
            Some(url) => println!("  [{}] {} · {} ({})", i + 1, c.authority, c.source_id, url),
            None => println!("  [{}] {} · {}", i + 1, c.authority, c.source_id),
        }
    }
}

async fn chat(rag: &LennyRag, evaluator: &PersonaEvaluator, opts: &AskOptions) -> anyhow::Result<()> {
    println!("Ask Lenny anything. Empty line or Ctrl-D to quit.");
    let stdin = io::stdin();
    loop {
        print!("\n> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 { break; }
        let question = line.trim();
        if question.is_empty() || matches!(question, "exit" | "quit") { break; }
        answer_once(rag, evaluator, question, opts).await?;
    }
    Ok(())
}
