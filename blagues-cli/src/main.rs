use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::fs;
use std::path::Path;

use blagues_core::dataset::{random_joke, random_joke_by_category};
use blagues_core::similarity::{best_match, SimilarityPolicy, SimilarityVerdict};
use blagues_core::{Category, Dataset, InMemoryDataset, Joke, JokeId, JokePayload};

/// Blagues: offline lookups against a joke dataset file
#[derive(Parser, Debug)]
#[command(name = "blagues")]
#[command(about = "Query a joke dataset and check suggestions for duplicates", long_about = None)]
struct Cli {
    /// Path to the JSON dataset
    #[arg(long, env = "DATASET_PATH", default_value = "blagues.json", global = true)]
    dataset: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a random joke
    Random(RandomArgs),
    /// Look a joke up by id or by its exact question
    Get(GetArgs),
    /// Print how many jokes the dataset holds
    Count,
    /// Score a would-be suggestion against the dataset
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
struct RandomArgs {
    /// Only pick from this category
    #[arg(long, conflicts_with = "disallow")]
    category: Option<String>,

    /// Categories to exclude, comma separated
    #[arg(long, value_delimiter = ',')]
    disallow: Vec<String>,
}

#[derive(Parser, Debug)]
struct GetArgs {
    /// A joke id, or the joke's question
    identifier: String,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    #[arg(long, default_value = "global")]
    category: String,

    #[arg(long)]
    question: String,

    #[arg(long)]
    answer: String,

    /// Scores above this are rejected as duplicates
    #[arg(long, default_value_t = 0.8)]
    duplicate_threshold: f64,

    /// Scores above this are accepted with a notice
    #[arg(long, default_value_t = 0.6)]
    similar_threshold: f64,
}

fn load_dataset(path: &Path) -> Result<InMemoryDataset> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset {}", path.display()))?;
    let items: Vec<Joke> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse dataset {}", path.display()))?;
    Ok(InMemoryDataset::new(items))
}

fn parse_category(key: &str) -> Result<Category> {
    key.parse::<Category>().map_err(|e| anyhow!("{}", e))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Verdict of `check`, with the matched item when there is one.
fn check_suggestion(
    items: &[Joke],
    payload: &JokePayload,
    policy: SimilarityPolicy,
) -> serde_json::Value {
    let texts: Vec<String> = items.iter().map(|j| j.payload().similarity_text()).collect();
    let found = best_match(&payload.similarity_text(), &texts);
    let (verdict, matched) = match policy.classify(found) {
        SimilarityVerdict::Duplicate { index, .. } => ("duplicate", items.get(index)),
        SimilarityVerdict::Similar { index, .. } => ("similar", items.get(index)),
        SimilarityVerdict::Distinct => ("distinct", None),
    };
    json!({
        "verdict": verdict,
        "score": found.score,
        "matched": matched,
    })
}

async fn run_random(dataset: &InMemoryDataset, args: RandomArgs) -> Result<()> {
    let items = dataset.all_items().await?;
    let joke = match args.category {
        Some(key) => random_joke_by_category(&items, parse_category(&key)?),
        None => {
            let disallow = args
                .disallow
                .iter()
                .filter(|key| !key.trim().is_empty())
                .map(|key| parse_category(key))
                .collect::<Result<Vec<_>>>()?;
            random_joke(&items, &disallow)
        }
    };
    let joke = joke.context("No joke matches these categories")?;
    print_json(joke)
}

async fn run_get(dataset: &InMemoryDataset, args: GetArgs) -> Result<()> {
    let identifier = args.identifier.trim();
    let found = match identifier.parse::<u32>() {
        Ok(id) => dataset.find_by_id(JokeId(id)).await?,
        Err(_) => dataset.find_by_question(identifier).await?,
    };
    let joke = found.with_context(|| format!("No joke matches '{}'", identifier))?;
    print_json(&joke)
}

async fn run_check(dataset: &InMemoryDataset, args: CheckArgs) -> Result<()> {
    let payload = JokePayload::parse(&args.category, &args.question, &args.answer)
        .map_err(|e| anyhow!("{}", e))?;
    let policy = SimilarityPolicy {
        duplicate_threshold: args.duplicate_threshold,
        similar_threshold: args.similar_threshold,
    };
    let items = dataset.all_items().await?;
    print_json(&check_suggestion(&items, &payload, policy))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let dataset = load_dataset(Path::new(&cli.dataset))?;

    match cli.command {
        Commands::Random(args) => run_random(&dataset, args).await,
        Commands::Get(args) => run_get(&dataset, args).await,
        Commands::Count => print_json(&json!({ "count": dataset.count().await? })),
        Commands::Check(args) => run_check(&dataset, args).await,
    }
}
