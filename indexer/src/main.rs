use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hybrid_core::chunker::chunk;
use hybrid_core::config::{BM25_B, BM25_K1, DEFAULT_ALPHA, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SENTENCES, DEFAULT_LIMIT, DEFAULT_RRF_K};
use hybrid_core::corpus::load_corpus;
use hybrid_core::encoder::encoder_from_name;
use hybrid_core::hybrid::{check_limit, min_max_normalize};
use hybrid_core::persist::{load_lexical, IndexPaths};
use hybrid_core::{CachePaths, Document, HybridSearch, InvertedIndex, SearchConfig, SearchContext, SemanticIndex, Tokenizer};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build hybrid BM25 + embedding indexes and query them", long_about = None)]
struct Cli {
    /// Cache directory holding the persisted indexes
    #[arg(long, global = true, default_value = "./cache")]
    cache: PathBuf,
    /// Corpus file or directory (.json / .jsonl)
    #[arg(long, global = true, default_value = "./data/movies.json")]
    corpus: PathBuf,
    /// Stopword list, one word per line; built-in English list when omitted
    #[arg(long, global = true)]
    stopwords: Option<PathBuf>,
    /// Encoder: `hashing`, `hashing:<dim>`, or a model name with the `fastembed` feature
    #[arg(long, global = true, default_value = "hashing")]
    encoder: String,
    /// Print results as JSON
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build both indexes from the corpus and persist them
    Build,
    /// BM25 keyword search
    Search {
        query: String,
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,
    },
    /// Term frequency of a single term in a document
    Tf { doc_id: u32, term: String },
    /// Ids of documents containing a term
    Docs { term: String },
    /// BM25 inverse document frequency of a term
    #[command(alias = "idf")]
    Bm25idf { term: String },
    /// BM25 saturated term frequency of a term in a document
    Bm25tf {
        doc_id: u32,
        term: String,
        #[arg(long, default_value_t = BM25_K1)]
        k1: f64,
        #[arg(long, default_value_t = BM25_B)]
        b: f64,
    },
    /// Full BM25 score of a term in a document
    Bm25 { doc_id: u32, term: String },
    /// Chunk-embedding search (builds the semantic cache if needed)
    Semantic {
        query: String,
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,
    },
    /// Show the sentence chunks produced for a text
    Chunk {
        text: String,
        #[arg(long, default_value_t = DEFAULT_CHUNK_SENTENCES)]
        max_sentences: usize,
        #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
        overlap: usize,
    },
    /// Encode a text and print its dimensions
    Embed { text: String },
    /// Min-max normalize a list of scores
    Normalize {
        #[arg(required = true, allow_negative_numbers = true)]
        scores: Vec<f64>,
    },
    /// Weighted hybrid search
    Weighted {
        query: String,
        #[arg(long, default_value_t = DEFAULT_ALPHA)]
        alpha: f64,
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,
    },
    /// Reciprocal rank fusion hybrid search
    Rrf {
        query: String,
        #[arg(long, default_value_t = DEFAULT_RRF_K)]
        k: u32,
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let ctx = context(&cli)?;
    let cache = CachePaths::new(&cli.cache);

    match &cli.command {
        Commands::Build => build(&ctx, &cache, &cli.corpus),
        Commands::Search { query, limit } => {
            check_limit(*limit)?;
            let index = lexical(&ctx, &cache)?;
            let hits = index.search_with(query, *limit, ctx.config().bm25_k1, ctx.config().bm25_b);
            if cli.json {
                return print_json(&hits);
            }
            println!("Searching for: {query}");
            if hits.is_empty() {
                println!("No results");
            }
            for (i, hit) in hits.iter().enumerate() {
                println!("{}. ({}) {} - score {:.4}", i + 1, hit.doc_id, hit.document.title, hit.score);
            }
            Ok(())
        }
        Commands::Tf { doc_id, term } => {
            println!("{}", lexical(&ctx, &cache)?.get_term_frequency(*doc_id, term)?);
            Ok(())
        }
        Commands::Docs { term } => {
            let ids = lexical(&ctx, &cache)?.get_document_ids(term);
            println!("{}", ids.iter().map(u32::to_string).collect::<Vec<_>>().join(" "));
            Ok(())
        }
        Commands::Bm25idf { term } => {
            println!("BM25 IDF score of '{term}': {:.2}", lexical(&ctx, &cache)?.bm25_idf(term)?);
            Ok(())
        }
        Commands::Bm25tf { doc_id, term, k1, b } => {
            let tf = lexical(&ctx, &cache)?.bm25_tf(*doc_id, term, *k1, *b)?;
            println!("BM25 TF score of '{term}' in document '{doc_id}': {tf:.2}");
            Ok(())
        }
        Commands::Bm25 { doc_id, term } => {
            let score = lexical(&ctx, &cache)?.bm25(*doc_id, term)?;
            println!("BM25 score of '{term}' in document '{doc_id}': {score:.2}");
            Ok(())
        }
        Commands::Semantic { query, limit } => {
            check_limit(*limit)?;
            let documents = documents(&cli.corpus)?;
            let index = SemanticIndex::load_or_build(&ctx, &IndexPaths::new(cache.semantic()), &documents)?;
            let hits = index.search_chunks(query, *limit)?;
            if cli.json {
                return print_json(&hits);
            }
            for (i, hit) in hits.iter().enumerate() {
                println!("{}. {} (score: {:.4})\n   {}...", i + 1, hit.title, hit.score, hit.excerpt);
            }
            Ok(())
        }
        Commands::Chunk { text, max_sentences, overlap } => {
            let chunks = chunk(text, *max_sentences, *overlap)?;
            println!("Chunking {} characters", text.chars().count());
            for (i, c) in chunks.iter().enumerate() {
                println!("{}. {c}", i + 1);
            }
            Ok(())
        }
        Commands::Embed { text } => {
            let vector = ctx.encoder().encode(text)?;
            println!("Text: {text}");
            println!("Encoder: {}", ctx.encoder().identifier());
            println!("First 5 dimensions: {:?}", &vector[..vector.len().min(5)]);
            println!("Dimensions: {}", vector.len());
            Ok(())
        }
        Commands::Normalize { scores } => {
            let normalized = min_max_normalize(scores);
            if cli.json {
                return print_json(&normalized);
            }
            for s in normalized {
                println!("* {s:.4}");
            }
            Ok(())
        }
        Commands::Weighted { query, alpha, limit } => {
            let search = hybrid(&ctx, &cache, &cli.corpus)?;
            let hits = search.weighted_search(query, *alpha, *limit)?;
            if cli.json {
                return print_json(&hits);
            }
            for (i, hit) in hits.iter().enumerate() {
                let s = &hit.scores;
                println!("{}. {}", i + 1, hit.document.title);
                println!("   Hybrid Score: {:.4}", s.hybrid);
                println!("   BM25: {:.4}, Semantic: {:.4}", s.bm25, s.semantic);
            }
            Ok(())
        }
        Commands::Rrf { query, k, limit } => {
            let search = hybrid(&ctx, &cache, &cli.corpus)?;
            let hits = search.rrf_search(query, *limit, *k)?;
            if cli.json {
                return print_json(&hits);
            }
            for (i, hit) in hits.iter().enumerate() {
                let s = &hit.scores;
                println!("{}. {}", i + 1, hit.document.title);
                println!("   RRF Score: {:.4}", s.score);
                println!("   BM25 Rank: {}, Semantic Rank: {}", s.bm25_rank, s.semantic_rank);
            }
            Ok(())
        }
    }
}

fn context(cli: &Cli) -> Result<SearchContext> {
    let tokenizer = match &cli.stopwords {
        Some(path) => Tokenizer::from_stopword_file(path)
            .with_context(|| format!("failed to read stopwords from {}", path.display()))?,
        None => Tokenizer::default(),
    };
    let config = SearchConfig::default();
    let encoder = encoder_from_name(&cli.encoder, &tokenizer, config.encode_batch_size)?;
    Ok(SearchContext::new(tokenizer, config, encoder))
}

fn documents(corpus: &Path) -> Result<Vec<Document>> {
    let corpus = load_corpus(corpus).with_context(|| format!("failed to load corpus {}", corpus.display()))?;
    for issue in &corpus.issues {
        eprintln!("skipped record {} of {}: {}", issue.position, issue.source, issue.reason);
    }
    Ok(corpus.documents)
}

fn lexical(ctx: &SearchContext, cache: &CachePaths) -> Result<InvertedIndex> {
    Ok(load_lexical(&IndexPaths::new(cache.lexical()), ctx.tokenizer().clone())?)
}

fn hybrid(ctx: &SearchContext, cache: &CachePaths, corpus: &Path) -> Result<HybridSearch> {
    let documents = documents(corpus)?;
    Ok(HybridSearch::load(ctx, cache, &documents)?)
}

fn build(ctx: &SearchContext, cache: &CachePaths, corpus: &Path) -> Result<()> {
    let documents = documents(corpus)?;
    let search = HybridSearch::build(ctx, &documents)?;
    search.save(cache)?;
    tracing::info!(
        cache = %cache.root.display(),
        num_docs = search.lexical().num_docs(),
        num_terms = search.lexical().num_terms(),
        chunks = search.semantic().num_chunks(),
        "index build complete"
    );
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
