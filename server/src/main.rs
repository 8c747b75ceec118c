use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use hybrid_core::encoder::encoder_from_name;
use hybrid_core::{CachePaths, SearchConfig, SearchContext, Tokenizer};
use server::build_app;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Cache directory holding the persisted indexes
    #[arg(long, default_value = "./cache")]
    cache: PathBuf,
    /// Corpus file or directory, used to attach documents and to rebuild
    #[arg(long, default_value = "./data/movies.json")]
    corpus: PathBuf,
    /// Stopword list, one word per line
    #[arg(long)]
    stopwords: Option<PathBuf>,
    /// Encoder name (`hashing`, `hashing:<dim>`, or a fastembed model)
    #[arg(long, default_value = "hashing")]
    encoder: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let tokenizer = match &args.stopwords {
        Some(path) => Tokenizer::from_stopword_file(path)
            .with_context(|| format!("failed to read stopwords from {}", path.display()))?,
        None => Tokenizer::default(),
    };
    let config = SearchConfig::default();
    let encoder = encoder_from_name(&args.encoder, &tokenizer, config.encode_batch_size)?;
    let ctx = SearchContext::new(tokenizer, config, encoder);

    let app: Router = build_app(ctx, CachePaths::new(&args.cache), args.corpus.clone())?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
