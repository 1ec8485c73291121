use anyhow::{bail, Context};
use clap::Parser;
use graphql_cypher::config::CompilerConfig;
use graphql_cypher::graph_catalog::GraphSchemaConfig;
use graphql_cypher::service::{GraphRequest, GraphService, StatementOutput};
use std::sync::Arc;

/// graphql-cypher - compile GraphQL selections into Cypher statements
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Schema definition (YAML)
    #[arg(long)]
    schema: String,

    /// Request with resolved root fields (JSON)
    #[arg(long)]
    request: String,

    /// Bearer token; overrides the token inside the request
    #[arg(long)]
    token: Option<String>,

    /// Compiler configuration (YAML); `GRAPHQL_CYPHER_*` variables otherwise
    #[arg(long)]
    config: Option<String>,
}

fn main() -> anyhow::Result<()> {
    // Defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CompilerConfig::from_yaml_file(path),
        None => CompilerConfig::from_env(),
    }
    .context("Configuration error")?;

    let schema = GraphSchemaConfig::from_yaml_file(&cli.schema)
        .and_then(|config| config.to_graph_schema())
        .with_context(|| format!("Failed to load schema from {}", cli.schema))?;
    log::info!("Loaded schema with {} node types", schema.node_types().count());

    let content = std::fs::read_to_string(&cli.request)
        .with_context(|| format!("Failed to read request {}", cli.request))?;
    let mut request: GraphRequest = serde_json::from_str(&content).context("Invalid request JSON")?;
    if cli.token.is_some() {
        request.token = cli.token.clone();
    }

    let service = GraphService::new(Arc::new(schema), config);
    let claims = service.authenticate(request.token.as_deref())?;

    let mut failed = false;
    for field in &request.fields {
        let key = field.selection.response_key();
        match service.translate(field, claims.as_ref()) {
            Ok(compiled) => {
                let output = StatementOutput::from(&compiled);
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            Err(e) => {
                log::error!("{} [{}]: {}", key, e.code(), e);
                failed = true;
            }
        }
    }
    if failed {
        bail!("One or more fields failed to compile");
    }
    Ok(())
}
