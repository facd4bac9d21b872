use std::process;

use clap::Parser;
use nubem_secrets_broker::config::{BrokerConfig, parse_bind, parse_concurrency};
use nubem_secrets_core::KeyEncoding;

/// Per-user secrets broker over Google Secret Manager.
#[derive(Parser)]
#[command(version)]
struct BrokerArgs {
    /// Override bind address (NUBEM_BIND_ADDRESS)
    #[arg(long)]
    bind: Option<String>,
    /// Storage backend: gcp or memory (SECRETS_BACKEND)
    #[arg(long)]
    backend: Option<String>,
    /// Physical key encoding: escaped or legacy (NUBEM_KEY_ENCODING)
    #[arg(long)]
    key_encoding: Option<KeyEncoding>,
    /// Cap on concurrent metadata lookups when listing; 0 disables the cap
    #[arg(long)]
    list_concurrency: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = real_main().await {
        eprintln!("broker exited with error: {err:#}");
        process::exit(1);
    }
}

async fn real_main() -> anyhow::Result<()> {
    nubem_secrets_broker::telemetry::init()?;
    let args = BrokerArgs::parse();
    let config = apply_overrides(BrokerConfig::from_env()?, args)?;
    nubem_secrets_broker::run(config).await
}

fn apply_overrides(mut config: BrokerConfig, args: BrokerArgs) -> anyhow::Result<BrokerConfig> {
    if let Some(bind) = args.bind {
        config.http_addr = parse_bind(&bind)?;
    }
    if let Some(backend) = args.backend {
        config.backend = backend.to_ascii_lowercase();
    }
    if let Some(encoding) = args.key_encoding {
        config.key_encoding = encoding;
    }
    if let Some(limit) = args.list_concurrency {
        config.list_concurrency = parse_concurrency(&limit)?;
    }
    Ok(config)
}
