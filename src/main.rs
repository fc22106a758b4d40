use anyhow::Context;
use dataworks::{api::registry::ToolRegistry, config::Config, logging, server};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = PathBuf::from("dataworks.toml");
    let mut i = 1;
    while i < args.len() {
        if args[i] == "--config" {
            i += 1;
            if i >= args.len() { eprintln!("--config requires a path"); std::process::exit(2); }
            config_path = PathBuf::from(&args[i]);
        }
        i += 1;
    }

    let cfg = Config::load(&config_path).with_context(|| format!("loading config {}", config_path.display()))?;
    cfg.validate().context("validating config")?;
    logging::init(&cfg.logging);

    let addr = format!("{}:{}", cfg.server.bind_addr, cfg.server.port);
    let registry = ToolRegistry::new(&cfg).context("building tool registry")?;

    info!(
        addr = %addr,
        base_path = %cfg.server.base_path,
        data_root = %cfg.root.root_dir,
        policy = ?cfg.root.policy,
        tools = ?registry.list_names(),
        "dataworks ready"
    );

    server::serve(cfg, registry).await
}
