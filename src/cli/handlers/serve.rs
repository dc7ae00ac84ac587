use std::net::SocketAddr;
use std::sync::Arc;

use crate::cli::commands::ServeArgs;
use crate::io::clickup::{ClickUpClient, TaskSource};
use crate::io::store::Store;
use crate::model::config::AppConfig;
use crate::ops::signing::LinkSigner;
use crate::web::{self, AppState};

pub fn cmd_serve(config: AppConfig, args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", args.host, port)
        .parse()
        .map_err(|e| format!("invalid listen address '{}:{}': {}", args.host, port, e))?;

    let store = Store::open(&config.server.database_path)?;
    // The blocking client runs its own runtime: it has to be created and
    // finally dropped outside of tokio.
    let source: Arc<dyn TaskSource + Send + Sync> = Arc::new(ClickUpClient::new(&config.clickup.api_token)?);
    let state = AppState {
        signer: LinkSigner::new(&config.auth.client_link_secret)?,
        config: Arc::new(config),
        store,
        source: Arc::clone(&source),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let served = runtime.block_on(web::serve(state, addr));
    drop(runtime);
    drop(source);
    served?;
    Ok(())
}
