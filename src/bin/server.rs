use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, info};
use warp::{self, Filter};

use signal_hub::config::ServerConfig;
use signal_hub::core::registry::ClientMeta;
use signal_hub::core::server::{ServerManager, SharedServerManager};
use signal_hub::handlers::http;
use signal_hub::handlers::websocket::handle_ws_client;

#[tokio::main]
async fn main() {
    // .env is optional; a missing file is not an error
    let dotenv_result = dotenvy::dotenv();

    // Initialize logging
    env_logger::init();

    match dotenv_result {
        Ok(path) => info!("environment loaded from {}", path.display()),
        Err(e) => debug!("no .env file loaded: {}", e),
    }

    // Load config from the environment
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("configuration: host={}, port={}", config.host, config.port);

    let manager: SharedServerManager = Arc::new(ServerManager::new(&config));
    manager.start_heartbeat();

    // WebSocket endpoint at /
    let ws_route = warp::path::end()
        .and(warp::ws())
        .and(warp::header::optional::<String>("user-agent"))
        .and(warp::addr::remote())
        .and(with_manager(manager.clone()))
        .map(
            |ws: warp::ws::Ws,
             user_agent: Option<String>,
             remote_addr: Option<SocketAddr>,
             manager: SharedServerManager| {
                let meta = ClientMeta {
                    user_agent,
                    remote_addr,
                };
                ws.on_upgrade(move |socket| handle_ws_client(socket, meta, manager))
            },
        );

    // Read-only network listing
    let networks_route = warp::path!("api" / "network")
        .and(warp::get())
        .and(with_manager(manager.clone()))
        .and_then(http::list_networks);

    let network_route = warp::path!("api" / "network" / String)
        .and(warp::get())
        .and(with_manager(manager.clone()))
        .and_then(http::get_network);

    let routes = ws_route
        .or(networks_route)
        .or(network_route)
        .recover(http::recover_not_found);

    // Build the server address
    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    info!("starting signal hub on {}", addr);

    let shutdown_manager = manager.clone();
    let (_, server) = warp::serve(routes).bind_with_graceful_shutdown(addr, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for shutdown signal: {}", e);
        }
        info!("shutdown signal received");
        shutdown_manager.close();
    });
    server.await;
}

// Helper filter handing the shared server state to each request
fn with_manager(
    manager: SharedServerManager,
) -> impl Filter<Extract = (SharedServerManager,), Error = Infallible> + Clone {
    warp::any().map(move || manager.clone())
}
