use std::sync::Arc;
use tokensmith::api;
use tokensmith::logger::*;
use tokensmith::server::*;
use tokensmith::settings::*;
use tokio::signal;
use warp::Filter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let project_settings = parse_settings(cli.settings.as_deref())?;
    let logger = Logger::new_bootstrap(project_settings.log.format);
    info!(?project_settings);
    let logger_config = LogConfig {
        filter: project_settings.log.filter.clone(),
    };
    logger.reload_from_config(&logger_config)?;

    let address: std::net::SocketAddr = project_settings.http.address.parse()?;
    let tls = tls_paths(&project_settings.http)?;

    let server = Arc::new(IssuerServer::try_new(&project_settings).await?);

    let routes = api::routes(server.clone())
        .recover(api::recover_error)
        .with(warp::trace::request());

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("could not register SIGINT: {}", e);
        }
    };
    match tls {
        Some((cert_path, key_path)) => {
            info!(%address, "serving over TLS");
            warp::serve(routes)
                .tls()
                .cert_path(cert_path)
                .key_path(key_path)
                .bind_with_graceful_shutdown(address, shutdown)
                .1
                .await
        }
        None => {
            warn!(%address, "serving plain HTTP; refresh cookies are marked Secure");
            warp::serve(routes)
                .try_bind_with_graceful_shutdown(address, shutdown)?
                .1
                .await
        }
    }

    let shutdown_timeout = std::time::Duration::from_secs(30);
    match tokio::time::timeout(shutdown_timeout, server.shutdown()).await {
        Ok(_) => info!("server shutdown successfully"),
        Err(_) => error!("server shutdown timed out"),
    }

    Ok(())
}
