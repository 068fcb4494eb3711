use super::config::{ServerConfig, DEFAULT_WORKERS};
use super::handlers;
use super::ServerError;
use crate::devices::registry::DeviceRegistry;
use crate::extension_control::defaults::EXTENSIONS_PATH;
use crate::extension_control::ExtensionControl;
use crate::staging::ArtifactStager;
use crate::tasks::PackageTaskDriver;
use crate::upload::ExtensionUploader;
use actix_web::{web, App, HttpServer};
use tracing::info;

/// Serves the extension operations until the process is stopped. Binding the
/// listener fails fast so the caller can report a usable error.
pub async fn run_extension_server<G, S, U, D>(
    control: ExtensionControl<G, S, U, D>,
    config: ServerConfig,
) -> Result<(), ServerError>
where
    G: DeviceRegistry + 'static,
    S: ArtifactStager + 'static,
    U: ExtensionUploader + 'static,
    D: PackageTaskDriver + 'static,
{
    info!(
        "starting the extension server at http://{}:{}",
        config.host, config.port
    );

    let control = web::Data::new(control);
    let server = HttpServer::new(move || {
        App::new().app_data(control.clone()).service(
            web::resource(EXTENSIONS_PATH)
                .route(web::get().to(handlers::query::<G, S, U, D>))
                .route(web::post().to(handlers::install::<G, S, U, D>))
                .route(web::put().to(handlers::update::<G, S, U, D>))
                .route(web::delete().to(handlers::uninstall::<G, S, U, D>)),
        )
    })
    .bind((config.host.to_string(), config.port.clone().into()))
    .map_err(|source| ServerError::Bind {
        address: format!("{}:{}", config.host, config.port),
        source,
    })?;

    Ok(server.workers(DEFAULT_WORKERS).run().await?)
}
