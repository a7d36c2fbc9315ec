use crate::configuration::{DatabaseBackend, Settings};
use crate::database::get_connection_pool;
use crate::order_client::{OrderLookup, OrderServiceClient, OrderSync};
use crate::providers::ProviderRegistry;
use crate::routes::main_route;
use crate::routes::payment::store::{InMemoryPaymentStore, PaymentStore, PgPaymentStore};
use crate::sweep::spawn_stale_payment_sweep;
use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    pub async fn build(configuration: Settings) -> Result<Self, anyhow::Error> {
        let store: Arc<dyn PaymentStore> = match configuration.database.backend {
            DatabaseBackend::Postgres => Arc::new(PgPaymentStore::new(get_connection_pool(
                &configuration.database,
            ))),
            DatabaseBackend::Memory => Arc::new(InMemoryPaymentStore::default()),
        };
        let registry = Arc::new(ProviderRegistry::from_settings(
            &configuration.providers,
            configuration.application.environment,
        ));
        let order_client = Arc::new(OrderServiceClient::new(configuration.order_service.clone()));

        let address = format!(
            "{}:{}",
            configuration.application.host, configuration.application.port
        );
        tracing::info!("Listening on {}", address);
        let listener = TcpListener::bind(&address)?;
        let port = listener.local_addr()?.port();
        let server = run(
            listener,
            store,
            registry,
            order_client.clone() as Arc<dyn OrderLookup>,
            order_client as Arc<dyn OrderSync>,
            configuration,
        )
        .await?;
        Ok(Self { port, server })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

/// Wires the server from its collaborators. Tests call this directly with
/// the in-memory store and mock order/provider implementations.
pub async fn run(
    listener: TcpListener,
    store: Arc<dyn PaymentStore>,
    registry: Arc<ProviderRegistry>,
    order_lookup: Arc<dyn OrderLookup>,
    order_sync: Arc<dyn OrderSync>,
    configuration: Settings,
) -> Result<Server, anyhow::Error> {
    if configuration.sweep.enabled {
        spawn_stale_payment_sweep(
            store.clone(),
            order_sync.clone(),
            configuration.sweep.clone(),
        );
    }

    let store = web::Data::from(store);
    let registry = web::Data::from(registry);
    let order_lookup = web::Data::from(order_lookup);
    let order_sync = web::Data::from(order_sync);
    let provider_settings = web::Data::new(configuration.providers.clone());
    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(store.clone())
            .app_data(registry.clone())
            .app_data(order_lookup.clone())
            .app_data(order_sync.clone())
            .app_data(provider_settings.clone())
            .configure(main_route)
    })
    .workers(4)
    .listen(listener)?
    .run();

    Ok(server)
}
