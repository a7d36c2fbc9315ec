use abai_springs_payments::{
    configuration::get_configuration,
    startup::Application,
    telemetry::{get_json_subscriber, init_subscriber},
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = get_json_subscriber(
        "abai-springs-payments".into(),
        "info".into(),
        std::io::stdout,
    );
    init_subscriber(subscriber);

    let configuration = get_configuration().expect("Failed to read configuration.");
    let application = Application::build(configuration).await?;
    tracing::info!("Listening on port {}", application.port());
    application.run_until_stopped().await?;
    Ok(())
}
