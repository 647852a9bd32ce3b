use anyhow::{bail, Context};
use housing_bookings::clients::{
    ApiClient, ApiNotificationSink, ApiPropertyDirectory, InMemoryNotificationSink,
    InMemoryPropertyDirectory, LahzaGateway, NotificationSink, PaymentGateway, PropertyDirectory,
    ScriptedGateway,
};
use housing_bookings::models::{PaymentStatus, PropertyInfo, Session};
use housing_bookings::{AppConfig, BookingError, BookingService, PaymentOutcome, PaymentPolicy};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const PAYMENT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const PAYMENT_POLL_LIMIT: usize = 60;

/// Collaborators the walkthrough runs against
struct Collaborators {
    directory: Arc<dyn PropertyDirectory>,
    gateway: Arc<dyn PaymentGateway>,
    sink: Arc<dyn NotificationSink>,
    /// Present when payments are simulated instead of sent to Lahza
    scripted: Option<Arc<ScriptedGateway>>,
}

impl Collaborators {
    /// Marketplace API plus the Lahza gateway
    fn live(config: &AppConfig, base_url: &str) -> anyhow::Result<Self> {
        let mut api = ApiClient::new(base_url, Duration::from_millis(config.api.timeout_ms))
            .context("Failed to create API client")?;
        match &config.api.token {
            Some(token) => api = api.with_token(token.clone()),
            None => warn!("No api.token configured, API requests are anonymous"),
        }
        if config.payments.secret_key.is_empty() {
            warn!("payments.secret_key is empty, Lahza will reject checkout requests");
        }

        Ok(Self {
            directory: Arc::new(ApiPropertyDirectory::new(api.clone())),
            gateway: Arc::new(
                LahzaGateway::new(&config.payments).context("Failed to create Lahza gateway")?,
            ),
            sink: Arc::new(ApiNotificationSink::new(api)),
            scripted: None,
        })
    }

    /// In-memory stand-ins seeded with one property
    fn demo() -> Self {
        let directory = Arc::new(InMemoryPropertyDirectory::new());
        directory.insert(PropertyInfo {
            id: "P123".to_string(),
            owner_id: "owner-1".to_string(),
            rate: 100,
        });
        let gateway = Arc::new(ScriptedGateway::new());

        Self {
            directory,
            gateway: gateway.clone(),
            sink: Arc::new(InMemoryNotificationSink::new()),
            scripted: Some(gateway),
        }
    }
}

/// Poll the gateway until the student finishes (or abandons) checkout
async fn wait_for_payment(service: &BookingService, reference: &str) -> anyhow::Result<PaymentOutcome> {
    for _ in 0..PAYMENT_POLL_LIMIT {
        match service.reconcile_payment(reference).await {
            Ok(outcome) if outcome.payment_status != PaymentStatus::Pending => return Ok(outcome),
            Ok(_) => info!("⏳ Waiting for payment {}", reference),
            Err(BookingError::VerificationFailed(reason)) => {
                warn!("Verification failed, retrying: {}", reason)
            }
            Err(err) => return Err(err).context("Failed to reconcile payment"),
        }
        tokio::time::sleep(PAYMENT_POLL_INTERVAL).await;
    }
    bail!("payment {reference} was not completed in time")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("HOUSING_ENV").unwrap_or_else(|_| "development".to_string());
    let config = AppConfig::load(&env).context("Failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    // Usage: housing-bookings [property-id] [check-in] [check-out]
    let args: Vec<String> = std::env::args().skip(1).collect();
    let property_id = args.first().map(String::as_str).unwrap_or("P123");
    let check_in = args.get(1).map(String::as_str).unwrap_or("2024-06-01").parse()?;
    let check_out = args.get(2).map(String::as_str).unwrap_or("2024-06-10").parse()?;

    info!("🏠 Housing Bookings - booking and payment walkthrough");
    info!("Pricing: {:?}, payment policy: {:?}", config.bookings.pricing, config.bookings.payment_policy);

    let collaborators = match &config.api.base_url {
        Some(base_url) => {
            info!("🌐 Using marketplace API at {}", base_url);
            Collaborators::live(&config, base_url)?
        }
        None => {
            info!("🧪 No api.base_url configured, using in-memory collaborators");
            Collaborators::demo()
        }
    };

    let service = BookingService::new(
        &config,
        collaborators.directory,
        collaborators.gateway,
        collaborators.sink,
    );
    let dispatcher = service.start_dispatcher();

    let student = Session::student("student-1");

    let booking = service
        .create_booking(&student, property_id, check_in, check_out)
        .await
        .context("Failed to create booking")?;
    info!("Created booking {} for {}", booking.id, booking.total_amount);
    let owner = Session::owner(booking.owner_id.clone());

    let booking = match config.bookings.payment_policy {
        PaymentPolicy::ApprovalFirst => service
            .approve(&owner, &booking.id)
            .await
            .context("Failed to approve booking")?,
        PaymentPolicy::PaymentFirst => booking,
    };

    let checkout = service
        .initiate_payment(&student, &booking.id)
        .await
        .context("Failed to initiate payment")?;
    info!("Redirect student to {}", checkout.checkout_url);

    let outcome = match &collaborators.scripted {
        Some(gateway) => {
            // The scripted gateway stands in for the student completing checkout
            gateway.set_status(&checkout.reference, PaymentStatus::Completed);
            service
                .reconcile_payment(&checkout.reference)
                .await
                .context("Failed to reconcile payment")?
        }
        None => wait_for_payment(&service, &checkout.reference).await?,
    };
    let replay = service.reconcile_payment(&checkout.reference).await?;
    info!("Reconciled twice, same outcome: {}", outcome == replay);

    service.flush_notifications().await;
    dispatcher.abort();

    let summary = json!({
        "booking": service.booking(&student, &booking.id).await?,
        "payment": outcome,
        "student_notifications": service.notifications(&student).await?,
        "owner_notifications": service.notifications(&owner).await?,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
