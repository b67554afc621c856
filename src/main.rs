mod bookings;
mod capacity;
mod config;
mod db;
mod models;
mod pricing;
mod reservation_items;
mod validation;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use bookings::{BookingService, BookingStore, InMemoryBookingStore, PgBookingStore};
use capacity::{
    AvailabilityAllocator, CapacityStore, InMemoryCapacityLedger, PgCapacityLedger,
};
use config::AppConfig;
use pricing::{InMemoryRuleStore, PgRuleStore, PricingEngine, PricingRuleStore};
use reservation_items::{
    InMemoryReservationItemStore, PgReservationItemStore, ReservationItemStore,
};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        capacity::handlers::check_availability_handler,
        capacity::handlers::create_resource_handler,
        pricing::handlers::calculate_price_handler,
        pricing::handlers::create_rule_handler,
        bookings::handlers::create_booking_handler,
        bookings::handlers::get_booking_handler,
        bookings::handlers::confirm_booking_handler,
        bookings::handlers::cancel_booking_handler,
        reservation_items::handlers::create_item_handler,
        reservation_items::handlers::cancel_item_handler,
        reservation_items::handlers::list_items_handler,
    ),
    components(
        schemas(
            models::ServiceType,
            models::ResourceType,
            models::CustomerSegment,
            capacity::models::Resource,
            capacity::models::CapacityRecord,
            capacity::models::AvailabilityCheckRequest,
            capacity::models::ResourceAvailability,
            capacity::models::AvailabilityReport,
            capacity::models::CreateResourceRequest,
            pricing::DiscountType,
            pricing::RuleCondition,
            pricing::PricingRule,
            pricing::AppliedRule,
            pricing::CalculatePriceRequest,
            pricing::PriceQuoteResponse,
            pricing::CreateRuleRequest,
            bookings::Booking,
            bookings::BookingStatus,
            bookings::PaymentStatus,
            bookings::CreateBookingRequest,
            bookings::ConfirmBookingRequest,
            bookings::CancelBookingRequest,
            reservation_items::ReservationItem,
            reservation_items::ReservationItemType,
            reservation_items::CreateReservationItemRequest,
            reservation_items::BookingItemsResponse,
        )
    ),
    tags(
        (name = "availability", description = "Resource registry and availability checks"),
        (name = "pricing", description = "Pricing rules and quote calculation"),
        (name = "bookings", description = "Booking lifecycle management"),
        (name = "reservation-items", description = "Line items attached to bookings"),
    ),
    info(
        title = "Tour Booking API",
        version = "1.0.0",
        description = "Booking and reservation engine: availability, pricing rules, and booking lifecycle",
    )
)]
struct ApiDoc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub capacity_store: Arc<dyn CapacityStore>,
    pub allocator: AvailabilityAllocator,
    pub rule_store: Arc<dyn PricingRuleStore>,
    pub pricing: PricingEngine,
    pub booking_store: Arc<dyn BookingStore>,
    pub item_store: Arc<dyn ReservationItemStore>,
    pub booking_service: BookingService,
}

impl AppState {
    /// Wire the full engine over arbitrary store implementations
    pub fn new(
        config: AppConfig,
        capacity_store: Arc<dyn CapacityStore>,
        rule_store: Arc<dyn PricingRuleStore>,
        booking_store: Arc<dyn BookingStore>,
        item_store: Arc<dyn ReservationItemStore>,
    ) -> Self {
        let allocator = AvailabilityAllocator::new(capacity_store.clone());
        let pricing = PricingEngine::new(rule_store.clone());
        let booking_service = BookingService::new(
            booking_store.clone(),
            item_store.clone(),
            allocator.clone(),
            pricing.clone(),
            config.hold_duration,
        );
        Self {
            config,
            capacity_store,
            allocator,
            rule_store,
            pricing,
            booking_store,
            item_store,
            booking_service,
        }
    }

    /// State over the in-memory stores, used by tests and DB-less dev mode
    pub fn in_memory(config: AppConfig) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryCapacityLedger::new()),
            Arc::new(InMemoryRuleStore::new()),
            Arc::new(InMemoryBookingStore::new()),
            Arc::new(InMemoryReservationItemStore::new()),
        )
    }

    /// State over the Postgres stores
    pub fn postgres(config: AppConfig, pool: db::DbPool) -> Self {
        Self::new(
            config,
            Arc::new(PgCapacityLedger::new(pool.clone())),
            Arc::new(PgRuleStore::new(pool.clone())),
            Arc::new(PgBookingStore::new(pool.clone())),
            Arc::new(PgReservationItemStore::new(pool)),
        )
    }
}

/// Creates and configures the application router
/// Maps all API endpoints to their handlers and adds CORS middleware
pub fn create_router(state: AppState) -> Router {
    use tower_http::cors::{Any, CorsLayer};

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Availability and resources
        .route(
            "/api/availability/check",
            post(capacity::handlers::check_availability_handler),
        )
        .route(
            "/api/resources",
            post(capacity::handlers::create_resource_handler),
        )
        // Pricing
        .route(
            "/api/pricing/calculate",
            post(pricing::handlers::calculate_price_handler),
        )
        .route(
            "/api/pricing/rules",
            post(pricing::handlers::create_rule_handler),
        )
        // Bookings
        .route("/api/bookings", post(bookings::handlers::create_booking_handler))
        .route("/api/bookings/:id", get(bookings::handlers::get_booking_handler))
        .route(
            "/api/bookings/:id/confirm",
            post(bookings::handlers::confirm_booking_handler),
        )
        .route(
            "/api/bookings/:id/cancel",
            post(bookings::handlers::cancel_booking_handler),
        )
        // Reservation items
        .route(
            "/api/reservation-items",
            post(reservation_items::handlers::create_item_handler),
        )
        .route(
            "/api/reservation-items/:id/cancel",
            post(reservation_items::handlers::cancel_item_handler),
        )
        .route(
            "/api/bookings/:id/items",
            get(reservation_items::handlers::list_items_handler),
        )
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tour_api=debug,info".into()),
        )
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Tour Booking API - Starting...");

    let config = AppConfig::from_env();

    let state = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = db::create_pool(database_url)
                .await
                .expect("Failed to create database pool");

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Migrations completed successfully");

            AppState::postgres(config.clone(), pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, running on in-memory stores");
            AppState::in_memory(config.clone())
        }
    };

    // Background sweep that expires lapsed Pending bookings
    bookings::expiry::spawn_expiry_sweep(state.booking_service.clone(), config.sweep_interval);

    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Tour Booking API is running on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
