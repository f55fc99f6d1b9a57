//! maimai stats server
//!
//! Main application entry point that sets up the Rocket web server
//! with the database, the fetch pipeline and routes.

use rocket::fairing::AdHoc;
use rocket::{launch, Build, Rocket};
use std::sync::Arc;

use maimai_stats_rs::error::{bad_request, forbidden, internal_error, not_found, unauthorized};
use maimai_stats_rs::route::CORS;
use maimai_stats_rs::service::{
    AuthResolver, FetchStateTracker, JobOrchestrator, LiveSite, MySqlStore, RegionProfiles,
    Scraper, SnapshotService,
};
use maimai_stats_rs::{config, Database, DbPool};

use rocket_prometheus::PrometheusMetrics;

/// Wire the fetch pipeline and the snapshot reader onto one store
fn init_services(pool: DbPool) -> (JobOrchestrator, SnapshotService) {
    let config = config::CONFIG.clone();
    let store = Arc::new(MySqlStore::new(pool));
    let profiles = Arc::new(RegionProfiles::default());

    let tracker = FetchStateTracker::new(store.clone());
    let resolver = AuthResolver::new(store.clone(), profiles.clone(), config.clone());
    let scraper = Scraper::new(profiles, config.clone(), tracker.clone());
    let site = Arc::new(LiveSite::new(resolver, scraper));

    let orchestrator = JobOrchestrator::new(store.clone(), site, tracker, config);
    let snapshots = SnapshotService::new(store);
    (orchestrator, snapshots)
}

/// Configure the Rocket application
async fn configure_rocket() -> Rocket<Build> {
    let prometheus = PrometheusMetrics::new();

    rocket::build()
        .attach(CORS)
        .attach(AdHoc::on_ignite("Database", |rocket| async {
            match Database::connect().await {
                Ok(pool) => {
                    if let Err(e) = Database::check_health(&pool).await {
                        log::error!("Database health check failed: {e}");
                        std::process::exit(1);
                    }
                    log::info!("Database connection established");
                    rocket.manage(pool)
                }
                Err(e) => {
                    log::error!("Failed to connect to database: {e}");
                    std::process::exit(1);
                }
            }
        }))
        .attach(AdHoc::on_ignite("Services", |rocket| async {
            let Some(pool) = rocket.state::<DbPool>().cloned() else {
                log::error!("Database pool missing while initializing services");
                std::process::exit(1);
            };
            let (orchestrator, snapshots) = init_services(pool);

            log::info!("Services initialized");
            rocket.manage(orchestrator).manage(snapshots)
        }))
        // for prometheus telemetry
        .attach(prometheus.clone())
        .mount("/metrics", prometheus)
        .mount("/", maimai_stats_rs::route::get_all_routes())
        .register(
            "/",
            rocket::catchers![
                not_found,
                internal_error,
                bad_request,
                unauthorized,
                forbidden,
            ],
        )
}

/// Application entry point
#[launch]
async fn rocket() -> _ {
    // init log
    tracing_subscriber::fmt::init();

    log::info!("maimai stats server");
    log::info!("Version: {}", maimai_stats_rs::MAIMAI_STATS_VERSION);
    log::info!("Starting server...");

    // Load environment variables
    dotenv::dotenv().ok();

    configure_rocket().await
}
