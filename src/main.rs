use actix_cors::Cors;
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{
    cookie::Key,
    middleware::{DefaultHeaders, Logger},
    web, App, HttpResponse, HttpServer, Responder,
};
use chrono::Utc;
use clap::Parser;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tenantguard_blog::{
    config::Config,
    helper::scheduler_helpers::{self, RunMode},
    jobs::{queue::RedbJobQueue, tasks::TaskContext, worker::JobWorker},
    llm::openai::OpenAiClient,
    routes,
    setup::db_setup,
    AppState, DbPool,
};

async fn root_handler() -> impl Responder {
    HttpResponse::Ok().content_type("text/plain").body("OK")
}

#[derive(Parser, Debug)]
#[command(name = "blog_server", author, version, about = "Starts the TenantGuard blog backend.")]
struct Cli {
    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

fn startup_error(context: &str, e: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("FATAL: {}: {}", context, e))
}

/// Periodic scheduler pass on the actix runtime.
fn spawn_scheduler(pool: DbPool, state: web::Data<AppState>, interval: Duration) {
    actix_web::rt::spawn(async move {
        loop {
            actix_web::rt::time::sleep(interval).await;
            let result = pool.get().map_err(|e| e.to_string()).and_then(|mut conn| {
                scheduler_helpers::check_and_generate(
                    &mut conn,
                    state.job_queue.as_ref(),
                    &state.system_author,
                    RunMode::Scheduled,
                    Utc::now(),
                )
                .map_err(|e| e.to_string())
            });
            match result {
                Ok(outcome) => log::info!("Scheduled blog check: {:?}", outcome),
                Err(e) => log::error!("Scheduled blog check failed: {}", e),
            }
        }
    });
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file).map_err(|e| startup_error("Failed to load configuration", e))?;

    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    let blog_db_path = config.blog_db_path();
    let jobs_db_path = config.jobs_db_path();
    for path in [&blog_db_path, &jobs_db_path] {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
    }

    let manager = SqliteConnectionManager::file(&blog_db_path)
        .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;"));
    let pool = Pool::builder()
        .build(manager)
        .map_err(|e| startup_error("Failed to create SQLite connection pool", e))?;
    {
        let mut conn = pool.get().map_err(|e| startup_error("Failed to get a database connection", e))?;
        db_setup::setup_blog_db(&mut conn).map_err(|e| startup_error("Failed to prepare blog schema", e))?;
    }

    let lease_ttl = chrono::Duration::seconds(config.jobs.lease_ttl_secs);
    let job_queue = Arc::new(
        RedbJobQueue::open(&jobs_db_path, lease_ttl).map_err(|e| startup_error("Failed to open job queue", e))?,
    );
    let requeued = job_queue.requeue_stale().map_err(|e| startup_error("Failed to recover stale jobs", e))?;
    if requeued > 0 {
        log::warn!("Re-queued {} job(s) interrupted by the last shutdown", requeued);
    }

    let generator = OpenAiClient::new(config.openai_settings())
        .map_err(|e| startup_error("Failed to build text generation client", e))?;
    let task_ctx = TaskContext { pool: pool.clone(), generator: Arc::new(generator) };
    JobWorker::new(job_queue.clone(), task_ctx, Duration::from_millis(config.jobs.poll_interval_ms))
        .spawn(config.jobs.workers);

    let app_state = web::Data::new(AppState {
        scheduler_token: config.scheduler_token.clone(),
        job_queue,
        system_author: config.scheduler.system_author.clone(),
    });

    if config.scheduler.enabled {
        let interval = Duration::from_secs(config.scheduler.interval_hours.max(1) * 3600);
        log::info!("Blog scheduler runs every {} hour(s)", config.scheduler.interval_hours.max(1));
        spawn_scheduler(pool.clone(), app_state.clone(), interval);
    }

    let session_key_bytes =
        hex::decode(&config.session_secret_key).map_err(|e| startup_error("SESSION_SECRET_KEY is not valid hex", e))?;
    let session_key = Key::try_from(session_key_bytes.as_slice())
        .map_err(|e| startup_error("SESSION_SECRET_KEY is too short", e))?;

    let server_address = format!("{}:{}", config.web.host, config.web.port);
    log::info!("Server starting at http://{}", server_address);

    HttpServer::new(move || {
        let session_mw = SessionMiddleware::builder(CookieSessionStore::default(), session_key.clone())
            .cookie_secure(config.use_secure_cookies)
            .cookie_http_only(true)
            .cookie_same_site(actix_web::cookie::SameSite::Lax)
            .build();

        let cors = {
            let allowed_origins_str = &config.allowed_origins;
            let cors = if allowed_origins_str.trim() == "*" {
                Cors::default().allow_any_origin()
            } else {
                allowed_origins_str
                    .split(',')
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            };
            cors.allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
                .allowed_headers(vec![
                    actix_web::http::header::AUTHORIZATION,
                    actix_web::http::header::ACCEPT,
                    actix_web::http::header::CONTENT_TYPE,
                    actix_web::http::header::HeaderName::from_static("x-scheduler-token"),
                ])
                .supports_credentials()
                .max_age(3600)
        };

        App::new()
            .wrap(session_mw)
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("X-XSS-Protection", "1; mode=block")),
            )
            .app_data(web::Data::new(pool.clone()))
            .app_data(app_state.clone())
            .app_data(web::JsonConfig::default().limit(1024 * 1024))
            .route("/", web::get().to(root_handler))
            .service(
                web::scope("/api")
                    .configure(routes::auth::config_api)
                    .configure(routes::admin::config_api)
                    .service(
                        web::scope("/blog")
                            .configure(routes::blog::config_api)
                            .configure(routes::blog_ai::config_api)
                            .configure(routes::approval::config_api)
                            .configure(routes::blog_admin::config_api)
                            .configure(routes::public::config_api),
                    ),
            )
    })
    .bind(server_address)?
    .run()
    .await
}
