use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use http::HeaderValue;
use tokio::{signal, sync::mpsc};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};
use tracing::{error, info, warn};

use storefront_api as api;
use storefront_api::notifications::{
    templates::MailIdentity, DisabledMailer, HttpMailer, NotificationGateway,
};
use storefront_api::services::{
    orders::{OrderService, OrderSettings},
    payments::{PaymentProvider, RazorpayClient},
};

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = Arc::new(api::events::EventSender::new(event_tx));
    tokio::spawn(api::events::process_events(event_rx));

    // Outbound integrations
    if cfg.razorpay_key_id.is_none() {
        warn!("Razorpay credentials not configured; online payments will fail");
    }
    let provider: Arc<dyn PaymentProvider> = Arc::new(
        RazorpayClient::new(
            cfg.razorpay_api_base.clone(),
            cfg.razorpay_key_id.clone(),
            cfg.razorpay_key_secret.clone(),
            cfg.payment_timeout(),
        )
        .context("failed to build payment provider client")?,
    );

    let notifier: Arc<dyn NotificationGateway> = match &cfg.email_api_url {
        Some(url) => {
            info!("Transactional email enabled");
            Arc::new(
                HttpMailer::new(
                    url.clone(),
                    cfg.email_api_key.clone(),
                    MailIdentity {
                        store_name: cfg.store_name.clone(),
                        from_address: cfg.email_from.clone(),
                        frontend_url: cfg.frontend_url.clone(),
                    },
                    cfg.email_timeout(),
                )
                .context("failed to build mail client")?,
            )
        }
        None => {
            warn!("Mail API URL not configured; notification emails are disabled");
            Arc::new(DisabledMailer)
        }
    };

    let orders = OrderService::new(
        db_arc.clone(),
        provider,
        notifier,
        OrderSettings {
            payment_secret: cfg.payment_secret(),
            currency: cfg.payment_currency.clone(),
            provider_timeout: cfg.payment_timeout(),
            notification_timeout: cfg.email_timeout(),
        },
    )
    .with_events(event_sender);

    let auth_service = Arc::new(api::auth::AuthService::new(api::auth::AuthConfig::from(
        &cfg,
    )));

    // Compose shared app state
    let app_state = api::AppState {
        db: db_arc,
        config: cfg.clone(),
        auth: auth_service,
        orders: Arc::new(orders),
    };

    // Build CORS layer from config
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    let cors_layer = if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.should_allow_permissive_cors() {
        info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        CorsLayer::permissive()
    } else {
        error!("Missing CORS configuration detected; set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true");
        anyhow::bail!("Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true");
    };

    let app = api::app_router(app_state)
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(
            REQUEST_TIMEOUT_SECS,
        )))
        .layer(CompressionLayer::new())
        .layer(cors_layer);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;
    info!("storefront-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("storefront-api stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
