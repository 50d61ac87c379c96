//! # keyward_api
//!
//! HTTP API library for Keyward.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use keyward_core::auth::AuthError;
use keyward_core::auth::jwt::TokenCodec;
use keyward_core::auth::password::PasswordPolicy;
use keyward_core::auth::password_reset::{PasswordLifecycleService, ResetLinkSettings};
use keyward_core::auth::session::SessionService;
use keyward_core::catalog::Catalog;
use keyward_core::groups::GroupService;
use keyward_core::notify::Notifier;
use keyward_core::store::Stores;
use keyward_core::tenant::TenantId;
use keyward_core::users::UserService;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::handlers::{auth, catalog, groups, password, users};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// API configuration.
    pub config: Arc<ApiConfig>,
    /// Fallback tenant for the public self-service routes.
    pub public_tenant: Option<TenantId>,
    pub tokens: Arc<TokenCodec>,
    pub catalog: Arc<Catalog>,
    pub sessions: Arc<SessionService>,
    pub lifecycle: Arc<PasswordLifecycleService>,
    pub users: Arc<UserService>,
    pub groups: Arc<GroupService>,
}

impl AppState {
    /// Wire the services over `stores` and `notifier`.
    pub fn new(
        config: ApiConfig,
        stores: Stores,
        notifier: Arc<dyn Notifier>,
        catalog: Catalog,
    ) -> Result<Self, AuthError> {
        let public_tenant = config
            .public_tenant
            .as_deref()
            .map(TenantId::parse)
            .transpose()?;
        let tokens = Arc::new(TokenCodec::new(config.tokens.clone())?);
        let passwords = Arc::new(PasswordPolicy::new(config.bcrypt_cost));
        let catalog = Arc::new(catalog);

        let sessions = Arc::new(SessionService::new(
            stores.clone(),
            tokens.clone(),
            passwords.clone(),
            config.lifetimes,
        ));
        let lifecycle = Arc::new(PasswordLifecycleService::new(
            stores.clone(),
            tokens.clone(),
            passwords.clone(),
            notifier,
            ResetLinkSettings {
                web_url: config.web_url.clone(),
                reset_path: config.reset_path.clone(),
            },
            config.lifetimes.password_action,
        ));
        let users = Arc::new(UserService::new(
            stores.clone(),
            catalog.clone(),
            passwords,
            lifecycle.clone(),
        ));
        let groups = Arc::new(GroupService::new(stores, catalog.clone()));

        Ok(Self {
            config: Arc::new(config),
            public_tenant,
            tokens,
            catalog,
            sessions,
            lifecycle,
            users,
            groups,
        })
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/auth/login", post(auth::login_handler))
        .route("/api/auth/refresh", post(auth::refresh_handler))
        .route("/api/auth/logout", post(auth::logout_handler))
        .route(
            "/api/users/public/clients",
            post(users::create_public_client_handler),
        )
        .route(
            "/api/users/password/reset-request",
            post(password::reset_request_handler),
        )
        .route("/api/users/password/reset", post(password::reset_handler))
        .route("/api/groups/public/admin", get(groups::admin_groups_handler))
        .route("/api/groups/public/code/{code}", get(groups::by_code_handler));

    // Protected routes (require auth, then a catalog feature for listed routes)
    let protected = Router::new()
        .route("/api/auth/check-url", get(auth::check_url_handler))
        .route("/api/catalog/features", get(catalog::features_handler))
        .route("/api/catalog/menus", get(catalog::menus_handler))
        .route(
            "/api/users",
            get(users::list_handler).post(users::create_handler),
        )
        .route("/api/users/search", get(users::search_handler))
        .route(
            "/api/users/my-permissions",
            get(users::my_permissions_handler),
        )
        .route(
            "/api/users/{id}",
            get(users::show_handler).delete(users::delete_handler),
        )
        .route("/api/users/{id}/basic", put(users::update_basic_handler))
        .route("/api/users/{id}/groups", put(users::update_groups_handler))
        .route(
            "/api/users/{id}/permissions",
            get(users::permissions_handler).put(users::update_permissions_handler),
        )
        .route(
            "/api/groups",
            get(groups::list_handler).post(groups::create_handler),
        )
        .route("/api/groups/search", get(groups::search_handler))
        .route(
            "/api/groups/{id}",
            get(groups::show_handler)
                .put(groups::update_handler)
                .delete(groups::delete_handler),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::permission::require_permission,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::tenant::tenant_context,
        ))
        .layer(cors)
        .with_state(state)
}
