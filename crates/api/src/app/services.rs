use std::sync::Arc;

use chrono::Utc;

use natours_auth::{Hs256Jwt, JwtValidator, NewUser, Role, TokenIssuer, User};
use natours_core::{DocumentId, Resource};
use natours_infra::{
    DocumentRepository, DocumentStore, InMemoryDocumentStore, Mailer, Repository, StoreError,
};
use natours_query::FilterClause;
use natours_reviews::Review;
use natours_tours::Tour;

use crate::app::errors::ApiError;
use crate::config::{AdminBootstrap, AppConfig};

/// Everything a handler needs, shared behind one `Arc`.
#[derive(Clone)]
pub struct AppServices {
    pub config: AppConfig,
    pub tours: Arc<dyn Repository<Tour>>,
    pub users: Arc<dyn Repository<User>>,
    pub reviews: Arc<dyn Repository<Review>>,
    pub tokens: Arc<dyn TokenIssuer>,
    pub jwt: Arc<dyn JwtValidator>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppServices {
    /// Wire repositories over `store` and a JWT signer from `config`.
    pub fn with_store(
        config: AppConfig,
        store: Arc<dyn DocumentStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let jwt = Arc::new(Hs256Jwt::new(config.jwt_secret.as_bytes(), config.jwt_ttl));
        Self {
            tours: Arc::new(DocumentRepository::<Tour>::new(Arc::clone(&store))),
            users: Arc::new(DocumentRepository::<User>::new(Arc::clone(&store))),
            reviews: Arc::new(DocumentRepository::<Review>::new(store)),
            tokens: jwt.clone(),
            jwt,
            mailer,
            config,
        }
    }

    pub fn in_memory(config: AppConfig, mailer: Arc<dyn Mailer>) -> Self {
        Self::with_store(config, Arc::new(InMemoryDocumentStore::new()), mailer)
    }
}

/// Pick the store from configuration: Postgres when a database URL is set
/// and the `postgres` feature is compiled in, memory otherwise.
pub async fn build_services(
    config: AppConfig,
    mailer: Arc<dyn Mailer>,
) -> Result<AppServices, StoreError> {
    if let Some(url) = config.database_url.clone() {
        #[cfg(feature = "postgres")]
        {
            // `connect` applies the schema.
            let store = natours_infra::PostgresDocumentStore::connect(&url).await?;
            tracing::info!("using postgres document store");
            return Ok(AppServices::with_store(config, Arc::new(store), mailer));
        }
        #[cfg(not(feature = "postgres"))]
        {
            let _ = url;
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but postgres feature not enabled, falling back to in-memory"
            );
        }
    }

    tracing::info!("using in-memory document store");
    Ok(AppServices::in_memory(config, mailer))
}

/// Create the configured administrator unless a user with that email
/// already exists.
pub async fn bootstrap_admin(
    services: &AppServices,
    admin: &AdminBootstrap,
) -> Result<Option<DocumentId>, ApiError> {
    let email = natours_auth::user::normalize_email(&admin.email);
    let existing = services
        .users
        .find_one(vec![FilterClause::eq("email", email.as_str())])
        .await?;
    if existing.is_some() {
        return Ok(None);
    }

    let draft = NewUser {
        name: Some("Administrator".to_string()),
        email: Some(email),
        role: Some(Role::ADMIN),
        password: Some(admin.password.clone()),
        confirm_password: Some(admin.password.clone()),
        ..NewUser::default()
    };
    let user = User::create(draft, DocumentId::new(), Utc::now())?;
    services.users.create(&user).await?;
    tracing::info!(user_id = %user.id, "bootstrapped administrator");
    Ok(Some(user.id))
}
