//! Use-case envelope: the producer side of the pattern. A business write and
//! its outbox row are inserted inside one transaction, so a crash or error
//! between the two is impossible by construction.

use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use tracing::{error, info};

use crate::error::{BusinessRejected, RelayError, RelayResult};
use crate::model::event_type;
use crate::store::OutboxStore;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedUser {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Create a user, or reject the request, atomically with appending its
/// `user_created` outbox row. Returns `Ok(Err(BusinessRejected))`, not
/// `Err`, when the email is already taken: that is an expected business
/// outcome, not a system failure.
pub async fn create_user(
    pool: &PgPool,
    store: &dyn OutboxStore,
    environment: &str,
    request: CreateUserRequest,
) -> RelayResult<Result<CreatedUser, BusinessRejected>> {
    info!(email = %request.email, "creating a new user");

    let mut tx = pool.begin().await?;

    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
        .bind(&request.email)
        .fetch_optional(&mut *tx)
        .await?;

    if existing.is_some() {
        tx.rollback().await?;
        error!(email = %request.email, "unable to create a new user");
        return Ok(Err(BusinessRejected(
            "user with this email already exists".to_string(),
        )));
    }

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO users (email, first_name, last_name) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(&request.email)
    .bind(&request.first_name)
    .bind(&request.last_name)
    .fetch_one(&mut *tx)
    .await?;

    let context = json!({
        "email": request.email,
        "first_name": request.first_name,
        "last_name": request.last_name,
    });

    if let Err(e) = store
        .append(&mut tx, event_type::USER_CREATED, environment, &context, 1)
        .await
    {
        error!(email = %request.email, error = %e, "failed to log user creation event");
        return Err(e);
    }

    tx.commit().await.map_err(RelayError::Database)?;

    info!(id, email = %request.email, "user has been created");
    Ok(Ok(CreatedUser {
        id,
        email: request.email,
        first_name: request.first_name,
        last_name: request.last_name,
    }))
}
