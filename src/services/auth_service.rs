use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::dto::auth::{Claims, LoginRequest, LoginResponse, RegisterRequest};
use crate::{
    entity::{
        Users,
        users::{ActiveModel as UserActive, Column as UserCol, Model as UserModel},
    },
    error::{AppError, AppResult, FieldError},
    models::User,
    response::{ApiResponse, Meta},
    services::cart_service,
    state::AppState,
};

pub const TOKEN_TTL_HOURS: i64 = 24;

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
    guest_token: Option<&str>,
) -> AppResult<ApiResponse<LoginResponse>> {
    let payload = RegisterRequest {
        name: payload.name.trim().to_string(),
        email: payload.email.trim().to_lowercase(),
        password: payload.password,
    };
    validate_registration(&payload)?;

    let exist = Users::find()
        .filter(UserCol::Email.eq(payload.email.as_str()))
        .one(&state.orm)
        .await?;
    if exist.is_some() {
        return Err(AppError::Validation(vec![FieldError::new(
            "email",
            "Email is already taken",
        )]));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(payload.password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();

    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name),
        email: Set(payload.email),
        password_hash: Set(password_hash),
        role: Set("user".to_string()),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    tracing::info!(user_id = %user.id, "user registered");
    let resp = signed_in(state, user, guest_token).await?;
    Ok(ApiResponse::success("User created", resp, Some(Meta::empty())))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
    guest_token: Option<&str>,
) -> AppResult<ApiResponse<LoginResponse>> {
    let LoginRequest { email, password } = payload;
    let user = Users::find()
        .filter(UserCol::Email.eq(email.trim().to_lowercase()))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid email or password".into()))?;

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;

    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(AppError::BadRequest("Invalid email or password".into()));
    }

    let resp = signed_in(state, user, guest_token).await?;
    Ok(ApiResponse::success("Logged in", resp, Some(Meta::empty())))
}

/// Issue a token and pull any guest cart into the account.
async fn signed_in(
    state: &AppState,
    user: UserModel,
    guest_token: Option<&str>,
) -> AppResult<LoginResponse> {
    let token = issue_token(&state.config.jwt_secret, user.id, &user.role)?;

    let merged_cart_items = match guest_token {
        Some(guest) => merge_outcome(
            user.id,
            cart_service::merge_guest_cart(state, guest, user.id).await,
        ),
        None => Some(0),
    };

    Ok(LoginResponse {
        token: format!("Bearer {token}"),
        user: user_from_entity(user),
        merged_cart_items,
    })
}

/// A failed merge never fails the sign-in; it is reported as `None`.
fn merge_outcome(user_id: Uuid, result: AppResult<u64>) -> Option<u64> {
    match result {
        Ok(moved) => Some(moved),
        Err(err) => {
            tracing::warn!(%user_id, error = %err, "guest cart merge failed");
            None
        }
    }
}

pub fn issue_token(secret: &str, user_id: Uuid, role: &str) -> AppResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(TOKEN_TTL_HOURS))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub fn validate_registration(payload: &RegisterRequest) -> AppResult<()> {
    let mut errors = Vec::new();

    let name_len = payload.name.chars().count();
    if name_len == 0 || name_len > 100 {
        errors.push(FieldError::new("name", "Name must be 1-100 characters"));
    }
    if !looks_like_email(&payload.email) {
        errors.push(FieldError::new("email", "Please enter a valid email address"));
    }
    let password_len = payload.password.chars().count();
    if !(8..=128).contains(&password_len) {
        errors.push(FieldError::new(
            "password",
            "Password must be 8-128 characters",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
}

pub(crate) fn user_from_entity(m: UserModel) -> User {
    User {
        id: m.id,
        name: m.name,
        email: m.email,
        role: m.role,
        created_at: m.created_at.with_timezone(&Utc),
    }
}
