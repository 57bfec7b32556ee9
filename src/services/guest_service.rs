use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::{
    db::OrmConn,
    entity::{
        Guests,
        guests::{ActiveModel as GuestActive, Column as GuestCol, Model as GuestModel},
    },
    error::AppResult,
    middleware::guest::GUEST_TTL_DAYS,
    state::AppState,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGuest {
    pub token: String,
    pub created: bool,
}

/// Reuse a live guest session or mint a new one.
///
/// An expired session is deleted (its cart goes with it through the FK cascade)
/// before a replacement is issued.
pub async fn resolve_guest(state: &AppState, presented: Option<&str>) -> AppResult<ResolvedGuest> {
    if let Some(token) = presented {
        if let Some(guest) = Guests::find_by_id(token.to_string()).one(&state.orm).await? {
            if is_live(&guest, Utc::now()) {
                return Ok(ResolvedGuest {
                    token: guest.session_token,
                    created: false,
                });
            }
            delete_guest(&state.orm, &guest.session_token).await?;
            tracing::debug!("expired guest session removed");
        }
    }

    purge_expired(&state.orm).await;
    let token = create_guest(&state.orm).await?;
    Ok(ResolvedGuest {
        token,
        created: true,
    })
}

/// The presented token, if it names an unexpired session.
pub async fn find_live(state: &AppState, token: &str) -> AppResult<Option<String>> {
    let guest = Guests::find_by_id(token.to_string()).one(&state.orm).await?;
    Ok(guest
        .filter(|guest| is_live(guest, Utc::now()))
        .map(|guest| guest.session_token))
}

pub fn is_live(guest: &GuestModel, now: DateTime<Utc>) -> bool {
    guest.expires_at.with_timezone(&Utc) > now
}

pub async fn create_guest(conn: &OrmConn) -> AppResult<String> {
    let now = Utc::now();
    let token = Uuid::new_v4().to_string();
    GuestActive {
        session_token: Set(token.clone()),
        expires_at: Set((now + Duration::days(GUEST_TTL_DAYS)).into()),
        created_at: Set(now.into()),
    }
    .insert(conn)
    .await?;
    tracing::debug!("guest session created");
    Ok(token)
}

pub async fn delete_guest(conn: &OrmConn, token: &str) -> AppResult<()> {
    Guests::delete_by_id(token.to_string()).exec(conn).await?;
    Ok(())
}

/// Best-effort cleanup of every expired guest row.
async fn purge_expired(conn: &OrmConn) {
    let result = Guests::delete_many()
        .filter(GuestCol::ExpiresAt.lt(Utc::now()))
        .exec(conn)
        .await;
    match result {
        Ok(res) if res.rows_affected > 0 => {
            tracing::debug!(removed = res.rows_affected, "expired guest sessions purged")
        }
        Ok(_) => {}
        Err(err) => tracing::warn!(error = %err, "guest purge failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guest(expires_at: DateTime<Utc>) -> GuestModel {
        GuestModel {
            session_token: "tok".into(),
            expires_at: expires_at.into(),
            created_at: (expires_at - Duration::days(GUEST_TTL_DAYS)).into(),
        }
    }

    #[test]
    fn session_is_live_until_expiry() {
        let now = Utc::now();
        assert!(is_live(&guest(now + Duration::minutes(1)), now));
        assert!(!is_live(&guest(now), now));
        assert!(!is_live(&guest(now - Duration::days(1)), now));
    }
}
