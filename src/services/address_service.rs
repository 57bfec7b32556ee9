use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use sea_orm::sea_query::Expr;
use uuid::Uuid;

use crate::{
    dto::addresses::CreateAddressRequest,
    entity::{
        Addresses,
        addresses::{ActiveModel as AddressActive, Column as AddressCol, Model as AddressModel},
    },
    error::{AppError, AppResult, FieldError},
    middleware::auth::AuthUser,
    models::Address,
    response::ApiResponse,
    state::AppState,
};

pub async fn list_addresses(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<Vec<Address>>> {
    let items = Addresses::find()
        .filter(AddressCol::UserId.eq(user.user_id))
        .order_by_desc(AddressCol::IsDefault)
        .order_by_asc(AddressCol::Id)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(address_from_entity)
        .collect();
    Ok(ApiResponse::success("OK", items, None))
}

/// A new default address demotes the previous default of the same type.
pub async fn create_address(
    state: &AppState,
    user: &AuthUser,
    payload: CreateAddressRequest,
) -> AppResult<ApiResponse<Address>> {
    validate(&payload)?;
    let address_type = payload.address_type.as_str();

    let txn = state.orm.begin().await?;
    if payload.is_default {
        Addresses::update_many()
            .col_expr(AddressCol::IsDefault, Expr::value(false))
            .filter(AddressCol::UserId.eq(user.user_id))
            .filter(AddressCol::AddressType.eq(address_type))
            .exec(&txn)
            .await?;
    }

    let address = AddressActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        address_type: Set(address_type.to_string()),
        line1: Set(payload.line1.trim().to_string()),
        line2: Set(payload
            .line2
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())),
        city: Set(payload.city.trim().to_string()),
        state: Set(payload.state.trim().to_string()),
        country: Set(payload.country.trim().to_string()),
        postal_code: Set(payload.postal_code.trim().to_string()),
        is_default: Set(payload.is_default),
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    Ok(ApiResponse::success(
        "Address created",
        address_from_entity(address),
        None,
    ))
}

fn validate(payload: &CreateAddressRequest) -> AppResult<()> {
    let errors: Vec<FieldError> = [
        ("line1", &payload.line1),
        ("city", &payload.city),
        ("state", &payload.state),
        ("country", &payload.country),
        ("postal_code", &payload.postal_code),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(field, _)| FieldError::new(field, "must not be empty"))
    .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

fn address_from_entity(m: AddressModel) -> Address {
    Address {
        id: m.id,
        user_id: m.user_id,
        address_type: m.address_type,
        line1: m.line1,
        line2: m.line2,
        city: m.city,
        state: m.state,
        country: m.country,
        postal_code: m.postal_code,
        is_default: m.is_default,
    }
}
