//! Read-only access to the material catalog.
//!
//! Categories and variants are owned by the catalog system; the ledger only
//! needs to confirm that the keys it is handed exist.

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use std::collections::BTreeSet;

use crate::entities::material_variant;
use crate::errors::ServiceError;

pub async fn require_variant<C: ConnectionTrait>(
    conn: &C,
    variant_id: i64,
) -> Result<material_variant::Model, ServiceError> {
    material_variant::Entity::find_by_id(variant_id)
        .filter(material_variant::Column::IsDeleted.eq(false))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Material variant {} not found", variant_id)))
}

/// Loads every variant in `variant_ids`, failing on the first missing one.
pub async fn require_variants<C: ConnectionTrait>(
    conn: &C,
    variant_ids: impl IntoIterator<Item = i64>,
) -> Result<Vec<material_variant::Model>, ServiceError> {
    let wanted: BTreeSet<i64> = variant_ids.into_iter().collect();
    if wanted.is_empty() {
        return Ok(Vec::new());
    }

    let found = material_variant::Entity::find()
        .filter(material_variant::Column::Id.is_in(wanted.iter().copied()))
        .filter(material_variant::Column::IsDeleted.eq(false))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if let Some(missing) = wanted
        .iter()
        .find(|id| !found.iter().any(|variant| variant.id == **id))
    {
        return Err(ServiceError::NotFound(format!(
            "Material variant {} not found",
            missing
        )));
    }

    Ok(found)
}
