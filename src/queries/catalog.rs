use sea_orm::{ConnectionTrait, EntityTrait, FromQueryResult, QuerySelect};
use serde::Serialize;

use crate::entity::sites;
use crate::error::AppResult;

/// A sensor location as shown in the site selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromQueryResult)]
pub struct Site {
    pub id: i32,
    pub name: String,
}

/// Distinct `(name, id)` pairs from the site table.
///
/// No ordering is applied; callers may only rely on the first element being
/// the default selection.
pub async fn list_sites<C: ConnectionTrait>(conn: &C) -> AppResult<Vec<Site>> {
    let sites = sites::Entity::find()
        .select_only()
        .column(sites::Column::Name)
        .column(sites::Column::Id)
        .distinct()
        .into_model::<Site>()
        .all(conn)
        .await?;

    tracing::debug!(count = sites.len(), "Loaded site catalog");
    Ok(sites)
}
