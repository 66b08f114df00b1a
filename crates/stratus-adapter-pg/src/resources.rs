use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;
use stratus_core::{CloudAccountId, CloudAccountRef, Resource, ResourceFilter, ResourceId, ResourceType};
use stratus_runtime::{ResourceStore, StoreError};

use crate::{PgStore, db_error, decode_error};

const COLUMNS: &str = "id, uid, name, resource_type, status, cloud_account_id, provider, region, \
                       settings, created_at, updated_at";

fn row_to_resource(row: &PgRow) -> Result<Resource, StoreError> {
    let resource_type: String = row.try_get("resource_type").map_err(db_error)?;
    let resource_type: ResourceType = resource_type
        .parse()
        .map_err(|e| decode_error("resource_type", e))?;
    let settings: Option<serde_json::Value> = row.try_get("settings").map_err(db_error)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(db_error)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(db_error)?;

    Ok(Resource {
        id: Some(row.try_get("id").map_err(db_error)?),
        uid: row.try_get("uid").map_err(db_error)?,
        name: row.try_get("name").map_err(db_error)?,
        resource_type,
        status: row.try_get("status").map_err(db_error)?,
        cloud_account: CloudAccountRef::new(
            row.try_get("cloud_account_id").map_err(db_error)?,
            row.try_get::<String, _>("provider").map_err(db_error)?,
        ),
        region: row.try_get("region").map_err(db_error)?,
        settings: settings.unwrap_or(serde_json::Value::Null),
        created_at: Some(created_at),
        updated_at: Some(updated_at),
    })
}

#[async_trait]
impl ResourceStore for PgStore {
    async fn insert_resource(&self, resource: &Resource) -> Result<Resource, StoreError> {
        let settings = (!resource.settings.is_null()).then(|| resource.settings.clone());
        let row = sqlx::query(&format!(
            r#"
            insert into resources
                (uid, name, resource_type, status, cloud_account_id, provider, region, settings)
            values ($1, $2, $3, $4, $5, $6, $7, $8)
            returning {COLUMNS}
            "#
        ))
        .bind(&resource.uid)
        .bind(&resource.name)
        .bind(resource.resource_type.as_str())
        .bind(&resource.status)
        .bind(resource.cloud_account.id)
        .bind(&resource.cloud_account.provider)
        .bind(&resource.region)
        .bind(settings)
        .fetch_one(self.pool())
        .await
        .map_err(db_error)?;

        row_to_resource(&row)
    }

    async fn get_resources(
        &self,
        account_id: CloudAccountId,
        filter: &ResourceFilter,
    ) -> Result<Vec<Resource>, StoreError> {
        let types: Vec<String> = filter.types.iter().map(|t| t.as_str().to_string()).collect();
        // Byte-wise collation keeps the order identical to Rust string ordering
        let rows = sqlx::query(&format!(
            r#"
            select {COLUMNS}
            from resources
            where cloud_account_id = $1
              and (cardinality($2::text[]) = 0 or resource_type = any($2))
            order by uid collate "C"
            "#
        ))
        .bind(account_id)
        .bind(types)
        .fetch_all(self.pool())
        .await
        .map_err(db_error)?;

        rows.iter().map(row_to_resource).collect()
    }

    async fn update_status(&self, id: ResourceId, status: &str) -> Result<(), StoreError> {
        let done = sqlx::query("update resources set status = $2, updated_at = now() where id = $1")
            .bind(id)
            .bind(status)
            .execute(self.pool())
            .await
            .map_err(db_error)?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("resource {id}")));
        }
        Ok(())
    }

    async fn remove_resource(&self, id: ResourceId) -> Result<(), StoreError> {
        // Memberships go with the row (on delete cascade)
        let done = sqlx::query("delete from resources where id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(db_error)?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("resource {id}")));
        }
        Ok(())
    }

    async fn get_resource_by_id(&self, id: ResourceId) -> Result<Option<Resource>, StoreError> {
        let row = sqlx::query(&format!("select {COLUMNS} from resources where id = $1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(db_error)?;
        row.as_ref().map(row_to_resource).transpose()
    }
}
