use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::PgRow;
use stratus_core::{CloudAccountId, GroupId, ResourceGroup, ResourceId};
use stratus_runtime::{GroupStore, StoreError};

use crate::{PgStore, db_error};

fn row_to_group(row: &PgRow) -> Result<ResourceGroup, StoreError> {
    Ok(ResourceGroup {
        id: row.try_get("id").map_err(db_error)?,
        cloud_account_id: row.try_get("cloud_account_id").map_err(db_error)?,
        name: row.try_get("name").map_err(db_error)?,
        created_at: row.try_get("created_at").map_err(db_error)?,
    })
}

impl PgStore {
    async fn group_exists(&self, id: GroupId) -> Result<bool, StoreError> {
        let (exists,): (bool,) =
            sqlx::query_as("select exists(select 1 from resource_groups where id = $1)")
                .bind(id)
                .fetch_one(self.pool())
                .await
                .map_err(db_error)?;
        Ok(exists)
    }
}

#[async_trait]
impl GroupStore for PgStore {
    async fn create_group(
        &self,
        account_id: CloudAccountId,
        name: &str,
    ) -> Result<ResourceGroup, StoreError> {
        let row = sqlx::query(
            r#"
            insert into resource_groups (cloud_account_id, name)
            values ($1, $2)
            returning id, cloud_account_id, name, created_at
            "#,
        )
        .bind(account_id)
        .bind(name)
        .fetch_one(self.pool())
        .await
        .map_err(db_error)?;
        row_to_group(&row)
    }

    async fn get_group(&self, id: GroupId) -> Result<Option<ResourceGroup>, StoreError> {
        let row = sqlx::query(
            "select id, cloud_account_id, name, created_at from resource_groups where id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_error)?;
        row.as_ref().map(row_to_group).transpose()
    }

    async fn list_groups(
        &self,
        account_id: CloudAccountId,
    ) -> Result<Vec<ResourceGroup>, StoreError> {
        let rows = sqlx::query(
            r#"
            select id, cloud_account_id, name, created_at
            from resource_groups
            where cloud_account_id = $1
            order by id
            "#,
        )
        .bind(account_id)
        .fetch_all(self.pool())
        .await
        .map_err(db_error)?;
        rows.iter().map(row_to_group).collect()
    }

    async fn delete_group(&self, id: GroupId) -> Result<(), StoreError> {
        let done = sqlx::query("delete from resource_groups where id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(db_error)?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("group {id}")));
        }
        Ok(())
    }

    async fn add_member(
        &self,
        group_id: GroupId,
        resource_id: ResourceId,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            insert into resource_group_members (group_id, resource_id)
            values ($1, $2)
            on conflict do nothing
            "#,
        )
        .bind(group_id)
        .bind(resource_id)
        .execute(self.pool())
        .await
        .map_err(|e| {
            let missing = matches!(&e, sqlx::Error::Database(db) if db.is_foreign_key_violation());
            if missing {
                StoreError::NotFound(format!("group {group_id} or resource {resource_id}"))
            } else {
                db_error(e)
            }
        })?;
        Ok(())
    }

    async fn remove_member(
        &self,
        group_id: GroupId,
        resource_id: ResourceId,
    ) -> Result<(), StoreError> {
        if !self.group_exists(group_id).await? {
            return Err(StoreError::NotFound(format!("group {group_id}")));
        }
        sqlx::query("delete from resource_group_members where group_id = $1 and resource_id = $2")
            .bind(group_id)
            .bind(resource_id)
            .execute(self.pool())
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn member_ids(&self, group_id: GroupId) -> Result<Vec<ResourceId>, StoreError> {
        if !self.group_exists(group_id).await? {
            return Err(StoreError::NotFound(format!("group {group_id}")));
        }
        let rows: Vec<(ResourceId,)> = sqlx::query_as(
            "select resource_id from resource_group_members where group_id = $1 order by position",
        )
        .bind(group_id)
        .fetch_all(self.pool())
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
