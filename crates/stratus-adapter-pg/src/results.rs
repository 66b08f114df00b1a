use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::PgRow;
use stratus_audit::{AuditItem, AuditResult, ResultState, ResultsStore};
use stratus_core::CloudAccountId;
use stratus_runtime::StoreError;

use crate::{PgStore, db_error, decode_error};

fn row_to_result(row: &PgRow) -> Result<AuditResult, StoreError> {
    let state: String = row.try_get("state").map_err(db_error)?;
    let data: serde_json::Value = row.try_get("data").map_err(db_error)?;
    let data: Vec<AuditItem> =
        serde_json::from_value(data).map_err(|e| decode_error("audit result data", e))?;

    Ok(AuditResult {
        id: Some(row.try_get("id").map_err(db_error)?),
        cloud_account_id: row.try_get("cloud_account_id").map_err(db_error)?,
        rule_id: row.try_get("rule_id").map_err(db_error)?,
        evaluated_at: row.try_get("evaluated_at").map_err(db_error)?,
        state: state
            .parse::<ResultState>()
            .map_err(|e| decode_error("audit result state", e))?,
        data,
    })
}

fn encode_data(result: &AuditResult) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(&result.data)
        .map_err(|e| StoreError::Database(format!("failed to encode audit result data: {e}")))
}

#[async_trait]
impl ResultsStore for PgStore {
    async fn create_pending(&self, result: &AuditResult) -> Result<AuditResult, StoreError> {
        let row = sqlx::query(
            r#"
            insert into audit_results (cloud_account_id, rule_id, evaluated_at, state, data)
            values ($1, $2, $3, $4, $5)
            returning id, cloud_account_id, rule_id, evaluated_at, state, data
            "#,
        )
        .bind(result.cloud_account_id)
        .bind(&result.rule_id)
        .bind(result.evaluated_at)
        .bind(result.state.to_string())
        .bind(encode_data(result)?)
        .fetch_one(self.pool())
        .await
        .map_err(db_error)?;
        row_to_result(&row)
    }

    async fn update_result(&self, result: &AuditResult) -> Result<(), StoreError> {
        let id = result
            .id
            .ok_or_else(|| StoreError::NotFound("audit result without id".to_string()))?;
        let done = sqlx::query("update audit_results set state = $2, data = $3 where id = $1")
            .bind(id)
            .bind(result.state.to_string())
            .bind(encode_data(result)?)
            .execute(self.pool())
            .await
            .map_err(db_error)?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("audit result {id}")));
        }
        Ok(())
    }

    async fn get_last_run(
        &self,
        account_id: CloudAccountId,
        rule_id: &str,
    ) -> Result<Option<AuditResult>, StoreError> {
        let row = sqlx::query(
            r#"
            select id, cloud_account_id, rule_id, evaluated_at, state, data
            from audit_results
            where cloud_account_id = $1 and rule_id = $2
            order by evaluated_at desc, id desc
            limit 1
            "#,
        )
        .bind(account_id)
        .bind(rule_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_error)?;
        row.as_ref().map(row_to_result).transpose()
    }
}
