//! Postgres-backed campaign store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `Storage` |
//! | Database (check constraint violation) | `23514` | `Storage` |
//! | Database (other) | Any other | `Storage` |
//! | PoolClosed / RowNotFound / other | N/A | `Storage` |
//!
//! ## Locking
//!
//! Counter writes and lifecycle changes run in one transaction that starts with
//! `SELECT … FROM campaigns … FOR UPDATE`, so concurrent writers for the same
//! campaign are serialized on the campaign row.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use tracing::{Span, instrument};
use uuid::Uuid;

use outreach_campaigns::{
    Campaign, CampaignCounters, CampaignDefinition, CampaignProgress, Contact, DispatchResult,
    JobConfig, PostalAddress, ResultUpdate, SampleRequest, apply_update,
};
use outreach_core::{CampaignId, ContactId, SampleRequestId};

use super::{
    AppliedUpdate, CampaignStore, CampaignTransition, Lifecycle, ResultPage, ResultQuery,
    StoreError,
};

const SCHEMA: &str = include_str!("../../migrations/0001_outreach.sql");

const CAMPAIGN_COLUMNS: &str = "id, name, description, created_by, job_name, contact_ids, \
     settings, status, total, processed, successful, failed, created_at, started_at, ended_at";

const RESULT_COLUMNS: &str = "id, campaign_id, contact_id, status, error_message, \
     external_response, response_data, execution_id, sample_requested, sample_request_id, \
     created_at, processed_at, delivered_at";

/// Postgres-backed store.
#[derive(Debug, Clone)]
pub struct PostgresCampaignStore {
    pool: Arc<PgPool>,
}

impl PostgresCampaignStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect to `database_url` with a default pool.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn apply_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;
        Ok(())
    }

    async fn lock_campaign(
        conn: &mut PgConnection,
        id: CampaignId,
    ) -> Result<Campaign, StoreError> {
        let row: Option<CampaignRow> = sqlx::query_as(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("lock_campaign", e))?;

        row.ok_or(StoreError::CampaignNotFound(id))?.try_into()
    }

    /// Insert the pending row if absent, then lock and return it.
    async fn upsert_pending(
        conn: &mut PgConnection,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<(DispatchResult, bool), StoreError> {
        let fresh = DispatchResult::pending(campaign_id, contact_id, Utc::now());
        let inserted = sqlx::query(
            r#"
            INSERT INTO dispatch_results (id, campaign_id, contact_id, status, created_at)
            VALUES ($1, $2, $3, 'pending', $4)
            ON CONFLICT (campaign_id, contact_id) DO NOTHING
            "#,
        )
        .bind(fresh.id.as_uuid())
        .bind(campaign_id.as_uuid())
        .bind(contact_id.as_uuid())
        .bind(fresh.created_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("upsert_pending", e))?
        .rows_affected()
            == 1;

        let row: ResultRow = sqlx::query_as(&format!(
            "SELECT {RESULT_COLUMNS} FROM dispatch_results \
             WHERE campaign_id = $1 AND contact_id = $2 FOR UPDATE"
        ))
        .bind(campaign_id.as_uuid())
        .bind(contact_id.as_uuid())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("upsert_pending", e))?;

        Ok((row.try_into()?, inserted))
    }

    async fn fetch_contact(
        conn: &mut PgConnection,
        id: ContactId,
    ) -> Result<Option<Contact>, StoreError> {
        let row: Option<ContactRow> = sqlx::query_as(
            r#"
            SELECT id, first_name, last_name, email_address, phone_number, company_name,
                   job_title, address, is_active
            FROM contacts
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_contact", e))?;

        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl CampaignStore for PostgresCampaignStore {
    #[instrument(skip(self, contact), fields(contact_id = %contact.id), err)]
    async fn save_contact(&self, contact: Contact) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO contacts (id, first_name, last_name, email_address, phone_number,
                                  company_name, job_title, address, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                email_address = EXCLUDED.email_address,
                phone_number = EXCLUDED.phone_number,
                company_name = EXCLUDED.company_name,
                job_title = EXCLUDED.job_title,
                address = EXCLUDED.address,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(contact.id.as_uuid())
        .bind(&contact.first_name)
        .bind(&contact.last_name)
        .bind(&contact.email_address)
        .bind(&contact.phone_number)
        .bind(&contact.company_name)
        .bind(&contact.job_title)
        .bind(Json(&contact.address))
        .bind(contact.is_active)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_contact", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(contact_id = %id), err)]
    async fn contact(&self, id: ContactId) -> Result<Option<Contact>, StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("contact", e))?;
        Self::fetch_contact(&mut conn, id).await
    }

    #[instrument(skip(self, ids), fields(requested = ids.len()), err)]
    async fn missing_contacts(&self, ids: &[ContactId]) -> Result<Vec<ContactId>, StoreError> {
        let wanted: Vec<Uuid> = ids.iter().map(|id| Uuid::from(*id)).collect();
        let found: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM contacts WHERE id = ANY($1)")
            .bind(&wanted)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("missing_contacts", e))?;

        let found: HashSet<Uuid> = found.into_iter().collect();
        Ok(ids
            .iter()
            .filter(|id| !found.contains(id.as_uuid()))
            .copied()
            .collect())
    }

    #[instrument(skip(self, job), fields(job = %job.name), err)]
    async fn save_job(&self, job: JobConfig) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO campaign_jobs (name, description, webhook_url, scenario_id, headers, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name) DO UPDATE SET
                description = EXCLUDED.description,
                webhook_url = EXCLUDED.webhook_url,
                scenario_id = EXCLUDED.scenario_id,
                headers = EXCLUDED.headers,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(&job.name)
        .bind(&job.description)
        .bind(&job.webhook_url)
        .bind(&job.scenario_id)
        .bind(Json(&job.headers))
        .bind(job.is_active)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_job", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn job(&self, name: &str) -> Result<Option<JobConfig>, StoreError> {
        let row: Option<JobRow> = sqlx::query_as(
            r#"
            SELECT name, description, webhook_url, scenario_id, headers, is_active
            FROM campaign_jobs
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("job", e))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, campaign), fields(campaign_id = %campaign.id()), err)]
    async fn insert_campaign(&self, campaign: &Campaign) -> Result<(), StoreError> {
        let def = campaign.definition();
        let counters = campaign.counters();
        let contact_ids: Vec<Uuid> = def.contact_ids.iter().map(|id| Uuid::from(*id)).collect();

        sqlx::query(&format!(
            "INSERT INTO campaigns ({CAMPAIGN_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        ))
        .bind(campaign.id().as_uuid())
        .bind(&def.name)
        .bind(&def.description)
        .bind(&def.created_by)
        .bind(&def.job_name)
        .bind(&contact_ids)
        .bind(Json(&def.settings))
        .bind(campaign.status().as_str())
        .bind(to_i32(counters.total)?)
        .bind(to_i32(counters.processed)?)
        .bind(to_i32(counters.successful)?)
        .bind(to_i32(counters.failed)?)
        .bind(campaign.created_at())
        .bind(campaign.started_at())
        .bind(campaign.ended_at())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_campaign", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(campaign_id = %id), err)]
    async fn campaign(&self, id: CampaignId) -> Result<Option<Campaign>, StoreError> {
        let row: Option<CampaignRow> =
            sqlx::query_as(&format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("campaign", e))?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self), fields(campaign_id = %id), err)]
    async fn transition_campaign(
        &self,
        id: CampaignId,
        change: Lifecycle,
    ) -> Result<CampaignTransition, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("transition_campaign", e))?;

        let before = Self::lock_campaign(&mut tx, id).await?;
        let mut after = before.clone();
        change.apply(&mut after)?;

        sqlx::query(
            "UPDATE campaigns SET status = $2, started_at = $3, ended_at = $4 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(after.status().as_str())
        .bind(after.started_at())
        .bind(after.ended_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("transition_campaign", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("transition_campaign", e))?;

        Ok(CampaignTransition { before, after })
    }

    #[instrument(skip(self), fields(campaign_id = %campaign_id, contact_id = %contact_id), err)]
    async fn ensure_result(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<(DispatchResult, bool), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("ensure_result", e))?;

        // Same lock order as `apply_result_update`: campaign row, then result row.
        Self::lock_campaign(&mut tx, campaign_id).await?;
        let out = Self::upsert_pending(&mut tx, campaign_id, contact_id).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("ensure_result", e))?;
        Ok(out)
    }

    #[instrument(
        skip(self, update),
        fields(
            campaign_id = %campaign_id,
            contact_id = %contact_id,
            incoming = %update.status,
            outcome = tracing::field::Empty
        ),
        err
    )]
    async fn apply_result_update(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
        update: ResultUpdate,
    ) -> Result<AppliedUpdate, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("apply_result_update", e))?;

        let mut campaign = Self::lock_campaign(&mut tx, campaign_id).await?;
        let (mut result, created) = Self::upsert_pending(&mut tx, campaign_id, contact_id).await?;
        let before = (!created).then(|| result.clone());

        let contact = if update.sample.is_some() {
            Self::fetch_contact(&mut tx, contact_id).await?
        } else {
            None
        };

        let effect = apply_update(&mut campaign, &mut result, update, contact.as_ref(), Utc::now());
        Span::current().record("outcome", tracing::field::debug(&effect.outcome));

        if effect.touched_result() {
            sqlx::query(
                r#"
                UPDATE dispatch_results SET
                    status = $2,
                    error_message = $3,
                    external_response = $4,
                    response_data = $5,
                    execution_id = $6,
                    sample_requested = $7,
                    sample_request_id = $8,
                    processed_at = $9,
                    delivered_at = $10
                WHERE id = $1
                "#,
            )
            .bind(result.id.as_uuid())
            .bind(result.status().as_str())
            .bind(&result.error_message)
            .bind(result.external_response.as_ref().map(Json))
            .bind(result.response_data.as_ref().map(Json))
            .bind(&result.execution_id)
            .bind(result.sample_requested)
            .bind(result.sample_request_id.map(Uuid::from))
            .bind(result.processed_at)
            .bind(result.delivered_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("apply_result_update", e))?;

            if let Some(sample) = &effect.sample_request {
                insert_sample(&mut tx, sample).await?;
            }

            if !effect.delta.is_zero() {
                let counters = campaign.counters();
                sqlx::query(
                    "UPDATE campaigns SET processed = $2, successful = $3, failed = $4 WHERE id = $1",
                )
                .bind(campaign_id.as_uuid())
                .bind(to_i32(counters.processed)?)
                .bind(to_i32(counters.successful)?)
                .bind(to_i32(counters.failed)?)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("apply_result_update", e))?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("apply_result_update", e))?;

        Ok(AppliedUpdate {
            before,
            result,
            effect,
            campaign,
        })
    }

    #[instrument(skip(self, query), fields(campaign_id = %campaign_id), err)]
    async fn list_results(
        &self,
        campaign_id: CampaignId,
        query: &ResultQuery,
    ) -> Result<ResultPage, StoreError> {
        let status = query.status.map(|s| s.as_str());

        let (exists, total): (bool, i64) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM campaigns WHERE id = $1), \
             (SELECT COUNT(*) FROM dispatch_results \
              WHERE campaign_id = $1 AND ($2::text IS NULL OR status = $2))",
        )
        .bind(campaign_id.as_uuid())
        .bind(status)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_results", e))?;
        if !exists {
            return Err(StoreError::CampaignNotFound(campaign_id));
        }

        let rows: Vec<ResultRow> = sqlx::query_as(&format!(
            "SELECT {RESULT_COLUMNS} FROM dispatch_results \
             WHERE campaign_id = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at ASC, id ASC LIMIT $3 OFFSET $4"
        ))
        .bind(campaign_id.as_uuid())
        .bind(status)
        .bind(i64::from(query.per_page()))
        .bind(query.offset() as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_results", e))?;

        let items = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<DispatchResult>, _>>()?;

        Ok(ResultPage {
            items,
            total: total.max(0) as u64,
            page: query.page(),
            per_page: query.per_page(),
        })
    }

    #[instrument(skip(self), fields(sample_request_id = %id), err)]
    async fn sample_request(
        &self,
        id: SampleRequestId,
    ) -> Result<Option<SampleRequest>, StoreError> {
        let row: Option<SampleRow> = sqlx::query_as(
            r#"
            SELECT id, result_id, campaign_id, contact_id, sample_type, quantity,
                   shipping_address, fulfillment_status, requested_at
            FROM sample_requests
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("sample_request", e))?;

        row.map(TryInto::try_into).transpose()
    }
}

async fn insert_sample(conn: &mut PgConnection, sample: &SampleRequest) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO sample_requests (id, result_id, campaign_id, contact_id, sample_type,
                                     quantity, shipping_address, fulfillment_status, requested_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(sample.id.as_uuid())
    .bind(sample.result_id.as_uuid())
    .bind(sample.campaign_id.as_uuid())
    .bind(sample.contact_id.as_uuid())
    .bind(&sample.sample_type)
    .bind(to_i32(sample.quantity)?)
    .bind(Json(&sample.shipping_address))
    .bind(sample.fulfillment_status.as_str())
    .bind(sample.requested_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("insert_sample", e))?;
    Ok(())
}

fn to_i32(value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Storage(format!("value out of range: {value}")))
}

fn to_u32(column: &str, value: i32) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::Storage(format!("negative value in column {column}: {value}")))
}

fn corrupt(what: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Storage(format!("failed to decode {what}: {err}"))
}

#[derive(Debug)]
struct CampaignRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    created_by: String,
    job_name: String,
    contact_ids: Vec<Uuid>,
    settings: Json<JsonValue>,
    status: String,
    total: i32,
    processed: i32,
    successful: i32,
    failed: i32,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for CampaignRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(CampaignRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            created_by: row.try_get("created_by")?,
            job_name: row.try_get("job_name")?,
            contact_ids: row.try_get("contact_ids")?,
            settings: row.try_get("settings")?,
            status: row.try_get("status")?,
            total: row.try_get("total")?,
            processed: row.try_get("processed")?,
            successful: row.try_get("successful")?,
            failed: row.try_get("failed")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
        })
    }
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = StoreError;

    fn try_from(row: CampaignRow) -> Result<Self, Self::Error> {
        let settings = match row.settings.0 {
            JsonValue::Object(map) => map,
            other => return Err(corrupt("campaign settings", format!("not an object: {other}"))),
        };
        let definition = CampaignDefinition {
            name: row.name,
            description: row.description,
            created_by: row.created_by,
            job_name: row.job_name,
            contact_ids: row.contact_ids.into_iter().map(ContactId::from).collect(),
            settings,
        };
        let progress = CampaignProgress {
            status: row.status.parse().map_err(|e| corrupt("campaign status", e))?,
            counters: CampaignCounters {
                total: to_u32("total", row.total)?,
                processed: to_u32("processed", row.processed)?,
                successful: to_u32("successful", row.successful)?,
                failed: to_u32("failed", row.failed)?,
            },
            started_at: row.started_at,
            ended_at: row.ended_at,
        };
        Ok(Campaign::restore(
            CampaignId::from(row.id),
            definition,
            progress,
            row.created_at,
        ))
    }
}

#[derive(Debug)]
struct ResultRow {
    id: Uuid,
    campaign_id: Uuid,
    contact_id: Uuid,
    status: String,
    error_message: Option<String>,
    external_response: Option<Json<JsonValue>>,
    response_data: Option<Json<JsonValue>>,
    execution_id: Option<String>,
    sample_requested: bool,
    sample_request_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ResultRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ResultRow {
            id: row.try_get("id")?,
            campaign_id: row.try_get("campaign_id")?,
            contact_id: row.try_get("contact_id")?,
            status: row.try_get("status")?,
            error_message: row.try_get("error_message")?,
            external_response: row.try_get("external_response")?,
            response_data: row.try_get("response_data")?,
            execution_id: row.try_get("execution_id")?,
            sample_requested: row.try_get("sample_requested")?,
            sample_request_id: row.try_get("sample_request_id")?,
            created_at: row.try_get("created_at")?,
            processed_at: row.try_get("processed_at")?,
            delivered_at: row.try_get("delivered_at")?,
        })
    }
}

impl TryFrom<ResultRow> for DispatchResult {
    type Error = StoreError;

    fn try_from(row: ResultRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|e| corrupt("result status", e))?;
        let mut result = DispatchResult::pending(
            CampaignId::from(row.campaign_id),
            ContactId::from(row.contact_id),
            row.created_at,
        )
        .restored(status);

        result.id = row.id.into();
        result.error_message = row.error_message;
        result.external_response = row.external_response.map(|j| j.0);
        result.response_data = row.response_data.map(|j| j.0);
        result.execution_id = row.execution_id;
        result.sample_requested = row.sample_requested;
        result.sample_request_id = row.sample_request_id.map(Into::into);
        result.processed_at = row.processed_at;
        result.delivered_at = row.delivered_at;
        Ok(result)
    }
}

#[derive(Debug)]
struct ContactRow {
    id: Uuid,
    first_name: String,
    last_name: String,
    email_address: String,
    phone_number: Option<String>,
    company_name: Option<String>,
    job_title: Option<String>,
    address: Json<PostalAddress>,
    is_active: bool,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ContactRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ContactRow {
            id: row.try_get("id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email_address: row.try_get("email_address")?,
            phone_number: row.try_get("phone_number")?,
            company_name: row.try_get("company_name")?,
            job_title: row.try_get("job_title")?,
            address: row.try_get("address")?,
            is_active: row.try_get("is_active")?,
        })
    }
}

impl From<ContactRow> for Contact {
    fn from(row: ContactRow) -> Self {
        Contact {
            id: row.id.into(),
            first_name: row.first_name,
            last_name: row.last_name,
            email_address: row.email_address,
            phone_number: row.phone_number,
            company_name: row.company_name,
            job_title: row.job_title,
            address: row.address.0,
            is_active: row.is_active,
        }
    }
}

#[derive(Debug)]
struct JobRow {
    name: String,
    description: Option<String>,
    webhook_url: String,
    scenario_id: Option<String>,
    headers: Json<BTreeMap<String, String>>,
    is_active: bool,
}

impl<'r> sqlx::FromRow<'r, PgRow> for JobRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(JobRow {
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            webhook_url: row.try_get("webhook_url")?,
            scenario_id: row.try_get("scenario_id")?,
            headers: row.try_get("headers")?,
            is_active: row.try_get("is_active")?,
        })
    }
}

impl From<JobRow> for JobConfig {
    fn from(row: JobRow) -> Self {
        JobConfig {
            name: row.name,
            description: row.description,
            webhook_url: row.webhook_url,
            scenario_id: row.scenario_id,
            headers: row.headers.0,
            is_active: row.is_active,
        }
    }
}

#[derive(Debug)]
struct SampleRow {
    id: Uuid,
    result_id: Uuid,
    campaign_id: Uuid,
    contact_id: Uuid,
    sample_type: String,
    quantity: i32,
    shipping_address: Json<PostalAddress>,
    fulfillment_status: String,
    requested_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for SampleRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SampleRow {
            id: row.try_get("id")?,
            result_id: row.try_get("result_id")?,
            campaign_id: row.try_get("campaign_id")?,
            contact_id: row.try_get("contact_id")?,
            sample_type: row.try_get("sample_type")?,
            quantity: row.try_get("quantity")?,
            shipping_address: row.try_get("shipping_address")?,
            fulfillment_status: row.try_get("fulfillment_status")?,
            requested_at: row.try_get("requested_at")?,
        })
    }
}

impl TryFrom<SampleRow> for SampleRequest {
    type Error = StoreError;

    fn try_from(row: SampleRow) -> Result<Self, Self::Error> {
        Ok(SampleRequest {
            id: row.id.into(),
            result_id: row.result_id.into(),
            campaign_id: row.campaign_id.into(),
            contact_id: row.contact_id.into(),
            sample_type: row.sample_type,
            quantity: to_u32("quantity", row.quantity)?,
            shipping_address: row.shipping_address.0,
            fulfillment_status: row
                .fulfillment_status
                .parse()
                .map_err(|e| corrupt("fulfillment status", e))?,
            requested_at: row.requested_at,
        })
    }
}

/// Map SQLx errors to `StoreError`, preserving the operation for context.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Unique violation
                Some("23505") => StoreError::Conflict(msg),
                // Foreign key / check constraint violation
                Some("23503") | Some("23514") => StoreError::Storage(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::RowNotFound => {
            StoreError::Storage(format!("unexpected row not found in {}", operation))
        }
        _ => StoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Store on a scratch database named by `OUTREACH_TEST_DATABASE_URL`;
    /// `None` skips the test.
    async fn scratch_store() -> Option<PostgresCampaignStore> {
        let url = std::env::var("OUTREACH_TEST_DATABASE_URL").ok()?;
        let store = PostgresCampaignStore::connect(&url).await.unwrap();
        store.apply_schema().await.unwrap();
        Some(store)
    }

    #[tokio::test]
    async fn loop_and_callback_first_touch_do_not_deadlock() {
        let Some(store) = scratch_store().await else {
            return;
        };
        store
            .save_job(JobConfig::new("pg-first-touch", "http://automation.invalid/hook"))
            .await
            .unwrap();
        let mut contact_ids = Vec::new();
        for i in 0..20 {
            let id = ContactId::new();
            store
                .save_contact(Contact::new(id, "First", format!("Last{i}"), format!("{id}@example.com")))
                .await
                .unwrap();
            contact_ids.push(id);
        }
        let campaign = Campaign::new(
            CampaignDefinition {
                name: "first touch".into(),
                description: None,
                created_by: "ops".into(),
                job_name: "pg-first-touch".into(),
                contact_ids: contact_ids.clone(),
                settings: Default::default(),
            },
            Utc::now(),
        )
        .unwrap();
        let id = campaign.id();
        store.insert_campaign(&campaign).await.unwrap();
        store
            .transition_campaign(id, Lifecycle::Start { at: Utc::now() })
            .await
            .unwrap();

        for contact_id in contact_ids {
            let (ensured, applied) = tokio::join!(
                store.ensure_result(id, contact_id),
                store.apply_result_update(
                    id,
                    contact_id,
                    ResultUpdate::new(outreach_campaigns::DispatchStatus::Delivered),
                ),
            );
            ensured.unwrap();
            applied.unwrap();
        }

        let counters = store.campaign(id).await.unwrap().unwrap().counters();
        assert_eq!((counters.processed, counters.successful, counters.failed), (20, 20, 0));
    }

    #[tokio::test]
    async fn results_of_unknown_campaign_are_not_found() {
        let Some(store) = scratch_store().await else {
            return;
        };
        let err = store
            .list_results(CampaignId::new(), &ResultQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CampaignNotFound(_)));
    }

    #[test]
    fn schema_declares_uniqueness_constraints() {
        assert!(SCHEMA.contains("UNIQUE (campaign_id, contact_id)"));
        assert!(SCHEMA.contains("UNIQUE (result_id)"));
    }

    fn decodes_from_pg_rows<T: for<'r> sqlx::FromRow<'r, PgRow>>() {}

    #[test]
    fn row_structs_decode_from_pg_rows() {
        decodes_from_pg_rows::<CampaignRow>();
        decodes_from_pg_rows::<ResultRow>();
        decodes_from_pg_rows::<ContactRow>();
        decodes_from_pg_rows::<JobRow>();
        decodes_from_pg_rows::<SampleRow>();
    }

    #[test]
    fn campaign_row_with_non_object_settings_is_rejected() {
        let row = CampaignRow {
            id: Uuid::now_v7(),
            name: "n".into(),
            description: None,
            created_by: "ops".into(),
            job_name: "hook".into(),
            contact_ids: vec![],
            settings: Json(JsonValue::Array(vec![])),
            status: "draft".into(),
            total: 0,
            processed: 0,
            successful: 0,
            failed: 0,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        };
        assert!(Campaign::try_from(row).is_err());
    }

    #[test]
    fn result_row_decodes_status() {
        let row = ResultRow {
            id: Uuid::now_v7(),
            campaign_id: Uuid::now_v7(),
            contact_id: Uuid::now_v7(),
            status: "bounced".into(),
            error_message: Some("mailbox full".into()),
            external_response: None,
            response_data: Some(Json(serde_json::json!({"opened": false}))),
            execution_id: None,
            sample_requested: false,
            sample_request_id: None,
            created_at: Utc::now(),
            processed_at: None,
            delivered_at: None,
        };
        let result = DispatchResult::try_from(row).unwrap();
        assert_eq!(result.status(), outreach_campaigns::DispatchStatus::Bounced);
        assert_eq!(result.error_message.as_deref(), Some("mailbox full"));
    }
}
