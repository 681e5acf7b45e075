//! PostgreSQL-backed [`EndpointStore`] built on SeaORM.

use crate::db::entities::{endpoint, prelude::*, probe_result};
use crate::db::enums::EndpointStatus;
use crate::db::store::{
    EndpointSnapshot, EndpointStore, NewProbeResult, ProbeResultRecord, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::{error, info};

const INITIAL_MIGRATION: &str =
    include_str!("../../migrations/20261019000000_create_initial_tables.sql");

#[derive(Clone, Debug)]
pub struct PgEndpointStore {
    db: DatabaseConnection,
}

impl PgEndpointStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let mut opt = ConnectOptions::new(database_url.to_owned());
        opt.max_connections(max_connections).sqlx_logging(false);
        let db = Database::connect(opt).await?;
        info!("Database connected successfully.");
        Ok(Self::new(db))
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        info!("Running database migrations...");
        self.db
            .execute_unprepared(INITIAL_MIGRATION)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to execute database migrations.");
                e
            })?;
        info!("Database migrations completed successfully.");
        Ok(())
    }

    /// Closes the underlying pool. Call only after the scheduler has stopped.
    pub async fn close(&self) -> Result<(), StoreError> {
        self.db.clone().close().await?;
        info!("Database connection closed.");
        Ok(())
    }
}

#[async_trait]
impl EndpointStore for PgEndpointStore {
    async fn active_endpoints(&self) -> Result<Vec<EndpointSnapshot>, StoreError> {
        let endpoints = Endpoint::find()
            .filter(endpoint::Column::IsActive.eq(true))
            .order_by_asc(endpoint::Column::Id)
            .all(&self.db)
            .await?;
        Ok(endpoints.iter().map(EndpointSnapshot::from).collect())
    }

    async fn insert_probe_result(
        &self,
        result: NewProbeResult,
    ) -> Result<ProbeResultRecord, StoreError> {
        let model = probe_result::ActiveModel {
            endpoint_id: Set(result.endpoint_id),
            http_status: Set(result.http_status),
            succeeded: Set(result.succeeded),
            response_time_ms: Set(result.response_time_ms),
            error: Set(result.error),
            created_at: Set(result.created_at),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    async fn update_endpoint_status(
        &self,
        endpoint_id: i32,
        status: EndpointStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let res = Endpoint::update_many()
            .col_expr(endpoint::Column::Status, Expr::value(status.to_value()))
            .col_expr(endpoint::Column::LastCheckedAt, Expr::value(checked_at))
            .filter(endpoint::Column::Id.eq(endpoint_id))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected > 0)
    }
}
