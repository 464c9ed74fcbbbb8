use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::db::now_timestamp;
use crate::entities::analyses;
use crate::models::analysis::{AnalysisSource, Prediction};

/// Stored analysis row with the predictions decoded.
#[derive(Debug, Clone)]
pub struct AnalysisRow {
    pub id: i32,
    pub user_id: i32,
    pub filename: String,
    pub stored_name: String,
    pub predictions: Vec<Prediction>,
    pub source: AnalysisSource,
    pub created_at: String,
}

impl TryFrom<analyses::Model> for AnalysisRow {
    type Error = anyhow::Error;

    fn try_from(model: analyses::Model) -> Result<Self> {
        let predictions: Vec<Prediction> = serde_json::from_str(&model.predictions)
            .with_context(|| format!("Corrupt predictions for analysis {}", model.id))?;

        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            filename: model.filename,
            stored_name: model.stored_name,
            predictions,
            source: AnalysisSource::parse(&model.source),
            created_at: model.created_at,
        })
    }
}

pub struct NewAnalysis<'a> {
    pub user_id: i32,
    pub filename: &'a str,
    pub stored_name: &'a str,
    pub predictions: &'a [Prediction],
    pub source: AnalysisSource,
}

pub struct AnalysisRepository {
    conn: DatabaseConnection,
}

impl AnalysisRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, analysis: NewAnalysis<'_>) -> Result<AnalysisRow> {
        let predictions = serde_json::to_string(analysis.predictions)?;

        let active = analyses::ActiveModel {
            user_id: Set(analysis.user_id),
            filename: Set(analysis.filename.to_string()),
            stored_name: Set(analysis.stored_name.to_string()),
            predictions: Set(predictions),
            source: Set(analysis.source.as_str().to_string()),
            created_at: Set(now_timestamp()),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert analysis")?;

        AnalysisRow::try_from(model)
    }

    pub async fn get(&self, id: i32) -> Result<Option<AnalysisRow>> {
        let model = analyses::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query analysis")?;

        model.map(AnalysisRow::try_from).transpose()
    }

    /// Newest first.
    pub async fn list_for_user(&self, user_id: i32, limit: u64) -> Result<Vec<AnalysisRow>> {
        let models = analyses::Entity::find()
            .filter(analyses::Column::UserId.eq(user_id))
            .order_by_desc(analyses::Column::CreatedAt)
            .order_by_desc(analyses::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to list analyses")?;

        models.into_iter().map(AnalysisRow::try_from).collect()
    }
}
