use crate::AppState;
use crate::api::error::AppError;
use crate::api::middleware::auth::Identity;
use crate::tabular::boxplot;
use crate::tabular::stats::{self, ColumnSummary, SummaryKind};
use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct FrequencyEntry {
    pub value: String,
    pub count: usize,
}

#[derive(Serialize, ToSchema)]
pub struct DescriptiveStatsResponse {
    pub variable_name: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std_dev: Option<f64>,
    pub min_val: Option<f64>,
    pub max_val: Option<f64>,
    pub q1: Option<f64>,
    pub q3: Option<f64>,
    pub missing_values: usize,
    pub data_type_detected: String,
    pub unique_values_count: Option<usize>,
    pub top_frequencies: Option<Vec<FrequencyEntry>>,
}

impl From<ColumnSummary> for DescriptiveStatsResponse {
    fn from(summary: ColumnSummary) -> Self {
        let mut response = DescriptiveStatsResponse {
            variable_name: summary.name,
            count: summary.valid_count,
            mean: None,
            median: None,
            std_dev: None,
            min_val: None,
            max_val: None,
            q1: None,
            q3: None,
            missing_values: summary.missing_count,
            data_type_detected: String::new(),
            unique_values_count: None,
            top_frequencies: None,
        };

        match summary.kind {
            SummaryKind::Numeric(numeric) => {
                response.data_type_detected = "numeric".to_string();
                response.mean = Some(numeric.mean);
                response.median = Some(numeric.median);
                response.std_dev = numeric.std_dev;
                response.min_val = Some(numeric.min);
                response.max_val = Some(numeric.max);
                response.q1 = numeric.q1;
                response.q3 = numeric.q3;
                response.unique_values_count = Some(numeric.distinct_count);
            }
            SummaryKind::Categorical(categorical) => {
                response.data_type_detected = "categorical".to_string();
                response.unique_values_count = Some(categorical.distinct_count);
                response.top_frequencies = Some(
                    categorical
                        .top_frequencies
                        .into_iter()
                        .map(|(value, count)| FrequencyEntry { value, count })
                        .collect(),
                );
            }
            SummaryKind::Empty => {
                response.data_type_detected = "empty".to_string();
                response.unique_values_count = Some(0);
            }
        }
        response
    }
}

#[derive(Serialize, ToSchema)]
pub struct BoxplotDataResponse {
    pub variable_name: String,
    pub min_val: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max_val: f64,
    pub outliers: Vec<f64>,
}

#[utoipa::path(
    get,
    path = "/files/{file_id}/statistics/{variable_name}",
    params(
        ("file_id" = String, Path, description = "File ID"),
        ("variable_name" = String, Path, description = "Column to summarize")
    ),
    responses(
        (status = 200, description = "Descriptive statistics for the column", body = DescriptiveStatsResponse),
        (status = 400, description = "File could not be parsed"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "File or column not found")
    ),
    tag = "statistics"
)]
pub async fn get_statistics(
    State(state): State<AppState>,
    Extension(Identity(user)): Extension<Identity>,
    Path((file_id, variable_name)): Path<(String, String)>,
) -> Result<Json<DescriptiveStatsResponse>, AppError> {
    let table = state.dataset.load_table(&user, &file_id).await?;
    let summary = stats::summarize(&table, &variable_name)?;
    Ok(Json(summary.into()))
}

#[utoipa::path(
    get,
    path = "/files/{file_id}/graph-data/boxplot/{variable_name}",
    params(
        ("file_id" = String, Path, description = "File ID"),
        ("variable_name" = String, Path, description = "Numeric column to plot")
    ),
    responses(
        (status = 200, description = "Boxplot data for the column", body = BoxplotDataResponse),
        (status = 400, description = "Column is not numeric or file could not be parsed"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "File or column not found")
    ),
    tag = "statistics"
)]
pub async fn get_boxplot(
    State(state): State<AppState>,
    Extension(Identity(user)): Extension<Identity>,
    Path((file_id, variable_name)): Path<(String, String)>,
) -> Result<Json<BoxplotDataResponse>, AppError> {
    let table = state.dataset.load_table(&user, &file_id).await?;
    let summary = boxplot::boxplot(&table, &variable_name)?;
    Ok(Json(BoxplotDataResponse {
        variable_name,
        min_val: summary.min,
        q1: summary.q1,
        median: summary.median,
        q3: summary.q3,
        max_val: summary.max,
        outliers: summary.outliers,
    }))
}
