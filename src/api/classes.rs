use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{Datelike, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::middleware::session::AppState;
use crate::error::{AppError, Result};
use crate::models::gym_class::{CreateClassData, GymClass, UpdateClassData};

#[derive(Debug, Deserialize)]
pub struct ScheduleQuery {
    /// 0 = Sunday
    pub day: Option<i16>,
}

fn validate_day(day: i16) -> Result<()> {
    if !(0..=6).contains(&day) {
        return Err(AppError::Validation(
            "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
        ));
    }
    Ok(())
}

/// Checks the fields shared by create and update
pub fn validate_class_fields(
    day_of_week: Option<i16>,
    duration_minutes: Option<i32>,
    capacity: Option<i32>,
    min_age: Option<i32>,
    max_age: Option<i32>,
) -> Result<()> {
    if let Some(day) = day_of_week {
        validate_day(day)?;
    }
    if duration_minutes.is_some_and(|d| d <= 0) {
        return Err(AppError::Validation(
            "Duration must be positive".to_string(),
        ));
    }
    if capacity.is_some_and(|c| c <= 0) {
        return Err(AppError::Validation(
            "Capacity must be positive".to_string(),
        ));
    }
    if min_age.is_some_and(|a| a < 0) || max_age.is_some_and(|a| a < 0) {
        return Err(AppError::Validation("Ages cannot be negative".to_string()));
    }
    if let (Some(min), Some(max)) = (min_age, max_age) {
        if min > max {
            return Err(AppError::Validation(
                "Minimum age cannot exceed maximum age".to_string(),
            ));
        }
    }
    Ok(())
}

async fn list_classes(
    State(state): State<AppState>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<Vec<GymClass>>> {
    if let Some(day) = query.day {
        validate_day(day)?;
    }
    let classes = GymClass::list_active(&state.pool, query.day).await?;
    Ok(Json(classes))
}

/// Today's schedule, used by the kiosk class picker
async fn todays_classes(State(state): State<AppState>) -> Result<Json<Vec<GymClass>>> {
    let today = Utc::now().weekday().num_days_from_sunday() as i16;
    let classes = GymClass::list_active(&state.pool, Some(today)).await?;
    Ok(Json(classes))
}

async fn create_class(
    State(state): State<AppState>,
    Json(req): Json<CreateClassData>,
) -> Result<(StatusCode, Json<GymClass>)> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("Class name is required".to_string()));
    }
    if req.program.trim().is_empty() {
        return Err(AppError::Validation("Program is required".to_string()));
    }
    validate_class_fields(
        Some(req.day_of_week),
        Some(req.duration_minutes),
        req.capacity,
        req.min_age,
        req.max_age,
    )?;

    let class = GymClass::create(&state.pool, req).await?;
    tracing::info!(class_id = %class.id, name = %class.name, "Class created");

    Ok((StatusCode::CREATED, Json(class)))
}

async fn update_class(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateClassData>,
) -> Result<Json<GymClass>> {
    let existing = GymClass::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Class not found".to_string()))?;

    // Age bounds are checked against the merged result
    validate_class_fields(
        req.day_of_week,
        req.duration_minutes,
        req.capacity,
        req.min_age.or(existing.min_age),
        req.max_age.or(existing.max_age),
    )?;

    let class = GymClass::update(&state.pool, id, req)
        .await?
        .ok_or_else(|| AppError::NotFound("Class not found".to_string()))?;

    tracing::info!(class_id = %class.id, "Class updated");

    Ok(Json(class))
}

/// Removes a class from the schedule; history keeps pointing at it
async fn delete_class(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    if !GymClass::deactivate(&state.pool, id).await? {
        return Err(AppError::NotFound("Class not found".to_string()));
    }

    tracing::info!(class_id = %id, "Class deactivated");

    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/classes", get(list_classes))
        .route("/api/classes/today", get(todays_classes))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/api/classes", post(create_class))
        .route("/api/classes/:id", put(update_class).delete(delete_class))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_class_fields() {
        assert!(validate_class_fields(Some(0), Some(60), Some(20), Some(4), Some(7)).is_ok());
        assert!(validate_class_fields(Some(6), Some(90), None, None, None).is_ok());
    }

    #[test]
    fn test_invalid_class_fields() {
        assert!(validate_class_fields(Some(7), Some(60), None, None, None).is_err());
        assert!(validate_class_fields(Some(1), Some(0), None, None, None).is_err());
        assert!(validate_class_fields(Some(1), Some(60), Some(0), None, None).is_err());
        assert!(validate_class_fields(Some(1), Some(60), None, Some(12), Some(6)).is_err());
    }
}
