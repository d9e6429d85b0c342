use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::middleware::session::AppState;
use crate::error::{AppError, Result};
use crate::models::{
    check_in::{CheckIn, CheckInMethod, CheckInRecord},
    member::Member,
};
use crate::services::check_in::{self, CheckInError, CheckInRequest, CheckInResult, MemberCard};

const DEFAULT_RANGE_DAYS: i64 = 30;
const MAX_RANGE_DAYS: i64 = 366;

/// Kiosk check-in by PIN or QR code
async fn kiosk_check_in(
    State(state): State<AppState>,
    Json(req): Json<CheckInRequest>,
) -> Result<(StatusCode, Json<CheckInResult>)> {
    let result = check_in::check_in(&state.pool, req).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub pin: Option<String>,
    pub qr: Option<String>,
}

/// Member card for the kiosk confirmation screen
async fn lookup_member(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<MemberCard>> {
    let (member, _) =
        check_in::find_member_by_credential(&state.pool, query.pin.as_deref(), query.qr.as_deref())
            .await?;
    let card = check_in::member_card(&state.pool, &member).await?;

    Ok(Json(card))
}

#[derive(Debug, Deserialize)]
pub struct AdminCheckInRequest {
    pub class_id: Option<Uuid>,
}

/// Front-desk check-in for a member who forgot their credentials
async fn admin_check_in(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AdminCheckInRequest>,
) -> Result<(StatusCode, Json<CheckInResult>)> {
    let member = Member::find_by_id(&state.pool, id)
        .await?
        .ok_or(CheckInError::MemberNotFound)?;

    let result = check_in::record_check_in(
        &state.pool,
        &member,
        req.class_id,
        CheckInMethod::Admin,
        Utc::now().date_naive(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

#[derive(Debug, Deserialize)]
pub struct CheckInRangeQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub member_id: Option<Uuid>,
}

/// Resolves an inclusive date range, defaulting to the last 30 days
pub fn resolve_range(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate)> {
    let to = to.unwrap_or(today);
    let from = from.unwrap_or(to - Duration::days(DEFAULT_RANGE_DAYS));

    if from > to {
        return Err(AppError::Validation(
            "'from' must not be after 'to'".to_string(),
        ));
    }
    if (to - from).num_days() > MAX_RANGE_DAYS {
        return Err(AppError::Validation(format!(
            "Date range may span at most {} days",
            MAX_RANGE_DAYS
        )));
    }

    Ok((from, to))
}

async fn list_check_ins(
    State(state): State<AppState>,
    Query(query): Query<CheckInRangeQuery>,
) -> Result<Json<Vec<CheckInRecord>>> {
    let (from, to) = resolve_range(query.from, query.to, Utc::now().date_naive())?;
    let records = CheckIn::list_records(&state.pool, from, to, query.member_id).await?;

    Ok(Json(records))
}

/// Leading characters spreadsheets treat as the start of a formula
const FORMULA_PREFIXES: [char; 6] = ['=', '+', '-', '@', '\t', '\r'];

/// Quotes a CSV field when it contains a delimiter, quote or line break.
/// Values that a spreadsheet would evaluate are prefixed with `'`.
pub fn csv_field(value: &str) -> String {
    if value.starts_with(FORMULA_PREFIXES) {
        return format!("\"'{}\"", value.replace('"', "\"\""));
    }
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn render_csv(records: &[CheckInRecord]) -> String {
    let mut out = String::from("date,checked_in_at,member_id,first_name,last_name,program,class,method\n");

    for r in records {
        let row = [
            r.check_in_date.to_string(),
            r.checked_in_at.to_rfc3339(),
            r.member_id.to_string(),
            csv_field(&r.first_name),
            csv_field(&r.last_name),
            csv_field(&r.program),
            csv_field(r.class_name.as_deref().unwrap_or("Open mat")),
            r.method.clone(),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }

    out
}

async fn export_check_ins(
    State(state): State<AppState>,
    Query(query): Query<CheckInRangeQuery>,
) -> Result<Response> {
    let (from, to) = resolve_range(query.from, query.to, Utc::now().date_naive())?;
    let records = CheckIn::list_records(&state.pool, from, to, query.member_id).await?;

    tracing::info!(rows = records.len(), %from, %to, "Exporting check-ins");

    let filename = format!("attachment; filename=\"checkins-{}-to-{}.csv\"", from, to);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        render_csv(&records),
    )
        .into_response())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/checkin", post(kiosk_check_in))
        .route("/api/members/lookup", get(lookup_member))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/api/checkins", get(list_check_ins))
        .route("/api/checkins/export", get(export_check_ins))
        .route("/api/members/:id/checkin", post(admin_check_in))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("Ana"), "Ana");
        assert_eq!(csv_field("Costa, Jr."), "\"Costa, Jr.\"");
        assert_eq!(csv_field("The \"Shark\""), "\"The \"\"Shark\"\"\"");
    }

    #[test]
    fn test_csv_field_neutralizes_formulas() {
        assert_eq!(
            csv_field("=HYPERLINK(\"http://evil\";\"x\")"),
            "\"'=HYPERLINK(\"\"http://evil\"\";\"\"x\"\")\""
        );
        assert_eq!(csv_field("+1"), "\"'+1\"");
        assert_eq!(csv_field("-2"), "\"'-2\"");
        assert_eq!(csv_field("@SUM(A1)"), "\"'@SUM(A1)\"");
        assert_eq!(csv_field("Anne-Marie"), "Anne-Marie");
    }

    #[test]
    fn test_render_csv_rows() {
        let records = vec![CheckInRecord {
            id: Uuid::nil(),
            member_id: Uuid::nil(),
            first_name: "Ana".to_string(),
            last_name: "Costa, Jr.".to_string(),
            program: "adult_bjj".to_string(),
            class_id: None,
            class_name: None,
            check_in_date: date(2024, 3, 1),
            checked_in_at: Utc::now(),
            method: "pin".to_string(),
        }];

        let csv = render_csv(&records);
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("date,"));
        assert!(lines[1].starts_with("2024-03-01,"));
        assert!(lines[1].contains("\"Costa, Jr.\""));
        assert!(lines[1].ends_with("Open mat,pin"));
    }

    #[test]
    fn test_resolve_range_defaults() {
        let today = date(2024, 3, 31);
        assert_eq!(
            resolve_range(None, None, today).unwrap(),
            (date(2024, 3, 1), today)
        );
    }

    #[test]
    fn test_resolve_range_rejects_inverted_and_wide() {
        let today = date(2024, 3, 31);
        assert!(resolve_range(Some(date(2024, 4, 2)), Some(date(2024, 4, 1)), today).is_err());
        assert!(resolve_range(Some(date(2022, 1, 1)), Some(date(2024, 1, 1)), today).is_err());
    }
}
