// ============================================================================
// History Route
// ============================================================================
//
// GET /history?user_id_1=<uuid>&user_id_2=<uuid>&limit=<n>&offset=<n>
//
// Reads the message store directly; the hub is not involved. `identity_1` and
// `identity_2` are accepted as aliases. Out-of-range pagination is clamped,
// non-numeric pagination and malformed ids are rejected with 400.
// ============================================================================

use axum::{
    extract::{Query, State},
    Json,
};
use chat_error::{AppError, AppResult};
use chat_types::{Message, Pagination, UserId};
use serde::{Deserialize, Serialize};

use crate::context::AppContext;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(alias = "identity_1")]
    pub user_id_1: Option<String>,
    #[serde(alias = "identity_2")]
    pub user_id_2: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub messages: Vec<Message>,
}

impl HistoryQuery {
    fn participants(&self) -> AppResult<(UserId, UserId)> {
        Ok((
            parse_user(self.user_id_1.as_deref(), "user_id_1")?,
            parse_user(self.user_id_2.as_deref(), "user_id_2")?,
        ))
    }

    fn pagination(&self) -> AppResult<Pagination> {
        Ok(Pagination::new(
            parse_number(self.limit.as_deref(), "limit")?,
            parse_number(self.offset.as_deref(), "offset")?,
        ))
    }
}

fn parse_user(raw: Option<&str>, field: &str) -> AppResult<UserId> {
    let raw = raw.ok_or_else(|| AppError::validation(format!("{} is required", field)))?;
    UserId::parse(raw).map_err(|e| AppError::validation(format!("{}: {}", field, e)))
}

fn parse_number(raw: Option<&str>, field: &str) -> AppResult<Option<i64>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| AppError::validation(format!("{} must be an integer", field))),
    }
}

/// GET /history
pub async fn get_history(
    State(ctx): State<AppContext>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<HistoryResponse>> {
    let (a, b) = query.participants()?;
    let page = query.pagination()?;

    let messages = ctx.store.history(&a, &b, page).await?;

    Ok(Json(HistoryResponse { messages }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_and_malformed_ids_rejected() {
        let query = HistoryQuery::default();
        assert!(matches!(query.participants(), Err(AppError::Validation(_))));

        let query = HistoryQuery {
            user_id_1: Some(UserId::random().to_string()),
            user_id_2: Some("bob".to_string()),
            ..Default::default()
        };
        assert!(matches!(query.participants(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_pagination_parsing() {
        let query = HistoryQuery {
            limit: Some("5000".to_string()),
            offset: Some("-3".to_string()),
            ..Default::default()
        };
        assert_eq!(
            query.pagination().unwrap(),
            Pagination { limit: 200, offset: 0 }
        );

        let query = HistoryQuery {
            limit: Some("ten".to_string()),
            ..Default::default()
        };
        assert!(query.pagination().is_err());
    }
}
