use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::Response,
    Json,
};
use uuid::Uuid;

use crate::{
    cards::{Pack, Slot},
    AppState, Resp,
};

use super::{
    sampling::{drop_rates, DropRate},
    server::SessionError,
    SimulatorError,
};

#[derive(serde::Serialize)]
struct PackSummary<'a> {
    id: &'a str,
    name: &'a str,
    cards: usize,
}

#[derive(serde::Serialize)]
struct SlotRates {
    slot: Slot,
    rates: Vec<DropRate>,
}

#[derive(serde::Deserialize)]
pub struct NewSession {
    pack: String,
    seed: Option<u64>,
}

#[derive(serde::Serialize)]
struct SessionCreated {
    session: Uuid,
}

#[derive(serde::Deserialize)]
pub struct OpenParams {
    #[serde(default)]
    rare: bool,
}

fn session_error(e: SessionError) -> Response<String> {
    match e {
        SessionError::NotFound => Resp::e404(e),
        SessionError::Closed => Resp::e500(e),
        SessionError::Simulator(_) => Resp::e422(e),
    }
}

fn respond<T: serde::Serialize>(result: Result<T, SessionError>) -> Response<String> {
    match result {
        Ok(value) => Resp::json(&value),
        Err(e) => session_error(e),
    }
}

fn pack_rates(pack: &Pack) -> Result<Vec<SlotRates>, SimulatorError> {
    let mut slots = Vec::new();
    for slot in Slot::ALL {
        let rates = drop_rates(pack, slot)?;
        if !rates.is_empty() {
            slots.push(SlotRates { slot, rates });
        }
    }
    Ok(slots)
}

pub async fn handle_list_packs(State(state): State<AppState>) -> Response<String> {
    let packs: Vec<PackSummary> = state
        .catalog
        .packs()
        .into_iter()
        .map(|pack| PackSummary {
            id: &pack.id,
            name: &pack.name,
            cards: pack.entries.len(),
        })
        .collect();
    Resp::json(&packs)
}

pub async fn handle_pack_rates(
    State(state): State<AppState>,
    Path(pack): Path<String>,
) -> Response<String> {
    match state.catalog.get(&pack) {
        Some(pack) => match pack_rates(pack) {
            Ok(rates) => Resp::json(&rates),
            Err(e) => Resp::e422(e),
        },
        None => Resp::e404(format!("Unknown pack: {pack}")),
    }
}

pub async fn handle_create_session(
    State(state): State<AppState>,
    body: Result<Json<NewSession>, JsonRejection>,
) -> Response<String> {
    let req = match body {
        Ok(Json(req)) => req,
        Err(e) => return Resp::e422(format!("Invalid session request: {}", e.body_text())),
    };
    let Some(pack) = state.catalog.get(&req.pack).cloned() else {
        return Resp::e422(format!("Unknown pack: {}", req.pack));
    };

    respond(
        state
            .sessions
            .create(pack, req.seed)
            .await
            .map(|session| SessionCreated { session }),
    )
}

pub async fn handle_open(
    State(state): State<AppState>,
    Path(session): Path<Uuid>,
    Query(params): Query<OpenParams>,
) -> Response<String> {
    respond(state.sessions.open(session, params.rare).await)
}

pub async fn handle_reset(
    State(state): State<AppState>,
    Path(session): Path<Uuid>,
) -> Response<String> {
    match state.sessions.reset(session).await {
        Ok(()) => Resp::ok("Session reset."),
        Err(e) => session_error(e),
    }
}

pub async fn handle_stats(
    State(state): State<AppState>,
    Path(session): Path<Uuid>,
) -> Response<String> {
    respond(state.sessions.stats(session).await)
}

pub async fn handle_totals(
    State(state): State<AppState>,
    Path(session): Path<Uuid>,
) -> Response<String> {
    respond(state.sessions.totals(session).await)
}

pub async fn handle_current_pull(
    State(state): State<AppState>,
    Path(session): Path<Uuid>,
) -> Response<String> {
    respond(state.sessions.current_pull(session).await)
}

pub async fn handle_history(
    State(state): State<AppState>,
    Path(session): Path<Uuid>,
) -> Response<String> {
    respond(state.sessions.history(session).await)
}

pub async fn handle_close(
    State(state): State<AppState>,
    Path(session): Path<Uuid>,
) -> Response<String> {
    match state.sessions.close(session).await {
        Ok(()) => Resp::ok("Session closed."),
        Err(e) => session_error(e),
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use axum::{
        body::Body,
        extract::{FromRequest, State},
        http::{header::CONTENT_TYPE, Request, Response, StatusCode},
        Json,
    };

    use crate::{
        cards::{Card, Pack, PackCatalog, PackSlotEntry, Slot},
        sim::{server::SessionHandle, SimulatorConfig, SimulatorError},
        AppState,
    };

    use super::{handle_create_session, pack_rates, NewSession};

    #[test]
    fn test_pack_rates_skips_empty_slots() {
        let entry = |slot: Slot| PackSlotEntry {
            card: Card::sample(1),
            pool: slot.pool(),
            slot,
            percent: 100.0,
        };
        let pack = Pack {
            id: "p".to_string(),
            name: "P".to_string(),
            entries: vec![entry(Slot::First), entry(Slot::First), entry(Slot::Fifth)],
        };

        let rates = pack_rates(&pack).unwrap();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].slot, Slot::First);
        assert_eq!(rates[0].rates.len(), 2);
        assert_eq!(rates[1].slot, Slot::Fifth);
    }

    #[test]
    fn test_pack_rates_overflow() {
        let entry = |percent: f64| PackSlotEntry {
            card: Card::sample(1),
            pool: Slot::RarePack.pool(),
            slot: Slot::RarePack,
            percent,
        };
        let pack = Pack {
            id: "p".to_string(),
            name: "P".to_string(),
            entries: vec![entry(1e15), entry(1e15)],
        };
        assert_eq!(
            pack_rates(&pack).err(),
            Some(SimulatorError::WeightOverflow {
                slot: Slot::RarePack
            })
        );
    }

    async fn create_session(state: AppState, body: &'static str) -> Response<String> {
        let req = Request::builder()
            .method("POST")
            .uri("/api/sessions")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
        let body = Json::<NewSession>::from_request(req, &()).await;
        handle_create_session(State(state), body).await
    }

    fn envelope(resp: &Response<String>) -> serde_json::Value {
        serde_json::from_str(resp.body()).unwrap()
    }

    #[tokio::test]
    async fn test_create_session_responses() {
        let mut catalog = PackCatalog::new();
        catalog.add(Pack {
            id: "p".to_string(),
            name: "P".to_string(),
            entries: Vec::new(),
        });
        let state = AppState {
            catalog: Arc::new(catalog),
            sessions: SessionHandle::spawn(SimulatorConfig::default()),
        };

        let resp = create_session(state.clone(), "{ not json").await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(envelope(&resp)["success"], false);
        assert!(envelope(&resp)["message"].is_string());

        let resp = create_session(state.clone(), r#"{ "seed": 1 }"#).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(envelope(&resp)["success"], false);

        let resp = create_session(state.clone(), r#"{ "pack": "missing" }"#).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(envelope(&resp)["message"], "Unknown pack: missing");

        let resp = create_session(state, r#"{ "pack": "P", "seed": 3 }"#).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(envelope(&resp)["session"].is_string());
    }
}
