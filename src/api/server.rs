use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::config::PageLimits;
use crate::core::{IndexError, NewWidget, Widget, WidgetId, WidgetPatch};
use crate::index::WidgetStore;
use crate::stats::IndexStats;

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    /// 从 0 开始的页号
    pub page: Option<usize>,
    pub size: Option<usize>,
}

impl PageParams {
    /// 返回 (page, size)，size 截断到 `1..=max_size`
    pub fn resolve(&self, limits: PageLimits) -> (usize, usize) {
        let size = self
            .size
            .unwrap_or(limits.default_size)
            .clamp(1, limits.max_size.max(1));
        (self.page.unwrap_or(0), size)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WidgetPage {
    pub items: Vec<Widget>,
    pub total: usize,
    pub page: usize,
    pub size: usize,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn WidgetStore>,
    pub limits: PageLimits,
}

/// Widget HTTP 服务：只做请求/响应映射，所有排序语义都在 `WidgetStore` 里
pub struct WidgetServer {
    state: AppState,
}

impl WidgetServer {
    pub fn new(store: Arc<dyn WidgetStore>, limits: PageLimits) -> Self {
        Self {
            state: AppState { store, limits },
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/widgets", get(list_handler).post(create_handler))
            .route(
                "/widgets/:id",
                get(find_handler)
                    .patch(update_handler)
                    .delete(delete_handler),
            )
            .route("/status", get(status_handler))
            .with_state(self.state.clone())
    }

    /// 在已绑定的 listener 上服务，`shutdown` 完成后优雅退出
    pub async fn serve<F>(self, listener: tokio::net::TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        tracing::info!("HTTP Widget Server listening on {}", listener.local_addr()?);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

fn parse_id(raw: &str) -> Result<WidgetId, ApiError> {
    raw.parse().map_err(|_| ApiError::BadId(raw.to_string()))
}

async fn create_handler(
    State(state): State<AppState>,
    Json(new): Json<NewWidget>,
) -> Result<(StatusCode, Json<Widget>), ApiError> {
    let widget = state.store.insert(new)?;
    tracing::debug!("created widget {} at z={}", widget.id, widget.z);
    Ok((StatusCode::CREATED, Json(widget)))
}

async fn list_handler(
    Query(params): Query<PageParams>,
    State(state): State<AppState>,
) -> Json<WidgetPage> {
    let (page, size) = params.resolve(state.limits);
    let result = state.store.page(page.saturating_mul(size), size);

    Json(WidgetPage {
        items: result.items,
        total: result.total,
        page,
        size,
    })
}

async fn find_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Widget>, ApiError> {
    let id = parse_id(&id)?;
    state
        .store
        .find_by_id(&id)
        .map(Json)
        .ok_or(ApiError::Index(IndexError::NotFound(id)))
}

async fn update_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(patch): Json<WidgetPatch>,
) -> Result<Json<Widget>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.store.update(&id, &patch)?))
}

async fn delete_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    if state.store.delete_by_id(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::Index(IndexError::NotFound(id)))
    }
}

async fn status_handler(State(state): State<AppState>) -> Json<IndexStats> {
    Json(state.store.stats())
}
