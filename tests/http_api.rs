use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::json;
use widget_index::api::{WidgetPage, WidgetServer};
use widget_index::config::PageLimits;
use widget_index::core::{NewWidget, Widget, WidgetId};
use widget_index::index::{OrderedIndex, WidgetStore};

async fn spawn_server() -> (String, Arc<OrderedIndex>) {
    let index = Arc::new(OrderedIndex::new());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let limits = PageLimits {
        default_size: 10,
        max_size: 50,
    };
    let server = WidgetServer::new(index.clone() as Arc<dyn WidgetStore>, limits);
    tokio::spawn(server.serve(listener, std::future::pending()));

    (format!("http://{}", addr), index)
}

fn fill(index: &OrderedIndex, count: i32) {
    for z in 0..count {
        index
            .insert(NewWidget::new(10, 10, 10, 10).with_z(z))
            .unwrap();
    }
}

async fn list(client: &reqwest::Client, base: &str, query: &str) -> WidgetPage {
    client
        .get(format!("{}/widgets?{}", base, query))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn create_without_z_goes_to_front() {
    let (base, _index) = spawn_server().await;
    let client = reqwest::Client::new();

    let body = json!({"x": 1, "y": 1, "width": 10, "height": 10});
    let resp = client
        .post(format!("{}/widgets", base))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let first: Widget = resp.json().await.unwrap();
    assert_eq!(first.z, 0);

    let second: Widget = client
        .post(format!("{}/widgets", base))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second.z, 1);
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn create_colliding_z_shifts_upper_widgets() {
    let (base, index) = spawn_server().await;
    fill(&index, 5);
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/widgets", base))
        .json(&json!({"x": 6666, "y": 10, "z": 3, "width": 10, "height": 10}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let page = list(&client, &base, "page=0&size=10").await;
    assert_eq!(page.total, 6);
    assert_eq!(page.items[3].x, 6666);
    assert_eq!(page.items[5].z, 5);
}

#[tokio::test]
async fn patch_colliding_z_keeps_count() {
    let (base, index) = spawn_server().await;
    fill(&index, 5);
    let client = reqwest::Client::new();

    let bottom = list(&client, &base, "page=0&size=1").await.items[0].clone();
    let resp = client
        .patch(format!("{}/widgets/{}", base, bottom.id))
        .json(&json!({"x": 999, "z": 3}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let page = list(&client, &base, "page=0&size=10").await;
    assert_eq!(page.total, 5);
    assert_eq!(page.items[2].x, 999);
    assert_eq!(page.items[4].z, 5);
}

#[tokio::test]
async fn invalid_bodies_are_rejected() {
    let (base, index) = spawn_server().await;
    let client = reqwest::Client::new();

    let zero_width = client
        .post(format!("{}/widgets", base))
        .json(&json!({"x": 1, "y": 1, "width": 0, "height": 10}))
        .send()
        .await
        .unwrap();
    assert_eq!(zero_width.status(), StatusCode::BAD_REQUEST);

    let missing_y = client
        .post(format!("{}/widgets", base))
        .json(&json!({"x": 1, "width": 10, "height": 10}))
        .send()
        .await
        .unwrap();
    assert!(missing_y.status().is_client_error());

    assert!(index.is_empty());
}

#[tokio::test]
async fn unknown_and_malformed_ids() {
    let (base, index) = spawn_server().await;
    fill(&index, 1);
    let client = reqwest::Client::new();
    let ghost = WidgetId::generate();

    let get = client
        .get(format!("{}/widgets/{}", base, ghost))
        .send()
        .await
        .unwrap();
    assert_eq!(get.status(), StatusCode::NOT_FOUND);

    let patch = client
        .patch(format!("{}/widgets/{}", base, ghost))
        .json(&json!({"x": 555}))
        .send()
        .await
        .unwrap();
    assert_eq!(patch.status(), StatusCode::NOT_FOUND);

    let del = client
        .delete(format!("{}/widgets/{}", base, ghost))
        .send()
        .await
        .unwrap();
    assert_eq!(del.status(), StatusCode::NOT_FOUND);

    let bad = client
        .get(format!("{}/widgets/not-an-id", base))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

    assert_eq!(index.len(), 1);
}

#[tokio::test]
async fn find_and_delete_existing_widget() {
    let (base, index) = spawn_server().await;
    fill(&index, 3);
    let client = reqwest::Client::new();
    let middle = index.find_by_z(1).unwrap();

    let found: Widget = client
        .get(format!("{}/widgets/{}", base, middle.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(found, middle);

    let del = client
        .delete(format!("{}/widgets/{}", base, middle.id))
        .send()
        .await
        .unwrap();
    assert_eq!(del.status(), StatusCode::NO_CONTENT);

    let zs: Vec<i32> = list(&client, &base, "")
        .await
        .items
        .iter()
        .map(|w| w.z)
        .collect();
    assert_eq!(zs, vec![0, 2]);
}

#[tokio::test]
async fn page_size_is_clamped_and_paged() {
    let (base, index) = spawn_server().await;
    fill(&index, 60);
    let client = reqwest::Client::new();

    let big = list(&client, &base, "page=0&size=1000").await;
    assert_eq!(big.size, 50);
    assert_eq!(big.items.len(), 50);
    assert_eq!(big.total, 60);

    let second = list(&client, &base, "page=1&size=50").await;
    assert_eq!(second.items.len(), 10);
    assert_eq!(second.items[0].z, 50);

    let beyond = list(&client, &base, "page=9&size=50").await;
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total, 60);
}

#[tokio::test]
async fn status_reports_counts() {
    let (base, index) = spawn_server().await;
    fill(&index, 4);
    index.insert(NewWidget::new(0, 0, 1, 1).with_z(0)).unwrap();
    let client = reqwest::Client::new();

    let stats: serde_json::Value = client
        .get(format!("{}/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["widget_count"], 5);
    assert_eq!(stats["highest_z"], 4);
    assert_eq!(stats["ops"]["cascades"], 1);
    assert_eq!(stats["ops"]["shifted_widgets"], 4);
}
