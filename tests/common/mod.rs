// tests/common/mod.rs
//
// In-process HTTP doubles bound to 127.0.0.1:0:
// - POST /hook     scripted webhook (records every request body)
// - GET  /feed.xml static feed document
// - GET  /broken   always 500

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use feed_relay::NormalizedEntry;

/// What the fake webhook answers. The last reply of a script repeats.
#[derive(Debug, Clone)]
pub enum Reply {
    Ok,
    Status(u16),
    RateLimited(Option<&'static str>),
    Stall(Duration),
}

#[derive(Default)]
struct Inner {
    script: Vec<Reply>,
    hits: Vec<(Instant, Value)>,
}

#[derive(Clone, Default)]
pub struct Hook {
    inner: Arc<Mutex<Inner>>,
}

impl Hook {
    pub fn hits(&self) -> usize {
        self.inner.lock().unwrap().hits.len()
    }

    pub fn bodies(&self) -> Vec<Value> {
        self.inner.lock().unwrap().hits.iter().map(|(_, b)| b.clone()).collect()
    }

    pub fn hit_times(&self) -> Vec<Instant> {
        self.inner.lock().unwrap().hits.iter().map(|(t, _)| *t).collect()
    }

    /// Embed titles in arrival order.
    pub fn titles(&self) -> Vec<String> {
        self.bodies()
            .iter()
            .map(|b| b["embeds"][0]["title"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

async fn webhook(State(hook): State<Hook>, body: Bytes) -> Response {
    let reply = {
        let mut inner = hook.inner.lock().unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        inner.hits.push((Instant::now(), json));
        if inner.script.len() > 1 {
            inner.script.remove(0)
        } else {
            inner.script.first().cloned().unwrap_or(Reply::Ok)
        }
    };

    match reply {
        Reply::Ok => StatusCode::NO_CONTENT.into_response(),
        Reply::Status(code) => StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        Reply::RateLimited(Some(after)) => (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, after)],
            "slow down",
        )
            .into_response(),
        Reply::RateLimited(None) => (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response(),
        Reply::Stall(d) => {
            tokio::time::sleep(d).await;
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

pub struct Server {
    pub base: String,
    pub hook: Hook,
}

impl Server {
    pub fn hook_url(&self) -> String {
        format!("{}/hook", self.base)
    }

    pub fn feed_url(&self) -> String {
        format!("{}/feed.xml", self.base)
    }

    pub fn broken_url(&self) -> String {
        format!("{}/broken", self.base)
    }
}

pub async fn spawn(script: Vec<Reply>, feed: Option<&str>) -> Server {
    let hook = Hook {
        inner: Arc::new(Mutex::new(Inner {
            script,
            hits: Vec::new(),
        })),
    };
    let feed = Arc::new(feed.unwrap_or_default().to_string());

    let app = Router::new()
        .route("/hook", post(webhook))
        .with_state(hook.clone())
        .route(
            "/feed.xml",
            get(move || {
                let feed = feed.clone();
                async move {
                    (
                        [(header::CONTENT_TYPE, "application/rss+xml")],
                        feed.to_string(),
                    )
                }
            }),
        )
        .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Server {
        base: format!("http://{addr}"),
        hook,
    }
}

pub fn fixture(name: &str) -> String {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
}

pub fn sample_entry(title: &str) -> NormalizedEntry {
    NormalizedEntry {
        title: title.to_string(),
        link: format!("https://example.test/{title}"),
        description: "body".to_string(),
        author: String::new(),
        published: None,
        timestamp: "2025-06-15T12:00:00+00:00".to_string(),
    }
}
