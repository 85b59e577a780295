use logwall::render::Follower;
use logwall::types::Event;
use logwall::ws::{connect, with_token};
use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::Message;

// Integration probe: only runs when LOGWALL_WS is set to an agent WebSocket URL.
// Example: LOGWALL_WS=ws://127.0.0.1:8989/ws LOGWALL_TOKEN=changeme cargo test -p logwall --test ws_probe -- --nocapture
#[tokio::test]
async fn probe_ws_init() {
    let url = match std::env::var("LOGWALL_WS") {
        Ok(v) if !v.is_empty() => v,
        _ => {
            eprintln!("skipping ws_probe: set LOGWALL_WS=ws://host:port/ws to run this integration test");
            return;
        }
    };
    let token = std::env::var("LOGWALL_TOKEN").ok();
    let url = with_token(&url, token.as_deref()).expect("valid url");
    let mut ws = connect(&url).await.expect("connect ws");

    let first = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
        .await
        .expect("init within timeout")
        .expect("stream open")
        .expect("ws ok");
    let Message::Text(text) = first else {
        panic!("expected a text frame");
    };
    let ev: Event = serde_json::from_str(&text).expect("event json");
    assert!(matches!(ev, Event::Init(_)), "first event must be init");
    let shown = Follower::new(true).render(&ev);
    eprintln!("{shown}");
}
