//! WebSocket client: connect to an agent and follow its event stream.

use std::io::Write;

use anyhow::{bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::render::Follower;
use crate::types::Event;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// `url` with `token` set as the `token` query parameter.
pub fn with_token(url: &str, token: Option<&str>) -> Result<String> {
    let mut u = Url::parse(url).with_context(|| format!("invalid url '{url}'"))?;
    match u.scheme() {
        "ws" | "wss" => {}
        other => bail!("unsupported scheme '{other}', expected ws:// or wss://"),
    }
    if let Some(t) = token {
        let others: Vec<(String, String)> = u
            .query_pairs()
            .filter(|(k, _)| k != "token")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        u.query_pairs_mut()
            .clear()
            .extend_pairs(others)
            .append_pair("token", t);
    }
    Ok(u.into())
}

// Connect to the agent and return the WS stream
pub async fn connect(url: &str) -> Result<WsStream> {
    match connect_async(url).await {
        Ok((ws, _)) => Ok(ws),
        Err(tungstenite::Error::Http(resp)) if resp.status() == 401 => {
            bail!("agent refused the connection: token missing or wrong")
        }
        Err(e) => Err(e).with_context(|| format!("connecting to {url}")),
    }
}

/// Print every event until the agent closes the stream.
pub async fn follow<W: Write>(ws: &mut WsStream, follower: &mut Follower, out: &mut W) -> Result<()> {
    while let Some(msg) = ws.next().await {
        match msg.context("reading from agent")? {
            Message::Text(text) => match serde_json::from_str::<Event>(&text) {
                Ok(ev) => {
                    let s = follower.render(&ev);
                    if !s.is_empty() {
                        out.write_all(s.as_bytes())?;
                        out.flush()?;
                    }
                }
                // newer agents may send events this client does not know
                Err(_) => continue,
            },
            Message::Ping(p) => ws.send(Message::Pong(p)).await?,
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_appended_once() {
        assert_eq!(
            with_token("ws://h:8989/ws", Some("p w")).unwrap(),
            "ws://h:8989/ws?token=p+w"
        );
        assert_eq!(
            with_token("ws://h/ws?token=old&x=1", Some("new")).unwrap(),
            "ws://h/ws?x=1&token=new"
        );
        assert_eq!(with_token("ws://h/ws", None).unwrap(), "ws://h/ws");
    }

    #[test]
    fn rejects_http_urls() {
        assert!(with_token("http://h/ws", None).is_err());
        assert!(with_token("not a url", None).is_err());
    }
}
