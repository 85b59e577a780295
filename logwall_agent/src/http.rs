//! Plain HTTP handlers: login, the log page, logout, liveness.
//!
//! | Method | Path       | Description                                 |
//! |--------|------------|---------------------------------------------|
//! | `GET`  | `/`        | Login form                                  |
//! | `POST` | `/`        | Password check, sets the session cookie     |
//! | `GET`  | `/logs`    | Live log page (session required)            |
//! | `GET`  | `/logout`  | Drops the session                           |
//! | `GET`  | `/healthz` | `ok`                                        |

use axum::extract::{Form, State};
use axum::http::{header, HeaderMap};
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;
use tracing::{info, warn};

use crate::selector;
use crate::session::{clear_cookie, session_cookie, set_cookie};
use crate::state::AppState;
use crate::tail::file_name;

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub pw: String,
}

pub async fn login_page() -> Html<String> {
    Html(render_login(None))
}

pub async fn login_submit(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Response {
    match state.gate.login(&form.pw).await {
        Some(token) => (
            [(header::SET_COOKIE, set_cookie(&token))],
            Redirect::to("/logs"),
        )
            .into_response(),
        None => {
            info!("wrong password");
            Html(render_login(Some("Wrong password"))).into_response()
        }
    }
}

pub async fn logs_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let authed = match session_cookie(&headers) {
        Some(t) => state.gate.is_authenticated(&t).await,
        None => false,
    };
    if !authed {
        return Redirect::to("/").into_response();
    }
    let files = selector::resolve(&state.config.log_dir, &state.config.prefixes)
        .unwrap_or_else(|e| {
            warn!("cannot list log dir: {e}");
            Vec::new()
        });
    let names: Vec<String> = files.iter().map(|p| file_name(p)).collect();
    Html(render_logs(&names, &state.config.log_dir.display().to_string())).into_response()
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(t) = session_cookie(&headers) {
        state.gate.logout(&t).await;
    }
    ([(header::SET_COOKIE, clear_cookie())], Redirect::to("/")).into_response()
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = r#"<style>
body{background:#0b1220;color:#e2e8f0;font-family:ui-monospace,Menlo,Consolas,monospace;margin:0}
.box{background:#1e293b;padding:2rem;border-radius:.75rem;width:20rem;margin:15vh auto}
input,button{width:100%;box-sizing:border-box;padding:.5rem;margin-top:.5rem;font:inherit}
button{background:#06b6d4;border:0;font-weight:bold;cursor:pointer}
.err{background:#7f1d1d;color:#fca5a5;padding:.5rem;border-radius:.25rem;text-align:center}
header{background:#06b6d4;color:#000;padding:1rem 1.5rem;display:flex;justify-content:space-between}
header a{color:#000}
main{padding:1.5rem}
section{border:1px solid #0891b2;border-radius:.5rem;margin-bottom:1.5rem;overflow:hidden}
section h2{background:#0e7490;color:#000;margin:0;padding:.5rem 1rem;font-size:.8rem;text-transform:uppercase}
pre{background:#000;color:#4ade80;margin:0;padding:.75rem;height:20rem;overflow-y:scroll;font-size:.8rem}
#stats{color:#94a3b8;font-size:.8rem;padding:0 1.5rem}
</style>"#;

pub fn render_login(error: Option<&str>) -> String {
    let err = error
        .map(|e| format!(r#"<p class="err">{}</p>"#, escape_html(e)))
        .unwrap_or_default();
    format!(
        r#"<!doctype html><html lang="en"><head><meta charset="utf-8">
<meta name="viewport" content="width=device-width,initial-scale=1">
<title>logwall login</title>{STYLE}</head>
<body><form method="post" class="box">
<h1>logwall</h1>{err}
<label for="pw">Password</label>
<input id="pw" name="pw" type="password" autofocus>
<button>Login</button>
</form></body></html>"#
    )
}

pub fn render_logs(files: &[String], log_dir: &str) -> String {
    let sections = if files.is_empty() {
        format!(
            r#"<p class="err">No log files found in {}</p>"#,
            escape_html(log_dir)
        )
    } else {
        files
            .iter()
            .enumerate()
            .map(|(i, f)| {
                format!(
                    r#"<section><h2>{}</h2><pre id="log_{i}"></pre></section>"#,
                    escape_html(f)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    // </ must not close the script element early
    let files_js = serde_json::to_string(files)
        .unwrap_or_else(|_| "[]".into())
        .replace("</", "<\\/");
    format!(
        r#"<!doctype html><html lang="en"><head><meta charset="utf-8">
<meta name="viewport" content="width=device-width,initial-scale=1">
<title>logwall</title>{STYLE}</head>
<body><header><strong>logwall: live logs</strong><a href="/logout">Logout</a></header>
<p id="stats"></p>
<main>
{sections}
</main>
<script>
const files={files_js};
const b=i=>document.getElementById("log_"+i);
const auto=el=>{{el.scrollTop=el.scrollHeight;}};
function put(f,content,append){{
  const i=files.indexOf(f);if(i<0)return;const el=b(i);
  el.textContent=append?el.textContent+content:content;auto(el);
}}
function stats(s){{
  const d=s.display;
  document.getElementById("stats").textContent=
    `${{s.hostname}}  cpu ${{d.cpu}}  mem ${{d.mem_used}}/${{d.mem_total}}  disk ${{d.disk_used}}/${{d.disk_total}}  rx ${{d.rx_rate}}  tx ${{d.tx_rate}}  up ${{d.uptime}}`;
}}
const proto=location.protocol==="https:"?"wss:":"ws:";
const ws=new WebSocket(`${{proto}}//${{location.host}}/ws`);
ws.onmessage=m=>{{
  const {{event,data}}=JSON.parse(m.data);
  if(event==="init"){{data.logs.forEach(o=>put(o.filename,o.content,false));stats(data.stats);}}
  else if(event==="log_update")put(data.filename,data.content,true);
  else if(event==="stats")stats(data);
}};
</script></body></html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<a href="x">&'"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;"
        );
    }

    #[test]
    fn login_shows_error_only_when_given() {
        assert!(!render_login(None).contains("Wrong password"));
        assert!(render_login(Some("Wrong password")).contains("Wrong password"));
    }

    #[test]
    fn logs_page_lists_files_safely() {
        let page = render_logs(&["core.1.log".into(), "</script>.log".into()], "log");
        assert!(page.contains(r#"<pre id="log_0">"#));
        assert!(page.contains("&lt;/script&gt;.log"));
        assert!(page.contains(r#"<\/script>.log"#));

        let empty = render_logs(&[], "/var/log/x");
        assert!(empty.contains("No log files found in /var/log/x"));
    }
}
