//! Human-readable rendering of registry statistics.
//!
//! Rendering only ever sees a `RegistrySnapshot`, never the registry itself.
//! Room names come straight from request paths and are escaped before output.

use std::fmt::Write;

use axum::{
    extract::{Query, State},
    http::header,
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;

use crate::connection_manager::RegistrySnapshot;
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StatsPageQuery {
    pub format: Option<String>,
}

/// GET /stats - HTML by default, plain text with `?format=text`
pub async fn stats_page(
    State(state): State<AppState>,
    Query(query): Query<StatsPageQuery>,
) -> Response {
    let snapshot = state.registry.snapshot().await;

    match query.format.as_deref() {
        Some("text") => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            render_text(&snapshot),
        )
            .into_response(),
        _ => Html(render_html(&snapshot)).into_response(),
    }
}

pub fn render_text(snapshot: &RegistrySnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "rooms: {}", snapshot.room_count);
    let _ = writeln!(out, "connections: {}", snapshot.connection_count);
    for (name, count) in snapshot.busiest_rooms() {
        let _ = writeln!(out, "{:?}\t{}", name, count);
    }
    out
}

pub fn render_html(snapshot: &RegistrySnapshot) -> String {
    let mut rows = String::new();
    for (name, count) in snapshot.busiest_rooms() {
        let _ = write!(
            rows,
            "\n                <tr><td>{}</td><td>{}</td></tr>",
            escape_html(name),
            count
        );
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Roomcast Stats</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Helvetica, Arial, sans-serif; color: #333; max-width: 800px; margin: 0 auto; padding: 2rem; background-color: #f4f7f6; }}
        .container {{ background-color: #fff; padding: 2rem; border-radius: 8px; box-shadow: 0 4px 6px rgba(0,0,0,0.1); }}
        .stats-grid {{ display: grid; grid-template-columns: repeat(auto-fit, minmax(200px, 1fr)); gap: 1.5rem; margin: 2rem 0; }}
        .stat-card {{ background-color: #ecf0f1; padding: 1.5rem; border-radius: 6px; text-align: center; }}
        .stat-value {{ display: block; font-size: 2.5rem; font-weight: bold; color: #3498db; }}
        .stat-label {{ display: block; color: #7f8c8d; text-transform: uppercase; letter-spacing: 1px; }}
        table {{ min-width: 400px; border-collapse: collapse; }}
        th, td {{ text-align: left; padding: 12px; border-bottom: 1px solid #ddd; }}
        .footer {{ margin-top: 2rem; font-size: 0.8rem; color: #bdc3c7; text-align: center; }}
    </style>
</head>
<body>
    <div class="container">
        <h1>Roomcast Statistics</h1>
        <div class="stats-grid">
            <div class="stat-card">
                <span class="stat-value">{rooms}</span>
                <span class="stat-label">Active Rooms</span>
            </div>
            <div class="stat-card">
                <span class="stat-value">{connections}</span>
                <span class="stat-label">Total Connections</span>
            </div>
        </div>
        <h2>Active Rooms Breakdown</h2>
        <table>
            <thead>
                <tr><th>Room Name</th><th>Connections</th></tr>
            </thead>
            <tbody>{rows}
            </tbody>
        </table>
    </div>
    <div class="footer">Snapshot taken {taken_at}</div>
</body>
</html>
"#,
        rooms = snapshot.room_count,
        connections = snapshot.connection_count,
        rows = rows,
        taken_at = snapshot.taken_at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
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
