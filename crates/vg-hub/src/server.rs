//! # Line Protocol Server
//!
//! One request is a `GET <table>` line followed by header lines,
//! terminated by a blank line or EOF. The connection task reads the
//! request asynchronously; parsing and answering are CPU-bound and run
//! on the blocking pool, where the wait barrier may suspend.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::output::{OutputBuffer, ResponseCode, ResponseHeader};
use crate::query::{executor, ParsedQuery};
use crate::state::Monitor;
use crate::tables::{Table, TableRegistry};

pub async fn serve(bind: &str, monitor: Arc<Monitor>) -> std::io::Result<()> {
    let tables = Arc::new(TableRegistry::new());
    let listener = TcpListener::bind(bind).await?;
    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::debug!(%peer, "client connected");
        let monitor = monitor.clone();
        let tables = tables.clone();
        tokio::spawn(async move {
            handle_connection(stream, monitor, tables).await;
            tracing::debug!(%peer, "client disconnected");
        });
    }
}

async fn handle_connection(stream: TcpStream, monitor: Arc<Monitor>, tables: Arc<TableRegistry>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    'requests: loop {
        let mut request: Vec<String> = Vec::new();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim_end_matches('\r');
                    if line.is_empty() {
                        if request.is_empty() {
                            continue;
                        }
                        break;
                    }
                    request.push(line.to_string());
                }
                Ok(None) => {
                    if request.is_empty() {
                        break 'requests;
                    }
                    break;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "read failed");
                    break 'requests;
                }
            }
        }

        let (response, keepalive) = {
            let monitor = monitor.clone();
            let tables = tables.clone();
            match tokio::task::spawn_blocking(move || process_request(&request, &tables, &monitor))
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(error = %e, "query worker died");
                    let mut out = OutputBuffer::new();
                    out.set_error(ResponseCode::InternalError, "internal error".to_string());
                    (out.render_response(ResponseHeader::Off), false)
                }
            }
        };

        if writer.write_all(&response).await.is_err() {
            break;
        }
        if !keepalive {
            break;
        }
    }
}

/// Parse and answer one request, returning the wire response and
/// whether the connection stays open.
pub fn process_request(
    lines: &[String],
    tables: &TableRegistry,
    monitor: &Monitor,
) -> (Vec<u8>, bool) {
    let mut out = OutputBuffer::new();
    let fallback = Table::empty();
    let (table, headers): (&Table, &[String]) = match lines.split_first() {
        Some((first, headers)) => {
            let table = match first.strip_prefix("GET") {
                Some(rest) if rest.starts_with([' ', '\t']) || rest.is_empty() => {
                    let name = rest.trim();
                    match tables.get(name) {
                        Some(table) => table,
                        None => {
                            out.set_error(
                                ResponseCode::NotFound,
                                format!("invalid GET request, no such table '{name}'"),
                            );
                            &fallback
                        }
                    }
                }
                _ => {
                    out.set_error(
                        ResponseCode::BadRequest,
                        format!("invalid request '{first}'"),
                    );
                    &fallback
                }
            };
            (table, headers)
        }
        None => (&fallback, &[][..]),
    };

    // Headers are parsed even when the GET line failed, so framing and
    // keepalive settings still apply to the error response.
    let plan = {
        let world = monitor.read();
        ParsedQuery::parse(headers, table, &world, &mut out)
    };
    tracing::debug!(
        table = table.name(),
        columns = ?plan.all_column_names,
        "parsed query"
    );
    if out.error().is_none() {
        executor::answer_query(&plan, table, monitor, &mut out);
    }
    (out.render_response(plan.response_header), plan.keepalive)
}
