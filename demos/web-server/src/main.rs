//! Example web console with an xterm.js container shell.
//!
//! Run with: cargo run -p web-console-example
//!
//! Then open http://localhost:3000, enter a container id, and attach.
//! Contexts live in `~/.container-console/contexts.json` (override with
//! `CONSOLE_CONTEXTS`); a `local` socket context is seeded on first run.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    response::{Html, IntoResponse},
    routing::get,
};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use console_context::{ClientRegistry, ContextStore, StoreError};
use console_core::{ContextDescriptor, TransportKind};
use console_engine::DockerDialer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let store_path = std::env::var_os("CONSOLE_CONTEXTS")
        .map_or_else(ContextStore::default_path, PathBuf::from);
    let store = ContextStore::new(store_path);
    seed_local_context(&store)?;

    let registry = Arc::new(ClientRegistry::new(store, DockerDialer));

    // Build router
    let app = Router::new()
        .route("/", get(index_handler))
        .merge(console_bridge::router(registry))
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Create the default `local` context on first run so the demo works
/// against a local engine socket out of the box.
fn seed_local_context(store: &ContextStore) -> Result<(), StoreError> {
    let local = ContextDescriptor::new(
        "local",
        TransportKind::Socket,
        "unix:///var/run/docker.sock",
    );
    match store.create(&local) {
        Ok(()) => {}
        Err(StoreError::AlreadyExists(_)) => return Ok(()),
        Err(e) => return Err(e),
    }
    if store.current()?.is_none() {
        store.set_current("local")?;
    }
    Ok(())
}

async fn index_handler() -> impl IntoResponse {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Container Console</title>
    <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/xterm@5.3.0/css/xterm.css" />
    <script src="https://cdn.jsdelivr.net/npm/xterm@5.3.0/lib/xterm.js"></script>
    <script src="https://cdn.jsdelivr.net/npm/xterm-addon-fit@0.8.0/lib/xterm-addon-fit.js"></script>
    <style>
        body {
            margin: 0;
            padding: 20px;
            background: #1e1e1e;
            font-family: system-ui, sans-serif;
        }
        h1 { color: #fff; margin-bottom: 10px; }
        #terminal-container {
            width: 100%;
            height: calc(100vh - 140px);
        }
        .controls { margin-bottom: 10px; }
        .controls input, .controls button {
            background: #2d2d2d;
            color: #d4d4d4;
            border: 1px solid #444;
            padding: 6px 10px;
            font-size: 14px;
        }
        .status {
            color: #888;
            font-size: 14px;
            margin-bottom: 10px;
        }
        .connected { color: #4a4; }
        .disconnected { color: #a44; }
    </style>
</head>
<body>
    <h1>Container Console</h1>
    <div class="controls">
        <input id="context" value="local" placeholder="context" />
        <input id="container" placeholder="container id" size="40" />
        <button id="attach">Attach</button>
    </div>
    <div class="status" id="status">Not attached</div>
    <div id="terminal-container"></div>

    <script>
        const term = new Terminal({
            cursorBlink: true,
            fontSize: 14,
            fontFamily: 'Menlo, Monaco, "Courier New", monospace',
            theme: {
                background: '#1e1e1e',
                foreground: '#d4d4d4',
            }
        });

        const fitAddon = new FitAddon.FitAddon();
        term.loadAddon(fitAddon);
        term.open(document.getElementById('terminal-container'));
        fitAddon.fit();

        const status = document.getElementById('status');
        const decoder = new TextDecoder();
        let ws;

        function sendResize() {
            if (ws && ws.readyState === WebSocket.OPEN) {
                const { cols, rows } = term;
                ws.send(JSON.stringify({ type: 'resize', rows, cols }));
            }
        }

        function attach() {
            if (ws) ws.close();
            const context = document.getElementById('context').value;
            const container = document.getElementById('container').value;
            if (!container) return;

            const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
            const url = `${protocol}//${window.location.host}/api/contexts/` +
                `${encodeURIComponent(context)}/containers/${encodeURIComponent(container)}/exec`;
            ws = new WebSocket(url);
            ws.binaryType = 'arraybuffer';

            ws.onopen = () => {
                status.textContent = 'Attached';
                status.className = 'status connected';
                term.focus();
                sendResize();
            };

            ws.onclose = () => {
                status.textContent = 'Disconnected';
                status.className = 'status disconnected';
            };

            ws.onmessage = (event) => {
                if (typeof event.data === 'string') {
                    // Text frames only carry setup diagnostics.
                    term.writeln(`\r\n[${event.data}]`);
                } else {
                    term.write(decoder.decode(new Uint8Array(event.data)));
                }
            };
        }

        document.getElementById('attach').addEventListener('click', attach);

        // Keystrokes go to the bridge verbatim.
        term.onData((data) => {
            if (ws && ws.readyState === WebSocket.OPEN) {
                ws.send(JSON.stringify({ type: 'input', data }));
            }
        });

        window.addEventListener('resize', () => {
            fitAddon.fit();
            sendResize();
        });
    </script>
</body>
</html>
"#;
