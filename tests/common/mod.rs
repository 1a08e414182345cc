//! Shared helpers for the HTTP integration tests

use std::sync::mpsc;
use std::thread;

/// Serve `router` on an ephemeral localhost port and return its base URL.
///
/// The server runs on its own thread with a private tokio runtime and lives
/// until the test process exits.
pub fn spawn_server(router: axum::Router) -> String {
    let (addr_tx, addr_rx) = mpsc::channel();

    thread::Builder::new()
        .name("mock-service".to_string())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_all()
                .build()
                .expect("tokio runtime");

            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind mock service");
                addr_tx
                    .send(listener.local_addr().expect("local addr"))
                    .expect("report address");
                axum::serve(listener, router).await.expect("serve");
            });
        })
        .expect("spawn mock service");

    let addr = addr_rx.recv().expect("mock service address");
    format!("http://{}", addr)
}

/// Base URL of a localhost port nothing is listening on
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{}", addr)
}
