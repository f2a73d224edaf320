//! Local release server and fixtures for integration tests

#![allow(dead_code)]

use std::ffi::OsString;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use pearl_setup::install::download::platform::Platform;
use pearl_setup::install::download::registry::DependencyDescriptor;
use pearl_setup::install::{Elevation, EnvironmentPaths, ExecutionContext, SystemBroker};

/// Binary shipped in the fixture archive; unlikely to exist on any machine
pub const FAKE_BINARY: &str = "pearl-fake-engine";

pub struct ReleaseServer {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
}

pub struct ServerState {
    archive: Vec<u8>,
    hits: AtomicUsize,
    fail_next: AtomicBool,
}

impl ReleaseServer {
    /// Serves `/release.tar.gz`, `/flaky.tar.gz` (first request dies
    /// mid-body) and 404 for everything else
    pub async fn start() -> Self {
        let state = Arc::new(ServerState {
            archive: fake_archive(FAKE_BINARY),
            hits: AtomicUsize::new(0),
            fail_next: AtomicBool::new(true),
        });
        let app = Router::new()
            .route("/release.tar.gz", get(release))
            .route("/flaky.tar.gz", get(flaky))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}/{}", self.addr, path.trim_start_matches('/'))
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }
}

async fn release(State(state): State<Arc<ServerState>>) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::OK, state.archive.clone()).into_response()
}

async fn flaky(State(state): State<Arc<ServerState>>) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    if !state.fail_next.swap(false, Ordering::SeqCst) {
        return (StatusCode::OK, state.archive.clone()).into_response();
    }
    let head = Bytes::copy_from_slice(&state.archive[..state.archive.len() / 2]);
    let chunks: Vec<Result<Bytes, io::Error>> =
        vec![Ok(head), Err(io::Error::other("connection dropped"))];
    Body::from_stream(futures_util::stream::iter(chunks)).into_response()
}

/// gzip'd tarball holding an executable `binary` and a license file
pub fn fake_archive(binary: &str) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let script: &[u8] = b"#!/bin/sh\necho fake engine\n";
    let mut header = tar::Header::new_gnu();
    header.set_size(script.len() as u64);
    header.set_mode(0o755);
    builder.append_data(&mut header, binary, script).unwrap();

    let license: &[u8] = b"Apache-2.0\n";
    let mut header = tar::Header::new_gnu();
    header.set_size(license.len() as u64);
    header.set_mode(0o644);
    builder.append_data(&mut header, "LICENSE", license).unwrap();

    builder.into_inner().unwrap().finish().unwrap()
}

/// Descriptor for the fixture binary, downloadable on this machine only
pub fn fake_dependency(url: String) -> DependencyDescriptor {
    let platform = Platform::detect().unwrap();
    DependencyDescriptor::new("fake-engine", "Pearl Daemon", FAKE_BINARY).with_download(
        platform.os,
        platform.arch,
        url,
    )
}

pub fn layout(root: &Path) -> EnvironmentPaths {
    EnvironmentPaths::with_root(root.join(".operate"), root)
}

/// Context searching the real `PATH` plus `bin_dir`, never in CI mode
pub fn context(bin_dir: &Path) -> ExecutionContext {
    let vars: Vec<(OsString, OsString)> = std::env::vars_os().collect();
    ExecutionContext::from_vars(vars, &[bin_dir.to_path_buf()]).with_ci(false)
}

/// Broker that runs privileged steps directly as the test user
pub fn direct_broker(ctx: ExecutionContext) -> SystemBroker {
    SystemBroker::with_elevation(ctx, Elevation::Direct, "Pearl")
}
