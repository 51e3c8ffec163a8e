//! HTTP fetcher tests against an in-process `tiny_http` server.

use brewline_fetch::{FetchError, FetchOptions, Fetcher, HttpFetcher};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tiny_http::{Header, Response, Server, StatusCode};

struct TestServer {
    url: String,
    _server: Arc<Server>,
    _handle: std::thread::JoinHandle<()>,
}

impl TestServer {
    fn start() -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").expect("failed to bind test HTTP server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let url = format!("http://127.0.0.1:{port}");

        let srv = Arc::clone(&server);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                let path = request.url().to_owned();
                let _ = match path.as_str() {
                    "/tool-1.0.tar.gz" => request.respond(Response::from_data(b"hello".to_vec())),
                    "/moved.tar.gz" => {
                        let location =
                            Header::from_bytes("Location", "/tool-1.0.tar.gz").expect("valid header");
                        request.respond(
                            Response::empty(StatusCode(302)).with_header(location),
                        )
                    }
                    "/loop.tar.gz" => {
                        let location =
                            Header::from_bytes("Location", "/loop.tar.gz").expect("valid header");
                        request.respond(
                            Response::empty(StatusCode(302)).with_header(location),
                        )
                    }
                    "/stall.tar.gz" => {
                        // Hold the request open without answering.
                        std::thread::spawn(move || {
                            std::thread::sleep(Duration::from_secs(8));
                            drop(request);
                        });
                        Ok(())
                    }
                    "/broken.tar.gz" => request.respond(
                        Response::from_string("boom").with_status_code(StatusCode(500)),
                    ),
                    _ => request.respond(
                        Response::from_string("not found").with_status_code(StatusCode(404)),
                    ),
                };
            }
        });

        Self {
            url,
            _server: server,
            _handle: handle,
        }
    }
}

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(
        FetchOptions::default()
            .with_timeout(Duration::from_secs(10))
            .with_max_redirects(3),
    )
}

#[test]
fn downloads_body_to_scoped_dir() {
    let server = TestServer::start();
    let work = tempfile::tempdir().unwrap();

    let fetched = fetcher()
        .fetch(&format!("{}/tool-1.0.tar.gz", server.url), work.path())
        .unwrap();
    assert_eq!(fs::read(fetched.path()).unwrap(), b"hello");
    assert_eq!(fetched.size(), 5);

    let path = fetched.path().to_path_buf();
    drop(fetched);
    assert!(!path.exists());
    assert_eq!(fs::read_dir(work.path()).unwrap().count(), 0);
}

#[test]
fn follows_redirects() {
    let server = TestServer::start();
    let work = tempfile::tempdir().unwrap();
    let fetched = fetcher()
        .fetch(&format!("{}/moved.tar.gz", server.url), work.path())
        .unwrap();
    assert_eq!(fs::read(fetched.path()).unwrap(), b"hello");
}

#[test]
fn redirect_loop_fails() {
    let server = TestServer::start();
    let work = tempfile::tempdir().unwrap();
    let err = fetcher()
        .fetch(&format!("{}/loop.tar.gz", server.url), work.path())
        .unwrap_err();
    assert!(
        matches!(err, FetchError::Transport { .. } | FetchError::Status { .. }),
        "unexpected: {err}"
    );
    assert_eq!(fs::read_dir(work.path()).unwrap().count(), 0);
}

#[test]
fn server_error_is_status() {
    let server = TestServer::start();
    let work = tempfile::tempdir().unwrap();
    let err = fetcher()
        .fetch(&format!("{}/broken.tar.gz", server.url), work.path())
        .unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 500, .. }), "{err}");
    assert_eq!(fs::read_dir(work.path()).unwrap().count(), 0);
}

#[test]
fn missing_resource_is_not_found() {
    let server = TestServer::start();
    let work = tempfile::tempdir().unwrap();
    let err = fetcher()
        .fetch(&format!("{}/absent.tar.gz", server.url), work.path())
        .unwrap_err();
    assert!(matches!(err, FetchError::NotFound(_)), "{err}");
}

#[test]
fn connection_refused_is_transport_error() {
    let work = tempfile::tempdir().unwrap();
    // Bind and drop to get a port nothing listens on.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let err = fetcher()
        .fetch(&format!("http://127.0.0.1:{port}/x.tar.gz"), work.path())
        .unwrap_err();
    assert!(matches!(err, FetchError::Transport { .. }), "{err}");
}

#[test]
fn stalled_server_times_out() {
    let server = TestServer::start();
    let work = tempfile::tempdir().unwrap();
    let started = std::time::Instant::now();
    let err = HttpFetcher::new(FetchOptions::default().with_timeout(Duration::from_secs(1)))
        .fetch(&format!("{}/stall.tar.gz", server.url), work.path())
        .unwrap_err();
    assert!(matches!(err, FetchError::Timeout { seconds: 1, .. }), "{err}");
    assert!(started.elapsed() < Duration::from_secs(6));
    assert_eq!(fs::read_dir(work.path()).unwrap().count(), 0);
}
