//! Minimal HTTP/1.1 server for integration tests: HEAD plus ranged and plain
//! GET over a fixed body, with scripted failures, artificial latency, and
//! request counters.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Clone)]
pub struct ServerOptions {
    /// Value of the `Accept-Ranges` header; `None` omits it and disables 206s.
    pub accept_ranges: Option<String>,
    /// Raw `Content-Disposition` value to advertise on HEAD.
    pub content_disposition: Option<String>,
    /// Sleep this long before answering any GET.
    pub get_delay: Duration,
    /// The first N GETs answer 500 before the body is served.
    pub fail_first_gets: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            accept_ranges: Some("bytes".to_string()),
            content_disposition: None,
            get_delay: Duration::ZERO,
            fail_first_gets: 0,
        }
    }
}

struct Shared {
    body: Vec<u8>,
    opts: ServerOptions,
    gets: AtomicUsize,
    heads: AtomicUsize,
    failures_left: AtomicUsize,
}

/// A running server plus its observation counters.
pub struct ServerHandle {
    pub url: String,
    shared: Arc<Shared>,
}

// Not every test binary reads the counters.
#[allow(dead_code)]
impl ServerHandle {
    pub fn get_count(&self) -> usize {
        self.shared.gets.load(Ordering::SeqCst)
    }

    pub fn head_count(&self) -> usize {
        self.shared.heads.load(Ordering::SeqCst)
    }
}

/// Serve `body` on an ephemeral port until the process exits.
pub fn start(body: Vec<u8>) -> ServerHandle {
    start_with_options(body, ServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: ServerOptions) -> ServerHandle {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
    let port = listener.local_addr().unwrap().port();
    let shared = Arc::new(Shared {
        failures_left: AtomicUsize::new(opts.fail_first_gets),
        body,
        opts,
        gets: AtomicUsize::new(0),
        heads: AtomicUsize::new(0),
    });
    {
        let shared = Arc::clone(&shared);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let shared = Arc::clone(&shared);
                thread::spawn(move || handle(stream, &shared));
            }
        });
    }
    ServerHandle {
        url: format!("http://127.0.0.1:{}/file.bin", port),
        shared,
    }
}

fn handle(mut stream: TcpStream, shared: &Shared) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (method, range) = parse_request(request);
    let total = shared.body.len() as u64;

    if method.eq_ignore_ascii_case("HEAD") {
        shared.heads.fetch_add(1, Ordering::SeqCst);
        let mut headers = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n",
            total
        );
        if let Some(value) = &shared.opts.accept_ranges {
            headers.push_str(&format!("Accept-Ranges: {}\r\n", value));
        }
        if let Some(value) = &shared.opts.content_disposition {
            headers.push_str(&format!("Content-Disposition: {}\r\n", value));
        }
        headers.push_str("\r\n");
        let _ = stream.write_all(headers.as_bytes());
        return;
    }

    if method.eq_ignore_ascii_case("GET") {
        shared.gets.fetch_add(1, Ordering::SeqCst);
        if !shared.opts.get_delay.is_zero() {
            thread::sleep(shared.opts.get_delay);
        }
        if claim_failure(&shared.failures_left) {
            let _ = stream.write_all(
                b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            );
            return;
        }
        let ranges_supported = shared.opts.accept_ranges.is_some();
        let (status_line, slice, extra) = match range {
            Some((start, end)) if ranges_supported => {
                let start = start.min(total) as usize;
                let end = end.min(total.saturating_sub(1)) as usize;
                if start > end {
                    let _ = stream.write_all(
                        b"HTTP/1.1 416 Range Not Satisfiable\r\nContent-Length: 0\r\n\r\n",
                    );
                    return;
                }
                let slice = &shared.body[start..=end];
                (
                    "HTTP/1.1 206 Partial Content",
                    slice,
                    format!("Content-Range: bytes {}-{}/{}\r\n", start, end, total),
                )
            }
            _ => ("HTTP/1.1 200 OK", &shared.body[..], String::new()),
        };
        let headers = format!(
            "{}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
            status_line,
            slice.len(),
            extra
        );
        let _ = stream.write_all(headers.as_bytes());
        let _ = stream.write_all(slice);
        return;
    }

    let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
}

fn claim_failure(failures_left: &AtomicUsize) -> bool {
    failures_left
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Returns the method and the `Range: bytes=X-Y` bounds when present.
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut lines = request.lines();
    let method = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or("");
    let mut range = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if !name.trim().eq_ignore_ascii_case("range") {
                continue;
            }
            let value = value.trim();
            if let Some(spec) = value.strip_prefix("bytes=") {
                if let Some((a, b)) = spec.split_once('-') {
                    let start = a.trim().parse::<u64>().unwrap_or(0);
                    let end = match b.trim() {
                        "" => u64::MAX,
                        s => s.parse::<u64>().unwrap_or(0),
                    };
                    range = Some((start, end));
                }
            }
        }
    }
    (method, range)
}
