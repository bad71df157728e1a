//! Minimal HTTP/1.1 asset server for integration tests.
//!
//! Serves a single static body on every path. GET honours `Range: bytes=X-Y`
//! with 206 Partial Content; PUT bodies are stored for inspection. Every
//! response carries `Connection: close`.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default)]
pub struct RangeServerOptions {
    /// Announce the full length but close the connection after this many body bytes.
    pub cut_after: Option<usize>,
    /// Flip every bit of the body byte at this offset.
    pub corrupt_at: Option<usize>,
    /// Status returned for PUT; 200 when unset.
    pub put_status: Option<u16>,
    /// Answer every GET with 200 and the full body, whatever the Range header says.
    pub ignore_ranges: bool,
    /// Send this many body bytes, then hold the connection open without sending more.
    pub stall_after: Option<usize>,
}

/// How long a stalled response is held open.
const STALL: Duration = Duration::from_secs(5);

pub struct RangeServer {
    /// Base URL, e.g. `http://127.0.0.1:12345/`.
    pub url: String,
    pub uploads: Arc<Mutex<Vec<Vec<u8>>>>,
    pub requests: Arc<AtomicUsize>,
}

impl RangeServer {
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn uploaded(&self) -> Vec<Vec<u8>> {
        self.uploads.lock().unwrap().clone()
    }
}

pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, RangeServerOptions::default())
}

pub fn start_with_options(mut body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    if let Some(at) = opts.corrupt_at {
        if let Some(b) = body.get_mut(at) {
            *b = !*b;
        }
    }
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let uploads = Arc::new(Mutex::new(Vec::new()));
    let requests = Arc::new(AtomicUsize::new(0));

    let (uploads_srv, requests_srv) = (uploads.clone(), requests.clone());
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let uploads = Arc::clone(&uploads_srv);
            requests_srv.fetch_add(1, Ordering::SeqCst);
            thread::spawn(move || handle(stream, &body, opts, &uploads));
        }
    });

    RangeServer {
        url: format!("http://127.0.0.1:{}/", port),
        uploads,
        requests,
    }
}

fn handle(mut stream: TcpStream, body: &[u8], opts: RangeServerOptions, uploads: &Mutex<Vec<Vec<u8>>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(10)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(10)));

    let Some((head, mut rest)) = read_head(&mut stream) else {
        return;
    };
    let request = parse_request(&head);

    if request.method.eq_ignore_ascii_case("PUT") {
        let expected = request.content_length.unwrap_or(0);
        let mut chunk = [0u8; 8192];
        while rest.len() < expected {
            match stream.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => rest.extend_from_slice(&chunk[..n]),
            }
        }
        uploads.lock().unwrap().push(rest);
        let status = match opts.put_status.unwrap_or(200) {
            200 => "200 OK".to_string(),
            code => format!("{} Test Status", code),
        };
        let response = format!("HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n", status);
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    if !request.method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    }

    let total = body.len() as u64;
    let range = if opts.ignore_ranges { None } else { request.range };
    let (status, slice) = match range {
        Some((start, end_incl)) => {
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start > end_incl || start >= total {
                let response = format!(
                    "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    total
                );
                let _ = stream.write_all(response.as_bytes());
                return;
            }
            ("206 Partial Content", &body[start as usize..=end_incl as usize])
        }
        None => ("200 OK", body),
    };

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\nConnection: close\r\n\r\n",
        status,
        slice.len()
    );
    let _ = stream.write_all(response.as_bytes());
    let sent = match opts.cut_after.or(opts.stall_after) {
        Some(n) => &slice[..n.min(slice.len())],
        None => slice,
    };
    for part in sent.chunks(64 * 1024) {
        if stream.write_all(part).is_err() {
            return;
        }
    }
    let _ = stream.flush();
    if opts.stall_after.is_some() {
        thread::sleep(STALL);
    }
    let _ = stream.shutdown(std::net::Shutdown::Write);
}

/// Reads up to the blank line ending the headers. Returns the header text and
/// any body bytes that arrived with it.
fn read_head(stream: &mut TcpStream) -> Option<(String, Vec<u8>)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..pos]).into_owned();
            return Some((head, buf[pos + 4..].to_vec()));
        }
    }
}

struct Request {
    method: String,
    range: Option<(u64, u64)>,
    content_length: Option<usize>,
}

/// `range` is `(start, end_inclusive)` from `Range: bytes=X-Y`.
fn parse_request(head: &str) -> Request {
    let mut lines = head.lines();
    let method = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or("")
        .to_string();
    let mut range = None;
    let mut content_length = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim());
        if name.eq_ignore_ascii_case("range") {
            if let Some(spec) = value.strip_prefix("bytes=") {
                if let Some((a, b)) = spec.split_once('-') {
                    let start = a.trim().parse::<u64>().unwrap_or(0);
                    let end = b.trim().parse::<u64>().unwrap_or(u64::MAX);
                    range = Some((start, end));
                }
            }
        } else if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse().ok();
        }
    }
    Request {
        method,
        range,
        content_length,
    }
}
