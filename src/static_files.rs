use std::io::{Read as _, Write as _};
use std::net::TcpStream;
use std::path::{Component, Path, PathBuf};

/// Parsed first line of an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RequestLine<'a> {
    pub method: &'a str,
    pub path: &'a str,
}

pub(crate) fn parse_request_line(request: &str) -> Option<RequestLine<'_>> {
    let mut parts = request.lines().next()?.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    let path = target.split('?').next().unwrap_or(target);
    Some(RequestLine { method, path })
}

/// True if the request headers ask for a WebSocket upgrade.
pub(crate) fn is_websocket_upgrade(request: &str) -> bool {
    request.lines().skip(1).any(|line| {
        let line = line.to_ascii_lowercase();
        line.starts_with("upgrade:") && line.contains("websocket")
    })
}

/// Map a URL path onto a file under `root`. `None` for traversal attempts.
pub(crate) fn resolve(root: &Path, url_path: &str) -> Option<PathBuf> {
    let relative = url_path.trim_start_matches('/');
    let relative = if relative.is_empty() {
        "index.html"
    } else {
        relative
    };

    let relative = Path::new(relative);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }

    let candidate = root.join(relative);
    if candidate.is_dir() {
        Some(candidate.join("index.html"))
    } else {
        Some(candidate)
    }
}

pub(crate) fn content_type(path: &Path) -> &'static str {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("html");
    match ext {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff2" => "font/woff2",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Serve one plain HTTP request from `static_dir` and close the connection.
pub(crate) fn serve(mut stream: TcpStream, request: &str, static_dir: Option<&Path>) {
    // The router only peeked; consume the request before answering.
    let mut request_buf = vec![0u8; 8192];
    let _ = stream.read(&mut request_buf);

    let Some(line) = parse_request_line(request) else {
        respond(&mut stream, "400 Bad Request", "text/plain", b"Bad request", true);
        return;
    };

    let head_only = line.method == "HEAD";
    if line.method != "GET" && !head_only {
        respond(&mut stream, "405 Method Not Allowed", "text/plain", b"Method not allowed", true);
        return;
    }

    let file = static_dir
        .and_then(|root| resolve(root, line.path))
        .and_then(|path| std::fs::read(&path).ok().map(|body| (path, body)));

    match file {
        Some((path, body)) => {
            log::debug!("[HTTP] {} {} -> {}", line.method, line.path, path.display());
            respond(&mut stream, "200 OK", content_type(&path), &body, !head_only);
        }
        None => {
            log::debug!("[HTTP] {} {} -> 404", line.method, line.path);
            respond(&mut stream, "404 Not Found", "text/plain", b"Not found", !head_only);
        }
    }
}

fn respond(stream: &mut TcpStream, status: &str, mime: &str, body: &[u8], with_body: bool) {
    let header = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n",
        status,
        mime,
        body.len()
    );

    if stream.write_all(header.as_bytes()).is_err() {
        return;
    }
    if with_body {
        // Chunked writes keep large files from overflowing the send buffer.
        for chunk in body.chunks(65536) {
            if stream.write_all(chunk).is_err() {
                return;
            }
        }
    }
    let _ = stream.flush();
}
