use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;

use base64::Engine;
use sha1::{Digest, Sha1};
use tracing::{info, warn};
use tungstenite::protocol::Role;
use tungstenite::WebSocket;

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const MAX_REQUEST_BYTES: usize = 8192;

/// What the Frontdoor did with one accepted connection.
pub enum Outcome {
    /// The request was a WebSocket upgrade; the connection is now framed.
    Upgraded(WebSocket<TcpStream>),
    /// A plain HTTP request was answered (200 or 404) and the connection
    /// should be closed.
    Served,
}

/// Read one HTTP request off `stream`, then either complete a WebSocket
/// handshake or serve a static file from `web_root`, matching the original
/// caster's session-handling contract: `/` maps to `/index.html`, a
/// missing file gets a 404 with a fixed body, and content-type is inferred
/// from the file extension.
pub fn handle_connection(mut stream: TcpStream, web_root: &Path) -> std::io::Result<Outcome> {
    let mut buf = vec![0u8; MAX_REQUEST_BYTES];
    let mut total = 0;

    let (method, path, headers_owned) = loop {
        let n = stream.read(&mut buf[total..])?;
        if n == 0 {
            return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "client closed before sending a full request"));
        }
        total += n;

        let mut headers = [httparse::EMPTY_HEADER; 32];
        let mut req = httparse::Request::new(&mut headers);
        match req.parse(&buf[..total]) {
            Ok(httparse::Status::Complete(_)) => {
                let method = req.method.unwrap_or("GET").to_string();
                let path = req.path.unwrap_or("/").to_string();
                let headers_owned: Vec<(String, String)> = req
                    .headers
                    .iter()
                    .map(|h| (h.name.to_ascii_lowercase(), String::from_utf8_lossy(h.value).to_string()))
                    .collect();
                break (method, path, headers_owned);
            }
            Ok(httparse::Status::Partial) => {
                if total >= MAX_REQUEST_BYTES {
                    return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "request too large"));
                }
                continue;
            }
            Err(e) => {
                return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()));
            }
        }
    };

    let header = |name: &str| headers_owned.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str());

    let is_upgrade = header("upgrade").is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
        && header("connection").is_some_and(|v| v.to_ascii_lowercase().contains("upgrade"));

    if is_upgrade {
        let Some(key) = header("sec-websocket-key") else {
            write_response(&mut stream, 400, "text/plain", "missing Sec-WebSocket-Key")?;
            return Ok(Outcome::Served);
        };
        let accept = accept_key(key);

        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {accept}\r\n\r\n"
        );
        stream.write_all(response.as_bytes())?;
        info!("frontdoor: upgraded connection to WebSocket");
        return Ok(Outcome::Upgraded(WebSocket::from_raw_socket(stream, Role::Server, None)));
    }

    if method != "GET" {
        write_response(&mut stream, 405, "text/plain", "method not allowed")?;
        return Ok(Outcome::Served);
    }

    serve_static(&mut stream, web_root, &path)?;
    Ok(Outcome::Served)
}

/// Compute the `Sec-WebSocket-Accept` header value from a client's
/// `Sec-WebSocket-Key`, per RFC 6455 section 4.2.2.
fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    let digest = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(digest)
}

fn serve_static(stream: &mut TcpStream, web_root: &Path, request_path: &str) -> std::io::Result<()> {
    let path = if request_path == "/" { "/index.html" } else { request_path };
    let full_path = web_root.join(path.trim_start_matches('/'));

    match std::fs::read(&full_path) {
        Ok(content) => {
            let content_type = content_type_for(path);
            write_response_bytes(stream, 200, content_type, &content)
        }
        Err(_) => {
            warn!("frontdoor: {} not found", full_path.display());
            let body = format!("The resource '{path}' was not found.");
            write_response(stream, 404, "text/html", &body)
        }
    }
}

fn content_type_for(path: &str) -> &'static str {
    if path.ends_with(".html") {
        "text/html"
    } else if path.ends_with(".js") {
        "application/javascript"
    } else if path.ends_with(".css") {
        "text/css"
    } else {
        "application/octet-stream"
    }
}

fn write_response(stream: &mut TcpStream, status: u16, content_type: &str, body: &str) -> std::io::Result<()> {
    write_response_bytes(stream, status, content_type, body.as_bytes())
}

fn write_response_bytes(stream: &mut TcpStream, status: u16, content_type: &str, body: &[u8]) -> std::io::Result<()> {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Unknown",
    };
    let header = format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Server: deskcast\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.shutdown(std::net::Shutdown::Write)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_rfc6455_example() {
        // The canonical example from RFC 6455 section 1.3.
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn content_type_table() {
        assert_eq!(content_type_for("/index.html"), "text/html");
        assert_eq!(content_type_for("/app.js"), "application/javascript");
        assert_eq!(content_type_for("/style.css"), "text/css");
        assert_eq!(content_type_for("/logo.png"), "application/octet-stream");
    }

    #[test]
    fn not_found_body_matches_expected_text() {
        let body = format!("The resource '{}' was not found.", "/missing.txt");
        assert_eq!(body, "The resource '/missing.txt' was not found.");
    }

    fn request_over_loopback(web_root: &Path, request: &str) -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let web_root = web_root.to_path_buf();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            handle_connection(stream, &web_root).unwrap();
        });

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(request.as_bytes()).unwrap();
        client.shutdown(std::net::Shutdown::Write).ok();

        let mut response = String::new();
        client.read_to_string(&mut response).unwrap();
        server.join().unwrap();
        response
    }

    #[test]
    fn serves_existing_file_with_200() {
        let dir = std::env::temp_dir().join(format!("deskcast-frontdoor-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.html"), b"<html>hi</html>").unwrap();

        let response = request_over_loopback(&dir, "GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.ends_with("<html>hi</html>"), "{response}");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn serves_404_for_missing_file() {
        let dir = std::env::temp_dir().join(format!("deskcast-frontdoor-test-404-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let response = request_over_loopback(&dir, "GET /nope.txt HTTP/1.1\r\nHost: x\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 404 Not Found"), "{response}");
        assert!(response.contains("The resource '/nope.txt' was not found."));

        std::fs::remove_dir_all(&dir).ok();
    }
}
