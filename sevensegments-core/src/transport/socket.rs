//! HTTP/1.1 over a raw TCP socket, with TLS for `https` targets
//!
//! The request is framed by hand and written in a loop that keeps going until
//! every byte has been accepted by the stream. A write error or a stream that
//! stops accepting bytes aborts the request; a truncated request is never
//! reported as sent.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use rustls::{ClientConfig as TlsClientConfig, ClientConnection, RootCertStore, StreamOwned};
use rustls_pki_types::ServerName;
use serde_json::Value;

use super::{log_request, Transport, TransportError, TransportResponse};

/// Connect timeout used unless overridden
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Longest status line or header line accepted
const LINE_LIMIT: usize = 1024;
/// Upper bound on the whole header block
const HEADER_LIMIT: usize = 16 * 1024;
/// Upper bound on a buffered response body
const BODY_LIMIT: usize = 1024 * 1024;

/// Transport speaking HTTP/1.1 directly over `std::net::TcpStream`
pub struct SocketTransport {
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
    tls_config: Arc<TlsClientConfig>,
    debug: bool,
}

impl SocketTransport {
    pub fn new(debug: bool) -> Result<Self, TransportError> {
        Self::with_timeouts(debug, DEFAULT_CONNECT_TIMEOUT, None)
    }

    /// `read_timeout` of `None` blocks until the server answers or closes.
    pub fn with_timeouts(
        debug: bool,
        connect_timeout: Duration,
        read_timeout: Option<Duration>,
    ) -> Result<Self, TransportError> {
        let root_store = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let tls_config = TlsClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| TransportError::Tls(e.to_string()))?
            .with_root_certificates(root_store)
            .with_no_client_auth();

        Ok(Self {
            connect_timeout,
            read_timeout,
            tls_config: Arc::new(tls_config),
            debug,
        })
    }

    fn connect(&self, target: &Target) -> Result<SocketStream, TransportError> {
        let addrs = (target.connect_host(), target.port)
            .to_socket_addrs()
            .map_err(TransportError::Connect)?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(tcp) => {
                    tcp.set_read_timeout(self.read_timeout)
                        .map_err(TransportError::Connect)?;
                    return self.wrap(target, tcp);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(TransportError::Connect(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
        })))
    }

    fn wrap(&self, target: &Target, tcp: TcpStream) -> Result<SocketStream, TransportError> {
        if !target.tls {
            return Ok(SocketStream::Plain(tcp));
        }
        let server_name = ServerName::try_from(target.connect_host())
            .map_err(|e| TransportError::Tls(format!("invalid server name: {}", e)))?
            .to_owned();
        let connection = ClientConnection::new(self.tls_config.clone(), server_name)
            .map_err(|e| TransportError::Tls(e.to_string()))?;
        Ok(SocketStream::Tls(Box::new(StreamOwned::new(connection, tcp))))
    }

    /// Connect and write the full request, returning the open stream.
    fn send(&self, url: &str, payload: &Value) -> Result<SocketStream, TransportError> {
        let target = Target::parse(url)?;
        let body = serde_json::to_vec(payload)?;
        let request = build_request(&target, &body);

        let mut stream = self.connect(&target)?;
        write_request(&mut stream, &request)?;
        Ok(stream)
    }
}

impl Transport for SocketTransport {
    fn post(&self, url: &str, payload: &Value) -> Result<TransportResponse, TransportError> {
        log_request(self.debug, "socket", url, payload);
        let result = self
            .send(url, payload)
            .and_then(|mut stream| read_response(&mut stream));
        if self.debug {
            match &result {
                Ok(response) => tracing::debug!(url = %url, status = response.status, "Request completed"),
                Err(e) => tracing::debug!(url = %url, error = %e, "Request failed"),
            }
        }
        result
    }

    fn post_and_forget(&self, url: &str, payload: &Value) {
        log_request(self.debug, "socket", url, payload);
        if let Err(e) = self.send(url, payload) {
            if self.debug {
                tracing::debug!(url = %url, error = %e, "Fire-and-forget request not sent");
            }
        }
    }
}

impl std::fmt::Debug for SocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketTransport")
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

/// Connection target split out of a URL
#[derive(Debug, PartialEq, Eq)]
struct Target {
    tls: bool,
    host: String,
    port: u16,
    /// Path plus query, always starting with `/`
    path: String,
}

impl Target {
    fn parse(url: &str) -> Result<Self, TransportError> {
        let invalid = |reason: String| TransportError::InvalidUrl {
            url: url.to_string(),
            reason,
        };

        let parsed = reqwest::Url::parse(url).map_err(|e| invalid(e.to_string()))?;
        let tls = match parsed.scheme() {
            "https" => true,
            "http" => false,
            other => return Err(invalid(format!("unsupported scheme '{}'", other))),
        };
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host".to_string()))?
            .to_string();
        let port = parsed.port().unwrap_or(if tls { 443 } else { 80 });

        let mut path = parsed.path().to_string();
        if path.is_empty() {
            path.push('/');
        }
        if let Some(query) = parsed.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Self {
            tls,
            host,
            port,
            path,
        })
    }

    /// Host without IPv6 brackets, for DNS lookup and SNI
    fn connect_host(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }

    /// Value for the `Host` header; the port is omitted when it is the scheme default
    fn host_header(&self) -> String {
        let default_port = if self.tls { 443 } else { 80 };
        if self.port == default_port {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

enum SocketStream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Read for SocketStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            SocketStream::Plain(s) => s.read(buf),
            SocketStream::Tls(s) => s.read(buf),
        }
    }
}

impl Write for SocketStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            SocketStream::Plain(s) => s.write(buf),
            SocketStream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            SocketStream::Plain(s) => s.flush(),
            SocketStream::Tls(s) => s.flush(),
        }
    }
}

fn build_request(target: &Target, body: &[u8]) -> Vec<u8> {
    let head = format!(
        "POST {} HTTP/1.1\r\n\
         Host: {}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n",
        target.path,
        target.host_header(),
        body.len()
    );
    let mut request = Vec::with_capacity(head.len() + body.len());
    request.extend_from_slice(head.as_bytes());
    request.extend_from_slice(body);
    request
}

/// Write all of `request`, accumulating partial writes.
///
/// Returns the number of bytes written, which always equals `request.len()`.
fn write_request<W: Write>(writer: &mut W, request: &[u8]) -> Result<usize, TransportError> {
    let expected = request.len();
    let mut written = 0;

    while written < expected {
        match writer.write(&request[written..]) {
            Ok(0) => return Err(TransportError::PartialWrite { written, expected }),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransportError::Write(e)),
        }
    }

    writer.flush().map_err(TransportError::Write)?;
    Ok(written)
}

fn read_response<R: Read>(reader: R) -> Result<TransportResponse, TransportError> {
    let mut reader = BufReader::new(reader);

    let status_line = read_line_limited(&mut reader, LINE_LIMIT)?;
    if status_line.len() <= 3 {
        return Err(TransportError::ShortResponse(status_line.len()));
    }
    let status = parse_status_line(&status_line)?;

    let mut content_length = None;
    let mut chunked = false;
    let mut header_bytes = 0;
    loop {
        let line = read_line_limited(&mut reader, LINE_LIMIT)?;
        if line.is_empty() {
            return Err(TransportError::MalformedResponse(
                "connection closed inside headers".to_string(),
            ));
        }
        header_bytes += line.len();
        if header_bytes > HEADER_LIMIT {
            return Err(TransportError::ResponseTooLarge {
                limit: HEADER_LIMIT,
            });
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.trim().eq_ignore_ascii_case("content-length") {
            let length = value.parse::<usize>().map_err(|_| {
                TransportError::MalformedResponse(format!("bad Content-Length '{}'", value))
            })?;
            content_length = Some(length);
        } else if name.trim().eq_ignore_ascii_case("transfer-encoding") {
            chunked = value.to_ascii_lowercase().contains("chunked");
        }
    }

    let body = if chunked {
        read_chunked(&mut reader)?
    } else if let Some(length) = content_length {
        if length > BODY_LIMIT {
            return Err(TransportError::ResponseTooLarge { limit: BODY_LIMIT });
        }
        let mut body = vec![0; length];
        reader.read_exact(&mut body).map_err(TransportError::Read)?;
        body
    } else {
        let mut body = Vec::new();
        match reader.take(BODY_LIMIT as u64 + 1).read_to_end(&mut body) {
            Ok(_) => {}
            // TLS peers may close without close_notify; the body ends there.
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {}
            Err(e) => return Err(TransportError::Read(e)),
        }
        if body.len() > BODY_LIMIT {
            return Err(TransportError::ResponseTooLarge { limit: BODY_LIMIT });
        }
        body
    };

    Ok(TransportResponse {
        status,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

/// Read one line (including its `\n`) of at most `limit` bytes.
///
/// Returns an empty string at end of stream.
fn read_line_limited<R: BufRead>(reader: &mut R, limit: usize) -> Result<String, TransportError> {
    let mut buf = Vec::new();
    reader
        .by_ref()
        .take(limit as u64)
        .read_until(b'\n', &mut buf)
        .map_err(TransportError::Read)?;
    if buf.len() == limit && buf.last() != Some(&b'\n') {
        return Err(TransportError::ResponseTooLarge { limit });
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn parse_status_line(line: &str) -> Result<u16, TransportError> {
    let mut parts = line.split_whitespace();
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(TransportError::MalformedResponse(format!(
            "bad status line '{}'",
            line.trim_end()
        )));
    }
    parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            TransportError::MalformedResponse(format!("bad status line '{}'", line.trim_end()))
        })
}

fn read_chunked<R: BufRead>(reader: &mut R) -> Result<Vec<u8>, TransportError> {
    let mut body = Vec::new();
    loop {
        let line = read_line_limited(reader, LINE_LIMIT)?;
        let size_field = line.trim().split(';').next().unwrap_or_default();
        let size = usize::from_str_radix(size_field, 16).map_err(|_| {
            TransportError::MalformedResponse(format!("bad chunk size '{}'", size_field))
        })?;

        if size == 0 {
            // Trailers end with a blank line (or EOF).
            loop {
                let trailer = read_line_limited(reader, LINE_LIMIT)?;
                if trailer.trim().is_empty() {
                    return Ok(body);
                }
            }
        }

        if size > BODY_LIMIT - body.len() {
            return Err(TransportError::ResponseTooLarge { limit: BODY_LIMIT });
        }
        let start = body.len();
        body.resize(start + size, 0);
        reader
            .read_exact(&mut body[start..])
            .map_err(TransportError::Read)?;
        // CRLF closing the chunk
        read_line_limited(reader, LINE_LIMIT)?;
    }
}
