//! HTTP transport for the streaming writer
//!
//! Wraps a blocking `reqwest` client. Redirects are not followed by the
//! client; a 3xx reply is handed to the engine like any other reply so the
//! engine decides whether and where to reconnect.

use std::io::{self, Read};
use std::time::Duration;

use fwmigrate_core::error::TransportFailure;
use fwmigrate_core::stream::{Transport, TransportEvent};
use reqwest::blocking::{Client, Response};
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;

/// Body bytes requested per read
const READ_CHUNK: usize = 16 * 1024;

enum Phase {
    Idle,
    Reply,
    Body,
    Closed,
}

/// Blocking HTTP transport
pub struct HttpTransport {
    client: Client,
    response: Option<Response>,
    location: Option<String>,
    buf: Vec<u8>,
    phase: Phase,
}

impl HttpTransport {
    /// Create a transport whose reads give up after `read_timeout`
    pub fn new(read_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(read_timeout)
            .connect_timeout(read_timeout)
            .build()?;
        Ok(Self {
            client,
            response: None,
            location: None,
            buf: vec![0; READ_CHUNK],
            phase: Phase::Idle,
        })
    }
}

fn map_request_error(e: &reqwest::Error) -> TransportFailure {
    if e.is_timeout() {
        TransportFailure::Timeout
    } else if e.is_connect() || e.is_builder() || e.is_request() {
        TransportFailure::ConnectFailed
    } else {
        TransportFailure::Io
    }
}

fn map_read_error(e: &io::Error) -> TransportFailure {
    // The blocking body reader reports its own timeout as an `Other` error
    // wrapping the reqwest error
    let client_timeout = e
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
        .is_some_and(reqwest::Error::is_timeout);

    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportFailure::Timeout,
        _ if client_timeout => TransportFailure::Timeout,
        _ => TransportFailure::Io,
    }
}

impl Transport for HttpTransport {
    fn connect(&mut self, url: &str) -> Result<(), TransportFailure> {
        self.close();
        log::debug!("GET {}", url);

        let response = self.client.get(url).send().map_err(|e| {
            log::error!("request to {} failed: {}", url, e);
            map_request_error(&e)
        })?;

        self.location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        self.response = Some(response);
        self.phase = Phase::Reply;
        Ok(())
    }

    fn next_event(&mut self) -> Result<TransportEvent<'_>, TransportFailure> {
        match self.phase {
            Phase::Idle | Phase::Closed => Err(TransportFailure::UnexpectedEvent),
            Phase::Reply => {
                let response = self.response.as_ref().ok_or(TransportFailure::Io)?;
                let status = response.status().as_u16();
                let content_length = response
                    .content_length()
                    .and_then(|len| u32::try_from(len).ok());
                log::debug!("HTTP {} (content length {:?})", status, content_length);
                self.phase = Phase::Body;
                Ok(TransportEvent::Reply {
                    status,
                    location: self.location.as_deref(),
                    content_length,
                })
            }
            Phase::Body => {
                let response = self.response.as_mut().ok_or(TransportFailure::Io)?;
                let n = loop {
                    match response.read(&mut self.buf) {
                        Ok(n) => break n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            log::error!("read failed: {}", e);
                            return Err(map_read_error(&e));
                        }
                    }
                };
                if n == 0 {
                    self.phase = Phase::Closed;
                    Ok(TransportEvent::Close)
                } else {
                    log::trace!("received {} bytes", n);
                    Ok(TransportEvent::Chunk(&self.buf[..n]))
                }
            }
        }
    }

    fn close(&mut self) {
        self.response = None;
        self.location = None;
        self.phase = Phase::Idle;
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::{ok_response, serve};
    use super::*;
    use fwmigrate_core::flash::NoProgress;
    use fwmigrate_core::stream::{download, DownloadOptions};
    use fwmigrate_dummy::{DummyConfig, DummyFlash};
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_download_follows_redirect_over_http() {
        let body: Vec<u8> = (0..10_000u32).map(|i| (i % 253) as u8).collect();
        let (base, server) = serve(vec![
            b"HTTP/1.1 302 Found\r\nLocation: /fw/v2.bin\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_vec(),
            ok_response(&body),
        ]);

        let mut flash = DummyFlash::new(DummyConfig { size: 64 * 1024 });
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let summary = download(
            &mut flash,
            transport,
            &format!("{}/latest", base),
            &DownloadOptions::new(0x4000, 0x10000),
            &mut NoProgress,
        )
        .unwrap();

        assert_eq!(summary.bytes_received, 10_000);
        assert_eq!(&flash.data()[0x4000..0x4000 + body.len()], &body[..]);
        assert_eq!(server.join().unwrap(), vec!["/latest", "/fw/v2.bin"]);
    }

    #[test]
    fn test_error_status_is_reported() {
        let (base, server) = serve(vec![
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
        ]);

        let mut flash = DummyFlash::new(DummyConfig { size: 64 * 1024 });
        flash.record_ops(true);
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let result = download(
            &mut flash,
            transport,
            &format!("{}/missing.bin", base),
            &DownloadOptions::new(0x4000, 0x10000),
            &mut NoProgress,
        );

        assert_eq!(
            result,
            Err(fwmigrate_core::Error::Transport(TransportFailure::Status(404)))
        );
        assert!(flash.ops().is_empty());
        server.join().unwrap();
    }

    #[test]
    fn test_stalled_body_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/fw.bin", listener.local_addr().unwrap());
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request);
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100000\r\n\r\nfw!")
                .unwrap();
            stream.flush().unwrap();
            // Hold the connection open well past the client timeout
            thread::sleep(Duration::from_secs(4));
        });

        let mut transport = HttpTransport::new(Duration::from_secs(1)).unwrap();
        transport.connect(&url).unwrap();
        assert!(matches!(
            transport.next_event(),
            Ok(TransportEvent::Reply { status: 200, .. })
        ));

        // The bytes sent with the headers may arrive before the stall
        let failure = loop {
            match transport.next_event() {
                Ok(TransportEvent::Chunk(_)) => continue,
                Ok(_) => panic!("body ended instead of stalling"),
                Err(e) => break e,
            }
        };
        assert_eq!(failure, TransportFailure::Timeout);

        transport.close();
        server.join().unwrap();
    }

    #[test]
    fn test_read_error_mapping() {
        assert_eq!(
            map_read_error(&io::Error::from(io::ErrorKind::TimedOut)),
            TransportFailure::Timeout
        );
        assert_eq!(
            map_read_error(&io::Error::from(io::ErrorKind::ConnectionReset)),
            TransportFailure::Io
        );
        assert_eq!(
            map_read_error(&io::Error::other("truncated chunk")),
            TransportFailure::Io
        );
    }

    #[test]
    fn test_connection_refused() {
        // Bind and drop to get a port nobody listens on
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut transport = HttpTransport::new(Duration::from_secs(2)).unwrap();
        assert_eq!(
            transport.connect(&format!("http://127.0.0.1:{}/", port)),
            Err(TransportFailure::ConnectFailed)
        );
    }
}
