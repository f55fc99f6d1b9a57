//! Local stand-in for the game data site, used by tests

use crate::model::Region;
use crate::service::client::{RegionProfile, RegionProfiles};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl MockResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            status: 302,
            headers: vec![("Location".to_string(), location.into())],
            body: String::new(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_cookie(mut self, cookie: &str) -> Self {
        self.headers
            .push(("Set-Cookie".to_string(), format!("{cookie}; Path=/")));
        self
    }
}

type Handler = Arc<dyn Fn(&RecordedRequest) -> MockResponse + Send + Sync>;

/// HTTP/1.1 responder on an ephemeral local port
pub struct MockSite {
    pub base: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockSite {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Handler = Arc::new(handler);

        let recorded = requests.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = handler.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve(stream, handler, recorded).await {
                        log::warn!("Mock site failed to answer a request: {e}");
                    }
                });
            }
        });

        Self { base, requests }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn profile(&self, region: Region) -> RegionProfile {
        let base = &self.base;
        let real = RegionProfile::for_region(region);
        match region {
            Region::Intl => RegionProfile {
                auth_check_url: format!("{base}/common_auth/login?site_id=test"),
                login_page_url: format!("{base}/common_auth/login?site_id=test"),
                login_submit_url: format!("{base}/common_auth/login/sid/"),
                site_base_url: format!("{base}/maimai-mobile/"),
                ..real
            },
            Region::Jp => RegionProfile {
                auth_check_url: format!("{base}/maimai-mobile/"),
                login_page_url: format!("{base}/maimai-mobile/"),
                login_submit_url: format!("{base}/maimai-mobile/submit/"),
                site_base_url: format!("{base}/maimai-mobile/"),
                ..real
            },
        }
    }

    pub fn profiles(&self) -> Arc<RegionProfiles> {
        Arc::new(RegionProfiles {
            intl: self.profile(Region::Intl),
            jp: self.profile(Region::Jp),
        })
    }
}

async fn serve(
    mut stream: TcpStream,
    handler: Handler,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
) -> std::io::Result<()> {
    let Some(request) = read_request(&mut stream).await? else {
        return Ok(());
    };
    let response = handler(&request);
    recorded.lock().unwrap().push(request);

    let mut raw = format!(
        "HTTP/1.1 {} Mock\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        response.body.len()
    );
    for (name, value) in &response.headers {
        raw.push_str(&format!("{name}: {value}\r\n"));
    }
    raw.push_str("\r\n");
    raw.push_str(&response.body);

    stream.write_all(raw.as_bytes()).await?;
    stream.shutdown().await
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<Option<RecordedRequest>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length: usize = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = buf.len().min(header_end + content_length);
    let body = String::from_utf8_lossy(&buf[header_end..body_end]).to_string();

    Ok(Some(RecordedRequest {
        method,
        path,
        headers,
        body,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keeps_serving_after_a_dropped_connection() {
        let site = MockSite::start(|_| MockResponse::ok("home")).await;
        let addr = site.base.trim_start_matches("http://");

        // Half a request, then hang up
        let mut broken = TcpStream::connect(addr).await.unwrap();
        broken
            .write_all(b"GET /maimai-mobile/ HTTP/1.1\r\nHost: x\r\n")
            .await
            .unwrap();
        drop(broken);

        let body = reqwest::get(format!("{}/maimai-mobile/", site.base))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "home");
        assert_eq!(site.requests().len(), 1);
    }
}
