use std::time::Duration;

use anyhow::Context;
use log::debug;
use reqwest::{blocking::Client, header};

/// Where the page comes from
pub trait PageFetcher {
    fn fetch(&self, url: &str) -> anyhow::Result<String>;
}

impl<F> PageFetcher for F
where
    F: Fn(&str) -> anyhow::Result<String>,
{
    fn fetch(&self, url: &str) -> anyhow::Result<String> {
        self(url)
    }
}

const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// A blocking http client with a fixed timeout
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static(ACCEPT));
        let client = Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    /// Non-2xx responses are errors
    fn fetch(&self, url: &str) -> anyhow::Result<String> {
        debug!("[HttpFetcher]: GET {url}");
        let res = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("failed to fetch {url}"))?
            .error_for_status()
            .with_context(|| format!("bad status from {url}"))?;
        res.text()
            .with_context(|| format!("failed to read the body of {url}"))
    }
}

#[cfg(test)]
mod test {
    use std::{
        io::{BufRead, BufReader, Write},
        net::TcpListener,
        thread,
    };

    use super::*;

    /// Answer one request with `status` and hand back the request head
    fn serve_once(status: &'static str, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut head = String::new();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                    break;
                }
                head.push_str(&line);
            }
            write!(
                stream,
                "HTTP/1.1 {status}\r\ncontent-type: text/html\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
            head.to_lowercase()
        });
        (url, handle)
    }

    #[test]
    fn test_bad_status_is_an_error() {
        let (url, server) = serve_once("503 Service Unavailable", "down");
        let fetcher = HttpFetcher::new("wos-test/1.0", Duration::from_secs(5)).unwrap();

        let err = fetcher.fetch(&url).unwrap_err();
        assert!(format!("{err:#}").contains("503"), "{err:#}");

        let head = server.join().unwrap();
        assert!(head.contains("user-agent: wos-test/1.0"), "{head}");
        assert!(head.contains(&format!("accept: {ACCEPT}")), "{head}");
    }

    #[test]
    fn test_fetch_body() {
        let (url, server) = serve_once("200 OK", "<h5>Active Codes</h5>");
        let fetcher = HttpFetcher::new("wos-test/1.0", Duration::from_secs(5)).unwrap();

        assert_eq!(fetcher.fetch(&url).unwrap(), "<h5>Active Codes</h5>");
        server.join().unwrap();
    }
}
