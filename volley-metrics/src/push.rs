use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::Request;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::exposition;
use crate::registry::Registry;

pub type PushResult<T> = std::result::Result<T, PushError>;

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("invalid push gateway url: {0}")]
    InvalidUrl(String),

    #[error("building push request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("push request failed: {0}")]
    Transport(String),

    #[error("push gateway returned status {0}")]
    Status(u16),
}

/// Pushes the registry's exposition to a Prometheus push gateway. Failures
/// are reported, never fatal; the run does not depend on the sink.
#[derive(Debug)]
pub struct Pusher {
    client: Client<HttpConnector, Full<Bytes>>,
    url: hyper::Uri,
}

impl Pusher {
    pub fn new(
        gateway: &str,
        job: &str,
        namespace: Option<&str>,
        id: Option<&str>,
    ) -> PushResult<Self> {
        let mut url = format!("{}/metrics/job/{job}", gateway.trim_end_matches('/'));
        if let Some(namespace) = namespace {
            url.push_str(&format!("/namespace/{namespace}"));
        }
        if let Some(id) = id {
            url.push_str(&format!("/id/{id}"));
        }

        let url: hyper::Uri = url.parse().map_err(|_| PushError::InvalidUrl(url))?;

        // Failed connects should surface promptly, not after the OS-level
        // timeout.
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(3)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self { client, url })
    }

    pub async fn push(&self, registry: &Registry) -> PushResult<()> {
        let body = exposition::render(&registry.snapshot());

        let request = Request::builder()
            .method(hyper::Method::PUT)
            .uri(self.url.clone())
            .header(hyper::header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(Full::new(Bytes::from(body)))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|err| PushError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Err(PushError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_grouped_push_urls() {
        let pusher = Pusher::new(
            "http://localhost:9091/",
            "volley-template",
            Some("staging"),
            Some("run-7"),
        )
        .unwrap();
        assert_eq!(
            pusher.url.to_string(),
            "http://localhost:9091/metrics/job/volley-template/namespace/staging/id/run-7"
        );

        let plain = Pusher::new("http://localhost:9091", "volley-x", None, None).unwrap();
        assert_eq!(
            plain.url.to_string(),
            "http://localhost:9091/metrics/job/volley-x"
        );
    }

    #[test]
    fn rejects_unparsable_urls() {
        assert!(Pusher::new("not a url", "job", None, None).is_err());
    }
}
