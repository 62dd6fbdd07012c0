//! Ready-to-use [`HttpRequestFn`] backed by `reqwest`, gated behind the
//! `reqwest-loader` feature (spec §6: the engine itself stays
//! transport-agnostic). Mirrors the teacher's own `fetch_fragment`: GET with
//! an `Accept` header, a `Range` header when a byte range is requested, and
//! `error_for_status` to turn non-2xx responses into a typed error.

use std::time::Instant;

use reqwest::header::RANGE;

use crate::error::NetworkError;

use super::{CancellationToken, HttpRequest, HttpRequestFn, HttpResponse};

fn categorize_reqwest_error(err: reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout
    } else if let Some(status) = err.status() {
        NetworkError::Http(status.as_u16())
    } else {
        NetworkError::Other(err.to_string())
    }
}

pub struct ReqwestLoader {
    client: reqwest::Client,
}

impl ReqwestLoader {
    pub fn new(client: reqwest::Client) -> Self {
        ReqwestLoader { client }
    }
}

impl Default for ReqwestLoader {
    fn default() -> Self {
        ReqwestLoader::new(reqwest::Client::new())
    }
}

#[async_trait::async_trait]
impl HttpRequestFn for ReqwestLoader {
    async fn request(&self, request: HttpRequest, cancel: CancellationToken) -> Result<HttpResponse, NetworkError> {
        let started = Instant::now();
        let mut req = self.client.get(&request.url);
        for (name, value) in &request.headers {
            req = req.header(name, value);
        }
        if let Some((start, end)) = request.range {
            req = req.header(RANGE, format!("bytes={start}-{end}"));
        }

        let send = async {
            if cancel.is_cancelled() {
                return Err(NetworkError::Aborted);
            }
            let response = req.send().await.map_err(categorize_reqwest_error)?;
            let response = response.error_for_status().map_err(categorize_reqwest_error)?;
            let data = response.bytes().await.map_err(categorize_reqwest_error)?;
            Ok(data)
        };

        let data = send.await?;
        if cancel.is_cancelled() {
            return Err(NetworkError::Aborted);
        }
        let size = data.len() as u64;
        Ok(HttpResponse { data, size, duration: started.elapsed() })
    }
}
