use crate::enrichment::EnrichmentRow;
use crate::error::{PipelineError, Result};
use reqwest::blocking::{Client, multipart};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Handle to a gene list stored by the enrichment service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserList {
    #[serde(rename = "userListId")]
    pub user_list_id: u64,
    #[serde(rename = "shortId")]
    pub short_id: String,
}

/// Remote gene set enrichment service.
pub trait EnrichmentService {
    /// Store a gene list and return its handle.
    fn add_list(&self, genes: &[String], description: &str) -> Result<UserList>;

    /// Ranked results of a stored list against one library id.
    fn enrich(&self, user_list_id: u64, library: &str) -> Result<Vec<EnrichmentRow>>;

    /// Browsable link to the results of a stored list.
    fn share_url(&self, short_id: &str) -> String;
}

/// Blocking client for the Enrichr REST API.
///
/// Every failure of a request, whether transport, status or body, is
/// reported as the error kind of the operation; nothing is retried.
pub struct EnrichrClient {
    client: Client,
    base_url: String,
}

impl EnrichrClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("single-enrich/", env!("CARGO_PKG_VERSION"))),
        );

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl EnrichmentService for EnrichrClient {
    fn add_list(&self, genes: &[String], description: &str) -> Result<UserList> {
        let url = format!("{}/addList", self.base_url);
        debug!("POST {} ({} genes)", url, genes.len());

        let submission_error = |reason: String| PipelineError::EnrichmentSubmission {
            description: description.to_string(),
            reason,
        };

        let form = multipart::Form::new()
            .text("list", genes.join("\n"))
            .text("description", description.to_string());
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .map_err(|e| submission_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(submission_error(format!("status {}", status)));
        }
        response
            .json()
            .map_err(|e| submission_error(format!("invalid response: {}", e)))
    }

    fn enrich(&self, user_list_id: u64, library: &str) -> Result<Vec<EnrichmentRow>> {
        let url = format!("{}/enrich", self.base_url);
        debug!("GET {}?userListId={}&backgroundType={}", url, user_list_id, library);

        let fetch_error = |reason: String| PipelineError::EnrichmentFetch {
            list_id: user_list_id,
            library: library.to_string(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .query(&[
                ("userListId", user_list_id.to_string()),
                ("backgroundType", library.to_string()),
            ])
            .send()
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("status {}", status)));
        }
        let body: Value = response
            .json()
            .map_err(|e| fetch_error(format!("invalid response: {}", e)))?;
        let rows = parse_enrich_response(&body, library).map_err(fetch_error)?;
        debug!("{} rows for list {} in {}", rows.len(), user_list_id, library);
        Ok(rows)
    }

    fn share_url(&self, short_id: &str) -> String {
        format!("{}/enrich?dataset={}", self.base_url, short_id)
    }
}

/// Rows of an `/enrich` response, each
/// `[rank, term, p, z, combined, [genes], adjusted p, old p, old adjusted p]`.
pub(crate) fn parse_enrich_response(
    body: &Value,
    library: &str,
) -> std::result::Result<Vec<EnrichmentRow>, String> {
    let entries = body
        .get(library)
        .and_then(Value::as_array)
        .ok_or_else(|| format!("response has no '{}' entry", library))?;

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let fields = entry
                .as_array()
                .ok_or_else(|| format!("row {} is not an array", i))?;
            let number = |index: usize| fields.get(index).and_then(Value::as_f64);

            let rank = number(0).map(|r| r as usize).unwrap_or(i + 1);
            let term = fields
                .get(1)
                .and_then(Value::as_str)
                .ok_or_else(|| format!("row {} has no term name", i))?
                .to_string();
            let p_value = number(2).ok_or_else(|| format!("row {} has no p-value", i))?;
            let overlapping_genes = fields
                .get(5)
                .and_then(Value::as_array)
                .map(|genes| {
                    genes
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            Ok(EnrichmentRow {
                rank,
                term,
                p_value,
                z_score: number(3),
                combined_score: number(4),
                odds_ratio: None,
                fdr: number(6).unwrap_or(p_value),
                overlapping_genes,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};
    use std::time::{Duration, Instant};

    /// Read one HTTP request (head plus body) off `stream`.
    fn read_request(stream: &mut TcpStream) {
        let mut data = Vec::new();
        let mut chunk = [0u8; 4096];
        let mut read_more = |data: &mut Vec<u8>| -> bool {
            match stream.read(&mut chunk) {
                Ok(0) | Err(_) => false,
                Ok(n) => {
                    data.extend_from_slice(&chunk[..n]);
                    true
                }
            }
        };

        let head_end = loop {
            if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                break end;
            }
            if !read_more(&mut data) {
                return;
            }
        };
        let head = String::from_utf8_lossy(&data[..head_end]).to_ascii_lowercase();
        let content_length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok());
        let chunked = head.contains("transfer-encoding: chunked");

        loop {
            let body = &data[head_end + 4..];
            let complete = match content_length {
                Some(len) => body.len() >= len,
                None => !chunked || body.ends_with(b"0\r\n\r\n"),
            };
            if complete || !read_more(&mut data) {
                return;
            }
        }
    }

    /// Answer the first request with `status` and `body`, then keep
    /// listening briefly. The handle yields the number of connections seen.
    fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<usize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
            read_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
            drop(stream);

            listener.set_nonblocking(true).unwrap();
            let mut connections = 1;
            let deadline = Instant::now() + Duration::from_millis(300);
            while Instant::now() < deadline {
                if listener.accept().is_ok() {
                    connections += 1;
                }
                thread::sleep(Duration::from_millis(10));
            }
            connections
        });
        (url, handle)
    }

    fn genes() -> Vec<String> {
        vec!["CDK1".to_string(), "CCNB1".to_string()]
    }

    #[test]
    fn test_parse_enrich_response() {
        let body = json!({
            "KEGG_2019_Human": [
                [1, "Cell cycle", 1e-5, -2.1, 24.2, ["CDK1", "CCNB1"], 1e-3, 0, 0],
                [2, "Apoptosis", 0.02, -1.5, 5.9, ["CASP3"], 0.4, 0, 0]
            ]
        });
        let rows = parse_enrich_response(&body, "KEGG_2019_Human").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].term, "Cell cycle");
        assert_eq!(rows[0].overlapping_genes, vec!["CDK1", "CCNB1"]);
        assert_eq!(rows[1].rank, 2);
        assert_eq!(rows[1].fdr, 0.4);
        assert_eq!(rows[0].z_score, Some(-2.1));
    }

    #[test]
    fn test_parse_missing_library() {
        let body = json!({ "Other": [] });
        assert!(parse_enrich_response(&body, "KEGG_2019_Human").is_err());
    }

    #[test]
    fn test_user_list_json() {
        let list: UserList = serde_json::from_str(r#"{"userListId": 42, "shortId": "abc"}"#).unwrap();
        assert_eq!(list.user_list_id, 42);
        assert_eq!(list.short_id, "abc");
    }

    #[test]
    fn test_share_url() {
        let client = EnrichrClient::new("https://maayanlab.cloud/Enrichr/").unwrap();
        assert_eq!(
            client.share_url("abc"),
            "https://maayanlab.cloud/Enrichr/enrich?dataset=abc"
        );
    }

    #[test]
    fn test_add_list_server_error_is_submission_error() {
        let (url, server) = serve_once("503 Service Unavailable", "");
        let client = EnrichrClient::new(&url).unwrap();
        let err = client.add_list(&genes(), "A vs. rest, upregulated").unwrap_err();
        match err {
            PipelineError::EnrichmentSubmission { description, reason } => {
                assert_eq!(description, "A vs. rest, upregulated");
                assert!(reason.contains("503"), "{}", reason);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(server.join().unwrap(), 1);
    }

    #[test]
    fn test_enrich_server_error_is_fetch_error() {
        let (url, server) = serve_once("500 Internal Server Error", "");
        let client = EnrichrClient::new(&url).unwrap();
        let err = client.enrich(1, "KEGG_2019_Human").unwrap_err();
        match err {
            PipelineError::EnrichmentFetch { list_id, library, reason } => {
                assert_eq!(list_id, 1);
                assert_eq!(library, "KEGG_2019_Human");
                assert!(reason.contains("500"), "{}", reason);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(server.join().unwrap(), 1);
    }

    #[test]
    fn test_malformed_bodies_keep_their_error_kind() {
        let (url, server) = serve_once("200 OK", "not json");
        let client = EnrichrClient::new(&url).unwrap();
        let err = client.add_list(&genes(), "B vs. rest, downregulated").unwrap_err();
        assert!(matches!(err, PipelineError::EnrichmentSubmission { .. }), "{}", err);
        assert_eq!(server.join().unwrap(), 1);

        let (url, server) = serve_once("200 OK", "{\"Other\": []}");
        let client = EnrichrClient::new(&url).unwrap();
        let err = client.enrich(7, "KEGG_2019_Human").unwrap_err();
        assert!(matches!(err, PipelineError::EnrichmentFetch { list_id: 7, .. }), "{}", err);
        assert_eq!(server.join().unwrap(), 1);
    }

    #[test]
    fn test_unreachable_service_keeps_error_kind() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let client = EnrichrClient::new(&url).unwrap();
        let err = client.add_list(&genes(), "A vs. rest, upregulated").unwrap_err();
        assert!(matches!(err, PipelineError::EnrichmentSubmission { .. }), "{}", err);
        let err = client.enrich(3, "ChEA_2016").unwrap_err();
        assert!(matches!(err, PipelineError::EnrichmentFetch { list_id: 3, .. }), "{}", err);
    }
}
