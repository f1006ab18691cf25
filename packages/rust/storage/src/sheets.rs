//! Google Sheets API v4 backend.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use leadscout_shared::{LeadScoutError, Replay, Result, RetryPolicy, send_with_retry};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use url::Url;

use crate::SheetBackend;
use crate::auth::GoogleAuth;

pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";

const USER_AGENT: &str = concat!("leadscout/", env!("CARGO_PKG_VERSION"));

/// Cells are stored exactly as given; `+44 ...` or `0161 ...` must not be parsed.
const VALUE_INPUT: &str = "RAW";

/// Last column a sheet can have.
const LAST_COLUMN: &str = "ZZZ";

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// A spreadsheet on Google Sheets, addressed by its id.
pub struct GoogleSheetsBackend {
    client: Client,
    base_url: String,
    spreadsheet_id: String,
    auth: Arc<GoogleAuth>,
    retry: RetryPolicy,
    known_sheets: Mutex<HashSet<String>>,
}

impl GoogleSheetsBackend {
    pub fn new(spreadsheet_id: &str, auth: GoogleAuth) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LeadScoutError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: SHEETS_API_BASE.to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            auth: Arc::new(auth),
            retry: RetryPolicy::default(),
            known_sheets: Mutex::new(HashSet::new()),
        })
    }

    /// Point at another API root (tests use a mock server).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// `{base}/spreadsheets/{segments...}` with each segment percent-encoded.
    fn api_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| LeadScoutError::config(format!("invalid Sheets API URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| LeadScoutError::config("Sheets API URL cannot be a base"))?
            .pop_if_empty()
            .push("spreadsheets")
            .extend(segments);
        Ok(url)
    }

    fn values_url(&self, range: &str) -> Result<Url> {
        self.api_url(&[self.spreadsheet_id.as_str(), "values", range])
    }

    async fn send(&self, request: RequestBuilder, replay: Replay, what: &str) -> Result<Response> {
        let token = self.auth.access_token().await?;
        let response = send_with_retry(request.bearer_auth(token), &self.retry, replay)
            .await
            .map_err(|e| LeadScoutError::StoreIo(format!("{what}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LeadScoutError::StoreIo(format!(
                "{what}: HTTP {status}: {}",
                body.trim()
            )));
        }
        Ok(response)
    }

    async fn sheet_titles(&self) -> Result<Vec<String>> {
        let mut url = self.api_url(&[self.spreadsheet_id.as_str()])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");
        let response = self
            .send(self.client.get(url), Replay::Idempotent, "read spreadsheet")
            .await?;
        let meta: SpreadsheetMeta = response
            .json()
            .await
            .map_err(|e| LeadScoutError::StoreIo(format!("read spreadsheet: {e}")))?;
        Ok(meta.sheets.into_iter().map(|s| s.properties.title).collect())
    }
}

/// A1 range covering a whole sheet.
fn sheet_range(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

/// Column letters for a 1-based column number (`1` is `A`, `27` is `AA`).
fn column_letters(mut column: usize) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        column -= 1;
        letters.push(char::from(b'A' + (column % 26) as u8));
        column /= 26;
    }
    letters.iter().rev().collect()
}

fn cell_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SheetBackend for GoogleSheetsBackend {
    #[instrument(skip(self))]
    async fn ensure_sheet(&self, sheet: &str) -> Result<()> {
        let mut known = self.known_sheets.lock().await;
        if known.contains(sheet) {
            return Ok(());
        }

        let titles = self.sheet_titles().await?;
        if !titles.iter().any(|t| t == sheet) {
            info!(sheet, "worksheet not found, creating it");
            let batch_update = format!("{}:batchUpdate", self.spreadsheet_id);
            let url = self.api_url(&[batch_update.as_str()])?;
            let body = serde_json::json!({
                "requests": [{
                    "addSheet": {
                        "properties": {
                            "title": sheet,
                            "gridProperties": { "rowCount": 100, "columnCount": 20 }
                        }
                    }
                }]
            });
            self.send(
                self.client.post(url).json(&body),
                Replay::ConnectOnly,
                "add sheet",
            )
            .await?;
        }

        known.extend(titles);
        known.insert(sheet.to_string());
        Ok(())
    }

    async fn read_values(&self, sheet: &str) -> Result<Vec<Vec<String>>> {
        let mut url = self.values_url(&sheet_range(sheet))?;
        url.query_pairs_mut().append_pair("majorDimension", "ROWS");

        let response = self
            .send(self.client.get(url), Replay::Idempotent, "read values")
            .await?;
        let range: ValueRange = response
            .json()
            .await
            .map_err(|e| LeadScoutError::StoreIo(format!("read values: {e}")))?;

        let rows: Vec<Vec<String>> = range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect();
        debug!(sheet, rows = rows.len(), "read sheet values");
        Ok(rows)
    }

    /// Appends are not retried once the server may have seen them; a replay
    /// would add the rows twice.
    async fn append_values(&self, sheet: &str, rows: Vec<Vec<String>>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let segment = format!("{}!A1:append", sheet_range(sheet));
        let mut url = self.values_url(&segment)?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", VALUE_INPUT)
            .append_pair("insertDataOption", "INSERT_ROWS");

        let count = rows.len();
        let body = serde_json::json!({ "majorDimension": "ROWS", "values": rows });
        self.send(
            self.client.post(url).json(&body),
            Replay::ConnectOnly,
            "append values",
        )
        .await?;
        info!(sheet, rows = count, "appended rows");
        Ok(())
    }

    /// Writes the new rows over the top of the sheet, then clears whatever lies
    /// below or to the right of them. A failed write leaves the old rows intact.
    async fn overwrite_values(&self, sheet: &str, mut rows: Vec<Vec<String>>) -> Result<()> {
        let range = sheet_range(sheet);

        if rows.is_empty() {
            let clear_url = self.values_url(&format!("{range}:clear"))?;
            self.send(
                self.client.post(clear_url).json(&serde_json::json!({})),
                Replay::Idempotent,
                "clear values",
            )
            .await?;
            return Ok(());
        }

        let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);
        for row in &mut rows {
            row.resize(width, String::new());
        }
        let count = rows.len();

        let segment = format!("{range}!A1");
        let mut url = self.values_url(&segment)?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", VALUE_INPUT);
        let body = serde_json::json!({
            "range": segment,
            "majorDimension": "ROWS",
            "values": rows,
        });
        self.send(
            self.client.put(url).json(&body),
            Replay::Idempotent,
            "write values",
        )
        .await?;

        let clear_url = self.api_url(&[self.spreadsheet_id.as_str(), "values:batchClear"])?;
        let leftovers = serde_json::json!({
            "ranges": [
                format!("{range}!A{}:{LAST_COLUMN}", count + 1),
                format!("{range}!{}1:{LAST_COLUMN}", column_letters(width + 1)),
            ]
        });
        self.send(
            self.client.post(clear_url).json(&leftovers),
            Replay::Idempotent,
            "clear leftover values",
        )
        .await?;
        info!(sheet, rows = count, "rewrote sheet");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> GoogleSheetsBackend {
        GoogleSheetsBackend::new("sheet-123", GoogleAuth::static_token("ya29.test"))
            .unwrap()
            .with_base_url(&server.uri())
            .with_retry(RetryPolicy::none())
    }

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn range_quotes_sheet_name() {
        assert_eq!(sheet_range("leads"), "'leads'");
        assert_eq!(sheet_range("Joe's"), "'Joe''s'");
    }

    #[tokio::test]
    async fn read_values_stringifies_cells() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/spreadsheets/sheet-123/values/.*leads.*$"))
            .and(header("authorization", "Bearer ya29.test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "range": "leads!A1:C3",
                "majorDimension": "ROWS",
                "values": [["Name", "Rating"], ["Acme", 4.5], ["Beta"]]
            })))
            .mount(&server)
            .await;

        let rows = backend(&server).read_values("leads").await.unwrap();
        assert_eq!(rows[1], strings(&["Acme", "4.5"]));
        assert_eq!(rows[2], strings(&["Beta"]));
    }

    #[tokio::test]
    async fn empty_sheet_has_no_values_field() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "range": "leads!A1:Z1000",
                "majorDimension": "ROWS"
            })))
            .mount(&server)
            .await;

        assert!(backend(&server).read_values("leads").await.unwrap().is_empty());
    }

    #[test]
    fn column_letters_roll_over() {
        assert_eq!(column_letters(1), "A");
        assert_eq!(column_letters(26), "Z");
        assert_eq!(column_letters(27), "AA");
        assert_eq!(column_letters(703), "AAA");
    }

    #[tokio::test]
    async fn append_sends_phone_cells_verbatim() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path_regex(r":append$"))
            .and(query_param("valueInputOption", "RAW"))
            .and(body_partial_json(serde_json::json!({
                "values": [["Acme", "+44 161 555 0100"], ["Beta", "0161 555 0101"]]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        backend(&server)
            .append_values(
                "leads",
                vec![
                    strings(&["Acme", "+44 161 555 0100"]),
                    strings(&["Beta", "0161 555 0101"]),
                ],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn append_is_not_repeated_after_server_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path_regex(r":append$"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend(&server).with_retry(RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
        });
        let err = backend
            .append_values("leads", vec![strings(&["Acme"])])
            .await
            .unwrap_err();
        assert!(matches!(err, LeadScoutError::StoreIo(_)));
    }

    #[tokio::test]
    async fn overwrite_writes_padded_rows_then_clears_leftovers() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path_regex(r"^/spreadsheets/sheet-123/values/"))
            .and(query_param("valueInputOption", "RAW"))
            .and(body_partial_json(serde_json::json!({
                "values": [["Name", "Phone"], ["Acme", ""]]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/spreadsheets/sheet-123/values:batchClear"))
            .and(body_partial_json(serde_json::json!({
                "ranges": ["'leads'!A3:ZZZ", "'leads'!C1:ZZZ"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        backend(&server)
            .overwrite_values("leads", vec![strings(&["Name", "Phone"]), strings(&["Acme"])])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_overwrite_leaves_sheet_uncleared() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backendError"))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let err = backend(&server)
            .overwrite_values("leads", vec![strings(&["Name"]), strings(&["Acme"])])
            .await
            .unwrap_err();
        assert!(matches!(err, LeadScoutError::StoreIo(_)));
    }

    #[tokio::test]
    async fn overwrite_with_no_rows_clears_the_sheet() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path_regex(r":clear$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        backend(&server)
            .overwrite_values("leads", Vec::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_sheet_is_added_once() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/spreadsheets/sheet-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sheets": [{ "properties": { "title": "Sheet1" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/spreadsheets/sheet-123:batchUpdate"))
            .and(body_partial_json(serde_json::json!({
                "requests": [{ "addSheet": { "properties": { "title": "leads" } } }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend(&server);
        backend.ensure_sheet("leads").await.unwrap();
        backend.ensure_sheet("leads").await.unwrap();
    }

    #[tokio::test]
    async fn api_error_is_store_io() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("PERMISSION_DENIED"))
            .mount(&server)
            .await;

        let err = backend(&server).read_values("leads").await.unwrap_err();
        assert!(matches!(err, LeadScoutError::StoreIo(_)));
        assert!(err.to_string().contains("PERMISSION_DENIED"));
    }
}
