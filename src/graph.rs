//! Mail-service seam and its Microsoft Graph implementation.
//!
//! The pipeline only ever talks to the `MailService` trait; `GraphClient`
//! is the production implementation over hyper. Listing follows
//! `@odata.nextLink` continuations verbatim, and the move/delete batches go
//! through the `$batch` endpoint with caller-tagged sub-requests.

use crate::auth::TokenProvider;
use crate::error::{Error, Result};
use crate::models::{
    BatchOutcome, DeleteRequest, MessagePage, MessageQuery, MessageRecord, MoveRequest, MoveState,
};
use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::{Body, Method, Request};
use hyper_rustls::HttpsConnector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// The remote mail API as the pipeline sees it. Batch calls return one
/// outcome per sub-request, keyed by the caller's token; an `Err` from any
/// method means the call itself could not be made or its envelope was
/// unusable, never an individual item failure.
#[async_trait]
pub trait MailService {
    async fn list_page(
        &self,
        account: &str,
        folder: &str,
        query: &MessageQuery,
        page_token: Option<&str>,
    ) -> Result<MessagePage>;

    async fn batch_move(&self, account: &str, items: &[MoveRequest])
    -> Result<Vec<BatchOutcome>>;

    async fn batch_delete(
        &self,
        account: &str,
        items: &[DeleteRequest],
    ) -> Result<Vec<BatchOutcome>>;
}

#[derive(Clone)]
pub struct GraphClient {
    http: hyper::Client<HttpsConnector<HttpConnector>>,
    auth: Arc<TokenProvider>,
    endpoint: String,
}

impl GraphClient {
    pub fn new(
        http: hyper::Client<HttpsConnector<HttpConnector>>,
        auth: Arc<TokenProvider>,
        endpoint: &str,
    ) -> Self {
        Self {
            http,
            auth,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    fn list_url(&self, account: &str, folder: &str, query: &MessageQuery) -> Result<String> {
        let base = format!(
            "{}/users/{}/mailFolders/{}/messages",
            self.endpoint, account, folder
        );
        let url = Url::parse_with_params(
            &base,
            &[
                ("$filter", build_filter(query)),
                ("$select", build_select(query.include_body).to_string()),
                ("$top", query.page_size.to_string()),
            ],
        )?;
        Ok(url.into())
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let token = self.auth.bearer().await?;
        let req = Request::builder()
            .method(Method::GET)
            .uri(url)
            .header("authorization", format!("Bearer {token}"))
            .header("accept", "application/json")
            .body(Body::empty())?;
        let resp = self.http.request(req).await?;
        let status = resp.status().as_u16();
        let bytes = hyper::body::to_bytes(resp.into_body()).await?;
        if !(200..300).contains(&status) {
            return Err(Error::Query {
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(bytes.to_vec())
    }

    /// One `$batch` round trip. The envelope must come back 2xx and parse;
    /// per-step statuses inside it are the caller's business.
    async fn execute_batch(&self, steps: Vec<BatchStep>) -> Result<Vec<BatchOutcome>> {
        let token = self.auth.bearer().await?;
        let payload = serde_json::to_vec(&BatchPayload { requests: steps })?;
        let req = Request::builder()
            .method(Method::POST)
            .uri(format!("{}/$batch", self.endpoint))
            .header("authorization", format!("Bearer {token}"))
            .header("content-type", "application/json")
            .header("accept", "application/json")
            .body(Body::from(payload))?;
        let resp = self.http.request(req).await?;
        let status = resp.status().as_u16();
        let bytes = hyper::body::to_bytes(resp.into_body()).await?;
        if !(200..300).contains(&status) {
            return Err(Error::BatchEnvelope(format!(
                "batch endpoint returned {status}: {}",
                String::from_utf8_lossy(&bytes)
            )));
        }
        let parsed: BatchResponsePayload = serde_json::from_slice(&bytes)
            .map_err(|e| Error::BatchEnvelope(format!("unparsable batch envelope: {e}")))?;
        Ok(parsed
            .responses
            .into_iter()
            .map(|step| BatchOutcome {
                token: step.id,
                status: step.status,
                body: step.body,
            })
            .collect())
    }
}

#[async_trait]
impl MailService for GraphClient {
    async fn list_page(
        &self,
        account: &str,
        folder: &str,
        query: &MessageQuery,
        page_token: Option<&str>,
    ) -> Result<MessagePage> {
        // A continuation token is the verbatim nextLink; only the first
        // page is built from the query.
        let url = match page_token {
            Some(link) => link.to_string(),
            None => self.list_url(account, folder, query)?,
        };
        let bytes = self.get(&url).await?;
        let parsed: ListResponse = serde_json::from_slice(&bytes)?;
        Ok(MessagePage {
            records: parsed.value.into_iter().map(into_record).collect(),
            next_page_token: parsed.next_link,
        })
    }

    async fn batch_move(
        &self,
        account: &str,
        items: &[MoveRequest],
    ) -> Result<Vec<BatchOutcome>> {
        let steps = items
            .iter()
            .map(|item| BatchStep {
                id: item.token.clone(),
                method: "POST",
                url: format!("/users/{}/messages/{}/move", account, item.message_id),
                body: Some(serde_json::json!({ "destinationId": item.destination })),
                headers: Some(HashMap::from([(
                    "Content-Type".to_string(),
                    "application/json".to_string(),
                )])),
            })
            .collect();
        self.execute_batch(steps).await
    }

    async fn batch_delete(
        &self,
        account: &str,
        items: &[DeleteRequest],
    ) -> Result<Vec<BatchOutcome>> {
        let steps = items
            .iter()
            .map(|item| BatchStep {
                id: item.token.clone(),
                method: "DELETE",
                url: format!(
                    "/users/{}/mailFolders/deleteditems/messages/{}",
                    account, item.message_id
                ),
                body: None,
                // A plain delete from the trash folder would just re-file
                // the message; the permanent preference bypasses that.
                headers: item.permanent.then(|| {
                    HashMap::from([("Prefer".to_string(), "permanent".to_string())])
                }),
            })
            .collect();
        self.execute_batch(steps).await
    }
}

fn build_filter(query: &MessageQuery) -> String {
    let mut clauses = Vec::new();
    if query.require_attachment {
        clauses.push("hasAttachments eq true".to_string());
    }
    if query.unread_only {
        clauses.push("isRead eq false".to_string());
    }
    clauses.push(format!("receivedDateTime gt {}", query.received_after));
    clauses.join(" and ")
}

fn build_select(include_body: bool) -> &'static str {
    if include_body {
        "subject,body,receivedDateTime,from,toRecipients,isRead"
    } else {
        "subject,receivedDateTime,from,toRecipients,isRead"
    }
}

fn into_record(msg: GraphMessage) -> MessageRecord {
    MessageRecord {
        original_id: msg.id,
        from: msg
            .from
            .and_then(|r| r.email_address)
            .and_then(|a| a.address)
            .unwrap_or_else(|| "Unknown".to_string()),
        to: msg
            .to_recipients
            .into_iter()
            .filter_map(|r| r.email_address.and_then(|a| a.address))
            .collect(),
        subject: msg.subject.unwrap_or_else(|| "No Subject".to_string()),
        received_at: msg.received_date_time.unwrap_or_default(),
        body: msg.body.map(plain_text_body).unwrap_or_default(),
        state: MoveState::Fetched,
    }
}

/// Graph bodies arrive as HTML more often than not; the archive only keeps
/// readable text.
fn plain_text_body(body: ItemBody) -> String {
    let content = body.content.unwrap_or_default();
    let text = match body.content_type.as_deref() {
        Some(kind) if kind.eq_ignore_ascii_case("html") => {
            html2text::from_read(content.as_bytes(), 80).unwrap_or(content)
        }
        _ => content,
    };
    text.trim().to_string()
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    value: Vec<GraphMessage>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    id: String,
    subject: Option<String>,
    body: Option<ItemBody>,
    received_date_time: Option<String>,
    from: Option<Recipient>,
    #[serde(default)]
    to_recipients: Vec<Recipient>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemBody {
    content_type: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Recipient {
    email_address: Option<EmailAddress>,
}

#[derive(Debug, Deserialize)]
struct EmailAddress {
    address: Option<String>,
}

#[derive(Debug, Serialize)]
struct BatchPayload {
    requests: Vec<BatchStep>,
}

#[derive(Debug, Serialize)]
struct BatchStep {
    id: String,
    method: &'static str,
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct BatchResponsePayload {
    #[serde(default)]
    responses: Vec<BatchResponseStep>,
}

#[derive(Debug, Deserialize)]
struct BatchResponseStep {
    id: String,
    status: u16,
    #[serde(default)]
    body: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> MessageQuery {
        MessageQuery {
            received_after: "2026-07-31T00:00:00Z".into(),
            require_attachment: false,
            unread_only: false,
            include_body: true,
            page_size: 10,
        }
    }

    #[test]
    fn filter_is_date_only_by_default() {
        assert_eq!(
            build_filter(&query()),
            "receivedDateTime gt 2026-07-31T00:00:00Z"
        );
    }

    #[test]
    fn filter_clauses_are_and_combined() {
        let mut q = query();
        q.require_attachment = true;
        q.unread_only = true;
        assert_eq!(
            build_filter(&q),
            "hasAttachments eq true and isRead eq false and receivedDateTime gt 2026-07-31T00:00:00Z"
        );
    }

    #[test]
    fn select_omits_body_when_not_archived() {
        assert!(!build_select(false).contains("body"));
        assert!(build_select(true).contains("body"));
    }

    #[test]
    fn list_response_parses_messages_and_next_link() {
        let json = r#"{
            "value": [{
                "id": "m1",
                "subject": "hello",
                "receivedDateTime": "2026-08-01T10:00:00Z",
                "from": {"emailAddress": {"address": "sender@x.com"}},
                "toRecipients": [{"emailAddress": {"address": "rcpt@x.com"}}],
                "body": {"contentType": "text", "content": "plain body"}
            }],
            "@odata.nextLink": "https://graph.microsoft.com/v1.0/next"
        }"#;
        let parsed: ListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.next_link.as_deref(), Some("https://graph.microsoft.com/v1.0/next"));
        let record = into_record(parsed.value.into_iter().next().unwrap());
        assert_eq!(record.original_id, "m1");
        assert_eq!(record.from, "sender@x.com");
        assert_eq!(record.to, vec!["rcpt@x.com".to_string()]);
        assert_eq!(record.body, "plain body");
        assert_eq!(record.state, MoveState::Fetched);
    }

    #[test]
    fn missing_sender_and_subject_get_placeholders() {
        let json = r#"{"value": [{"id": "m2"}]}"#;
        let parsed: ListResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.next_link.is_none());
        let record = into_record(parsed.value.into_iter().next().unwrap());
        assert_eq!(record.from, "Unknown");
        assert_eq!(record.subject, "No Subject");
        assert!(record.to.is_empty());
    }

    #[test]
    fn html_bodies_are_reduced_to_text() {
        let body = ItemBody {
            content_type: Some("html".into()),
            content: Some("<html><body><p>hello there</p></body></html>".into()),
        };
        assert_eq!(plain_text_body(body), "hello there");
    }

    #[test]
    fn batch_responses_keep_their_tokens() {
        let json = r#"{"responses": [
            {"id": "b", "status": 404, "body": {"error": "gone"}},
            {"id": "a", "status": 201, "body": {"id": "new-id"}}
        ]}"#;
        let parsed: BatchResponsePayload = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.responses.len(), 2);
        assert_eq!(parsed.responses[0].id, "b");
        assert_eq!(parsed.responses[0].status, 404);
        assert_eq!(parsed.responses[1].body["id"], "new-id");
    }

    #[test]
    fn delete_steps_serialize_permanent_preference() {
        let step = BatchStep {
            id: "t1".into(),
            method: "DELETE",
            url: "/users/a@x.com/mailFolders/deleteditems/messages/n1".into(),
            body: None,
            headers: Some(HashMap::from([(
                "Prefer".to_string(),
                "permanent".to_string(),
            )])),
        };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["headers"]["Prefer"], "permanent");
        assert!(json.get("body").is_none());
    }
}
