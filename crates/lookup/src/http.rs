//! HTTP strategies
//!
//! A single [`HttpStrategy`] type covers every REST endpoint and scraped page
//! in the catalog. URL and body templates accept `{document}` (digits only),
//! `{document_formatted}` and `{kind}` placeholders.

use crate::descriptor::Strategy;
use crate::errors::StrategyError;
use agroadb_data::Subject;
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

/// Header-borne credential
///
/// `token: None` means the operator has not configured it. The strategy
/// then fails with `CredentialsMissing` without touching the network.
#[derive(Clone)]
pub struct Credential {
    pub header: String,
    /// Prefix such as `Bearer` or `APIKey`
    pub scheme: Option<String>,
    pub token: Option<String>,
}

impl Credential {
    pub fn bearer(token: Option<String>) -> Self {
        Self {
            header: "Authorization".to_string(),
            scheme: Some("Bearer".to_string()),
            token,
        }
    }

    pub fn header(header: impl Into<String>, token: Option<String>) -> Self {
        Self {
            header: header.into(),
            scheme: None,
            token,
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    fn header_value(&self) -> Option<String> {
        let token = self.token.as_deref().filter(|t| !t.is_empty())?;
        Some(match &self.scheme {
            Some(scheme) => format!("{} {}", scheme, token),
            None => token.to_string(),
        })
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("header", &self.header)
            .field("scheme", &self.scheme)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Extracts one field from an HTML page: the first capture group wins
#[derive(Debug, Clone)]
pub struct ScrapeRule {
    pub field: String,
    pub pattern: Regex,
}

impl ScrapeRule {
    pub fn new(field: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            field: field.into(),
            pattern: Regex::new(pattern)?,
        })
    }

    fn apply(&self, body: &str) -> Option<String> {
        let captured = self.pattern.captures(body)?.get(1)?.as_str();
        let text = collapse_whitespace(&strip_tags(captured));
        (!text.is_empty()).then_some(text)
    }
}

#[derive(Debug, Clone)]
pub enum ResponseFormat {
    Json,
    /// Scrape an HTML page into a flat JSON object
    Html(Vec<ScrapeRule>),
}

#[derive(Debug, Clone)]
pub enum HttpMethod {
    Get,
    /// POST with a JSON body template
    PostJson(Value),
}

#[derive(Debug, Clone)]
pub struct HttpStrategy {
    name: String,
    client: Client,
    url_template: String,
    method: HttpMethod,
    credential: Option<Credential>,
    headers: Vec<(String, String)>,
    format: ResponseFormat,
}

impl HttpStrategy {
    pub fn get(name: impl Into<String>, client: Client, url_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client,
            url_template: url_template.into(),
            method: HttpMethod::Get,
            credential: None,
            headers: Vec::new(),
            format: ResponseFormat::Json,
        }
    }

    pub fn post_json(
        name: impl Into<String>,
        client: Client,
        url_template: impl Into<String>,
        body: Value,
    ) -> Self {
        Self {
            method: HttpMethod::PostJson(body),
            ..Self::get(name, client, url_template)
        }
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    pub fn url_for(&self, subject: &Subject) -> String {
        render(&self.url_template, subject)
    }

    fn parse_body(&self, body: &str) -> Result<Value, StrategyError> {
        match &self.format {
            ResponseFormat::Json => serde_json::from_str(body)
                .map_err(|e| StrategyError::parse(format!("invalid JSON: {}", e))),
            ResponseFormat::Html(rules) => {
                let fields: Map<String, Value> = rules
                    .iter()
                    .filter_map(|rule| Some((rule.field.clone(), Value::String(rule.apply(body)?))))
                    .collect();
                if fields.is_empty() {
                    Err(StrategyError::parse("no scrape rule matched the page"))
                } else {
                    Ok(Value::Object(fields))
                }
            }
        }
    }
}

#[async_trait]
impl Strategy for HttpStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, subject: &Subject) -> Result<Value, StrategyError> {
        let auth = match &self.credential {
            Some(credential) => match credential.header_value() {
                Some(value) => Some((credential.header.as_str(), value)),
                None => {
                    return Err(StrategyError::credentials(format!(
                        "no {} configured for {}",
                        credential.header, self.name
                    )))
                }
            },
            None => None,
        };

        let url = self.url_for(subject);
        let mut request = match &self.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::PostJson(body) => self.client.post(&url).json(&render_value(body, subject)),
        };
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some((header, value)) = auth {
            request = request.header(header, value);
        }

        debug!(strategy = %self.name, url = %redact_url(&url), "HTTP request");
        let response = request
            .send()
            .await
            .map_err(|e| StrategyError::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, response.headers()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| StrategyError::network(format!("reading body: {}", e)))?;
        self.parse_body(&body)
    }
}

/// Map a non-2xx status to the failure taxonomy
pub fn classify_status(status: StatusCode, headers: &reqwest::header::HeaderMap) -> StrategyError {
    match status.as_u16() {
        401 | 403 => StrategyError::credentials(format!("rejected with HTTP {}", status.as_u16())),
        429 => StrategyError::RateLimited {
            retry_after: headers
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        },
        // a missing record will still be missing on the next attempt
        404 => StrategyError::parse("not found"),
        408 => StrategyError::network("HTTP 408"),
        code if status.is_server_error() => StrategyError::network(format!("HTTP {}", code)),
        code => StrategyError::parse(format!("unexpected HTTP {}", code)),
    }
}

fn render(template: &str, subject: &Subject) -> String {
    template
        .replace("{document_formatted}", &subject.formatted())
        .replace("{document}", subject.digits())
        .replace("{kind}", subject.kind().as_str())
}

fn render_value(value: &Value, subject: &Subject) -> Value {
    match value {
        Value::String(s) => Value::String(render(s, subject)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, subject)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, subject)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Hide the document in logged URLs
fn redact_url(url: &str) -> String {
    match url.split_once('?') {
        Some((path, _)) => format!("{}?…", path),
        None => url.to_string(),
    }
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&nbsp;", " ").replace("&amp;", "&")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cnpj() -> Subject {
        Subject::parse("11.222.333/0001-81").unwrap()
    }

    #[test]
    fn test_render_placeholders() {
        let subject = cnpj();
        assert_eq!(
            render("https://x/{kind}/{document}?f={document_formatted}", &subject),
            "https://x/cnpj/11222333000181?f=11.222.333/0001-81"
        );

        let body = render_value(&json!({"query": {"match": {"doc": "{document}"}}, "size": 10}), &subject);
        assert_eq!(body, json!({"query": {"match": {"doc": "11222333000181"}}, "size": 10}));
    }

    #[test]
    fn test_classify_status() {
        let headers = reqwest::header::HeaderMap::new();
        assert!(classify_status(StatusCode::UNAUTHORIZED, &headers).is_credentials_missing());
        assert!(classify_status(StatusCode::FORBIDDEN, &headers).is_credentials_missing());
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND, &headers),
            StrategyError::parse("not found")
        );
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, &headers),
            StrategyError::Network(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, &headers),
            StrategyError::Parse(_)
        ));

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, &headers),
            StrategyError::RateLimited {
                retry_after: Some(Duration::from_secs(7))
            }
        );
    }

    #[test]
    fn test_scrape_rules() {
        let page = r#"<table><tr><td>Código do imóvel</td><td class="v"> MT-5107925-ABC </td></tr>
            <tr><td>Situação</td><td class="v"><b>Ativo</b></td></tr></table>"#;
        let strategy = HttpStrategy::get("scrape", Client::new(), "http://x").with_format(
            ResponseFormat::Html(vec![
                ScrapeRule::new("codigo_imovel", r#"Código do imóvel</td><td class="v">([^<]+)<"#)
                    .unwrap(),
                ScrapeRule::new("situacao", r#"Situação</td><td class="v">(.*?)</td>"#).unwrap(),
                ScrapeRule::new("area", r"Área: ([\d,]+)").unwrap(),
            ]),
        );

        let value = strategy.parse_body(page).unwrap();
        assert_eq!(value, json!({"codigo_imovel": "MT-5107925-ABC", "situacao": "Ativo"}));

        assert!(matches!(
            strategy.parse_body("<html>maintenance</html>"),
            Err(StrategyError::Parse(_))
        ));
    }

    #[test]
    fn test_credential_debug_hides_token() {
        let credential = Credential::bearer(Some("s3cret".into()));
        assert!(!format!("{:?}", credential).contains("s3cret"));
        assert_eq!(credential.header_value().as_deref(), Some("Bearer s3cret"));
        assert_eq!(Credential::header("chave-api-dados", Some(String::new())).header_value(), None);
    }

    #[tokio::test]
    async fn test_missing_token_skips_network() {
        // unroutable address: any network attempt would surface as Network
        let strategy = HttpStrategy::get("serpro", Client::new(), "http://10.255.255.1/{document}")
            .with_credential(Credential::bearer(None));

        let err = strategy.fetch(&cnpj()).await.unwrap_err();
        assert!(err.is_credentials_missing());
    }
}
