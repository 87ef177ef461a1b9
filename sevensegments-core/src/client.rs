//! Client for the 7SEGMENTS API
//!
//! [`SevenSegments`] owns the session state (token, customer, project, target)
//! and turns each operation into a JSON payload handed to a [`Transport`].
//!
//! `track`, `identify` and `update` are fire-and-forget: transport failures are
//! never reported to the caller. `evaluate` waits for the answer and surfaces
//! every failure as an [`Error`].

use serde_json::{json, Map, Value};

use crate::config::{Config, TransportKind};
use crate::customer::{Customer, CustomerIds};
use crate::error::{Error, Result};
use crate::transport::{HttpTransport, SocketTransport, Transport};

/// Default API endpoint
pub const DEFAULT_TARGET: &str = "http://api.7segments.com";

/// Project used until [`SevenSegments::set_project`] is called
pub const DEFAULT_PROJECT: &str = "default";

const EVENTS_PATH: &str = "/crm/events";
const CUSTOMERS_PATH: &str = "/crm/customers";
const EVALUATE_PATH: &str = "/campaigns/automated/evaluate";

/// Event or customer properties. Always serialized as a JSON object.
pub type Properties = Map<String, Value>;

/// 7SEGMENTS API client
pub struct SevenSegments {
    token: String,
    customer_ids: CustomerIds,
    project: String,
    target: String,
    transport: Box<dyn Transport>,
    debug: bool,
}

impl SevenSegments {
    /// Client with default project, target and HTTP transport
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::builder(token).build()
    }

    pub fn builder(token: impl Into<String>) -> SevenSegmentsBuilder {
        SevenSegmentsBuilder::new(token)
    }

    /// Build a client from a loaded [`Config`]
    pub fn from_config(config: &Config) -> Result<Self> {
        // Rejects a bad token before any transport gets constructed.
        config.validate()?;

        let builder = Self::builder(config.token.clone())
            .customer(config.customer.clone())
            .project(config.project.clone())
            .target(config.target.clone())
            .debug(config.debug);

        let transport: Box<dyn Transport> = match config.transport.kind {
            TransportKind::Http => Box::new(HttpTransport::with_timeout(
                config.debug,
                config.transport.timeout(),
            )?),
            TransportKind::Socket => Box::new(SocketTransport::with_timeouts(
                config.debug,
                config.transport.connect_timeout(),
                config.transport.timeout(),
            )?),
        };
        builder.transport(transport).build()
    }

    /// Bind the session to a customer.
    ///
    /// A string binds `{"registered": id}`, a map is used as-is and
    /// [`Customer::Anonymous`] (or `None`) clears the binding.
    pub fn set_customer(&mut self, customer: impl Into<Customer>) {
        self.customer_ids = customer.into().into_ids();
    }

    /// Bind the session to a customer given as untyped JSON.
    ///
    /// Fails for anything other than `null`, a string, or an object of strings.
    pub fn set_customer_value(&mut self, customer: Value) -> Result<()> {
        let customer = Customer::try_from(customer)?;
        self.set_customer(customer);
        Ok(())
    }

    /// Switch the project subsequent events are tracked under
    pub fn set_project(&mut self, project: impl Into<String>) -> Result<()> {
        self.project = validate_project(project.into())?;
        Ok(())
    }

    /// Track a behavioral event. Delivery is best effort.
    ///
    /// Only an empty `event_type` is reported as an error.
    pub fn track(&self, event_type: &str, properties: Option<Properties>) -> Result<()> {
        if event_type.is_empty() {
            return Err(Error::InvalidInput(
                "event type must be a non-empty string".to_string(),
            ));
        }

        let event = json!({
            "project_id": self.project,
            "customer_ids": self.customer_ids,
            "company_id": self.token,
            "type": event_type,
            "properties": properties.unwrap_or_default(),
        });
        self.post_and_forget(EVENTS_PATH, &event);
        Ok(())
    }

    /// Rebind the customer, then send `properties` as an update.
    pub fn identify(&mut self, customer: impl Into<Customer>, properties: Option<Properties>) {
        self.set_customer(customer);
        self.update(properties);
    }

    /// Update properties of the bound customer. Delivery is best effort.
    pub fn update(&self, properties: Option<Properties>) {
        let data = json!({
            "ids": self.customer_ids,
            "company_id": self.token,
            "properties": properties.unwrap_or_default(),
        });
        self.post_and_forget(CUSTOMERS_PATH, &data);
    }

    /// Evaluate automated campaigns for the bound customer.
    ///
    /// With exactly one campaign the result is `data[0]` of the response;
    /// otherwise the whole response object is returned.
    pub fn evaluate<S: AsRef<str>>(
        &self,
        campaigns: &[S],
        customer_properties: Option<Properties>,
    ) -> Result<Value> {
        let campaign_ids: Vec<&str> = campaigns.iter().map(AsRef::as_ref).collect();
        let data = json!({
            "campaigns": campaign_ids,
            "ids": self.customer_ids,
            "company_id": self.token,
            "properties": customer_properties.unwrap_or_default(),
        });

        let url = self.url(EVALUATE_PATH);
        self.log_call(&url, &data);
        let response = self.transport.post(&url, &data)?;

        if !response.is_success() {
            tracing::warn!(
                url = %url,
                status = response.status,
                "Campaign evaluation rejected"
            );
            return Err(Error::Api {
                status: response.status,
                body: response.body,
            });
        }

        let mut parsed: Value = serde_json::from_str(&response.body)?;
        if campaign_ids.len() != 1 {
            return Ok(parsed);
        }

        match parsed.get_mut("data").and_then(|d| d.get_mut(0)) {
            Some(first) => Ok(first.take()),
            None => Err(Error::MalformedResponse(
                "evaluation response has no data[0] entry".to_string(),
            )),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn customer_ids(&self) -> &CustomerIds {
        &self.customer_ids
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.target, path)
    }

    fn post_and_forget(&self, path: &str, payload: &Value) {
        let url = self.url(path);
        self.log_call(&url, payload);
        self.transport.post_and_forget(&url, payload);
    }

    fn log_call(&self, url: &str, payload: &Value) {
        if self.debug {
            tracing::debug!(url = %url, payload = %payload, "7SEGMENTS call");
        }
    }
}

impl std::fmt::Debug for SevenSegments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SevenSegments")
            .field("customer_ids", &self.customer_ids)
            .field("project", &self.project)
            .field("target", &self.target)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SevenSegments`]
pub struct SevenSegmentsBuilder {
    token: String,
    customer: Customer,
    project: String,
    target: String,
    transport: Option<Box<dyn Transport>>,
    debug: bool,
}

impl SevenSegmentsBuilder {
    fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            customer: Customer::Anonymous,
            project: DEFAULT_PROJECT.to_string(),
            target: DEFAULT_TARGET.to_string(),
            transport: None,
            debug: false,
        }
    }

    pub fn customer(mut self, customer: impl Into<Customer>) -> Self {
        self.customer = customer.into();
        self
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    /// Base URL of the API, e.g. `https://api.7segments.com`
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Use a custom transport instead of [`HttpTransport`]
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Log every call's URL and payload at `debug` level
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Validate inputs and create the client.
    ///
    /// The default transport is only created once the token, project and
    /// target have been accepted.
    pub fn build(self) -> Result<SevenSegments> {
        validate_token(&self.token)?;
        let project = validate_project(self.project)?;
        let target = self.target.trim_end_matches('/').to_string();
        if target.is_empty() {
            return Err(Error::InvalidInput(
                "target must be a non-empty URL".to_string(),
            ));
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => Box::new(HttpTransport::new(self.debug)?),
        };

        Ok(SevenSegments {
            token: self.token,
            customer_ids: self.customer.into_ids(),
            project,
            target,
            transport,
            debug: self.debug,
        })
    }
}

fn validate_token(token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(Error::InvalidInput(
            "API token must be a non-empty string".to_string(),
        ));
    }
    Ok(())
}

fn validate_project(project: String) -> Result<String> {
    if project.is_empty() {
        return Err(Error::InvalidInput(
            "project name must be a non-empty string".to_string(),
        ));
    }
    Ok(project)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryTransport, TransportResponse};

    fn client(transport: &MemoryTransport) -> SevenSegments {
        SevenSegments::builder("token-1")
            .transport(transport.clone())
            .build()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let transport = MemoryTransport::new();
        let client = client(&transport);
        assert_eq!(client.token(), "token-1");
        assert_eq!(client.project(), DEFAULT_PROJECT);
        assert_eq!(client.target(), DEFAULT_TARGET);
        assert!(client.customer_ids().is_empty());
    }

    #[test]
    fn test_empty_token_rejected() {
        let result = SevenSegments::builder("")
            .transport(MemoryTransport::new())
            .build();
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(matches!(
            SevenSegments::new(""),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_target_trailing_slash_trimmed() {
        let client = SevenSegments::builder("t")
            .target("https://example.com/")
            .transport(MemoryTransport::new())
            .build()
            .unwrap();
        assert_eq!(client.target(), "https://example.com");
    }

    #[test]
    fn test_set_project() {
        let transport = MemoryTransport::new();
        let mut client = client(&transport);
        client.set_project("shop").unwrap();
        assert_eq!(client.project(), "shop");
        assert!(matches!(client.set_project(""), Err(Error::InvalidInput(_))));
        assert_eq!(client.project(), "shop");
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_track_payload() {
        let transport = MemoryTransport::new();
        let mut client = client(&transport);
        client.set_customer("jane");

        let mut properties = Properties::new();
        properties.insert("price".to_string(), json!(12.5));
        client.track("purchase", Some(properties)).unwrap();

        let request = transport.last_request().unwrap();
        assert!(request.forget);
        assert_eq!(request.url, "http://api.7segments.com/crm/events");
        assert_eq!(
            request.payload,
            json!({
                "project_id": "default",
                "customer_ids": {"registered": "jane"},
                "company_id": "token-1",
                "type": "purchase",
                "properties": {"price": 12.5},
            })
        );
    }

    #[test]
    fn test_track_empty_properties_is_object() {
        let transport = MemoryTransport::new();
        let client = client(&transport);
        client.track("view", None).unwrap();
        client.track("view", Some(Properties::new())).unwrap();

        for request in transport.requests() {
            assert_eq!(request.payload["properties"], json!({}));
            assert_eq!(request.payload["customer_ids"], json!({}));
            let body = request.payload.to_string();
            assert!(body.contains(r#""properties":{}"#));
        }
    }

    #[test]
    fn test_track_rejects_empty_event_type() {
        let transport = MemoryTransport::new();
        let client = client(&transport);
        assert!(matches!(client.track("", None), Err(Error::InvalidInput(_))));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_update_payload() {
        let transport = MemoryTransport::new();
        let client = SevenSegments::builder("tok")
            .customer(CustomerIds::from([("cookie".to_string(), "c1".to_string())]))
            .transport(transport.clone())
            .build()
            .unwrap();
        client.update(None);

        let request = transport.last_request().unwrap();
        assert!(request.forget);
        assert_eq!(request.url, "http://api.7segments.com/crm/customers");
        assert_eq!(
            request.payload,
            json!({"ids": {"cookie": "c1"}, "company_id": "tok", "properties": {}})
        );
    }

    #[test]
    fn test_identify_rebinds_customer() {
        let transport = MemoryTransport::new();
        let mut client = client(&transport);
        client.set_customer("old");

        let mut properties = Properties::new();
        properties.insert("name".to_string(), json!("Jane"));
        client.identify("new", Some(properties));

        assert_eq!(client.customer_ids().get("registered").unwrap(), "new");
        let request = transport.last_request().unwrap();
        assert_eq!(request.payload["ids"], json!({"registered": "new"}));
        assert_eq!(request.payload["properties"], json!({"name": "Jane"}));

        client.identify(Customer::Anonymous, None);
        assert_eq!(transport.last_request().unwrap().payload["ids"], json!({}));
    }

    #[test]
    fn test_set_customer_value() {
        let transport = MemoryTransport::new();
        let mut client = client(&transport);
        client.set_customer_value(json!({"a": "b"})).unwrap();
        assert_eq!(client.customer_ids().get("a").unwrap(), "b");

        assert!(client.set_customer_value(json!(5)).is_err());
        // rejected input leaves the binding untouched
        assert_eq!(client.customer_ids().get("a").unwrap(), "b");

        client.set_customer_value(json!(null)).unwrap();
        assert!(client.customer_ids().is_empty());
    }

    #[test]
    fn test_evaluate_single_campaign_unwraps() {
        let transport = MemoryTransport::new();
        transport.push_json(&json!({"data": [{"id": "camp1", "result": true}]}));
        let client = client(&transport);

        let result = client.evaluate(&["camp1"], None).unwrap();
        assert_eq!(result, json!({"id": "camp1", "result": true}));

        let request = transport.last_request().unwrap();
        assert!(!request.forget);
        assert_eq!(
            request.url,
            "http://api.7segments.com/campaigns/automated/evaluate"
        );
        assert_eq!(
            request.payload,
            json!({"campaigns": ["camp1"], "ids": {}, "company_id": "token-1", "properties": {}})
        );
    }

    #[test]
    fn test_evaluate_many_campaigns_returns_whole_response() {
        let body = json!({"data": [{"id": "camp1"}, {"id": "camp2"}]});
        let transport = MemoryTransport::new();
        transport.push_json(&body);
        let client = client(&transport);

        let result = client
            .evaluate(&["camp1".to_string(), "camp2".to_string()], None)
            .unwrap();
        assert_eq!(result, body);
    }

    #[test]
    fn test_evaluate_no_campaigns() {
        let transport = MemoryTransport::new();
        let client = client(&transport);
        let result = client.evaluate::<&str>(&[], None).unwrap();
        assert_eq!(result, json!({}));
        assert_eq!(transport.last_request().unwrap().payload["campaigns"], json!([]));
    }

    #[test]
    fn test_evaluate_missing_data_is_error() {
        let transport = MemoryTransport::new();
        transport.push_json(&json!({"errors": ["nope"]}));
        transport.push_json(&json!({"data": []}));
        let client = client(&transport);

        assert!(matches!(
            client.evaluate(&["camp1"], None),
            Err(Error::MalformedResponse(_))
        ));
        assert!(matches!(
            client.evaluate(&["camp1"], None),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_evaluate_surfaces_failures() {
        let transport = MemoryTransport::new();
        transport.push_failure("connection refused");
        transport.push_response(TransportResponse::new(500, "boom"));
        transport.push_response(TransportResponse::new(200, "not json"));
        let client = client(&transport);

        assert!(matches!(
            client.evaluate(&["c"], None),
            Err(Error::Transport(_))
        ));
        assert!(matches!(
            client.evaluate(&["c"], None),
            Err(Error::Api { status: 500, .. })
        ));
        assert!(matches!(client.evaluate(&["c"], None), Err(Error::Json(_))));
    }

    #[test]
    fn test_failing_transport_is_silent_for_fire_and_forget() {
        let transport = MemoryTransport::failing("offline");
        let mut client = client(&transport);

        client.track("view", None).unwrap();
        client.update(None);
        client.identify("jane", None);
        assert_eq!(transport.requests().len(), 3);

        assert!(client.evaluate(&["c"], None).is_err());
    }
}
