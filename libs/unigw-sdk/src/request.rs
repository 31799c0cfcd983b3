use crate::error::GatewayError;
use crate::response::{CommonJsonResponse, GatewayResponse};
use serde_json::{Map, Value};
use unigw_crypto::token::TRANS_ID_KEY;

/// Declared payload type of an API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApiType {
    /// No declared type; responses are decoded as JSON
    #[default]
    Unspecified,
    Json,
    Xml,
}

impl ApiType {
    /// `""` is unspecified, `"json"` is JSON, any other name is XML.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "" => Self::Unspecified,
            "json" => Self::Json,
            _ => Self::Xml,
        }
    }

    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Unspecified => "",
            Self::Json => "application/json",
            Self::Xml => "text/xml",
        }
    }
}

/// What [`GatewayClient::execute`](crate::GatewayClient::execute) needs from a request
pub trait GatewayRequest: Send {
    /// Shape the response body is decoded into
    type Response: GatewayResponse;

    /// Dot-separated API name, e.g. `cn.iot.usernumber.check`
    fn api_name(&self) -> &str;

    fn api_version(&self) -> &str;

    fn api_type(&self) -> ApiType {
        ApiType::Unspecified
    }

    /// Declared content type; selects the response decoder.
    fn content_type(&self) -> &'static str {
        self.api_type().content_type()
    }

    /// Business parameters, sent under `data`.
    fn params(&self) -> &Map<String, Value>;

    /// Client-side validation, run before signing.
    ///
    /// # Errors
    /// [`GatewayError::Rule`] when a parameter is unacceptable.
    fn check(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    /// Sees the complete signed envelope right before it is serialized.
    fn before_send(&mut self, envelope: &Map<String, Value>);

    /// Wire body; empty means the client serializes the envelope itself.
    ///
    /// The client clears it before every [`before_send`](Self::before_send),
    /// so a hook that sets no text gets the envelope serialized for it.
    fn request_text(&self) -> &str;

    fn set_request_text(&mut self, text: String);

    fn trans_id(&self) -> &str;

    fn set_trans_id(&mut self, trans_id: String);
}

/// Request carrying a free-form JSON parameter map
#[derive(Debug, Clone, Default)]
pub struct CommonJsonRequest {
    api_name: String,
    api_version: String,
    api_type: ApiType,
    params: Map<String, Value>,
    request_text: String,
    trans_id: String,
}

impl CommonJsonRequest {
    #[must_use]
    pub fn new(api_name: impl Into<String>, api_version: impl Into<String>) -> Self {
        Self {
            api_name: api_name.into(),
            api_version: api_version.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_api_type(mut self, api_type: ApiType) -> Self {
        self.api_type = api_type;
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn set_api_name(&mut self, api_name: impl Into<String>) {
        self.api_name = api_name.into();
    }

    pub fn set_api_version(&mut self, api_version: impl Into<String>) {
        self.api_version = api_version.into();
    }

    pub fn set_params(&mut self, params: Map<String, Value>) {
        self.params = params;
    }

    pub fn params_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.params
    }
}

impl GatewayRequest for CommonJsonRequest {
    type Response = CommonJsonResponse;

    fn api_name(&self) -> &str {
        &self.api_name
    }

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn api_type(&self) -> ApiType {
        self.api_type
    }

    fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Keeps the envelope's `trans_id` and its JSON text as the request body.
    fn before_send(&mut self, envelope: &Map<String, Value>) {
        if let Some(Value::String(trans_id)) = envelope.get(TRANS_ID_KEY) {
            self.trans_id.clone_from(trans_id);
        }
        match serde_json::to_string(envelope) {
            Ok(text) => self.request_text = text,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize request envelope");
            }
        }
    }

    fn request_text(&self) -> &str {
        &self.request_text
    }

    fn set_request_text(&mut self, text: String) {
        self.request_text = text;
    }

    fn trans_id(&self) -> &str {
        &self.trans_id
    }

    fn set_trans_id(&mut self, trans_id: String) {
        self.trans_id = trans_id;
    }
}
