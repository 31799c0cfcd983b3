use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Key in `data` that marks a failed call
pub const ERROR_CODE_KEY: &str = "error_code";

/// Capabilities the decoder and the client need from a response shape
///
/// Implementors are plain serde targets; `Default` provides the value handed
/// back when the body cannot be decoded.
pub trait GatewayResponse: DeserializeOwned + Default + Send {
    fn is_success(&self) -> bool;

    /// Overrides the shape's own success derivation.
    fn set_success(&mut self, success: bool);

    fn status(&self) -> &str;

    fn message(&self) -> &str;

    /// Raw response body as received.
    fn body(&self) -> &str;

    fn set_body(&mut self, body: String);
}

/// Generic response: `status`, `message` and a free-form `data` map
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CommonJsonResponse {
    #[serde(deserialize_with = "lenient_string")]
    pub status: String,

    /// Text on most gateways, numeric on some
    #[serde(deserialize_with = "lenient_string")]
    pub message: String,

    #[serde(deserialize_with = "text_node_map")]
    pub data: Option<Map<String, Value>>,

    #[serde(skip)]
    body: String,

    #[serde(skip)]
    success: Option<bool>,
}

impl CommonJsonResponse {
    #[must_use]
    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.data.as_ref()
    }

    /// Success as derived from `data`, ignoring any explicit override.
    ///
    /// Missing `data` or an `error_code` entry fails. Otherwise the first
    /// `respcode`/`rspcode` key (any case) with a string or numeric value
    /// decides: `0` succeeds, anything else fails. No code means success.
    #[must_use]
    pub fn derived_success(&self) -> bool {
        let Some(data) = &self.data else {
            return false;
        };
        if data.contains_key(ERROR_CODE_KEY) {
            return false;
        }

        data.iter()
            .filter(|(key, _)| {
                key.eq_ignore_ascii_case("respcode") || key.eq_ignore_ascii_case("rspcode")
            })
            .find_map(|(_, value)| response_code_is_zero(value))
            .unwrap_or(true)
    }
}

impl GatewayResponse for CommonJsonResponse {
    fn is_success(&self) -> bool {
        self.success.unwrap_or_else(|| self.derived_success())
    }

    fn set_success(&mut self, success: bool) {
        self.success = Some(success);
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn message(&self) -> &str {
        &self.message
    }

    fn body(&self) -> &str {
        &self.body
    }

    fn set_body(&mut self, body: String) {
        self.body = body;
    }
}

/// `Some(is_zero)` for string and numeric codes, `None` for other types.
///
/// Fractional numbers count by their integer part.
fn response_code_is_zero(value: &Value) -> Option<bool> {
    match text_node(value) {
        Value::String(code) => Some(code == "0"),
        Value::Number(n) => Some(if let Some(i) = n.as_i64() {
            i == 0
        } else if let Some(u) = n.as_u64() {
            u == 0
        } else {
            n.as_f64().is_some_and(|f| f > -1.0 && f < 1.0)
        }),
        _ => None,
    }
}

/// Accepts a string, a number or a boolean; null and missing become empty.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?.unwrap_or(Value::Null);
    Ok(match text_node(&value) {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Business data with every XML text wrapper replaced by its content.
fn text_node_map<'de, D>(deserializer: D) -> Result<Option<Map<String, Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    let data = Option::<Map<String, Value>>::deserialize(deserializer)?;
    Ok(data.map(|map| {
        map.into_iter()
            .map(|(key, value)| (key, strip_text_nodes(value)))
            .collect()
    }))
}

fn strip_text_nodes(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            if map.len() == 1
                && let Some(inner) = map.remove("$text").or_else(|| map.remove("$value"))
            {
                return strip_text_nodes(inner);
            }
            Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, strip_text_nodes(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(strip_text_nodes).collect()),
        other => other,
    }
}

/// XML text content can arrive as a `{"$text": ..}` map.
fn text_node(value: &Value) -> &Value {
    match value {
        Value::Object(map) if map.len() == 1 => map
            .get("$text")
            .or_else(|| map.get("$value"))
            .unwrap_or(value),
        _ => value,
    }
}
