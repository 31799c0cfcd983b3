use crate::error::{HttpError, InvalidUriKind};

/// Prefix dropped from API names before they become a path.
const API_NAME_PREFIX: &str = "cn.";

/// Gateway endpoint for an API.
///
/// `base` gets a trailing `/`, a leading `cn.` is dropped from `api_name`,
/// its dots become path separators, and `/v<api_version>` is appended.
///
/// ```
/// assert_eq!(
///     unigw_http::build_gateway_url("https://gw.example.com", "cn.iot.card.status", "1.0"),
///     "https://gw.example.com/iot/card/status/v1.0"
/// );
/// ```
#[must_use]
pub fn build_gateway_url(base: &str, api_name: &str, api_version: &str) -> String {
    let api_name = api_name.strip_prefix(API_NAME_PREFIX).unwrap_or(api_name);
    let api_path = api_name.replace('.', "/");

    let mut url = String::with_capacity(base.len() + api_path.len() + api_version.len() + 3);
    url.push_str(base);
    if !url.ends_with('/') {
        url.push('/');
    }
    url.push_str(&api_path);
    url.push_str("/v");
    url.push_str(api_version);
    url
}

/// Append query parameters to `base`.
///
/// Pairs with an empty key or value are skipped; an existing query is kept.
///
/// # Errors
/// [`HttpError::InvalidUri`] when `base` is not an absolute URL.
pub fn build_get_url(base: &str, params: &[(&str, &str)]) -> Result<String, HttpError> {
    let mut pairs = params
        .iter()
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .peekable();
    if pairs.peek().is_none() {
        return Ok(base.to_owned());
    }

    let mut url = url::Url::parse(base).map_err(|e| HttpError::InvalidUri {
        url: base.to_owned(),
        kind: InvalidUriKind::ParseError,
        reason: e.to_string(),
    })?;
    {
        let mut query = url.query_pairs_mut();
        for (k, v) in pairs {
            query.append_pair(k, v);
        }
    }
    Ok(url.into())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_url_strips_prefix_and_maps_dots() {
        assert_eq!(
            build_gateway_url("http://gw.example.com/", "cn.iot.usernumber.check", "1.1"),
            "http://gw.example.com/iot/usernumber/check/v1.1"
        );
    }

    #[test]
    fn test_gateway_url_adds_missing_slash() {
        assert_eq!(
            build_gateway_url("http://gw.example.com/api", "iot.card.query", "2"),
            "http://gw.example.com/api/iot/card/query/v2"
        );
    }

    #[test]
    fn test_gateway_url_only_strips_leading_prefix() {
        assert_eq!(
            build_gateway_url("http://h/", "iot.cn.query", "1.0"),
            "http://h/iot/cn/query/v1.0"
        );
        assert_eq!(build_gateway_url("http://h/", "cn.", "1"), "http://h//v1");
    }

    #[test]
    fn test_gateway_url_keeps_version_verbatim() {
        assert_eq!(
            build_gateway_url("http://h/", "cn.a.b", "V1.1"),
            "http://h/a/b/vV1.1"
        );
    }

    #[test]
    fn test_get_url_appends_encoded_pairs() {
        let url = build_get_url(
            "http://h/query",
            &[("iccid", "8986 06"), ("", "skip"), ("empty", ""), ("a", "b&c")],
        )
        .unwrap();
        assert_eq!(url, "http://h/query?iccid=8986+06&a=b%26c");
    }

    #[test]
    fn test_get_url_keeps_existing_query() {
        let url = build_get_url("http://h/query?x=1", &[("y", "2")]).unwrap();
        assert_eq!(url, "http://h/query?x=1&y=2");
    }

    #[test]
    fn test_get_url_without_params_is_unchanged() {
        assert_eq!(build_get_url("not a url", &[]).unwrap(), "not a url");
        assert_eq!(build_get_url("http://h/q", &[("k", "")]).unwrap(), "http://h/q");
    }

    #[test]
    fn test_get_url_rejects_relative_base() {
        let err = build_get_url("/relative", &[("k", "v")]).unwrap_err();
        assert!(matches!(
            err,
            HttpError::InvalidUri {
                kind: InvalidUriKind::ParseError,
                ..
            }
        ));
    }
}
