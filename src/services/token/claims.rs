use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Accessible-API claim value meaning "every API".
pub const ALL_APIS: &str = "all";

/// Claim names owned by [`TokenClaims`]. Extension claims with these names are dropped.
pub const REGISTERED_CLAIMS: &[&str] = &[
    "sub",
    "iss",
    "iat",
    "exp",
    "userNo",
    "serviceId",
    "role",
    "auth",
    "apis",
    "provider",
    "nickname",
    "clientIp",
    "deviceCd",
    "deviceStr",
    "uid",
    "tokenType",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Flat claim map carried by access and refresh tokens.
///
/// - access: `sub` is the AES identity envelope.
/// - refresh: `sub` is the plaintext user number, `uid` optionally carries the envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<TokenType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_no: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(
        rename = "auth",
        default,
        deserialize_with = "deserialize_authorities",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub authorities: Vec<String>,
    #[serde(rename = "apis", default, skip_serializing_if = "Vec::is_empty")]
    pub accessible_apis: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(rename = "deviceCd", default, skip_serializing_if = "Option::is_none")]
    pub device_code: Option<String>,
    #[serde(rename = "deviceStr", default, skip_serializing_if = "Option::is_none")]
    pub device_detail: Option<String>,

    // Encrypted identity on refresh tokens.
    #[serde(rename = "uid", default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenClaims {
    pub fn is_refresh(&self) -> bool {
        self.token_type == Some(TokenType::Refresh)
    }
}

/// Collapse a mixed list of numeric and string authority codes into strings.
///
/// Numbers keep their JSON rendering (`7` → `"7"`), strings are trimmed,
/// anything else (null, nested values, empty strings) is dropped. First
/// occurrence wins on duplicates.
pub fn normalize_authorities<I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = Value>,
{
    let mut out: Vec<String> = Vec::new();
    for value in values {
        let authority = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        if !authority.is_empty() && !out.contains(&authority) {
            out.push(authority);
        }
    }
    out
}

fn deserialize_authorities<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Array(items)) => normalize_authorities(items),
        // Some issuers put a single authority or a comma list in place of an array.
        Some(Value::String(s)) => normalize_authorities(s.split(',').map(Value::from)),
        Some(n @ Value::Number(_)) => normalize_authorities([n]),
        _ => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn mixed_authorities_become_strings() {
        let out = normalize_authorities(vec![json!(1), json!("ADMIN"), json!(2.5), json!(null)]);
        assert_eq!(out, vec!["1", "ADMIN", "2.5"]);
    }

    #[test]
    fn duplicate_and_blank_authorities_are_dropped() {
        let out = normalize_authorities(vec![json!("USER"), json!(" USER "), json!(""), json!(3), json!("3")]);
        assert_eq!(out, vec!["USER", "3"]);
    }

    #[test]
    fn claims_parse_mixed_auth_claim_and_keep_extensions() {
        let claims: TokenClaims = serde_json::from_value(json!({
            "sub": "abc",
            "exp": 10,
            "auth": [100, "ADMIN"],
            "tokenType": "access",
            "tenant": "acme"
        }))
        .unwrap();

        assert_eq!(claims.authorities, vec!["100", "ADMIN"]);
        assert_eq!(claims.token_type, Some(TokenType::Access));
        assert_eq!(claims.extra.get("tenant"), Some(&json!("acme")));
        assert!(claims.user_no.is_none());
    }

    #[test]
    fn scalar_auth_claim_is_accepted() {
        let claims: TokenClaims =
            serde_json::from_value(json!({ "exp": 10, "auth": "USER,ADMIN" })).unwrap();
        assert_eq!(claims.authorities, vec!["USER", "ADMIN"]);
    }
}
