use serde::{Deserialize, Deserializer, Serialize};

/// The only signing algorithm accepted by the verifier.
pub const ACCEPTED_ALGORITHM: &str = "HS256";

/// Expected value of the `typ` header, compared case-insensitively.
pub const TOKEN_TYPE: &str = "JWT";

/// JOSE header of a compact token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenHeader {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

/// Claims understood by the verifier. Any other claim in the payload is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer, selects the shared secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Expiration time (unix seconds)
    #[serde(
        default,
        deserialize_with = "deserialize_numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub exp: Option<i64>,
    /// Single-use value obtained from the nonce endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl Claims {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            iss: Some(issuer.into()),
            ..Self::default()
        }
    }

    pub fn with_exp(mut self, exp: i64) -> Self {
        self.exp = Some(exp);
        self
    }

    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }
}

// NumericDate may carry fractional seconds; those are truncated.
fn deserialize_numeric_date<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<serde_json::Number> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(number) => {
            if let Some(seconds) = number.as_i64() {
                Ok(Some(seconds))
            } else if let Some(seconds) = number.as_f64().filter(|s| s.is_finite()) {
                Ok(Some(seconds.trunc() as i64))
            } else {
                Err(serde::de::Error::custom("exp must be a unix timestamp"))
            }
        }
    }
}

/// Issuer identity attached to a request once its token has been verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedIdentity {
    pub issuer: String,
}
