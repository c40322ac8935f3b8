use base64::{engine::general_purpose::STANDARD, engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Base64UrlError {
    #[error("invalid Base64URL length {0}")]
    InvalidLength(usize),

    #[error("invalid Base64URL data: {0}")]
    Decode(#[from] base64::DecodeError),
}

pub fn encode_base64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decodes unpadded Base64URL by mapping it back to padded standard Base64.
pub fn decode_base64url(data: &str) -> Result<Vec<u8>, Base64UrlError> {
    let padding = match data.len() % 4 {
        0 => "",
        2 => "==",
        3 => "=",
        _ => return Err(Base64UrlError::InvalidLength(data.len())),
    };

    let mut standard: String = data
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();
    standard.push_str(padding);

    Ok(STANDARD.decode(standard)?)
}

/// Header, payload and signature of a dot-separated token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JwtParts<'a> {
    pub header: &'a str,
    pub payload: &'a str,
    pub signature: &'a str,
}

/// Splits into at most three parts; anything else is not a JWT.
pub fn split_jwt(token: &str) -> Option<JwtParts<'_>> {
    let mut parts = token.splitn(3, '.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature)) => Some(JwtParts {
            header,
            payload,
            signature,
        }),
        _ => None,
    }
}

/// Decodes one segment for display, pretty-printing it when it is JSON.
pub fn decode_segment(segment: &str) -> Result<String, Base64UrlError> {
    let bytes = decode_base64url(segment)?;

    match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(json) => Ok(serde_json::to_string_pretty(&json)
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned())),
        Err(_) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
    }
}
