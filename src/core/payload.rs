//! Base64 / data-URI handling for image payloads.

use base64::{
    Engine as _,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig, general_purpose},
};

use crate::core::error::ProcessError;

/// Anything shorter than this cannot be a real image.
pub const MIN_IMAGE_BYTES: usize = 100;

const LENIENT_DECODER: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

#[derive(Debug, Clone)]
pub struct DecodedPayload {
    pub bytes: Vec<u8>,
    /// MIME type declared by a `data:` prefix, if there was one.
    pub mime: Option<String>,
}

/// Split `data:<mime>;base64,<body>` into its MIME type and body.
/// Strings without the prefix are returned untouched.
pub fn strip_data_uri(input: &str) -> (Option<&str>, &str) {
    if let Some(rest) = input.strip_prefix("data:") {
        if let Some(idx) = rest.find(";base64,") {
            let mime = &rest[..idx];
            let body = &rest[idx + ";base64,".len()..];
            let mime = if mime.is_empty() { None } else { Some(mime) };
            return (mime, body);
        }
    }
    (None, input)
}

fn is_base64_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'+' || c == b'/' || c == b'='
}

/// Strip, check and decode an image payload.
pub fn decode_image_payload(input: &str) -> Result<DecodedPayload, ProcessError> {
    let (mime, body) = strip_data_uri(input);

    if body.is_empty() || !body.bytes().all(is_base64_char) {
        return Err(ProcessError::InvalidBase64);
    }

    let bytes = LENIENT_DECODER
        .decode(body)
        .map_err(|_| ProcessError::InvalidBase64)?;

    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(ProcessError::PayloadTooSmall);
    }

    Ok(DecodedPayload {
        bytes,
        mime: mime.map(str::to_string),
    })
}

pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        general_purpose::STANDARD.encode(bytes)
    )
}
