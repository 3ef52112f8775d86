//! Photo references accepted by the generator

use base64::{engine::general_purpose::STANDARD, Engine as _};
use url::Url;

use crate::server::error::DiagnosisError;

/// Mime type assumed for inline uploads and untyped downloads
pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";

/// Where the photo bytes come from. Immutable for the lifetime of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum PhotoReference {
  Remote(Url),
  Inline { base64: String },
  /// Inline bytes that could not be decoded; generation goes on without an image
  Unreadable { reason: String },
}

impl PhotoReference {
  /// Build a reference from the optional request fields. Inline bytes win
  /// over a URL since they need no network round-trip.
  pub fn from_parts(
    photo_url: Option<&str>,
    image_base64: Option<&str>,
  ) -> Result<Self, DiagnosisError> {
    let photo_url = photo_url.map(str::trim).filter(|value| !value.is_empty());

    if let Some(encoded) = image_base64.map(str::trim).filter(|value| !value.is_empty()) {
      // MIME and base64(1) output wrap lines
      let payload: String = strip_data_url_prefix(encoded)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
      match STANDARD.decode(&payload) {
        Ok(_) => return Ok(Self::Inline { base64: payload }),
        Err(e) if photo_url.is_none() => {
          return Ok(Self::Unreadable { reason: format!("imageBase64 is not valid base64: {e}") });
        }
        Err(e) => tracing::warn!("Ignoring undecodable imageBase64, using photoUrl: {}", e),
      }
    }

    if let Some(raw_url) = photo_url {
      let url = Url::parse(raw_url)
        .map_err(|e| DiagnosisError::validation(format!("photoUrl is not a valid URL: {e}")))?;
      if !matches!(url.scheme(), "http" | "https") {
        return Err(DiagnosisError::validation(format!(
          "photoUrl must use http or https, got '{}'",
          url.scheme()
        )));
      }
      return Ok(Self::Remote(url));
    }

    Err(DiagnosisError::validation("either photoUrl or imageBase64 is required"))
  }
}

/// Render bytes as a `data:` URL the vision model accepts inline
pub fn data_url(mime_type: &str, base64: &str) -> String {
  format!("data:{mime_type};base64,{base64}")
}

fn strip_data_url_prefix(encoded: &str) -> &str {
  match encoded.split_once(";base64,") {
    Some((prefix, payload)) if prefix.starts_with("data:") => payload,
    _ => encoded,
  }
}
