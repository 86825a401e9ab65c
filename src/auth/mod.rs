#[cfg(test)]
mod tests;

use reqwest::RequestBuilder;
use tracing::warn;

const PEM_LINE_WIDTH: usize = 64;

/// Outcome of private-key normalization. `wrapped_fallback` is set when no PEM
/// envelope was found and the input was wrapped as `PRIVATE KEY` best-effort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedKey {
    pub pem: String,
    pub wrapped_fallback: bool,
}

/// Signing identifiers plus the normalized key material. The signing provider
/// itself is built by the host; this struct only carries what it needs.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user_id: String,
    pub tenancy_id: String,
    pub key_fingerprint: String,
    pub private_key_pem: String,
    pub passphrase: Option<String>,
    pub region: String,
}

impl Credentials {
    /// Builds credentials from raw inputs, normalizing the key blob along the way.
    #[inline]
    pub fn new(
        user_id: impl Into<String>,
        tenancy_id: impl Into<String>,
        key_fingerprint: impl Into<String>,
        raw_private_key: &str,
        passphrase: Option<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            tenancy_id: tenancy_id.into(),
            key_fingerprint: key_fingerprint.into(),
            private_key_pem: normalize_private_key(raw_private_key).pem,
            passphrase,
            region: region.into(),
        }
    }
}

/// Decorates outgoing requests with authentication; implemented by whatever
/// signing scheme the host wires in. Construction of the real OCI request
/// signer is out of scope here.
pub trait RequestAuthorizer: Send + Sync {
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder;
}

/// Plain bearer-token authorizer, used for session-token setups and in tests.
#[derive(Debug, Clone)]
pub struct BearerAuthorizer {
    token: String,
}

impl BearerAuthorizer {
    #[inline]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl RequestAuthorizer for BearerAuthorizer {
    #[inline]
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", format!("Bearer {}", self.token))
    }
}

/// Normalizes a possibly mangled PEM private key blob into canonical PEM with
/// 64-character body lines.
///
/// Keys pasted through UIs routinely arrive with escaped `\n` sequences,
/// collapsed whitespace, or stripped armor. If a matching
/// `-----BEGIN <TYPE>-----`/`-----END <TYPE>-----` envelope is present the body
/// is rechunked and re-armored with the original type; otherwise the whole
/// input is treated as key material and wrapped as `PRIVATE KEY` (non-fatal,
/// logged). Empty input maps to empty output. Idempotent.
#[inline]
pub fn normalize_private_key(raw: &str) -> NormalizedKey {
    let unescaped = raw.replace("\\n", "\n");
    let trimmed = unescaped.trim();

    if trimmed.is_empty() {
        return NormalizedKey {
            pem: String::new(),
            wrapped_fallback: false,
        };
    }

    if let Some((label, body)) = extract_envelope(trimmed) {
        return NormalizedKey {
            pem: armor(&label, &strip_whitespace(&body)),
            wrapped_fallback: false,
        };
    }

    warn!("No PEM envelope found in private key material; wrapping as PRIVATE KEY");
    NormalizedKey {
        pem: armor("PRIVATE KEY", &strip_whitespace(trimmed)),
        wrapped_fallback: true,
    }
}

/// Finds a `BEGIN <TYPE>`/`END <TYPE>` envelope with matching types and returns
/// the label and the enclosed body.
fn extract_envelope(input: &str) -> Option<(String, String)> {
    let begin_start = input.find("-----BEGIN ")?;
    let label_start = begin_start + "-----BEGIN ".len();
    let label_len = input.get(label_start..)?.find("-----")?;
    let label = input.get(label_start..label_start + label_len)?.to_string();

    let body_start = label_start + label_len + "-----".len();
    let end_marker = format!("-----END {label}-----");
    let body_len = input.get(body_start..)?.find(&end_marker)?;
    let body = input.get(body_start..body_start + body_len)?.to_string();

    Some((label, body))
}

fn strip_whitespace(input: &str) -> String {
    input.chars().filter(|c| !c.is_whitespace()).collect()
}

fn armor(label: &str, body: &str) -> String {
    let chars: Vec<char> = body.chars().collect();
    let mut out = format!("-----BEGIN {label}-----\n");
    for line in chars.chunks(PEM_LINE_WIDTH) {
        out.extend(line);
        out.push('\n');
    }
    out.push_str(&format!("-----END {label}-----"));
    out
}
