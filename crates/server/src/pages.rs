//! HTML pages rendered into the login popup.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use serde_json::json;

/// The popup pages run one inline script and load nothing else.
pub const AUTH_PAGE_CSP: &str =
    "default-src 'none'; script-src 'unsafe-inline'; style-src 'unsafe-inline'; base-uri 'none'; frame-ancestors 'none'";

pub const MSG_PROVIDER_ERROR: &str =
    "Authentication failed. Please close this window and try again.";
pub const MSG_INVALID_STATE: &str =
    "Authentication session expired. Please close this window and restart login.";
pub const MSG_MISSING_CODE: &str = "Missing authorization code. Please try again.";
pub const MSG_INTERNAL: &str =
    "Unable to complete authentication. Please close this window and try again.";

/// A rendered popup page with its status code.
#[derive(Debug)]
pub struct AuthPage {
    status: StatusCode,
    body: String,
}

impl AuthPage {
    /// Hands the ID token and nonce to `window.opener`, restricted to
    /// `target_origin`, then closes the popup.
    pub fn success(id_token: &str, nonce: &str, target_origin: &str) -> Self {
        let message = json!({
            "type": "authorization_response",
            "payload": { "id_token": id_token, "nonce": nonce },
        });
        let body = format!(
            r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <title>Authentication Complete</title>
  </head>
  <body>
    <script>
      if (window.opener) {{
        window.opener.postMessage({message}, {origin});
      }}
      window.close();
    </script>
    <p>Authentication complete. You may close this window.</p>
  </body>
</html>
"#,
            message = script_json(&message),
            origin = script_json(&json!(target_origin)),
        );
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    pub fn error(status: StatusCode, message: &str) -> Self {
        let body = format!(
            r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <title>Authentication Error</title>
  </head>
  <body>
    <p>{}</p>
  </body>
</html>
"#,
            escape_html(message)
        );
        Self { status, body }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

impl IntoResponse for AuthPage {
    fn into_response(self) -> Response {
        let mut response = (self.status, Html(self.body)).into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(AUTH_PAGE_CSP),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }
}

/// JSON safe to splice into an inline `<script>`.
fn script_json(value: &serde_json::Value) -> String {
    value
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
