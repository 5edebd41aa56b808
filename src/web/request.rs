//! Request parameters and multipart form encoding

use crate::web::transport::TransportRequest;
use std::collections::HashMap;
use uuid::Uuid;

/// Callback invoked exactly once per request with `(status, headers, body)`.
pub type WebCallback = Box<dyn FnOnce(u16, HashMap<String, String>, String) + Send>;

/// Identifier handed back for every submitted request and echoed in events.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub(crate) u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RequestId({})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// One binary attachment of a form request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormBinaryData {
    pub field_name: String,
    pub data: Vec<u8>,
    /// Defaults to `file.dat` when empty
    pub file_name: String,
    /// Defaults to `application/octet-stream` when empty
    pub mime_type: String,
}

impl FormBinaryData {
    pub fn new(field_name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            field_name: field_name.into(),
            data: data.into(),
            file_name: String::new(),
            mime_type: String::new(),
        }
    }

    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    Raw {
        content_type: String,
        payload: Vec<u8>,
    },
    Form {
        fields: Vec<(String, String)>,
        binary: Vec<FormBinaryData>,
    },
}

/// Everything a worker needs to run one request.
pub struct RequestParameters {
    pub uri: String,
    pub method: Method,
    pub body: RequestBody,
    pub cookie: Option<String>,
    pub callback: Option<WebCallback>,
}

impl std::fmt::Debug for RequestParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestParameters")
            .field("uri", &self.uri)
            .field("method", &self.method)
            .field("body", &self.body)
            .field("cookie", &self.cookie)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl RequestParameters {
    pub fn get(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            method: Method::Get,
            body: RequestBody::Empty,
            cookie: None,
            callback: None,
        }
    }

    pub fn post(
        uri: impl Into<String>,
        content_type: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            uri: uri.into(),
            method: Method::Post,
            body: RequestBody::Raw {
                content_type: content_type.into(),
                payload: payload.into(),
            },
            cookie: None,
            callback: None,
        }
    }

    /// Form fields are sorted by name so the encoded body is stable.
    pub fn form(
        uri: impl Into<String>,
        fields: &HashMap<String, String>,
        binary: &[FormBinaryData],
    ) -> Self {
        let mut fields: Vec<(String, String)> = fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        fields.sort();

        Self {
            uri: uri.into(),
            method: Method::Post,
            body: RequestBody::Form {
                fields,
                binary: binary.to_vec(),
            },
            cookie: None,
            callback: None,
        }
    }

    pub fn cookie(mut self, cookie: Option<&str>) -> Self {
        self.cookie = cookie.map(str::to_string);
        self
    }

    pub fn callback(mut self, callback: Option<WebCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Splits the parameters into the wire-facing request and the callback.
    pub(crate) fn into_transport(
        self,
        user_agent: Option<&str>,
    ) -> (TransportRequest, Option<WebCallback>) {
        let mut headers = Vec::new();
        if let Some(agent) = user_agent {
            headers.push(("User-Agent".to_string(), agent.to_string()));
        }
        if let Some(cookie) = self.cookie {
            headers.push(("Cookie".to_string(), cookie));
        }

        let body = match self.body {
            RequestBody::Empty => Vec::new(),
            RequestBody::Raw {
                content_type,
                payload,
            } => {
                headers.push(("Content-Type".to_string(), content_type));
                payload
            }
            RequestBody::Form { fields, binary } => {
                let boundary = format!("hydrogen-{}", Uuid::new_v4().simple());
                headers.push((
                    "Content-Type".to_string(),
                    format!("multipart/form-data; boundary={}", boundary),
                ));
                encode_multipart(&fields, &binary, &boundary)
            }
        };

        let request = TransportRequest {
            method: self.method,
            uri: self.uri,
            headers,
            body,
        };
        (request, self.callback)
    }
}

/// Percent-escapes `"`, CR and LF so a name cannot end its quoted string or
/// start a new header line.
fn escape_disposition(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => escaped.push_str("%22"),
            '\r' => escaped.push_str("%0D"),
            '\n' => escaped.push_str("%0A"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Encodes string fields then binary parts as `multipart/form-data`.
///
/// Field and file names are percent-escaped where they would break the
/// `Content-Disposition` header.
pub fn encode_multipart(
    fields: &[(String, String)],
    binary: &[FormBinaryData],
    boundary: &str,
) -> Vec<u8> {
    let mut body = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                escape_disposition(name)
            )
            .as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    for part in binary {
        let file_name = if part.file_name.is_empty() {
            "file.dat"
        } else {
            part.file_name.as_str()
        };
        let mime_type = if part.mime_type.is_empty() {
            "application/octet-stream"
        } else {
            part.mime_type.as_str()
        };

        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                escape_disposition(&part.field_name),
                escape_disposition(file_name)
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
        body.extend_from_slice(&part.data);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}
