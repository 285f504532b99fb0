//! Request and response types flowing through dispatch channels.
//!
//! The dispatch core never decodes bodies. The only thing it reads from a
//! [`Response`] is its status code, which feeds the AIMD feedback loop via
//! [`Response::is_qos_status`] and [`Response::is_server_error`].

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use std::fmt;

/// Static description of a logical RPC endpoint.
///
/// Endpoints are typically generated once per service interface and shared
/// for the lifetime of the process, so all identifying fields are `'static`.
///
/// # Example
///
/// ```rust
/// use tower_dispatch_core::Endpoint;
/// use http::Method;
///
/// let endpoint = Endpoint::new("catalog", "getItem", Method::GET).with_version("1.2.0");
/// assert_eq!(endpoint.service_name(), "catalog");
/// assert_eq!(endpoint.to_string(), "catalog.getItem");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    service_name: &'static str,
    endpoint_name: &'static str,
    version: &'static str,
    method: Method,
}

impl Endpoint {
    /// Creates a new endpoint description with version `0.0.0`.
    pub fn new(service_name: &'static str, endpoint_name: &'static str, method: Method) -> Self {
        Self {
            service_name,
            endpoint_name,
            version: "0.0.0",
            method,
        }
    }

    /// Sets the version of the service definition this endpoint belongs to.
    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    /// Returns the name of the service this endpoint belongs to.
    pub fn service_name(&self) -> &'static str {
        self.service_name
    }

    /// Returns the endpoint name.
    pub fn endpoint_name(&self) -> &'static str {
        self.endpoint_name
    }

    /// Returns the service definition version.
    pub fn version(&self) -> &'static str {
        self.version
    }

    /// Returns the HTTP method used to invoke this endpoint.
    pub fn method(&self) -> &Method {
        &self.method
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service_name, self.endpoint_name)
    }
}

/// An outbound request.
///
/// Cloning is cheap: the body is reference counted. Channels that admit a
/// request clone it; refused requests stay with their owner.
#[derive(Debug, Clone, Default)]
pub struct Request {
    headers: HeaderMap,
    path_params: Vec<(String, String)>,
    body: Option<Bytes>,
}

impl Request {
    /// Creates an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Adds a path parameter. Parameters keep insertion order.
    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.push((name.into(), value.into()));
        self
    }

    /// Sets the request body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a mutable reference to the request headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Returns the value of a path parameter.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns all path parameters in insertion order.
    pub fn path_params(&self) -> &[(String, String)] {
        &self.path_params
    }

    /// Returns the request body, if any.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}

/// A response produced by a transport.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Creates a response with the given status, no headers and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// The synthetic response returned when a queue is full: status 429,
    /// no headers, no body.
    pub fn too_many_requests() -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS)
    }

    /// Adds a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the response body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the numeric status code.
    pub fn code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the response body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consumes the response, returning its body.
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Returns true if the server asked the client to back off.
    ///
    /// QoS statuses are 308 (retry elsewhere), 429 (too many requests) and
    /// 503 (unavailable).
    pub fn is_qos_status(&self) -> bool {
        matches!(
            self.status,
            StatusCode::PERMANENT_REDIRECT
                | StatusCode::TOO_MANY_REQUESTS
                | StatusCode::SERVICE_UNAVAILABLE
        )
    }

    /// Returns true for any 5xx status.
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Returns true for any 2xx status.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
