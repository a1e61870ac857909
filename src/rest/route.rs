use crate::utils::error::{Result, WumpyError};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Method;
use std::collections::BTreeMap;
use std::fmt;

/// Parameters that split a ratelimit bucket per resource.
pub const MAJOR_PARAMETERS: [&str; 4] = ["channel_id", "guild_id", "webhook_id", "webhook_token"];

/// Everything but the unreserved characters of RFC 3986 gets escaped in a segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// A request target: method, path template and the values filling it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    method: Method,
    template: String,
    params: BTreeMap<String, String>,
}

impl Route {
    pub fn new(method: Method, template: impl Into<String>) -> Self {
        Self {
            method,
            template: template.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// `"{METHOD} {template}"`, shared by every route with the same shape.
    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method, self.template)
    }

    pub fn major_params(&self) -> String {
        MAJOR_PARAMETERS
            .iter()
            .filter_map(|name| self.params.get(*name).map(|v| format!("{}={}", name, v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// The template with every placeholder substituted.
    pub fn path(&self) -> Result<String> {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let end = after.find('}').ok_or_else(|| WumpyError::InvalidRouteError {
                path: self.template.clone(),
                reason: "unterminated placeholder".to_string(),
            })?;

            let name = &after[..end];
            let value = self
                .params
                .get(name)
                .ok_or_else(|| WumpyError::InvalidRouteError {
                    path: self.template.clone(),
                    reason: format!("missing value for '{}'", name),
                })?;
            out.extend(utf8_percent_encode(value, SEGMENT));
            rest = &after[end + 1..];
        }
        out.push_str(rest);

        Ok(out)
    }

    pub fn url(&self, base: &str) -> Result<String> {
        Ok(format!("{}{}", base.trim_end_matches('/'), self.path()?))
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.path() {
            Ok(path) => write!(f, "{} {}", self.method, path),
            Err(_) => write!(f, "{}", self.endpoint()),
        }
    }
}
