//! Session identity and connection URL handling.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::deep_link::DeepLink;
use crate::error::{ConnectionError, Error, Result};

/// Base host of the inspection service.
pub const DEFAULT_SERVICE_HOST: &str = "assurance.example.com";

/// Path of the client socket endpoint.
const SOCKET_PATH: &str = "/client/v1";

/// Subdomain prefix of socket hosts (`connect[-env].<host>`).
const CONNECT_LABEL: &str = "connect";

/// Service environment a session lives in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Prod,
    Qa,
    Stage,
    Dev,
}

impl Environment {
    /// Host suffix appended to service subdomains.
    pub fn url_suffix(&self) -> &'static str {
        match self {
            Self::Prod => "",
            Self::Qa => "-qa",
            Self::Stage => "-stage",
            Self::Dev => "-dev",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prod => "prod",
            Self::Qa => "qa",
            Self::Stage => "stage",
            Self::Dev => "dev",
        }
    }

    /// Lenient parse for link parameters; unknown values mean prod.
    pub fn from_param(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        [Self::Prod, Self::Qa, Self::Stage, Self::Dev]
            .into_iter()
            .find(|env| env.url_suffix() == suffix)
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prod" | "" => Ok(Self::Prod),
            "qa" => Ok(Self::Qa),
            "stage" => Ok(Self::Stage),
            "dev" => Ok(Self::Dev),
            other => Err(Error::internal(format!("unknown environment: {other}"))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one session plus the credentials needed to join it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDetails {
    session_id: String,
    client_id: String,
    environment: Environment,
    host: String,
    token: Option<String>,
    org_id: Option<String>,
}

impl SessionDetails {
    pub fn new(
        session_id: impl Into<String>,
        client_id: impl Into<String>,
        environment: Environment,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            client_id: client_id.into(),
            environment,
            host: DEFAULT_SERVICE_HOST.to_string(),
            token: None,
            org_id: None,
        }
    }

    /// Builds unauthenticated details from a pairing deep link.
    pub fn from_deep_link(link: &DeepLink, client_id: impl Into<String>) -> Self {
        Self::new(link.session_id.to_string(), client_id, link.environment)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn org_id(&self) -> Option<&str> {
        self.org_id.as_deref()
    }

    /// Stores the pairing code and org id. Always succeeds.
    pub fn authenticate(&mut self, pin: impl Into<String>, org_id: impl Into<String>) {
        self.token = Some(pin.into());
        self.org_id = Some(org_id.into());
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some() && self.org_id.is_some()
    }

    /// Socket URL for this session; requires pairing code and org id.
    pub fn derive_connection_url(&self) -> std::result::Result<Url, ConnectionError> {
        let token = self.token.as_deref().ok_or(ConnectionError::NoPinCode)?;
        let org_id = self.org_id.as_deref().ok_or(ConnectionError::NoOrgId)?;

        let base = format!(
            "wss://{}{}.{}{}",
            CONNECT_LABEL,
            self.environment.url_suffix(),
            self.host,
            SOCKET_PATH
        );
        let mut url = Url::parse(&base).map_err(|_| ConnectionError::InvalidUrl(base.clone()))?;
        url.query_pairs_mut()
            .append_pair("sessionId", &self.session_id)
            .append_pair("token", token)
            .append_pair("orgId", org_id)
            .append_pair("clientId", &self.client_id);

        Ok(url)
    }

    /// Rebuilds details from a URL produced by [`derive_connection_url`].
    ///
    /// [`derive_connection_url`]: Self::derive_connection_url
    pub fn parse(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| Error::invalid_url(format!("{url}: {e}")))?;

        let full_host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::missing_field("host"))?;
        let (label, base_host) = full_host
            .split_once('.')
            .ok_or_else(|| Error::missing_field("host"))?;
        let suffix = label
            .strip_prefix(CONNECT_LABEL)
            .ok_or_else(|| Error::invalid_url(format!("not a socket host: {full_host}")))?;
        let environment = Environment::from_suffix(suffix)
            .ok_or_else(|| Error::invalid_url(format!("unknown environment in host: {full_host}")))?;
        if base_host.is_empty() {
            return Err(Error::missing_field("host"));
        }

        let query: HashMap<String, String> = parsed.query_pairs().into_owned().collect();
        let required = |key: &str| -> Result<String> {
            query
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| Error::missing_field(key))
        };

        let session_id = required("sessionId")?;
        let client_id = required("clientId")?;
        let org_id = required("orgId")?;
        let token = required("token")?;

        let mut details = Self::new(session_id, client_id, environment).with_host(base_host);
        details.authenticate(token, org_id);
        Ok(details)
    }
}
