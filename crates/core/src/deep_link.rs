//! Pairing deep links.
//!
//! A link such as `myapp://?adb_validation_sessionid=<uuid>&env=stage`
//! starts a session. Only the query string matters; scheme and path are the
//! host application's business.

use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::session::Environment;

/// Query parameter carrying the session id.
pub const SESSION_ID_PARAM: &str = "adb_validation_sessionid";

/// Optional query parameter selecting the environment.
pub const ENVIRONMENT_PARAM: &str = "env";

/// A parsed pairing link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeepLink {
    pub session_id: Uuid,
    pub environment: Environment,
}

impl DeepLink {
    pub fn parse(link: &str) -> Result<Self> {
        let url = Url::parse(link).map_err(|e| Error::invalid_deep_link(format!("{link}: {e}")))?;

        let mut session_id = None;
        let mut environment = Environment::Prod;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                SESSION_ID_PARAM => session_id = Some(value.into_owned()),
                ENVIRONMENT_PARAM => environment = Environment::from_param(&value),
                _ => {}
            }
        }

        let raw = session_id
            .ok_or_else(|| Error::invalid_deep_link(format!("missing {SESSION_ID_PARAM}")))?;
        let session_id = Uuid::parse_str(&raw)
            .map_err(|_| Error::invalid_deep_link(format!("session id is not a uuid: {raw}")))?;

        Ok(Self {
            session_id,
            environment,
        })
    }
}
