//! `X-License-Key` authentication for the plugin-facing webhook API.

use super::auth::AuthError;
use crate::db::DbProject;
use crate::server::router::ForgeState;

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::HeaderMapExt;
use headers::{Header, HeaderName, HeaderValue};
use moka::sync::Cache;
use std::{sync::Arc, time::Duration};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

static X_LICENSE_KEY: HeaderName = HeaderName::from_static("x-license-key");

/// Typed `X-License-Key` header; blank values do not decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XLicenseKey(pub String);

impl Header for XLicenseKey {
    fn name() -> &'static HeaderName {
        &X_LICENSE_KEY
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = values.next().ok_or_else(headers::Error::invalid)?;
        let key = value
            .to_str()
            .map_err(|_| headers::Error::invalid())?
            .trim();
        if key.is_empty() {
            return Err(headers::Error::invalid());
        }
        Ok(XLicenseKey(key.to_string()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        if let Ok(value) = HeaderValue::from_str(&self.0) {
            values.extend(std::iter::once(value));
        }
    }
}

/// Short-lived license key -> project cache in front of the DB actor.
#[derive(Clone)]
pub struct LicenseCache {
    cache: Cache<String, Arc<DbProject>>,
}

impl LicenseCache {
    pub fn new(ttl_secs: u64, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(ttl_secs.max(1)))
            .max_capacity(max_capacity.max(1))
            .build();
        Self { cache }
    }

    pub fn get(&self, license_key: &str) -> Option<Arc<DbProject>> {
        self.cache.get(license_key)
    }

    pub fn insert(&self, license_key: String, project: Arc<DbProject>) {
        self.cache.insert(license_key, project);
    }
}

/// The project owning the presented license key.
#[derive(Debug, Clone)]
pub struct LicensedProject(pub Arc<DbProject>);

impl FromRequestParts<ForgeState> for LicensedProject {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ForgeState,
    ) -> Result<Self, Self::Rejection> {
        let XLicenseKey(presented) = parts
            .headers
            .typed_get::<XLicenseKey>()
            .ok_or(AuthError::MissingLicense)?;

        if let Some(project) = state.licenses.get(&presented) {
            return Ok(LicensedProject(project));
        }

        let project = match state.db.find_project_by_license(&presented).await {
            Ok(Some(project)) => project,
            Ok(None) => return Err(AuthError::InvalidLicense),
            Err(e) => {
                warn!(error = %e, "license lookup failed");
                return Err(AuthError::Unavailable);
            }
        };

        if !bool::from(project.license_key.as_bytes().ct_eq(presented.as_bytes())) {
            return Err(AuthError::InvalidLicense);
        }

        debug!(project_id = %project.id, "license key cached");
        let project = Arc::new(project);
        state.licenses.insert(presented, project.clone());
        Ok(LicensedProject(project))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    #[test]
    fn license_header_decodes_trimmed_value() {
        let mut headers = HeaderMap::new();
        headers.insert("x-license-key", HeaderValue::from_static("  lic-123 "));
        assert_eq!(
            headers.typed_get::<XLicenseKey>(),
            Some(XLicenseKey("lic-123".to_string()))
        );
    }

    #[test]
    fn blank_license_header_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("x-license-key", HeaderValue::from_static("   "));
        assert_eq!(headers.typed_get::<XLicenseKey>(), None);
        assert_eq!(HeaderMap::new().typed_get::<XLicenseKey>(), None);
    }
}
