//! Signed session cookies.
//!
//! The cookie value is `<session id>.<hex HMAC-SHA256 of the id>`. A value
//! whose signature doesn't check out is treated as if there were no cookie.

use axum::{
    headers::{Cookie, HeaderMapExt},
    http::{HeaderMap, HeaderValue},
};
use hmac::{digest::InvalidLength, Hmac, Mac};
use log::{debug, error};
use sha2::Sha256;

use crate::model::session;

type HmacSha256 = Hmac<Sha256>;

pub const COOKIE_NAME: &str = "sid";

#[derive(Clone)]
pub struct CookieSigner {
    /// Keyed once, cloned for every signature.
    mac: HmacSha256,
}

impl CookieSigner {
    pub fn new(secret: &[u8]) -> Result<CookieSigner, InvalidLength> {
        Ok(CookieSigner {
            mac: HmacSha256::new_from_slice(secret)?,
        })
    }

    pub fn sign(&self, id: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(id.as_bytes());
        format!("{}.{}", id, hex::encode(mac.finalize().into_bytes()))
    }

    /// The session id inside `value`, if we signed it.
    pub fn verify<'a>(&self, value: &'a str) -> Option<&'a str> {
        let (id, signature) = value.rsplit_once('.')?;
        let signature = hex::decode(signature).ok()?;

        let mut mac = self.mac.clone();
        mac.update(id.as_bytes());
        mac.verify_slice(&signature).ok()?;

        Some(id)
    }

    /// Read and verify the session cookie of a request.
    pub fn session_id(&self, headers: &HeaderMap) -> Option<session::Id> {
        let cookies = headers.typed_get::<Cookie>()?;
        let value = cookies.get(COOKIE_NAME)?;
        match self.verify(value) {
            Some(id) => Some(id.to_string()),
            None => {
                debug!("Ignoring session cookie with a bad signature");
                None
            }
        }
    }

    /// `Set-Cookie` header value for a session.
    pub fn header(&self, id: &str) -> Option<HeaderValue> {
        let cookie = format!(
            "{}={}; HttpOnly; SameSite=Lax; Path=/",
            COOKIE_NAME,
            self.sign(id)
        );
        match HeaderValue::from_str(&cookie) {
            Ok(value) => Some(value),
            Err(err) => {
                error!("Session cookie is not a valid header: {}", err);
                None
            }
        }
    }
}
