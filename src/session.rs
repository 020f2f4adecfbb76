//! First-party session carried in two signed cookies.

use std::fmt;

use tower_cookies::cookie::SameSite;
use tower_cookies::cookie::time::{Duration, OffsetDateTime};
use tower_cookies::{Cookie, Cookies, Key};

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const USER_ID_COOKIE: &str = "user_id";

const SESSION_TTL: Duration = Duration::hours(24);

#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub user_id: i64,
}

impl Session {
    pub fn new(access_token: impl Into<String>, user_id: i64) -> Self {
        Self {
            access_token: access_token.into(),
            user_id,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Writes, reads and clears the session cookies.
///
/// Both cookies are signed with `key`; a cookie whose signature does not
/// verify reads as absent.
#[derive(Clone)]
pub struct SessionCodec {
    key: Key,
    secure: bool,
}

impl fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCodec")
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

impl SessionCodec {
    pub fn new(key: Key) -> Self {
        Self { key, secure: false }
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Builds the unsigned session cookies expiring 24 hours after `now`.
    pub fn cookies_for(&self, session: &Session, now: OffsetDateTime) -> [Cookie<'static>; 2] {
        let expires = now + SESSION_TTL;
        let access_token = Cookie::build((ACCESS_TOKEN_COOKIE, session.access_token.clone()))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .expires(expires)
            .build();
        let user_id = Cookie::build((USER_ID_COOKIE, session.user_id.to_string()))
            .path("/")
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .expires(expires)
            .build();
        [access_token, user_id]
    }

    pub fn issue(&self, cookies: &Cookies, session: &Session) {
        let signed = cookies.signed(&self.key);
        for cookie in self.cookies_for(session, OffsetDateTime::now_utc()) {
            signed.add(cookie);
        }
    }

    pub fn read(&self, cookies: &Cookies) -> Option<Session> {
        let signed = cookies.signed(&self.key);
        decode(signed.get(ACCESS_TOKEN_COOKIE), signed.get(USER_ID_COOKIE))
    }

    /// Overwrites both cookies with expired blanks, whether or not the
    /// request carried a session.
    pub fn clear(&self, cookies: &Cookies) {
        for name in [ACCESS_TOKEN_COOKIE, USER_ID_COOKIE] {
            cookies.add(expired(name, self.secure));
        }
    }
}

fn decode(access_token: Option<Cookie<'_>>, user_id: Option<Cookie<'_>>) -> Option<Session> {
    let access_token = access_token?.value().to_string();
    let user_id = user_id?.value().parse().ok()?;
    if access_token.is_empty() {
        return None;
    }
    Some(Session {
        access_token,
        user_id,
    })
}

// Keeps the attributes the cookie was issued with.
fn expired(name: &'static str, secure: bool) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .http_only(name == ACCESS_TOKEN_COOKIE)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(Duration::ZERO)
        .expires(OffsetDateTime::UNIX_EPOCH)
        .build()
}
