//! Cookie policy for the access and refresh token cookies.

use cookie::{Cookie, SameSite};
use time::{Duration, OffsetDateTime};

use crate::config::{CookieConfig, to_time_duration};
use crate::token::TokenPair;

/// Builds `Set-Cookie` values for issued and cleared credentials.
///
/// Both cookies are `HttpOnly` and `SameSite=Lax`. The access cookie uses a
/// max-age of the token lifetime minus a safety margin; the refresh cookie
/// expires together with its token.
#[derive(Debug, Clone)]
pub struct CookiePolicy {
    config: CookieConfig,
    access_max_age: Duration,
}

impl CookiePolicy {
    #[must_use]
    pub fn new(config: CookieConfig, access_token_lifetime: std::time::Duration) -> Self {
        let access_max_age =
            to_time_duration(access_token_lifetime.saturating_sub(config.expiry_margin));
        Self {
            config,
            access_max_age,
        }
    }

    #[must_use]
    pub fn access_cookie_name(&self) -> &str {
        &self.config.access_token_name
    }

    #[must_use]
    pub fn refresh_cookie_name(&self) -> &str {
        &self.config.refresh_token_name
    }

    fn base(&self, name: &str, value: String) -> Cookie<'static> {
        let mut cookie = Cookie::build((name.to_string(), value))
            .path(self.config.path.clone())
            .http_only(true)
            .secure(self.config.secure)
            .same_site(SameSite::Lax)
            .build();
        if let Some(domain) = &self.config.domain {
            cookie.set_domain(domain.clone());
        }
        cookie
    }

    /// Cookies carrying a freshly issued pair.
    #[must_use]
    pub fn issue(&self, pair: &TokenPair) -> [Cookie<'static>; 2] {
        let mut access = self.base(&self.config.access_token_name, pair.access_token.clone());
        access.set_max_age(self.access_max_age);

        let mut refresh = self.base(&self.config.refresh_token_name, pair.refresh_token.clone());
        refresh.set_expires(pair.refresh_expires_at);

        [access, refresh]
    }

    /// Cookies that remove both credentials from the browser.
    #[must_use]
    pub fn clear(&self) -> [Cookie<'static>; 2] {
        [
            &self.config.access_token_name,
            &self.config.refresh_token_name,
        ]
        .map(|name| {
            let mut cookie = self.base(name, String::new());
            cookie.set_max_age(Duration::ZERO);
            cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
            cookie
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> TokenPair {
        let now = OffsetDateTime::now_utc();
        TokenPair {
            access_token: "access".into(),
            access_expires_at: now + Duration::hours(4),
            refresh_token: "refresh".into(),
            refresh_expires_at: now + Duration::days(20),
        }
    }

    fn policy() -> CookiePolicy {
        CookiePolicy::new(
            CookieConfig::default(),
            std::time::Duration::from_secs(4 * 60 * 60),
        )
    }

    #[test]
    fn test_issue_cookie_attributes() {
        let pair = pair();
        let [access, refresh] = policy().issue(&pair);

        assert_eq!(access.name(), "alog_tkn");
        assert_eq!(access.value(), "access");
        assert_eq!(access.max_age(), Some(Duration::seconds(4 * 60 * 60 - 60)));
        assert_eq!(access.http_only(), Some(true));
        assert_eq!(access.secure(), Some(true));
        assert_eq!(access.same_site(), Some(SameSite::Lax));
        assert_eq!(access.path(), Some("/"));

        assert_eq!(refresh.name(), "refresh_tkn");
        assert_eq!(refresh.expires_datetime(), Some(pair.refresh_expires_at));
        assert_eq!(refresh.http_only(), Some(true));
        assert_eq!(refresh.same_site(), Some(SameSite::Lax));
    }

    #[test]
    fn test_clear_sets_zero_max_age() {
        for cookie in policy().clear() {
            assert_eq!(cookie.value(), "");
            assert_eq!(cookie.max_age(), Some(Duration::ZERO));
        }
    }

    #[test]
    fn test_domain_applied() {
        let policy = CookiePolicy::new(
            CookieConfig {
                domain: Some("log.example.com".into()),
                ..Default::default()
            },
            std::time::Duration::from_secs(3600),
        );
        let [access, _] = policy.issue(&pair());
        assert_eq!(access.domain(), Some("log.example.com"));
    }
}
