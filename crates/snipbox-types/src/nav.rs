//! Navigation state carried in page query strings: `id` (snippet pages),
//! `tab` and `redirect` (auth page).

use serde::{Deserialize, Serialize};

/// Which form the auth page opens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthTab {
    #[default]
    Signin,
    Signup,
}

impl AuthTab {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Signin => "signin",
            Self::Signup => "signup",
        }
    }

    /// Lenient parse for a page parameter: `login` is accepted as sign-in,
    /// anything unknown is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "signin" | "login" => Some(Self::Signin),
            "signup" => Some(Self::Signup),
            _ => None,
        }
    }
}

/// `GET /auth?tab=&redirect=`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthPageQuery {
    #[serde(default)]
    pub tab: Option<String>,
    /// Where to go once signed in. Same-site only.
    #[serde(default)]
    pub redirect: Option<String>,
}

impl AuthPageQuery {
    pub fn tab(&self) -> AuthTab {
        self.tab.as_deref().and_then(AuthTab::parse).unwrap_or_default()
    }
}

/// Accept a caller-supplied redirect only if it stays on this site.
/// Relative paths are resolved against `public_url` (no trailing slash).
pub fn safe_redirect(public_url: &str, requested: Option<&str>, default_path: &str) -> String {
    match requested.map(str::trim) {
        Some(r) if r.starts_with('/') && !r.starts_with("//") && !r.starts_with("/\\") => {
            format!("{public_url}{r}")
        }
        Some(r) if r == public_url || r.starts_with(&format!("{public_url}/")) => r.to_string(),
        _ => format!("{public_url}{default_path}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirects_stay_on_site() {
        let base = "https://snip.example";
        assert_eq!(safe_redirect(base, Some("/create"), "/"), "https://snip.example/create");
        assert_eq!(
            safe_redirect(base, Some("https://snip.example/view?id=1"), "/"),
            "https://snip.example/view?id=1"
        );
        assert_eq!(safe_redirect(base, Some("//evil.example"), "/"), "https://snip.example/");
        assert_eq!(safe_redirect(base, Some("/\\evil.example"), "/"), "https://snip.example/");
        assert_eq!(safe_redirect(base, Some("https://snip.example.evil"), "/"), "https://snip.example/");
        assert_eq!(safe_redirect(base, None, "/reset-password"), "https://snip.example/reset-password");
    }

    #[test]
    fn auth_tab_parsing() {
        let q = |tab: &str| AuthPageQuery {
            tab: Some(tab.into()),
            redirect: None,
        };
        assert_eq!(q("signup").tab(), AuthTab::Signup);
        assert_eq!(q("Login").tab(), AuthTab::Signin);
        assert_eq!(q("bogus").tab(), AuthTab::Signin);
        assert_eq!(AuthPageQuery::default().tab(), AuthTab::Signin);
    }
}
