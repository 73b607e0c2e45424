//! Input rules shared by the server and the client.
//!
//! The client runs these as pre-checks so obviously bad input never leaves
//! the machine; the server runs them again because it cannot trust callers.

use thiserror::Error;

use crate::api::{NewSnippet, SnippetPatch};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_TAGS: usize = 5;
pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_CODE_BYTES: usize = 256 * 1024;
pub const MIN_SEARCH_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Password should be at least 6 characters")]
    PasswordTooShort,
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Username must be 3-32 characters: letters, digits, '_' or '-'")]
    InvalidUsername,
    #[error("Title, code and language are required")]
    MissingSnippetFields,
    #[error("Title must be at most 200 characters")]
    TitleTooLong,
    #[error("Code must be at most 256 KiB")]
    CodeTooLarge,
}

pub fn check_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(())
}

pub fn check_email(email: &str) -> Result<(), ValidationError> {
    let (local, domain) = email.split_once('@').ok_or(ValidationError::InvalidEmail)?;
    let domain_ok = domain
        .split_once('.')
        .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty());
    if local.is_empty() || domain.contains('@') || !domain_ok || email.contains(char::is_whitespace) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(())
}

pub fn check_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    let charset_ok = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !(3..=32).contains(&len) || !charset_ok {
        return Err(ValidationError::InvalidUsername);
    }
    Ok(())
}

/// Split a comma separated tag field, dropping blanks and keeping at most
/// [`MAX_TAGS`] in input order.
pub fn parse_tags(raw: &str) -> Vec<String> {
    normalize_tags(raw.split(','))
}

pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .take(MAX_TAGS)
        .collect()
}

impl NewSnippet {
    /// Trim the free-text fields, normalize tags and enforce the required
    /// fields. Returns the cleaned snippet.
    pub fn validated(mut self) -> Result<Self, ValidationError> {
        self.title = self.title.trim().to_string();
        self.language = self.language.trim().to_string();
        self.description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self.tags = normalize_tags(&self.tags);

        if self.title.is_empty() || self.code.trim().is_empty() || self.language.is_empty() {
            return Err(ValidationError::MissingSnippetFields);
        }
        check_snippet_sizes(&self.title, &self.code)?;
        Ok(self)
    }
}

impl SnippetPatch {
    pub fn validated(mut self) -> Result<Self, ValidationError> {
        if let Some(title) = self.title.as_mut() {
            *title = title.trim().to_string();
            if title.is_empty() {
                return Err(ValidationError::MissingSnippetFields);
            }
        }
        if let Some(language) = self.language.as_mut() {
            *language = language.trim().to_string();
            if language.is_empty() {
                return Err(ValidationError::MissingSnippetFields);
            }
        }
        if self.code.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(ValidationError::MissingSnippetFields);
        }
        if let Some(d) = self.description.as_mut() {
            *d = d.trim().to_string();
        }
        self.tags = self.tags.map(normalize_tags);
        check_snippet_sizes(
            self.title.as_deref().unwrap_or_default(),
            self.code.as_deref().unwrap_or_default(),
        )?;
        Ok(self)
    }
}

fn check_snippet_sizes(title: &str, code: &str) -> Result<(), ValidationError> {
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ValidationError::TitleTooLong);
    }
    if code.len() > MAX_CODE_BYTES {
        return Err(ValidationError::CodeTooLarge);
    }
    Ok(())
}

/// Light cleanup applied by the editor's "format" button: tabs become two
/// spaces and runs of two or more blank lines collapse to a single one.
pub fn tidy_code(code: &str) -> String {
    let chars: Vec<char> = code.replace('\t', "  ").chars().collect();
    let mut out = String::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '\n' {
            let mut newlines = 1;
            let mut last_newline = i;
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                if chars[j] == '\n' {
                    newlines += 1;
                    last_newline = j;
                }
                j += 1;
            }
            if newlines >= 3 {
                out.push_str("\n\n");
                i = last_newline + 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }

    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode<'a> {
    /// Query too short to search; show the recent listing instead.
    Recent,
    Search(&'a str),
}

pub fn classify_search(q: &str) -> SearchMode<'_> {
    let q = q.trim();
    if q.chars().count() < MIN_SEARCH_LEN {
        SearchMode::Recent
    } else {
        SearchMode::Search(q)
    }
}
