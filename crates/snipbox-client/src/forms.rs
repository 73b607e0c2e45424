//! Raw form input and the checks run on it before anything is sent.

use snipbox_types::api::{NewSnippet, ProfilePatch, SignUpRequest, SnippetPatch};
use snipbox_types::models::{Profile, Snippet, Visibility};
use snipbox_types::validate::{self, ValidationError};

#[derive(Debug, Clone, Default)]
pub struct SignUpForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl SignUpForm {
    /// Mismatch is reported before length, as the sign-up page does.
    pub fn validate(&self) -> Result<SignUpRequest, ValidationError> {
        if self.password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }
        validate::check_password(&self.password)?;

        let email = self.email.trim().to_lowercase();
        let username = self.username.trim().to_string();
        validate::check_email(&email)?;
        validate::check_username(&username)?;

        Ok(SignUpRequest {
            email,
            password: self.password.clone(),
            username,
        })
    }
}

/// Create/edit form. `tags` is the comma separated text field.
#[derive(Debug, Clone, Default)]
pub struct SnippetForm {
    pub title: String,
    pub description: String,
    pub code: String,
    pub language: String,
    pub visibility: Visibility,
    pub tags: String,
}

impl SnippetForm {
    /// Prefill for editing.
    pub fn from_snippet(snippet: &Snippet) -> Self {
        Self {
            title: snippet.title.clone(),
            description: snippet.description.clone().unwrap_or_default(),
            code: snippet.code.clone(),
            language: snippet.language.clone(),
            visibility: snippet.visibility,
            tags: snippet.tags.join(", "),
        }
    }

    pub fn into_new_snippet(self) -> Result<NewSnippet, ValidationError> {
        NewSnippet {
            title: self.title,
            description: Some(self.description),
            code: self.code,
            language: self.language,
            visibility: self.visibility,
            tags: validate::parse_tags(&self.tags),
        }
        .validated()
    }

    /// Every field of the form as a patch; an empty description clears it.
    pub fn into_patch(self) -> Result<SnippetPatch, ValidationError> {
        let new = self.into_new_snippet()?;
        Ok(SnippetPatch {
            title: Some(new.title),
            description: Some(new.description.unwrap_or_default()),
            code: Some(new.code),
            language: Some(new.language),
            visibility: Some(new.visibility),
            tags: Some(new.tags),
        })
    }

    /// Apply the editor's "format" button to the code field.
    pub fn tidy(&mut self) {
        self.code = validate::tidy_code(&self.code);
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfileForm {
    pub username: String,
    pub bio: String,
    pub website: String,
}

impl ProfileForm {
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            username: profile.username.clone().unwrap_or_default(),
            bio: profile.bio.clone().unwrap_or_default(),
            website: profile.website.clone().unwrap_or_default(),
        }
    }

    /// All three fields are sent; empty ones are cleared server-side.
    pub fn into_patch(self) -> Result<ProfilePatch, ValidationError> {
        let username = self.username.trim().to_string();
        if !username.is_empty() {
            validate::check_username(&username)?;
        }
        Ok(ProfilePatch {
            username: Some(username),
            bio: Some(self.bio.trim().to_string()),
            website: Some(self.website.trim().to_string()),
        })
    }
}
