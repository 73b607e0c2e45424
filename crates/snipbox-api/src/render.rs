//! HTML fragments for the server-rendered pages.
//!
//! Every user-controlled value is passed through [`escape_html`] before it is
//! interpolated. Helpers that return markup (`highlight`, `snippet_card`, ...)
//! already escape their inputs; helpers that return plain text
//! (`truncate_text`, `format_relative`, ...) do not.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use reqwest::Url;

use snipbox_types::models::{SiteStats, Snippet, Visibility};
use snipbox_types::nav::AuthTab;

use crate::oauth::Provider;

/// Characters of code shown on a listing card.
pub const EXCERPT_LEN: usize = 200;
/// Characters of title shown in the trending sidebar.
pub const TRENDING_TITLE_LEN: usize = 30;
/// Tags shown on a listing card.
pub const CARD_TAGS: usize = 3;

const ANONYMOUS: &str = "Anonymous";

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// At most `max` characters, with `...` appended when cut.
pub fn truncate_text(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Single-line preview of code: whitespace runs collapse to one space.
pub fn truncate_code(code: &str, max: usize) -> String {
    let flat = code.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_text(&flat, max)
}

/// Escape `text` and wrap case-insensitive occurrences of `query` in
/// `<mark>`. Matching runs on the raw text so entities are never split.
pub fn highlight(text: &str, query: &str) -> String {
    let needle: Vec<char> = query.trim().chars().collect();
    if needle.is_empty() {
        return escape_html(text);
    }

    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut plain = String::new();
    let mut i = 0;
    while i < chars.len() {
        let end = i + needle.len();
        let hit = end <= chars.len()
            && chars[i..end]
                .iter()
                .zip(&needle)
                .all(|(a, b)| a.to_lowercase().eq(b.to_lowercase()));
        if hit {
            out.push_str(&escape_html(&plain));
            plain.clear();
            let matched: String = chars[i..end].iter().collect();
            let _ = write!(out, "<mark>{}</mark>", escape_html(&matched));
            i = end;
        } else {
            plain.push(chars[i]);
            i += 1;
        }
    }
    out.push_str(&escape_html(&plain));
    out
}

/// "5 min ago", "3 h ago", "2 d ago", then the plain date after a week.
pub fn format_relative(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now - at;
    if elapsed.num_minutes() < 60 {
        format!("{} min ago", elapsed.num_minutes().max(0))
    } else if elapsed.num_hours() < 24 {
        format!("{} h ago", elapsed.num_hours())
    } else if elapsed.num_days() < 7 {
        format!("{} d ago", elapsed.num_days())
    } else {
        at.format("%Y-%m-%d").to_string()
    }
}

pub fn format_datetime(at: DateTime<Utc>) -> String {
    at.format("%B %-d, %Y %H:%M").to_string()
}

pub fn share_twitter(page_url: &str, title: &str) -> String {
    share_url("https://twitter.com/intent/tweet", page_url, title)
}

pub fn share_telegram(page_url: &str, title: &str) -> String {
    share_url("https://t.me/share/url", page_url, title)
}

fn share_url(endpoint: &str, page_url: &str, title: &str) -> String {
    Url::parse_with_params(endpoint, [("url", page_url), ("text", title)])
        .map(String::from)
        .unwrap_or_else(|_| endpoint.to_string())
}

fn author_name(snippet: &Snippet) -> &str {
    snippet.author.username.as_deref().unwrap_or(ANONYMOUS)
}

fn author_initial(snippet: &Snippet) -> String {
    snippet
        .author
        .username
        .as_deref()
        .and_then(|u| u.chars().next())
        .map(|c| c.to_uppercase().collect())
        .unwrap_or_else(|| "A".to_string())
}

fn tags_html(tags: &[String], limit: usize) -> String {
    if tags.is_empty() {
        return String::new();
    }
    let spans: String = tags
        .iter()
        .take(limit)
        .map(|t| format!(r#"<span class="tag">{}</span>"#, escape_html(t)))
        .collect();
    format!(r#"<div class="snippet-tags">{spans}</div>"#)
}

/// Listing card. With a search query, title and excerpt are highlighted.
pub fn snippet_card(snippet: &Snippet, query: Option<&str>, now: DateTime<Utc>) -> String {
    let excerpt = truncate_code(&snippet.code, EXCERPT_LEN);
    let (title, excerpt) = match query {
        Some(q) => (highlight(&snippet.title, q), highlight(&excerpt, q)),
        None => (escape_html(&snippet.title), escape_html(&excerpt)),
    };

    format!(
        r#"<a href="/view?id={id}" class="snippet-card">
<div class="snippet-header"><h3>{title}</h3><span class="language-badge">{language}</span></div>
<div class="snippet-meta"><span class="author">{author}</span><span class="date">{date}</span><span class="views">{views}</span></div>
<div class="snippet-excerpt">{excerpt}</div>
{tags}</a>"#,
        id = snippet.id,
        language = escape_html(&snippet.language),
        author = escape_html(author_name(snippet)),
        date = format_relative(snippet.created_at, now),
        views = snippet.views,
        tags = tags_html(&snippet.tags, CARD_TAGS),
    )
}

pub fn trending_item(snippet: &Snippet) -> String {
    format!(
        r#"<a href="/view?id={}" class="trending-item"><span class="trending-title">{}</span><span class="language-badge small">{}</span><span class="views">{}</span></a>"#,
        snippet.id,
        escape_html(&truncate_text(&snippet.title, TRENDING_TITLE_LEN)),
        escape_html(&snippet.language),
        snippet.views,
    )
}

fn empty_state(title: &str, hint: &str) -> String {
    format!(r#"<div class="empty-state"><h3>{title}</h3><p>{hint}</p></div>"#)
}

/// Full HTML document around `body`.
pub fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} | snipbox</title>
</head>
<body>
<header class="site-header">
<a href="/" class="logo">snipbox</a>
<form action="/" method="get" class="search"><input type="search" name="q" placeholder="Search snippets"></form>
<nav id="authSection"><a href="/create" class="btn btn-secondary">New snippet</a><a href="/auth" class="btn btn-secondary">Sign in</a><a href="/auth?tab=signup" class="btn btn-primary">Sign up</a></nav>
</header>
<main>
{body}
</main>
</body>
</html>"#,
        title = escape_html(title),
    )
}

/// Everything the home page shows.
pub struct IndexView<'a> {
    /// Present when the listing is a search result.
    pub query: Option<&'a str>,
    pub snippets: &'a [Snippet],
    pub page: u32,
    pub has_next: bool,
    pub trending: &'a [Snippet],
    pub stats: SiteStats,
}

pub fn index_page(view: &IndexView<'_>, now: DateTime<Utc>) -> String {
    let listing = if view.snippets.is_empty() {
        match view.query {
            Some(_) => empty_state("Nothing found", "Try different keywords"),
            None => empty_state("No snippets yet", "Be the first to publish some code!"),
        }
    } else {
        view.snippets
            .iter()
            .map(|s| snippet_card(s, view.query, now))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let heading = match view.query {
        Some(q) => format!("Results for \"{}\"", escape_html(q)),
        None => "Recent snippets".to_string(),
    };

    let mut pager = String::new();
    if view.query.is_none() {
        if view.page > 1 {
            let _ = write!(pager, r#"<a href="/?page={}" class="prev">Newer</a>"#, view.page - 1);
        }
        if view.has_next {
            let _ = write!(pager, r#"<a href="/?page={}" class="next">Older</a>"#, view.page + 1);
        }
    }

    let trending = if view.trending.is_empty() {
        r#"<p class="empty-text">No data yet</p>"#.to_string()
    } else {
        view.trending.iter().map(trending_item).collect()
    };

    let body = format!(
        r#"<section class="listing"><h2>{heading}</h2>
<div id="recentPosts">{listing}</div>
<nav class="pager">{pager}</nav></section>
<aside>
<div class="stats"><span id="totalSnippets">{snippets}</span> snippets, <span id="totalUsers">{users}</span> users</div>
<div id="trendingList">{trending}</div>
</aside>"#,
        snippets = view.stats.snippets,
        users = view.stats.users,
    );
    layout("Share code", &body)
}

/// Snippet page. `page_url` is this page's absolute URL, used for sharing.
pub fn view_page(snippet: &Snippet, is_owner: bool, page_url: &str) -> String {
    let private_badge = if snippet.visibility == Visibility::Private {
        format!(r#"<div class="meta-item private">{}</div>"#, snippet.visibility.label())
    } else {
        String::new()
    };
    let description = snippet
        .description
        .as_deref()
        .map(|d| format!(r#"<div class="description"><h3>Description</h3><p>{}</p></div>"#, escape_html(d)))
        .unwrap_or_default();
    let owner_controls = if is_owner {
        format!(
            r#"<a href="/create?id={id}" class="btn btn-secondary">Edit</a><button class="btn btn-secondary" data-action="delete" data-id="{id}">Delete</button>"#,
            id = snippet.id
        )
    } else {
        String::new()
    };

    let body = format!(
        r#"<article id="snippetContainer">
<div class="snippet-header">
<h1 class="snippet-title">{title}</h1>
<div class="snippet-meta">
<div class="snippet-author"><div class="author-avatar">{initial}</div><div><div class="author-name">{author}</div><div class="post-date">{date}</div></div></div>
<div class="meta-item">{views} views</div>
<div class="meta-item">{language}</div>
{private_badge}
</div>
{tags}
<div class="snippet-actions">{owner_controls}
<div class="share-buttons"><a class="share-btn" href="{twitter}" target="_blank" rel="noopener">Twitter</a><a class="share-btn" href="{telegram}" target="_blank" rel="noopener">Telegram</a></div>
</div>
</div>
{description}
<div class="code-container">
<div class="code-toolbar"><span>{language}</span><a href="/snippets/{id}/raw" class="raw-link" target="_blank">Raw</a></div>
<pre><code class="language-{language}">{code}</code></pre>
</div>
</article>"#,
        id = snippet.id,
        title = escape_html(&snippet.title),
        initial = escape_html(&author_initial(snippet)),
        author = escape_html(author_name(snippet)),
        date = format_datetime(snippet.created_at),
        views = snippet.views,
        language = escape_html(&snippet.language),
        tags = tags_html(&snippet.tags, usize::MAX),
        twitter = escape_html(&share_twitter(page_url, &snippet.title)),
        telegram = escape_html(&share_telegram(page_url, &snippet.title)),
        code = escape_html(&snippet.code),
    );
    layout(&snippet.title, &body)
}

pub fn not_found_page() -> String {
    layout(
        "Not found",
        r#"<div id="notFound" class="empty-state"><h3>Snippet not found</h3><p>It may have been deleted or made private.</p><a href="/" class="btn btn-primary">Back to snippets</a></div>"#,
    )
}

/// `{public_url}{path}` with an encoded query. Falls back to the bare path
/// if `public_url` does not parse.
pub fn site_url(public_url: &str, path: &str, params: &[(&str, &str)]) -> String {
    let base = format!("{public_url}{path}");
    if params.is_empty() {
        return base;
    }
    Url::parse_with_params(&base, params)
        .map(String::from)
        .unwrap_or(base)
}

fn active(on: bool) -> &'static str {
    if on { " active" } else { "" }
}

/// Sign-in and sign-up forms. Both carry `redirect`, the already resolved
/// same-site target to open once signed in; `tab` picks the visible form.
pub fn auth_page(public_url: &str, tab: AuthTab, redirect: &str, providers: &[Provider]) -> String {
    let signin = tab == AuthTab::Signin;
    let tab_href = |t: AuthTab| site_url(public_url, "/auth", &[("tab", t.as_str()), ("redirect", redirect)]);
    let oauth: String = providers
        .iter()
        .map(|p| {
            let href = site_url(
                public_url,
                &format!("/auth/oauth/{}", p.as_str()),
                &[("redirect_to", redirect)],
            );
            format!(
                r#"<a href="{}" id="{}SignIn" class="btn btn-oauth">Continue with {}</a>"#,
                escape_html(&href),
                p.as_str(),
                p.label()
            )
        })
        .collect();
    let redirect = escape_html(redirect);

    let body = format!(
        r#"<section class="auth-container">
<div class="auth-tabs">
<a href="{signin_href}" class="tab{signin_active}" data-tab="login">Sign in</a>
<a href="{signup_href}" class="tab{signup_active}" data-tab="signup">Sign up</a>
</div>
<div id="errorMessage" class="error-message" hidden></div>
<div id="successMessage" class="success-message" hidden></div>
<form id="loginForm" class="auth-form{signin_active}" data-action="signin">
<input type="hidden" name="redirect" value="{redirect}">
<input type="email" name="email" placeholder="Email" required>
<input type="password" name="password" placeholder="Password" required>
<button type="submit" class="btn btn-primary">Sign in</button>
<a href="/auth?tab=signin" id="forgotPassword" data-action="recover">Forgot password?</a>
</form>
<form id="signupForm" class="auth-form{signup_active}" data-action="signup">
<input type="hidden" name="redirect" value="{redirect}">
<input type="text" name="username" placeholder="Username" required>
<input type="email" name="email" placeholder="Email" required>
<input type="password" name="password" placeholder="Password" minlength="6" required>
<input type="password" name="confirm_password" placeholder="Confirm password" minlength="6" required>
<button type="submit" class="btn btn-primary">Sign up</button>
</form>
<div class="oauth-buttons">{oauth}</div>
</section>"#,
        signin_href = escape_html(&tab_href(AuthTab::Signin)),
        signup_href = escape_html(&tab_href(AuthTab::Signup)),
        signin_active = active(signin),
        signup_active = active(!signin),
    );
    layout(if signin { "Sign in" } else { "Sign up" }, &body)
}

/// Create form, or edit form prefilled from `snippet`.
pub fn editor_page(snippet: Option<&Snippet>) -> String {
    let (heading, action, id) = match snippet {
        Some(s) => ("Edit snippet", "update", s.id.to_string()),
        None => ("New snippet", "create", String::new()),
    };
    let field = |f: fn(&Snippet) -> String| snippet.map(f).map(|v| escape_html(&v)).unwrap_or_default();
    let current = snippet.map(|s| s.visibility).unwrap_or_default();
    let visibility: String = [Visibility::Public, Visibility::Unlisted, Visibility::Private]
        .iter()
        .map(|v| {
            let selected = if *v == current { " selected" } else { "" };
            format!(r#"<option value="{}"{selected}>{}</option>"#, v.as_str(), v.label())
        })
        .collect();

    let body = format!(
        r#"<section class="editor">
<h1>{heading}</h1>
<form id="createSnippetForm" data-action="{action}" data-id="{id}">
<input type="text" id="title" name="title" value="{title}" placeholder="Title" required>
<textarea id="description" name="description" placeholder="Description">{description}</textarea>
<input type="text" id="language" name="language" value="{language}" placeholder="Language" required>
<select id="visibility" name="visibility">{visibility}</select>
<input type="text" id="tags" name="tags" value="{tags}" placeholder="Tags, comma separated">
<textarea id="code" name="code" placeholder="Code" required>{code}</textarea>
<button type="button" id="formatCode" class="btn btn-secondary">Format</button>
<button type="submit" class="btn btn-primary">Save</button>
</form>
</section>"#,
        title = field(|s| s.title.clone()),
        description = field(|s| s.description.clone().unwrap_or_default()),
        language = field(|s| s.language.clone()),
        tags = field(|s| s.tags.join(", ")),
        code = field(|s| s.code.clone()),
    );
    layout(heading, &body)
}

/// Landing page of a password reset link.
pub fn reset_page(token: Option<&str>) -> String {
    let body = match token {
        Some(token) => format!(
            r#"<section class="auth-container">
<h1>Choose a new password</h1>
<form id="resetForm" data-action="reset">
<input type="hidden" name="token" value="{}">
<input type="password" name="password" placeholder="New password" minlength="6" required>
<input type="password" name="confirm_password" placeholder="Confirm password" minlength="6" required>
<button type="submit" class="btn btn-primary">Save password</button>
</form>
</section>"#,
            escape_html(token)
        ),
        None => empty_state(
            "This reset link is invalid",
            r#"Request a new one from the <a href="/auth">sign-in page</a>."#,
        ),
    };
    layout("Reset password", &body)
}
