//! End-to-end: the client against a real server on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;

use snipbox_api::mail::LogMailer;
use snipbox_api::oauth::OAuthProviders;
use snipbox_api::{ApiConfig, AppStateInner};
use snipbox_client::forms::{ProfileForm, SignUpForm, SnippetForm};
use snipbox_client::messages::{Locale, user_message};
use snipbox_client::{ClientError, SnipboxClient};
use snipbox_db::Database;
use snipbox_types::api::ListQuery;
use snipbox_types::models::Visibility;
use snipbox_types::validate::ValidationError;
use uuid::Uuid;

async fn spawn_server() -> String {
    let dir = std::env::temp_dir().join(format!("snipbox-client-test-{}", Uuid::new_v4()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = format!("http://{addr}");

    let state = AppStateInner::new(
        Database::open_in_memory().unwrap(),
        ApiConfig {
            jwt_secret: "client-test-secret".into(),
            public_url: base.clone(),
            session_ttl: chrono::Duration::hours(1),
            storage_dir: dir,
            oauth: OAuthProviders::default(),
        },
        Arc::new(LogMailer),
    )
    .await
    .unwrap();
    let app = snipbox_api::router(state);

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });
    base
}

fn signup(username: &str) -> SignUpForm {
    SignUpForm {
        username: username.into(),
        email: format!("{username}@example.com"),
        password: "secret1".into(),
        confirm_password: "secret1".into(),
    }
}

#[tokio::test]
async fn signup_form_errors_never_reach_the_network() {
    // Nothing listens on the discard port; a request would fail with Http.
    let client = SnipboxClient::new("http://127.0.0.1:9").unwrap();

    let mut form = signup("ann");
    form.confirm_password = "secret2".into();
    let err = client.sign_up(&form).await.unwrap_err();
    assert!(matches!(err, ClientError::Form(ValidationError::PasswordMismatch)));

    form.password = "12345".into();
    form.confirm_password = "12345".into();
    let err = client.sign_up(&form).await.unwrap_err();
    assert!(matches!(err, ClientError::Form(ValidationError::PasswordTooShort)));
    assert_eq!(user_message(&err, Locale::Ru), "Пароль должен быть не менее 6 символов");
}

#[tokio::test]
async fn full_session_against_server() {
    let base = spawn_server().await;
    let ann = SnipboxClient::new(&base).unwrap();
    let guest = SnipboxClient::new(&base).unwrap();

    let user = ann.sign_up(&signup("ann")).await.unwrap();
    assert_eq!(user.username.as_deref(), Some("ann"));
    assert_eq!(ann.current_user().await.unwrap().unwrap().id, user.id);
    assert!(guest.current_user().await.unwrap().is_none());

    let err = guest.sign_up(&signup("ann")).await.unwrap_err();
    assert_eq!(err.status(), Some(409));
    assert_eq!(user_message(&err, Locale::En), "This email is already registered");

    let public = ann
        .create_snippet(
            &SnippetForm {
                title: "Quick sort".into(),
                code: "fn sort() {}".into(),
                language: "rust".into(),
                tags: "algo, sort".into(),
                ..Default::default()
            }
            .into_new_snippet()
            .unwrap(),
        )
        .await
        .unwrap();
    let private = ann
        .create_snippet(
            &SnippetForm {
                title: "Diary".into(),
                code: "secret".into(),
                language: "text".into(),
                visibility: Visibility::Private,
                ..Default::default()
            }
            .into_new_snippet()
            .unwrap(),
        )
        .await
        .unwrap();

    // Private content never reaches another viewer.
    assert!(guest.get_snippet(private.id).await.unwrap_err().is_not_found());
    assert!(guest.raw_snippet(private.id).await.unwrap_err().is_not_found());
    assert_eq!(ann.get_snippet(private.id).await.unwrap().code, "secret");

    // One view per client session.
    assert_eq!(guest.get_snippet(public.id).await.unwrap().views, 1);
    assert_eq!(guest.get_snippet(public.id).await.unwrap().views, 1);
    assert_eq!(ann.raw_snippet(public.id).await.unwrap(), "fn sort() {}");

    assert_eq!(guest.search_or_recent("q").await.unwrap().len(), 1);
    assert_eq!(guest.search_or_recent("SORT").await.unwrap()[0].id, public.id);
    assert!(guest.search_or_recent("diary").await.unwrap().is_empty());
    assert_eq!(guest.list_snippets(ListQuery::default()).await.unwrap().len(), 1);
    assert_eq!(guest.trending().await.unwrap()[0].id, public.id);
    assert_eq!(guest.stats().await.unwrap().users, 1);

    let mut edit = SnippetForm::from_snippet(&public);
    edit.title = "Quicker sort".into();
    let updated = ann.update_snippet(public.id, &edit.clone().into_patch().unwrap()).await.unwrap();
    assert_eq!(updated.title, "Quicker sort");
    assert_eq!(updated.tags, vec!["algo", "sort"]);
    assert!(guest.update_snippet(public.id, &edit.into_patch().unwrap()).await.is_err());

    let profile = ann
        .update_profile(
            &ProfileForm {
                username: "annie".into(),
                bio: "rustacean".into(),
                website: String::new(),
            }
            .into_patch()
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(profile.username.as_deref(), Some("annie"));
    assert!(profile.website.is_none());

    let url = ann.upload_avatar("me.webp", b"RIFF....WEBP".to_vec()).await.unwrap();
    assert!(url.contains(&format!("/avatars/{}.webp?v=", user.id)));
    assert_eq!(ann.profile().await.unwrap().avatar_url.as_deref(), Some(url.as_str()));
    assert_eq!(ann.my_snippets().await.unwrap().len(), 2);
    assert_eq!(ann.my_stats().await.unwrap().total_snippets, 2);

    ann.delete_snippet(private.id).await.unwrap();
    assert!(ann.get_snippet(private.id).await.unwrap_err().is_not_found());

    ann.sign_out().await.unwrap();
    assert!(!ann.is_signed_in());
    ann.sign_in("ann@example.com", "secret1").await.unwrap();
    ann.delete_account().await.unwrap();
    assert!(!ann.is_signed_in());
    let err = ann.sign_in("ann@example.com", "secret1").await.unwrap_err();
    assert_eq!(user_message(&err, Locale::Ru), "Неверный email или пароль");
}
