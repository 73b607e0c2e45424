//! User-facing wording for errors.

use crate::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Ru,
}

/// Known server and form messages: `(raw, english, russian)`.
const KNOWN: &[(&str, &str, &str)] = &[
    ("Invalid login credentials", "Invalid email or password", "Неверный email или пароль"),
    ("Email not confirmed", "Confirm your email to sign in", "Подтвердите email для входа"),
    ("User already registered", "This email is already registered", "Пользователь уже зарегистрирован"),
    (
        "Password should be at least 6 characters",
        "Password must be at least 6 characters",
        "Пароль должен быть не менее 6 символов",
    ),
    ("Passwords do not match", "Passwords do not match", "Пароли не совпадают"),
    ("Username already taken", "This username is already taken", "Пользователь с таким именем уже существует"),
    ("Title, code and language are required", "Fill in the title, code and language", "Заполните обязательные поля: заголовок, код и язык"),
    ("Snippet not found", "Snippet not found", "Скрипт не найден"),
    ("File too large. Maximum size is 2MB", "File too large. Maximum size is 2MB", "Файл слишком большой. Максимальный размер 2MB"),
];

/// Text to show for `err`. Unknown messages are shown as they are.
pub fn user_message(err: &ClientError, locale: Locale) -> String {
    translate(&err.to_string(), locale)
}

pub fn translate(raw: &str, locale: Locale) -> String {
    if raw.trim().is_empty() {
        return match locale {
            Locale::En => "Something went wrong".to_string(),
            Locale::Ru => "Произошла ошибка".to_string(),
        };
    }
    KNOWN
        .iter()
        .find(|(key, _, _)| *key == raw)
        .map(|(_, en, ru)| match locale {
            Locale::En => en.to_string(),
            Locale::Ru => ru.to_string(),
        })
        .unwrap_or_else(|| raw.to_string())
}
