//! Internationalization (i18n) module.
//!
//! Provides localized strings for delivery captions and CLI output.
//! English is the default language; Russian is available as an alternative.

use std::sync::OnceLock;

static CURRENT_LANG: OnceLock<Lang> = OnceLock::new();

/// Supported languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    /// English (default)
    En,
    /// Russian
    Ru,
}

impl Lang {
    /// Parse a language code string (e.g. "en", "ru", "en_US", "ru_RU.UTF-8").
    /// Returns `None` for unrecognized codes.
    pub fn from_code(code: &str) -> Option<Self> {
        let normalized = code.to_lowercase();
        let prefix = normalized.split(['_', '-', '.']).next().unwrap_or("");
        match prefix {
            "en" => Some(Self::En),
            "ru" => Some(Self::Ru),
            _ => None,
        }
    }

    /// Return the ISO 639-1 code for this language.
    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ru => "ru",
        }
    }
}

/// Initialize the global language. Call once at startup.
/// If already initialized, this is a no-op.
pub fn set_lang(lang: Lang) {
    let _ = CURRENT_LANG.set(lang);
}

/// Get the currently configured language (defaults to English).
pub fn lang() -> Lang {
    CURRENT_LANG.get().copied().unwrap_or(Lang::En)
}

/// Detect language from `MAILRELAY_LANG`, then `LC_MESSAGES` / `LANG`.
pub fn detect_system_lang() -> Lang {
    std::env::var("MAILRELAY_LANG")
        .ok()
        .and_then(|v| Lang::from_code(&v))
        .or_else(|| {
            std::env::var("LC_MESSAGES")
                .ok()
                .and_then(|v| Lang::from_code(&v))
        })
        .or_else(|| std::env::var("LANG").ok().and_then(|v| Lang::from_code(&v)))
        .unwrap_or(Lang::En)
}

/// Macro for defining translatable message functions.
/// Each function returns a `&'static str` based on the current language.
macro_rules! msg {
    ($name:ident, $en:expr, $ru:expr) => {
        /// Returns a localized string for the current language.
        pub fn $name() -> &'static str {
            in_lang(lang()).$name()
        }

        impl Strings {
            pub fn $name(self) -> &'static str {
                match self.0 {
                    Lang::En => $en,
                    Lang::Ru => $ru,
                }
            }
        }
    };
}

/// Strings of one fixed language, independent of the global setting.
#[derive(Debug, Clone, Copy)]
pub struct Strings(Lang);

/// Access the strings of `lang`.
pub fn in_lang(lang: Lang) -> Strings {
    Strings(lang)
}

// ── General ──────────────────────────────────────────────────────

msg!(
    app_about,
    "Relay new mail to Telegram: long bodies are split, every message is packed into a ZIP archive.",
    "Пересылка новой почты в Telegram: длинные письма делятся на части, каждое письмо упаковывается в ZIP-архив."
);
msg!(
    app_long_about,
    "mailrelay reads new messages from an IMAP mailbox or an MBOX file,\nsends the first part of each body as a text message and delivers\nthe body and attachments as one ZIP archive per message.",
    "mailrelay читает новые письма из ящика IMAP или файла MBOX,\nотправляет начало каждого письма текстом и доставляет\nтекст и вложения одним ZIP-архивом на письмо."
);

// ── CLI help strings ─────────────────────────────────────────────

msg!(
    help_verbose,
    "Verbose logging (-v info, -vv debug, -vvv trace)",
    "Подробный журнал (-v info, -vv debug, -vvv trace)"
);
msg!(
    help_config,
    "Configuration file (overrides $MAILRELAY_CONFIG)",
    "Файл конфигурации (заменяет $MAILRELAY_CONFIG)"
);
msg!(
    help_cmd_run,
    "Fetch new messages and deliver them (one batch)",
    "Получить новые письма и доставить их (один проход)"
);
msg!(
    help_cmd_split,
    "Print the chunks a text would be split into",
    "Показать части, на которые будет разбит текст"
);
msg!(
    help_cmd_pack,
    "Pack one .eml message into a ZIP archive",
    "Упаковать одно письмо .eml в ZIP-архив"
);
msg!(
    help_cmd_completions,
    "Generate shell completions",
    "Сгенерировать автодополнение для оболочки"
);
msg!(
    help_cmd_manpage,
    "Generate a man page",
    "Сгенерировать man-страницу"
);

// ── Delivery captions ────────────────────────────────────────────

msg!(
    caption_full_text,
    "Full text of the message",
    "Полный текст письма"
);

// ── CLI output ───────────────────────────────────────────────────

msg!(cli_delivered, "Delivered", "Доставлено");
msg!(cli_failed, "Failed", "Ошибок");
msg!(cli_last_seen, "Last committed id", "Последний сохранённый id");
msg!(cli_archive_written, "Archive written", "Архив записан");
msg!(cli_chunk, "Chunk", "Часть");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code() {
        assert_eq!(Lang::from_code("en"), Some(Lang::En));
        assert_eq!(Lang::from_code("ru_RU.UTF-8"), Some(Lang::Ru));
        assert_eq!(Lang::from_code("RU-ru"), Some(Lang::Ru));
        assert_eq!(Lang::from_code("de_DE"), None);
        assert_eq!(Lang::from_code(""), None);
    }

    #[test]
    fn test_code_roundtrip() {
        for lang in [Lang::En, Lang::Ru] {
            assert_eq!(Lang::from_code(lang.code()), Some(lang));
        }
    }

    #[test]
    fn test_captions_per_language() {
        assert_eq!(in_lang(Lang::En).caption_full_text(), "Full text of the message");
        assert_eq!(in_lang(Lang::Ru).caption_full_text(), "Полный текст письма");
    }

    #[test]
    fn test_default_is_english_or_set() {
        // The global may have been set by another test; both are valid
        let current = lang();
        assert_eq!(caption_full_text(), in_lang(current).caption_full_text());
    }
}
