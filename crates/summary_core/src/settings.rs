use std::fmt;

/// Keys of the extension-wide settings storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingKey {
    Uid,
    OpenAiApiKey,
    TranslationTargetLang,
    CopyWithTimestamps,
}

impl SettingKey {
    pub const ALL: [SettingKey; 4] = [
        SettingKey::Uid,
        SettingKey::OpenAiApiKey,
        SettingKey::TranslationTargetLang,
        SettingKey::CopyWithTimestamps,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::Uid => "uid",
            SettingKey::OpenAiApiKey => "openai_api_key",
            SettingKey::TranslationTargetLang => "translation_target_lang",
            SettingKey::CopyWithTimestamps => "copy_with_timestamps",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Translation target languages, keyed by their translation-service code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetLang {
    #[default]
    EnUs,
    Zh,
    Es,
    Id,
    PtBr,
    Fr,
    Ja,
    Ru,
    De,
    Ko,
}

impl TargetLang {
    pub const ALL: [TargetLang; 10] = [
        TargetLang::EnUs,
        TargetLang::Zh,
        TargetLang::Es,
        TargetLang::Id,
        TargetLang::PtBr,
        TargetLang::Fr,
        TargetLang::Ja,
        TargetLang::Ru,
        TargetLang::De,
        TargetLang::Ko,
    ];

    pub fn code(self) -> &'static str {
        match self {
            TargetLang::EnUs => "EN-US",
            TargetLang::Zh => "ZH",
            TargetLang::Es => "ES",
            TargetLang::Id => "ID",
            TargetLang::PtBr => "PT-BR",
            TargetLang::Fr => "FR",
            TargetLang::Ja => "JA",
            TargetLang::Ru => "RU",
            TargetLang::De => "DE",
            TargetLang::Ko => "KO",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            TargetLang::EnUs => "English",
            TargetLang::Zh => "中文",
            TargetLang::Es => "Español",
            TargetLang::Id => "Bahasa Indonesia",
            TargetLang::PtBr => "Português",
            TargetLang::Fr => "Français",
            TargetLang::Ja => "日本語",
            TargetLang::Ru => "Русский язык",
            TargetLang::De => "Deutsch",
            TargetLang::Ko => "한국어",
        }
    }

    /// Case-insensitive lookup by code; unknown codes yield `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|lang| lang.code().eq_ignore_ascii_case(code.trim()))
    }
}
