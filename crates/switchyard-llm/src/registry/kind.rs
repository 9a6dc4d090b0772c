//! Built-in provider families and their defaults

use super::QuotaLimit;
use serde::{Deserialize, Serialize};

/// Provider family; decides defaults and payload details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// DeepSeek
    Deepseek,
    /// Zhipu GLM
    Zhipu,
    /// Alibaba DashScope (Qwen)
    Ali,
    /// Moonshot (Kimi)
    Moonshot,
    /// Any endpoint speaking the OpenAI chat completions format
    OpenaiCompatible,
}

impl ProviderKind {
    /// All built-in kinds
    pub const ALL: [ProviderKind; 5] = [
        Self::Deepseek,
        Self::Zhipu,
        Self::Ali,
        Self::Moonshot,
        Self::OpenaiCompatible,
    ];

    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deepseek => "deepseek",
            Self::Zhipu => "zhipu",
            Self::Ali => "ali",
            Self::Moonshot => "moonshot",
            Self::OpenaiCompatible => "openai_compatible",
        }
    }

    /// Parse from an id such as `"deepseek"`
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == id)
    }

    /// Default API base URL
    #[must_use]
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Self::Deepseek => Some("https://api.deepseek.com/v1"),
            Self::Zhipu => Some("https://open.bigmodel.cn/api/paas/v4"),
            Self::Ali => Some("https://dashscope.aliyuncs.com/api/v1"),
            Self::Moonshot => Some("https://api.moonshot.cn/v1"),
            Self::OpenaiCompatible => None,
        }
    }

    /// Default model
    #[must_use]
    pub fn default_model(&self) -> Option<&'static str> {
        match self {
            Self::Deepseek => Some("deepseek-chat"),
            Self::Zhipu => Some("glm-4"),
            Self::Ali => Some("qwen-turbo"),
            Self::Moonshot => Some("moonshot-v1-8k"),
            Self::OpenaiCompatible => None,
        }
    }

    /// Environment variable holding the API key
    #[must_use]
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::Deepseek => "DEEPSEEK_API_KEY",
            Self::Zhipu => "ZHIPU_API_KEY",
            Self::Ali => "ALI_API_KEY",
            Self::Moonshot => "MOONSHOT_API_KEY",
            Self::OpenaiCompatible => "OPENAI_COMPATIBLE_API_KEY",
        }
    }

    /// Default spend and request ceilings
    #[must_use]
    pub fn default_quota(&self) -> QuotaLimit {
        let (daily, monthly, rpm) = match self {
            Self::Deepseek => (50.0, 1000.0, 60),
            Self::Zhipu => (100.0, 2000.0, 30),
            Self::Ali => (80.0, 1500.0, 40),
            Self::Moonshot => (30.0, 500.0, 20),
            Self::OpenaiCompatible => (100.0, 2000.0, 60),
        };
        QuotaLimit::new(daily, monthly, rpm)
    }

    /// Nucleus sampling value sent with every request
    #[must_use]
    pub fn top_p(&self) -> Option<f32> {
        match self {
            Self::Zhipu => Some(0.95),
            Self::Ali => Some(0.8),
            _ => None,
        }
    }

    /// Extra request headers
    #[must_use]
    pub fn extra_headers(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Ali => &[("X-DashScope-SSE", "disable")],
            _ => &[],
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
