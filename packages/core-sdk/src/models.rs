use std::{fmt, str::FromStr};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/**
 * \brief 支持的上游 Provider 协议方言。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    OpenaiCompatible,
    Gemini,
    Anthropic,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::OpenaiCompatible, Provider::Gemini, Provider::Anthropic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenaiCompatible => "openai-compatible",
            Provider::Gemini => "gemini",
            Provider::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai-compatible" | "openai" => Ok(Provider::OpenaiCompatible),
            "gemini" | "google" => Ok(Provider::Gemini),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            other => Err(anyhow!("unknown provider: {}", other)),
        }
    }
}

/**
 * \brief 连接模式：直连 Provider，或经由用户自有代理转发。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionMode {
    #[default]
    Direct,
    Proxy,
}

impl ConnectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionMode::Direct => "direct",
            ConnectionMode::Proxy => "proxy",
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ConnectionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(ConnectionMode::Direct),
            "proxy" => Ok(ConnectionMode::Proxy),
            other => Err(anyhow!("unknown connection mode: {}", other)),
        }
    }
}

/**
 * \brief 已配置的 AI 端点。
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AIModel {
    /** \brief 不透明标识 */
    pub id: String,
    /** \brief 显示名称 */
    pub name: String,
    pub provider: Provider,
    /** \brief 请求地址；代理模式下为用户自有服务地址 */
    pub endpoint: String,
    /** \brief 凭据，仅直连模式有意义，可为空 */
    pub api_key: String,
    /** \brief Provider 侧模型标识 */
    pub model: String,
    pub mode: ConnectionMode,
}

impl AIModel {
    /**
     * \brief 凭据是否会随请求发出。
     */
    pub fn exposes_credential(&self) -> bool {
        self.mode == ConnectionMode::Direct
    }
}

/**
 * \brief 新增/编辑模型时使用的表单数据（不含 id）。
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDraft {
    pub name: String,
    pub provider: Provider,
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub mode: ConnectionMode,
}

impl ModelDraft {
    pub fn into_model(self, id: String) -> AIModel {
        AIModel {
            id,
            name: self.name,
            provider: self.provider,
            endpoint: self.endpoint,
            api_key: self.api_key,
            model: self.model,
            mode: self.mode,
        }
    }
}

/**
 * \brief 静态预设条目，仅用于预填 AIModel。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelPreset {
    pub id: &'static str,
    pub name: &'static str,
    pub provider: Provider,
    pub endpoint: &'static str,
    pub model: &'static str,
    pub mode: ConnectionMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BorderRadius {
    None,
    Small,
    Medium,
    Large,
    #[default]
    Full,
}

impl BorderRadius {
    pub fn css(&self) -> &'static str {
        match self {
            BorderRadius::None => "0px",
            BorderRadius::Small => "6px",
            BorderRadius::Medium => "12px",
            BorderRadius::Large => "20px",
            BorderRadius::Full => "9999px",
        }
    }
}

impl FromStr for BorderRadius {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(BorderRadius::None),
            "small" => Ok(BorderRadius::Small),
            "medium" => Ok(BorderRadius::Medium),
            "large" => Ok(BorderRadius::Large),
            "full" => Ok(BorderRadius::Full),
            other => Err(anyhow!("unknown border radius: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    BottomLeft,
    #[default]
    BottomRight,
}

impl Position {
    /** \brief 水平方向的 CSS 属性名。 */
    pub fn css_side(&self) -> &'static str {
        match self {
            Position::BottomLeft => "left",
            Position::BottomRight => "right",
        }
    }
}

impl FromStr for Position {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bottom-left" | "left" => Ok(Position::BottomLeft),
            "bottom-right" | "right" => Ok(Position::BottomRight),
            other => Err(anyhow!("unknown position: {}", other)),
        }
    }
}

/**
 * \brief 浮动按钮样式。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonStyle {
    pub label: String,
    /** \brief 背景色，#rgb 或 #rrggbb */
    pub background: String,
    /** \brief 文字颜色 */
    pub text_color: String,
    #[serde(default)]
    pub radius: BorderRadius,
    #[serde(default)]
    pub position: Position,
}

impl Default for ButtonStyle {
    fn default() -> Self {
        ButtonStyle {
            label: "Chat with us".to_string(),
            background: "#2563eb".to_string(),
            text_color: "#ffffff".to_string(),
            radius: BorderRadius::Full,
            position: Position::BottomRight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/**
 * \brief 消息结构，与 OpenAI Chat 消息格式对齐。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /** \brief 角色：user/assistant */
    pub role: Role,
    /** \brief 内容 */
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
