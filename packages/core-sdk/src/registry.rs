use reqwest::Url;
use uuid::Uuid;

use crate::error::{SessionError, ValidationError};
use crate::models::{AIModel, ConnectionMode, ModelDraft, ModelPreset, Provider};

pub const BUILTIN_MODEL_ID: &str = "builtin-demo";
pub const BUILTIN_MODEL_NAME: &str = "WidgetForge Demo";

const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

static PRESETS: &[ModelPreset] = &[
    ModelPreset {
        id: "openai",
        name: "OpenAI GPT-4o mini",
        provider: Provider::OpenaiCompatible,
        endpoint: "https://api.openai.com/v1/chat/completions",
        model: "gpt-4o-mini",
        mode: ConnectionMode::Direct,
    },
    ModelPreset {
        id: "gemini",
        name: "Google Gemini 1.5 Flash",
        provider: Provider::Gemini,
        endpoint: GEMINI_BASE,
        model: "gemini-1.5-flash",
        mode: ConnectionMode::Direct,
    },
    ModelPreset {
        id: "anthropic",
        name: "Anthropic Claude 3.5 Sonnet",
        provider: Provider::Anthropic,
        endpoint: "https://api.anthropic.com/v1/messages",
        model: "claude-3-5-sonnet-latest",
        mode: ConnectionMode::Direct,
    },
    ModelPreset {
        id: "groq",
        name: "Groq Llama 3.1 8B",
        provider: Provider::OpenaiCompatible,
        endpoint: "https://api.groq.com/openai/v1/chat/completions",
        model: "llama-3.1-8b-instant",
        mode: ConnectionMode::Direct,
    },
    ModelPreset {
        id: "deepseek",
        name: "DeepSeek Chat",
        provider: Provider::OpenaiCompatible,
        endpoint: "https://api.deepseek.com/chat/completions",
        model: "deepseek-chat",
        mode: ConnectionMode::Direct,
    },
    ModelPreset {
        id: "custom-proxy",
        name: "Custom proxy",
        provider: Provider::OpenaiCompatible,
        endpoint: "https://your-domain.example/api/chat",
        model: "gpt-4o-mini",
        mode: ConnectionMode::Proxy,
    },
];

pub fn presets() -> &'static [ModelPreset] {
    PRESETS
}

pub fn preset(id: &str) -> Option<&'static ModelPreset> {
    PRESETS.iter().find(|p| p.id == id)
}

/**
 * \brief 用预设预填表单，凭据留空。
 */
pub fn draft_from_preset(id: &str) -> Option<ModelDraft> {
    preset(id).map(|p| ModelDraft {
        name: p.name.to_string(),
        provider: p.provider,
        endpoint: p.endpoint.to_string(),
        api_key: String::new(),
        model: p.model.to_string(),
        mode: p.mode,
    })
}

/**
 * \brief 校验并规整表单：去除首尾空白，直连模式要求绝对 http(s) 地址。
 */
pub fn validate_draft(mut draft: ModelDraft) -> Result<ModelDraft, ValidationError> {
    draft.name = draft.name.trim().to_string();
    draft.endpoint = draft.endpoint.trim().to_string();
    draft.model = draft.model.trim().to_string();
    draft.api_key = draft.api_key.trim().to_string();

    if draft.name.is_empty() {
        return Err(ValidationError::Missing("name"));
    }
    if draft.endpoint.is_empty() {
        return Err(ValidationError::Missing("endpoint"));
    }
    if draft.model.is_empty() {
        return Err(ValidationError::Missing("model"));
    }
    if draft.mode == ConnectionMode::Direct && !is_absolute_http_url(&draft.endpoint) {
        return Err(ValidationError::InvalidEndpoint(draft.endpoint));
    }
    Ok(draft)
}

fn is_absolute_http_url(s: &str) -> bool {
    match Url::parse(s) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

/**
 * \brief 会话内的模型列表：内置演示模型始终位于首位且不可删除。
 */
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRegistry {
    models: Vec<AIModel>,
}

impl ModelRegistry {
    pub fn new(demo_api_key: Option<&str>) -> Self {
        let builtin = AIModel {
            id: BUILTIN_MODEL_ID.to_string(),
            name: BUILTIN_MODEL_NAME.to_string(),
            provider: Provider::Gemini,
            endpoint: GEMINI_BASE.to_string(),
            api_key: demo_api_key.unwrap_or_default().to_string(),
            model: "gemini-1.5-flash".to_string(),
            mode: ConnectionMode::Direct,
        };
        ModelRegistry {
            models: vec![builtin],
        }
    }

    /** \brief 内置模型，恒在首位。 */
    pub fn builtin(&self) -> &AIModel {
        &self.models[0]
    }

    pub fn list(&self) -> &[AIModel] {
        &self.models
    }

    pub fn get(&self, id: &str) -> Option<&AIModel> {
        self.models.iter().find(|m| m.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn add(&mut self, draft: ModelDraft) -> Result<String, SessionError> {
        let draft = validate_draft(draft)?;
        let id = Uuid::new_v4().to_string();
        self.models.push(draft.into_model(id.clone()));
        Ok(id)
    }

    /**
     * \brief 用表单覆盖模型。快照不回传凭据原文，因此表单凭据为空时沿用已存凭据。
     */
    pub fn update(&mut self, id: &str, draft: ModelDraft) -> Result<&AIModel, SessionError> {
        let mut draft = validate_draft(draft)?;
        let slot = self
            .models
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| SessionError::UnknownModel(id.to_string()))?;
        if draft.api_key.is_empty() {
            draft.api_key = std::mem::take(&mut slot.api_key);
        }
        *slot = draft.into_model(id.to_string());
        Ok(slot)
    }

    pub fn remove(&mut self, id: &str) -> Result<AIModel, SessionError> {
        if id == BUILTIN_MODEL_ID {
            return Err(SessionError::BuiltInModel);
        }
        let pos = self
            .models
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| SessionError::UnknownModel(id.to_string()))?;
        Ok(self.models.remove(pos))
    }
}
