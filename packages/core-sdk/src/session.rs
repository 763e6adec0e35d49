use anyhow::Result;
use serde::Serialize;

use crate::codegen;
use crate::config::Config;
use crate::error::{SessionError, ValidationError};
use crate::llm;
use crate::models::{AIModel, ButtonStyle, ConnectionMode, ModelDraft, Provider};
use crate::registry::{ModelRegistry, BUILTIN_MODEL_ID};
use crate::telemetry;
use crate::widget::{PendingSend, PreviewWidget};

/**
 * \brief 一次待发送的消息，携带提交时刻的模型快照。
 */
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub pending: PendingSend,
    pub model: AIModel,
}

/**
 * \brief 对外展示的模型条目，不含凭据原文。
 */
#[derive(Debug, Clone, Serialize)]
pub struct ModelView {
    pub id: String,
    pub name: String,
    pub provider: Provider,
    pub endpoint: String,
    pub model: String,
    pub mode: ConnectionMode,
    pub has_api_key: bool,
    pub builtin: bool,
}

impl From<&AIModel> for ModelView {
    fn from(m: &AIModel) -> Self {
        ModelView {
            id: m.id.clone(),
            name: m.name.clone(),
            provider: m.provider,
            endpoint: m.endpoint.clone(),
            model: m.model.clone(),
            mode: m.mode,
            has_api_key: !m.api_key.is_empty(),
            builtin: m.id == BUILTIN_MODEL_ID,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub models: Vec<ModelView>,
    pub selected_model_id: String,
    pub style: ButtonStyle,
    pub widget: PreviewWidget,
}

/**
 * \brief 应用状态的唯一持有者：模型列表、当前选择、样式与预览挂件。
 */
#[derive(Debug, Clone)]
pub struct Session {
    registry: ModelRegistry,
    selected: String,
    style: ButtonStyle,
    widget: PreviewWidget,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        let registry = ModelRegistry::new(config.demo_api_key.as_deref());
        let widget = PreviewWidget::new(&registry.builtin().name);
        Session {
            registry,
            selected: BUILTIN_MODEL_ID.to_string(),
            style: ButtonStyle::default(),
            widget,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn style(&self) -> &ButtonStyle {
        &self.style
    }

    pub fn widget(&self) -> &PreviewWidget {
        &self.widget
    }

    pub fn selected_model(&self) -> &AIModel {
        self.registry
            .get(&self.selected)
            .unwrap_or_else(|| self.registry.builtin())
    }

    /**
     * \brief 切换当前模型；切换到不同模型时重置会话并关闭面板。
     */
    pub fn select_model(&mut self, id: &str) -> Result<(), SessionError> {
        let name = self
            .registry
            .get(id)
            .map(|m| m.name.clone())
            .ok_or_else(|| SessionError::UnknownModel(id.to_string()))?;
        if self.selected != id {
            self.selected = id.to_string();
            self.widget.reset(&name);
            telemetry::log_event("session.select", &format!("model={}", name));
        }
        Ok(())
    }

    pub fn add_model(&mut self, draft: ModelDraft) -> Result<String, SessionError> {
        let id = self.registry.add(draft)?;
        telemetry::log_event("session.model", &format!("add id={}", id));
        Ok(id)
    }

    /**
     * \brief 编辑模型；若编辑的是当前模型，会话随之重置。
     */
    pub fn update_model(&mut self, id: &str, draft: ModelDraft) -> Result<(), SessionError> {
        let name = self.registry.update(id, draft)?.name.clone();
        if self.selected == id {
            self.widget.reset(&name);
        }
        telemetry::log_event("session.model", &format!("update id={}", id));
        Ok(())
    }

    /**
     * \brief 删除模型；删除当前模型时回退到内置模型。
     */
    pub fn remove_model(&mut self, id: &str) -> Result<(), SessionError> {
        self.registry.remove(id)?;
        if self.selected == id {
            self.selected = BUILTIN_MODEL_ID.to_string();
            let name = self.registry.builtin().name.clone();
            self.widget.reset(&name);
        }
        telemetry::log_event("session.model", &format!("remove id={}", id));
        Ok(())
    }

    pub fn set_style(&mut self, style: ButtonStyle) -> Result<(), SessionError> {
        self.style = validate_style(style)?;
        Ok(())
    }

    pub fn toggle_widget(&mut self) -> bool {
        self.widget.toggle()
    }

    /**
     * \brief 提交输入；空白输入或已有请求在途时返回 None。
     */
    pub fn submit(&mut self, input: &str) -> Option<Outgoing> {
        let model = self.selected_model().clone();
        self.widget
            .submit(input)
            .map(|pending| Outgoing { pending, model })
    }

    pub fn complete(&mut self, outgoing: &Outgoing, reply: impl Into<String>) -> bool {
        let accepted = self.widget.complete(&outgoing.pending, reply);
        if !accepted {
            telemetry::log_event(
                "session.complete",
                &format!("discarded stale reply for model={}", outgoing.model.name),
            );
        }
        accepted
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            models: self.registry.list().iter().map(ModelView::from).collect(),
            selected_model_id: self.selected_model().id.clone(),
            style: self.style.clone(),
            widget: self.widget.clone(),
        }
    }

    pub fn export_script(&self) -> Result<String> {
        codegen::generate_script(&self.style, self.selected_model())
    }

    pub fn export_snippet(&self) -> Result<String> {
        codegen::embed_snippet(&self.style, self.selected_model())
    }

    pub fn preview_page(&self) -> Result<String> {
        codegen::preview_page(&self.style, self.selected_model())
    }
}

/**
 * \brief 执行一次待发送的消息；内置演示模型未配置凭据时返回模拟回复。
 */
pub async fn dispatch(client: &reqwest::Client, outgoing: &Outgoing) -> String {
    if is_simulated(&outgoing.model) {
        return simulated_reply(&outgoing.pending.content);
    }
    llm::send(client, &outgoing.model, &outgoing.pending.content).await
}

fn is_simulated(model: &AIModel) -> bool {
    model.id == BUILTIN_MODEL_ID && model.api_key.is_empty()
}

pub fn simulated_reply(content: &str) -> String {
    format!(
        "(demo) No API key is configured for the built-in model, so this reply is simulated. You said: \"{}\"",
        content
    )
}

/**
 * \brief 校验样式：标签非空，颜色为 #rgb 或 #rrggbb。
 */
pub fn validate_style(mut style: ButtonStyle) -> Result<ButtonStyle, ValidationError> {
    style.label = style.label.trim().to_string();
    style.background = style.background.trim().to_string();
    style.text_color = style.text_color.trim().to_string();
    if style.label.is_empty() {
        return Err(ValidationError::Missing("label"));
    }
    if !is_hex_color(&style.background) {
        return Err(ValidationError::InvalidColor {
            field: "background",
            value: style.background,
        });
    }
    if !is_hex_color(&style.text_color) {
        return Err(ValidationError::InvalidColor {
            field: "text_color",
            value: style.text_color,
        });
    }
    Ok(style)
}

fn is_hex_color(s: &str) -> bool {
    match s.strip_prefix('#') {
        Some(hex) => matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}
