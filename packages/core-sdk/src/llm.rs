use anyhow::{Context, Result};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::{json, Value};

use crate::models::{AIModel, ConnectionMode, Provider};
use crate::telemetry;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const ANTHROPIC_MAX_TOKENS: u32 = 1024;
/** \brief 允许浏览器直接调用 Anthropic API 的请求头。 */
pub const ANTHROPIC_BROWSER_ACCESS: &str = "anthropic-dangerous-direct-browser-access";

pub const NO_RESPONSE: &str = "No response";
pub const UNKNOWN_FORMAT: &str = "Unknown response format";
pub const ERROR_PREFIX: &str = "Error: ";

/**
 * \brief 请求实际使用的协议方言：代理模式统一为一种，直连模式按 Provider 区分。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dialect {
    Proxy,
    OpenaiCompatible,
    Gemini,
    Anthropic,
}

impl Dialect {
    pub const ALL: [Dialect; 4] = [
        Dialect::Proxy,
        Dialect::OpenaiCompatible,
        Dialect::Gemini,
        Dialect::Anthropic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Proxy => "proxy",
            Dialect::OpenaiCompatible => "openai-compatible",
            Dialect::Gemini => "gemini",
            Dialect::Anthropic => "anthropic",
        }
    }

    pub fn reply_chain(&self) -> &'static ReplyChain {
        match self {
            Dialect::Proxy => &PROXY_CHAIN,
            Dialect::OpenaiCompatible => &OPENAI_CHAIN,
            Dialect::Gemini => &GEMINI_CHAIN,
            Dialect::Anthropic => &ANTHROPIC_CHAIN,
        }
    }
}

pub fn dialect(model: &AIModel) -> Dialect {
    match (model.mode, model.provider) {
        (ConnectionMode::Proxy, _) => Dialect::Proxy,
        (ConnectionMode::Direct, Provider::OpenaiCompatible) => Dialect::OpenaiCompatible,
        (ConnectionMode::Direct, Provider::Gemini) => Dialect::Gemini,
        (ConnectionMode::Direct, Provider::Anthropic) => Dialect::Anthropic,
    }
}

/**
 * \brief JSON 路径中的一步：对象键或数组下标。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Step {
    Key(&'static str),
    Index(usize),
}

/**
 * \brief 具名的回复提取策略，沿 `path` 取值，只有非空字符串才算命中。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplyStrategy {
    pub name: &'static str,
    pub path: &'static [Step],
}

impl ReplyStrategy {
    pub fn extract<'a>(&self, v: &'a Value) -> Option<&'a str> {
        let mut cur = v;
        for step in self.path {
            cur = match step {
                Step::Key(k) => cur.get(*k)?,
                Step::Index(i) => cur.get(*i)?,
            };
        }
        cur.as_str().filter(|s| !s.is_empty())
    }
}

/**
 * \brief 有序策略表加兜底文本。顺序即优先级，预览与导出脚本共用同一份表。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplyChain {
    pub strategies: &'static [ReplyStrategy],
    pub fallback: &'static str,
}

impl ReplyChain {
    pub fn resolve(&self, v: &Value) -> String {
        self.strategies
            .iter()
            .find_map(|s| s.extract(v))
            .unwrap_or(self.fallback)
            .to_string()
    }
}

const CHOICES_CONTENT: ReplyStrategy = ReplyStrategy {
    name: "choices",
    path: &[
        Step::Key("choices"),
        Step::Index(0),
        Step::Key("message"),
        Step::Key("content"),
    ],
};

const ERROR_MESSAGE: ReplyStrategy = ReplyStrategy {
    name: "error",
    path: &[Step::Key("error"), Step::Key("message")],
};

/// The proxy contract (`content`, then `choices[0].message.content`, then
/// `output`) is a convention of this tool, not a published standard.
pub static PROXY_CHAIN: ReplyChain = ReplyChain {
    strategies: &[
        ReplyStrategy {
            name: "content",
            path: &[Step::Key("content")],
        },
        CHOICES_CONTENT,
        ReplyStrategy {
            name: "output",
            path: &[Step::Key("output")],
        },
    ],
    fallback: UNKNOWN_FORMAT,
};

pub static OPENAI_CHAIN: ReplyChain = ReplyChain {
    strategies: &[CHOICES_CONTENT, ERROR_MESSAGE],
    fallback: NO_RESPONSE,
};

pub static GEMINI_CHAIN: ReplyChain = ReplyChain {
    strategies: &[
        ReplyStrategy {
            name: "candidates",
            path: &[
                Step::Key("candidates"),
                Step::Index(0),
                Step::Key("content"),
                Step::Key("parts"),
                Step::Index(0),
                Step::Key("text"),
            ],
        },
        ERROR_MESSAGE,
    ],
    fallback: NO_RESPONSE,
};

pub static ANTHROPIC_CHAIN: ReplyChain = ReplyChain {
    strategies: &[
        ReplyStrategy {
            name: "content",
            path: &[Step::Key("content"), Step::Index(0), Step::Key("text")],
        },
        ERROR_MESSAGE,
    ],
    fallback: NO_RESPONSE,
};

/**
 * \brief 一次 HTTP 请求的完整描述，不含任何网络副作用。
 */
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSpec {
    pub method: &'static str,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl RequestSpec {
    fn post(url: String, body: Value) -> Self {
        RequestSpec {
            method: "POST",
            url,
            headers: vec![(CONTENT_TYPE.as_str().to_string(), "application/json".to_string())],
            body,
        }
    }

    fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/**
 * \brief 将单条用户消息映射为目标方言的请求。
 */
pub fn build_request(model: &AIModel, content: &str) -> RequestSpec {
    let endpoint = model.endpoint.trim_end_matches('/');
    match dialect(model) {
        Dialect::Proxy => RequestSpec::post(
            endpoint.to_string(),
            json!({
                "messages": [{"role": "user", "content": content}],
                "model": model.model,
            }),
        ),
        Dialect::OpenaiCompatible => RequestSpec::post(
            endpoint.to_string(),
            json!({
                "model": model.model,
                "messages": [{"role": "user", "content": content}],
            }),
        )
        .header(AUTHORIZATION.as_str(), format!("Bearer {}", model.api_key)),
        Dialect::Gemini => RequestSpec::post(
            format!(
                "{}/models/{}:generateContent?key={}",
                endpoint, model.model, model.api_key
            ),
            json!({
                "contents": [{"parts": [{"text": content}]}],
            }),
        ),
        Dialect::Anthropic => RequestSpec::post(
            endpoint.to_string(),
            json!({
                "model": model.model,
                "max_tokens": ANTHROPIC_MAX_TOKENS,
                "messages": [{"role": "user", "content": content}],
            }),
        )
        .header("x-api-key", model.api_key.clone())
        .header("anthropic-version", ANTHROPIC_VERSION)
        .header(ANTHROPIC_BROWSER_ACCESS, "true"),
    }
}

/**
 * \brief 按模型方言解析已解码的响应体。
 */
pub fn parse_reply(model: &AIModel, v: &Value) -> String {
    dialect(model).reply_chain().resolve(v)
}

pub fn transport_error<E: std::fmt::Display>(e: E) -> String {
    format!("{}{}", ERROR_PREFIX, e)
}

/**
 * \brief 发送一次请求并返回可展示的回复；传输失败同样以 `Error: ...` 文本返回，不重试。
 */
pub async fn send(client: &reqwest::Client, model: &AIModel, content: &str) -> String {
    let spec = build_request(model, content);
    match execute(client, &spec).await {
        Ok((status, v)) => {
            telemetry::log_event(
                "llm.send",
                &format!(
                    "model={} dialect={} status={}",
                    model.name,
                    dialect(model).as_str(),
                    status
                ),
            );
            parse_reply(model, &v)
        }
        Err(e) => {
            telemetry::log_error(
                "llm.send",
                &format!(
                    "model={} dialect={} failed: {:#}",
                    model.name,
                    dialect(model).as_str(),
                    e
                ),
            );
            transport_error(e)
        }
    }
}

async fn execute(client: &reqwest::Client, spec: &RequestSpec) -> Result<(u16, Value)> {
    let mut req = client.post(&spec.url);
    for (name, value) in &spec.headers {
        req = req.header(name.as_str(), value.as_str());
    }
    let resp = req.json(&spec.body).send().await?;
    let status = resp.status().as_u16();
    let text = resp.text().await?;
    let v: Value = serde_json::from_str(&text)
        .with_context(|| format!("response is not valid JSON (status {})", status))?;
    Ok((status, v))
}
