use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;

use crate::llm::{self, Dialect, ReplyChain};
use crate::models::{AIModel, ButtonStyle, ConnectionMode, Provider};
use crate::widget;

const CONFIG_SLOT: &str = "__WIDGETFORGE_CONFIG__";
const PROTOCOL_SLOT: &str = "__WIDGETFORGE_PROTOCOL__";
const SNIPPET_SLOT: &str = "__WIDGETFORGE_SNIPPET__";
const TITLE_SLOT: &str = "__WIDGETFORGE_TITLE__";

/**
 * \brief 嵌入脚本读取的挂件配置。凭据仅在直连模式下出现。
 */
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedConfig<'a> {
    pub label: &'a str,
    pub background: &'a str,
    pub text_color: &'a str,
    pub radius: &'static str,
    pub side: &'static str,
    pub title: &'a str,
    pub greeting: String,
    pub provider: Provider,
    pub mode: ConnectionMode,
    pub dialect: Dialect,
    pub endpoint: &'a str,
    pub model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<&'a str>,
}

impl<'a> EmbedConfig<'a> {
    pub fn new(style: &'a ButtonStyle, model: &'a AIModel) -> Self {
        EmbedConfig {
            label: &style.label,
            background: &style.background,
            text_color: &style.text_color,
            radius: style.radius.css(),
            side: style.position.css_side(),
            title: &model.name,
            greeting: widget::greeting(&model.name),
            provider: model.provider,
            mode: model.mode,
            dialect: llm::dialect(model),
            endpoint: model.endpoint.trim_end_matches('/'),
            model: &model.model,
            api_key: model
                .exposes_credential()
                .then_some(model.api_key.as_str()),
        }
    }
}

/**
 * \brief 协议常量与回复提取表，直接取自 `llm`，保证预览与导出脚本一致。
 */
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolTable {
    pub anthropic_version: &'static str,
    pub anthropic_max_tokens: u32,
    pub anthropic_browser_access: &'static str,
    pub error_prefix: &'static str,
    pub chains: BTreeMap<&'static str, &'static ReplyChain>,
}

impl ProtocolTable {
    pub fn current() -> Self {
        ProtocolTable {
            anthropic_version: llm::ANTHROPIC_VERSION,
            anthropic_max_tokens: llm::ANTHROPIC_MAX_TOKENS,
            anthropic_browser_access: llm::ANTHROPIC_BROWSER_ACCESS,
            error_prefix: llm::ERROR_PREFIX,
            chains: Dialect::ALL
                .iter()
                .map(|d| (d.as_str(), d.reply_chain()))
                .collect(),
        }
    }
}

/**
 * \brief 生成可独立运行的嵌入脚本（不含 `<script>` 标签）。
 */
pub fn generate_script(style: &ButtonStyle, model: &AIModel) -> Result<String> {
    let config = inline_json(&EmbedConfig::new(style, model))?;
    let protocol = inline_json(&ProtocolTable::current())?;
    Ok(fill(
        SCRIPT_TEMPLATE,
        &[(CONFIG_SLOT, config.as_str()), (PROTOCOL_SLOT, protocol.as_str())],
    ))
}

/**
 * \brief 可直接粘贴到任意 HTML 页面的代码片段。
 */
pub fn embed_snippet(style: &ButtonStyle, model: &AIModel) -> Result<String> {
    let script = generate_script(style, model)?;
    Ok(format!("<script>\n{}\n</script>", script))
}

/**
 * \brief 嵌入了当前挂件的模拟网站页面，用于实时预览。
 */
pub fn preview_page(style: &ButtonStyle, model: &AIModel) -> Result<String> {
    let snippet = embed_snippet(style, model)?;
    let title = escape_html(&model.name);
    Ok(fill(
        PREVIEW_TEMPLATE,
        &[(TITLE_SLOT, title.as_str()), (SNIPPET_SLOT, snippet.as_str())],
    ))
}

/**
 * \brief 单遍填充模板占位符；已填入的内容不会被再次扫描。
 */
fn fill(template: &str, slots: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        let next = slots
            .iter()
            .filter_map(|(name, value)| rest.find(name).map(|pos| (pos, *name, *value)))
            .min_by_key(|(pos, _, _)| *pos);
        match next {
            Some((pos, name, value)) => {
                out.push_str(&rest[..pos]);
                out.push_str(value);
                rest = &rest[pos + name.len()..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

/**
 * \brief 序列化为可安全内联到 `<script>` 中的 JSON。
 * `<` `>` `&` 以 `\uXXXX` 形式写出，因此含这些字符的凭据在脚本文本中不是原文，
 * 但 JS 解析后的值与原文一致。
 */
fn inline_json<T: Serialize>(value: &T) -> Result<String> {
    let raw = serde_json::to_string(value)?;
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    Ok(out)
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
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

const SCRIPT_TEMPLATE: &str = r##"/* WidgetForge chat widget */
(function () {
  "use strict";
  var CONFIG = __WIDGETFORGE_CONFIG__;
  var PROTOCOL = __WIDGETFORGE_PROTOCOL__;
  if (window.__widgetforgeMounted) return;
  window.__widgetforgeMounted = true;

  function pick(data, path) {
    var cur = data;
    for (var i = 0; i < path.length; i++) {
      if (cur === null || typeof cur !== "object") return null;
      cur = cur[path[i]];
    }
    return typeof cur === "string" && cur.length > 0 ? cur : null;
  }

  function resolveReply(data) {
    var chain = PROTOCOL.chains[CONFIG.dialect];
    for (var i = 0; i < chain.strategies.length; i++) {
      var hit = pick(data, chain.strategies[i].path);
      if (hit !== null) return hit;
    }
    return chain.fallback;
  }

  function buildRequest(content) {
    var headers = { "Content-Type": "application/json" };
    var messages = [{ role: "user", content: content }];
    switch (CONFIG.dialect) {
      case "openai-compatible":
        headers["Authorization"] = "Bearer " + CONFIG.apiKey;
        return { url: CONFIG.endpoint, headers: headers, body: { model: CONFIG.model, messages: messages } };
      case "gemini":
        return {
          url: CONFIG.endpoint + "/models/" + CONFIG.model + ":generateContent?key=" + CONFIG.apiKey,
          headers: headers,
          body: { contents: [{ parts: [{ text: content }] }] }
        };
      case "anthropic":
        headers["x-api-key"] = CONFIG.apiKey;
        headers["anthropic-version"] = PROTOCOL.anthropicVersion;
        headers[PROTOCOL.anthropicBrowserAccess] = "true";
        return {
          url: CONFIG.endpoint,
          headers: headers,
          body: { model: CONFIG.model, max_tokens: PROTOCOL.anthropicMaxTokens, messages: messages }
        };
      default:
        return { url: CONFIG.endpoint, headers: headers, body: { messages: messages, model: CONFIG.model } };
    }
  }

  function ask(content) {
    var req = buildRequest(content);
    return fetch(req.url, { method: "POST", headers: req.headers, body: JSON.stringify(req.body) })
      .then(function (res) { return res.json(); })
      .then(resolveReply)
      .catch(function (err) {
        return PROTOCOL.errorPrefix + (err && err.message ? err.message : String(err));
      });
  }

  function el(tag, css, text) {
    var node = document.createElement(tag);
    if (css) node.style.cssText = css;
    if (text !== undefined) node.textContent = text;
    return node;
  }

  var font = "font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',sans-serif;";
  var corner = CONFIG.side + ":24px;bottom:24px;";

  var button = el("button",
    "position:fixed;" + corner + "z-index:2147483000;padding:12px 20px;border:none;cursor:pointer;" +
    "box-shadow:0 4px 14px rgba(0,0,0,.2);" + font + "font-size:14px;font-weight:600;" +
    "background:" + CONFIG.background + ";color:" + CONFIG.textColor + ";border-radius:" + CONFIG.radius + ";",
    CONFIG.label);

  var panel = el("div",
    "position:fixed;" + CONFIG.side + ":24px;bottom:84px;z-index:2147483000;width:340px;max-height:480px;" +
    "display:none;flex-direction:column;background:#fff;border-radius:12px;overflow:hidden;" +
    "box-shadow:0 8px 30px rgba(0,0,0,.25);" + font);

  var header = el("div",
    "padding:12px 16px;font-weight:600;font-size:14px;background:" + CONFIG.background + ";color:" + CONFIG.textColor + ";",
    CONFIG.title);

  var list = el("div", "flex:1;overflow-y:auto;padding:12px;display:flex;flex-direction:column;gap:8px;min-height:200px;");

  var form = el("form", "display:flex;gap:8px;padding:10px;border-top:1px solid #eee;");
  var input = el("input", "flex:1;padding:8px 10px;border:1px solid #ddd;border-radius:6px;font-size:14px;outline:none;");
  input.placeholder = "Type a message...";
  var send = el("button",
    "padding:8px 14px;border:none;border-radius:6px;cursor:pointer;font-weight:600;" +
    "background:" + CONFIG.background + ";color:" + CONFIG.textColor + ";",
    "Send");
  send.type = "submit";

  form.appendChild(input);
  form.appendChild(send);
  panel.appendChild(header);
  panel.appendChild(list);
  panel.appendChild(form);

  function addMessage(role, text) {
    var mine = role === "user";
    var bubble = el("div",
      "max-width:80%;padding:8px 12px;border-radius:10px;font-size:14px;line-height:1.45;white-space:pre-wrap;word-wrap:break-word;" +
      (mine
        ? "align-self:flex-end;background:" + CONFIG.background + ";color:" + CONFIG.textColor + ";"
        : "align-self:flex-start;background:#f1f3f5;color:#1f2328;"),
      text);
    list.appendChild(bubble);
    list.scrollTop = list.scrollHeight;
  }

  var busy = false;

  button.addEventListener("click", function () {
    var open = panel.style.display !== "none";
    panel.style.display = open ? "none" : "flex";
    if (!open) input.focus();
  });

  form.addEventListener("submit", function (e) {
    e.preventDefault();
    var text = input.value.trim();
    if (!text || busy) return;
    busy = true;
    send.disabled = true;
    input.value = "";
    addMessage("user", text);
    ask(text).then(function (reply) {
      addMessage("assistant", reply);
      busy = false;
      send.disabled = false;
    });
  });

  function mount() {
    addMessage("assistant", CONFIG.greeting);
    document.body.appendChild(panel);
    document.body.appendChild(button);
  }

  if (document.readyState === "loading") {
    document.addEventListener("DOMContentLoaded", mount);
  } else {
    mount();
  }
})();"##;

const PREVIEW_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width,initial-scale=1">
<title>Acme Outdoor Co. · __WIDGETFORGE_TITLE__</title>
<style>
*{margin:0;padding:0;box-sizing:border-box}
body{font-family:Georgia,serif;background:#faf7f2;color:#2b2b2b;line-height:1.6}
nav{display:flex;justify-content:space-between;padding:18px 40px;background:#fff;border-bottom:1px solid #e8e2d8}
nav .brand{font-weight:700;letter-spacing:.04em}
nav a{margin-left:22px;color:#555;text-decoration:none;font-size:14px}
.hero{padding:90px 40px;text-align:center;background:linear-gradient(135deg,#d9e4dd,#f3e9dc)}
.hero h1{font-size:40px;margin-bottom:12px}
.grid{display:grid;grid-template-columns:repeat(auto-fit,minmax(220px,1fr));gap:24px;padding:48px 40px}
.card{background:#fff;border:1px solid #e8e2d8;border-radius:8px;padding:22px;min-height:140px}
footer{padding:30px 40px;color:#888;font-size:13px}
</style>
</head>
<body>
<nav><span class="brand">ACME OUTDOOR</span><span><a href="#">Shop</a><a href="#">Journal</a><a href="#">Support</a></span></nav>
<section class="hero"><h1>Gear for every trail</h1><p>Preview of your chat widget powered by __WIDGETFORGE_TITLE__.</p></section>
<section class="grid">
<div class="card"><h3>Tents</h3><p>Lightweight shelters for two to six people.</p></div>
<div class="card"><h3>Packs</h3><p>Daypacks and expedition packs built to last.</p></div>
<div class="card"><h3>Footwear</h3><p>Trail runners and boots for any terrain.</p></div>
</section>
<footer>This page is a mock website rendered by WidgetForge.</footer>
__WIDGETFORGE_SNIPPET__
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BorderRadius, Position};
    use serde_json::Value;

    fn model(mode: ConnectionMode) -> AIModel {
        AIModel {
            id: "m1".to_string(),
            name: "Support Bot".to_string(),
            provider: Provider::Anthropic,
            endpoint: "https://api.anthropic.com/v1/messages/".to_string(),
            api_key: "sk-ant-VERY-SECRET-123".to_string(),
            model: "claude-3-5-sonnet-latest".to_string(),
            mode,
        }
    }

    fn config_of(script: &str) -> Value {
        let start = script.find("var CONFIG = ").expect("config slot") + "var CONFIG = ".len();
        let end = start + script[start..].find(";\n").expect("config end");
        serde_json::from_str(&script[start..end]).expect("config is json")
    }

    #[test]
    fn test_direct_mode_embeds_credential() {
        let script = generate_script(&ButtonStyle::default(), &model(ConnectionMode::Direct)).unwrap();
        assert!(script.contains("sk-ant-VERY-SECRET-123"));
        let cfg = config_of(&script);
        assert_eq!(cfg["apiKey"], "sk-ant-VERY-SECRET-123");
        assert_eq!(cfg["dialect"], "anthropic");
        assert_eq!(cfg["endpoint"], "https://api.anthropic.com/v1/messages");
    }

    #[test]
    fn test_proxy_mode_never_embeds_credential() {
        for provider in Provider::ALL {
            let m = AIModel {
                provider,
                ..model(ConnectionMode::Proxy)
            };
            let script = generate_script(&ButtonStyle::default(), &m).unwrap();
            assert!(!script.contains("sk-ant-VERY-SECRET-123"));
            let cfg = config_of(&script);
            assert!(cfg.get("apiKey").is_none());
            assert_eq!(cfg["dialect"], "proxy");
        }
        let snippet = embed_snippet(&ButtonStyle::default(), &model(ConnectionMode::Proxy)).unwrap();
        assert!(!snippet.contains("VERY-SECRET"));
    }

    #[test]
    fn test_style_fields_reach_config() {
        let style = ButtonStyle {
            label: "Ask us".to_string(),
            background: "#111".to_string(),
            text_color: "#fafafa".to_string(),
            radius: BorderRadius::Small,
            position: Position::BottomLeft,
        };
        let script = generate_script(&style, &model(ConnectionMode::Direct)).unwrap();
        let cfg = config_of(&script);
        assert_eq!(cfg["label"], "Ask us");
        assert_eq!(cfg["background"], "#111");
        assert_eq!(cfg["textColor"], "#fafafa");
        assert_eq!(cfg["radius"], "6px");
        assert_eq!(cfg["side"], "left");
        assert_eq!(cfg["greeting"], widget::greeting("Support Bot"));
    }

    #[test]
    fn test_protocol_table_matches_adapter() {
        let script = generate_script(&ButtonStyle::default(), &model(ConnectionMode::Proxy)).unwrap();
        assert!(!script.contains(PROTOCOL_SLOT));
        assert!(!script.contains(CONFIG_SLOT));
        assert!(script.contains(llm::UNKNOWN_FORMAT));
        assert!(script.contains(llm::ANTHROPIC_VERSION));

        let table = serde_json::to_value(ProtocolTable::current()).unwrap();
        let proxy = &table["chains"]["proxy"]["strategies"];
        let names: Vec<_> = proxy
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["content", "choices", "output"]);
        assert_eq!(
            table["chains"]["gemini"]["strategies"][0]["path"],
            serde_json::json!(["candidates", 0, "content", "parts", 0, "text"])
        );
    }

    #[test]
    fn test_script_request_builder_mirrors_adapter() {
        let script = generate_script(&ButtonStyle::default(), &model(ConnectionMode::Direct)).unwrap();
        assert!(script.contains(r#"CONFIG.endpoint + "/models/" + CONFIG.model + ":generateContent?key=" + CONFIG.apiKey"#));
        assert!(script.contains(r#""Bearer " + CONFIG.apiKey"#));
        assert!(script.contains(r#"headers["x-api-key"] = CONFIG.apiKey"#));
        assert!(script.contains("body: { contents: [{ parts: [{ text: content }] }] }"));
        assert!(script.contains(
            "body: { model: CONFIG.model, max_tokens: PROTOCOL.anthropicMaxTokens, messages: messages }"
        ));
        assert!(script.contains("body: { messages: messages, model: CONFIG.model }"));

        let m = AIModel {
            provider: Provider::Gemini,
            endpoint: "https://g.example/v1beta/".to_string(),
            model: "gemini-1.5-flash".to_string(),
            ..model(ConnectionMode::Direct)
        };
        let cfg = config_of(&generate_script(&ButtonStyle::default(), &m).unwrap());
        let js_url = format!(
            "{}/models/{}:generateContent?key={}",
            cfg["endpoint"].as_str().unwrap(),
            cfg["model"].as_str().unwrap(),
            cfg["apiKey"].as_str().unwrap()
        );
        assert_eq!(js_url, llm::build_request(&m, "hi").url);

        let proxy = llm::build_request(&model(ConnectionMode::Proxy), "hi");
        let keys: Vec<_> = proxy.body.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["messages", "model"]);
    }

    #[test]
    fn test_markup_characters_in_credential_are_escaped_but_decode_verbatim() {
        let m = AIModel {
            api_key: "k<1>&\"2".to_string(),
            ..model(ConnectionMode::Direct)
        };
        let script = generate_script(&ButtonStyle::default(), &m).unwrap();
        assert!(!script.contains("k<1>&"));
        assert!(script.contains(r#"k\u003c1\u003e\u0026\"2"#));
        assert_eq!(config_of(&script)["apiKey"], "k<1>&\"2");
    }

    #[test]
    fn test_user_text_cannot_close_script_tag() {
        let style = ButtonStyle {
            label: "</script><script>alert(1)</script>".to_string(),
            ..ButtonStyle::default()
        };
        let m = AIModel {
            name: "Bot <b>&</b>".to_string(),
            ..model(ConnectionMode::Proxy)
        };
        let snippet = embed_snippet(&style, &m).unwrap();
        assert_eq!(snippet.matches("</script>").count(), 1);
        let cfg = config_of(&generate_script(&style, &m).unwrap());
        assert_eq!(cfg["label"], "</script><script>alert(1)</script>");

        let page = preview_page(&style, &m).unwrap();
        assert!(page.contains("Bot &lt;b&gt;&amp;&lt;/b&gt;"));
        assert_eq!(page.matches("</script>").count(), 1);
    }
}
